//! Unix implementation: /proc-based CPU times, SIGKILL termination, and a
//! stub window probe (hang detection is a windowing-system concept and is
//! effectively disabled here).

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::logic::hung::{TopLevelWindow, WindowProbe};
use crate::logic::terminate::TerminateError;

use super::CpuTimes;

fn clock_ticks_per_sec() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks <= 0 {
        100
    } else {
        ticks as u64
    }
}

fn ticks_to_100ns(ticks: u64) -> u64 {
    ticks.saturating_mul(10_000_000 / clock_ticks_per_sec())
}

fn system_uptime() -> io::Result<f64> {
    let raw = fs::read_to_string("/proc/uptime")?;
    raw.split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/uptime"))
}

pub fn process_cpu_times(pid: u32) -> io::Result<CpuTimes> {
    let raw = fs::read_to_string(format!("/proc/{pid}/stat"))?;
    // The comm field is parenthesized and may itself contain spaces and
    // parentheses; everything after the last ')' is fixed-position.
    let rest = raw
        .rfind(')')
        .map(|i| &raw[i + 1..])
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed stat line"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After comm: state is field 0, utime 11, stime 12, starttime 19.
    if fields.len() < 20 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "short stat line"));
    }
    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-numeric stat field"))
    };
    let utime = parse(fields[11])?;
    let stime = parse(fields[12])?;
    let starttime = parse(fields[19])?;

    let uptime = system_uptime()?;
    let age_secs = (uptime - starttime as f64 / clock_ticks_per_sec() as f64).max(0.0);
    Ok(CpuTimes {
        kernel_100ns: ticks_to_100ns(stime),
        user_100ns: ticks_to_100ns(utime),
        age: Duration::from_secs_f64(age_secs),
    })
}

pub fn terminate_process(pid: u32) -> Result<(), TerminateError> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let e = io::Error::last_os_error();
    match e.raw_os_error() {
        Some(libc::EPERM) => Err(TerminateError::AccessDenied),
        Some(libc::ESRCH) => Err(TerminateError::NotFound),
        _ => Err(TerminateError::Os(e)),
    }
}

/// True when `path` sits under a directory owned by the base system.
pub fn is_system_path(path: &Path) -> bool {
    const SYSTEM_PREFIXES: &[&str] = &[
        "/usr/bin/",
        "/usr/sbin/",
        "/usr/lib/systemd/",
        "/bin/",
        "/sbin/",
        "/lib/systemd/",
    ];
    let text = path.to_string_lossy();
    SYSTEM_PREFIXES.iter().any(|p| text.starts_with(p))
}

/// No desktop integration here; reports no windows, so nothing is ever
/// classified as hung.
pub struct NativeWindowProbe;

impl WindowProbe for NativeWindowProbe {
    fn visible_windows(&self) -> Vec<TopLevelWindow> {
        Vec::new()
    }

    fn is_responsive(&self, _window: &TopLevelWindow, _timeout: Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_times_are_readable() {
        let times = process_cpu_times(std::process::id()).unwrap();
        assert!(times.age > Duration::ZERO);
        // Burn a little CPU and confirm the accumulator moved.
        let mut x = 0u64;
        for i in 0..5_000_000u64 {
            x = x.wrapping_add(i);
        }
        assert!(x > 0);
        let later = process_cpu_times(std::process::id()).unwrap();
        assert!(later.total_100ns() >= times.total_100ns());
    }

    #[test]
    fn missing_process_is_an_error() {
        // Pid 0 has no /proc entry.
        assert!(process_cpu_times(0).is_err());
    }

    #[test]
    fn system_path_prefixes() {
        assert!(is_system_path(Path::new("/usr/sbin/sshd")));
        assert!(is_system_path(Path::new("/usr/lib/systemd/systemd-logind")));
        assert!(!is_system_path(Path::new("/home/bob/sshd")));
        assert!(!is_system_path(Path::new("/usr/local/bin/tool")));
    }

    #[test]
    fn kill_nonexistent_pid_reports_not_found() {
        // Pid near the default pid_max limit; extremely unlikely to exist.
        match terminate_process(4_194_000) {
            Err(TerminateError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
