//! Scan scheduling and per-process orchestration.
//!
//! One scheduler thread owns the cycle: rotate the log, build the hung set,
//! enumerate processes, classify and enforce each, sweep stale history.
//! Process enumeration sits behind `SystemView` so the whole pipeline runs
//! against fakes in tests.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::System;

use crate::constants::{COOLDOWN_CLEANUP_INTERVAL, MAX_BACKOFF_SHIFT, MAX_BACKOFF_WAIT};
use crate::logic::config::{Config, ConfigManager};
use crate::logic::cooldown::CooldownTable;
use crate::logic::history::{HistoryStore, Trigger};
use crate::logic::hung::{build_hung_set, HungWindowSet, WindowProbe};
use crate::logic::logwriter::LogWriter;
use crate::logic::measure::{instantaneous_percent, lifetime_average_percent, mb_from_bytes, CpuSample};
use crate::logic::notifier::{Notification, Notifier, Severity};
use crate::logic::policy::{
    classify_normal, classify_system, describe_abnormality, describe_suspicion, route, Route,
};
use crate::logic::shutdown::Shutdown;
use crate::logic::terminate::Terminator;
use crate::platform::CpuTimes;

/// One enumerated process, as much of it as the OS let us see.
#[derive(Debug, Clone)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub memory_bytes: Option<u64>,
}

#[derive(Debug)]
pub struct SnapshotError(pub String);

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SnapshotError {}

pub trait SystemView: Send {
    /// Enumerate all running processes.
    fn snapshot(&mut self) -> Result<Vec<ProcessSample>, SnapshotError>;

    /// CPU time accumulators and age for one process.
    fn cpu_times(&self, pid: u32) -> io::Result<CpuTimes>;
}

/// Live enumeration through `sysinfo`, CPU times through the native APIs
/// (sysinfo's own CPU numbers are refresh-relative; the policy needs raw
/// accumulators).
pub struct SysinfoView {
    sys: System,
}

impl SysinfoView {
    pub fn new() -> Self {
        SysinfoView { sys: System::new() }
    }
}

impl Default for SysinfoView {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemView for SysinfoView {
    fn snapshot(&mut self) -> Result<Vec<ProcessSample>, SnapshotError> {
        self.sys.refresh_processes();
        let samples = self
            .sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessSample {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                exe: process.exe().map(|p| p.to_path_buf()),
                memory_bytes: Some(process.memory()),
            })
            .collect();
        Ok(samples)
    }

    fn cpu_times(&self, pid: u32) -> io::Result<CpuTimes> {
        crate::platform::process_cpu_times(pid)
    }
}

/// Runtime switches owned by the embedding layer: monitoring on/off and the
/// pending system-resume notification.
pub struct RuntimeFlags {
    monitor_active: AtomicBool,
    system_resumed: AtomicBool,
}

impl RuntimeFlags {
    pub fn new(monitor_active: bool) -> Self {
        RuntimeFlags {
            monitor_active: AtomicBool::new(monitor_active),
            system_resumed: AtomicBool::new(false),
        }
    }

    pub fn monitoring(&self) -> bool {
        self.monitor_active.load(Ordering::Relaxed)
    }

    pub fn set_monitoring(&self, on: bool) {
        self.monitor_active.store(on, Ordering::Relaxed);
    }

    /// Called from the power-event handler; the scheduler picks it up on
    /// its next tick.
    pub fn flag_resume(&self) {
        self.system_resumed.store(true, Ordering::Relaxed);
    }

    fn take_resume(&self) -> bool {
        self.system_resumed.swap(false, Ordering::Relaxed)
    }
}

/// Exponential wait after consecutive snapshot failures, doubling per
/// failure and capped both in shift and absolute duration.
fn backoff_wait(interval: Duration, failures: u32) -> Duration {
    if failures <= 1 {
        return interval.min(MAX_BACKOFF_WAIT);
    }
    let shift = (failures - 1).min(MAX_BACKOFF_SHIFT);
    interval
        .saturating_mul(1u32 << shift)
        .min(MAX_BACKOFF_WAIT)
}

pub struct Monitor {
    view: Box<dyn SystemView>,
    probe: Box<dyn WindowProbe>,
    terminator: Terminator,
    config: Arc<ConfigManager>,
    history: Arc<HistoryStore>,
    log: Arc<LogWriter>,
    cooldowns: Arc<CooldownTable>,
    notifier: Arc<dyn Notifier>,
    shutdown: Arc<Shutdown>,
    flags: Arc<RuntimeFlags>,
    own_pid: u32,
    snapshot_failures: u32,
    last_prune: Instant,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view: Box<dyn SystemView>,
        probe: Box<dyn WindowProbe>,
        terminator: Terminator,
        config: Arc<ConfigManager>,
        history: Arc<HistoryStore>,
        log: Arc<LogWriter>,
        cooldowns: Arc<CooldownTable>,
        notifier: Arc<dyn Notifier>,
        shutdown: Arc<Shutdown>,
        flags: Arc<RuntimeFlags>,
    ) -> Self {
        Monitor {
            view,
            probe,
            terminator,
            config,
            history,
            log,
            cooldowns,
            notifier,
            shutdown,
            flags,
            own_pid: std::process::id(),
            snapshot_failures: 0,
            last_prune: Instant::now(),
        }
    }

    /// Scheduler loop; returns when the shutdown signal fires.
    pub fn run(&mut self) {
        while !self.shutdown.is_triggered() {
            self.config.poll(self.flags.monitoring());

            if self.flags.take_resume() {
                self.history.reset_all();
                self.log
                    .line("System resume detected, resetting process history.");
            }

            if self.last_prune.elapsed() >= COOLDOWN_CLEANUP_INTERVAL {
                self.cooldowns.prune();
                self.last_prune = Instant::now();
            }

            let cfg = self.config.snapshot();
            let interval = Duration::from_millis(cfg.monitor_interval_ms);
            let wait = if self.flags.monitoring() {
                self.run_cycle(&cfg)
            } else {
                interval
            };

            if self.shutdown.wait_timeout(wait) {
                break;
            }
        }
        log::info!("scheduler stopped");
    }

    /// One full scan. Returns how long to wait before the next one, which
    /// stretches under snapshot-failure backoff.
    pub fn run_cycle(&mut self, cfg: &Config) -> Duration {
        let interval = Duration::from_millis(cfg.monitor_interval_ms);

        self.log.rotate_if_needed(cfg.log_max_size_bytes);

        let hung_set = build_hung_set(
            self.probe.as_ref(),
            Duration::from_millis(cfg.hang_timeout_ms),
            cfg.max_hung_windows,
            &self.shutdown,
            &self.log,
        );

        let samples = match self.view.snapshot() {
            Ok(samples) => samples,
            Err(e) => {
                self.snapshot_failures += 1;
                if self.snapshot_failures == 1 {
                    self.log.line(&format!(
                        "ERROR: Process snapshot failed ({}), will retry with backoff.",
                        e
                    ));
                } else if self.snapshot_failures > 3 {
                    self.log.line(&format!(
                        "ERROR: Snapshot has failed {} times consecutively.",
                        self.snapshot_failures
                    ));
                }
                return backoff_wait(interval, self.snapshot_failures);
            }
        };
        if self.snapshot_failures > 0 {
            self.log.line(&format!(
                "Snapshot succeeded after {} failures.",
                self.snapshot_failures
            ));
            self.snapshot_failures = 0;
        }

        self.history.mark_all_unseen();
        for sample in &samples {
            if self.shutdown.is_triggered() {
                break;
            }
            self.examine(sample, &hung_set, cfg);
        }
        self.history.sweep();
        interval
    }

    fn examine(&mut self, sample: &ProcessSample, hung_set: &HungWindowSet, cfg: &Config) {
        match route(
            sample.pid,
            self.own_pid,
            &sample.name,
            sample.exe.as_deref(),
            &cfg.exclude,
        ) {
            Route::Ignored => {}
            Route::SystemProtected => self.check_system(sample, hung_set, cfg),
            Route::Normal => self.check_normal(sample, hung_set, cfg),
        }
    }

    fn check_normal(&mut self, sample: &ProcessSample, hung_set: &HungWindowSet, cfg: &Config) {
        let hung = hung_set.contains(sample.pid);
        let times = match self.view.cpu_times(sample.pid) {
            Ok(times) => times,
            Err(_) => {
                // Process exists but is not inspectable; hang detection
                // still applies, resource checks do not.
                self.history.touch(sample.pid);
                if hung {
                    self.enforce_hang_only(sample);
                } else {
                    self.history.reset_trigger(sample.pid, Trigger::Hang);
                }
                return;
            }
        };

        let cpu = match self
            .history
            .sample(sample.pid, times.kernel_100ns, times.user_100ns)
        {
            // First sighting: no interval yet, CPU judged from the next
            // sample onward.
            None => CpuSample::Percent(0.0),
            Some(delta) => {
                CpuSample::Percent(instantaneous_percent(delta.delta_100ns, delta.elapsed_secs))
            }
        };
        let mem_mb = sample.memory_bytes.map(mb_from_bytes);

        let abnormality = classify_normal(
            cpu,
            mem_mb,
            hung,
            cfg.cpu_threshold_percent,
            cfg.mem_threshold_mb,
        );
        let Some(abnormality) = abnormality else {
            self.history.reset_trigger(sample.pid, Trigger::Resource);
            return;
        };

        if self.history.is_exhausted(sample.pid, Trigger::Resource) {
            if self.history.claim_exhaustion_log(sample.pid, Trigger::Resource) {
                self.log.line(&format!(
                    "Process {} (PID {}) exceeds threshold but termination attempts exhausted, skipping further attempts",
                    sample.name, sample.pid
                ));
            }
            return;
        }

        let reason =
            describe_abnormality(abnormality, cfg.cpu_threshold_percent, cfg.mem_threshold_mb);
        self.log.line(&event_body(
            false,
            sample,
            &reason,
            cpu.value_or_zero(),
            mem_mb,
        ));
        if cfg.notify_on_termination {
            self.notifier.notify(
                &Notification::new(
                    Severity::Info,
                    "Process Terminated",
                    format!(
                        "Terminated {} (PID {})\nReason: {}",
                        sample.name, sample.pid, reason
                    ),
                )
                .for_process(&sample.name, sample.pid),
            );
        }
        self.terminator
            .enforce(sample.pid, &sample.name, Trigger::Resource);
    }

    fn enforce_hang_only(&mut self, sample: &ProcessSample) {
        if self.history.is_exhausted(sample.pid, Trigger::Hang) {
            if self.history.claim_exhaustion_log(sample.pid, Trigger::Hang) {
                self.log.line(&format!(
                    "Process {} (PID {}) is hung but termination attempts exhausted, skipping further attempts",
                    sample.name, sample.pid
                ));
            }
            return;
        }
        self.terminator
            .enforce(sample.pid, &sample.name, Trigger::Hang);
    }

    fn check_system(&mut self, sample: &ProcessSample, hung_set: &HungWindowSet, cfg: &Config) {
        let path_text = sample
            .exe
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Path unavailable".to_string());

        if hung_set.contains(sample.pid) {
            if self.cooldowns.should_fire(&sample.name) {
                self.notifier.notify(
                    &Notification::new(
                        Severity::Warning,
                        "Suspicious System Process",
                        format!(
                            "System process {} (PID {}) has a hung window.\nPath: {}\n(This could be normal activity; check the path if concerned.)",
                            sample.name, sample.pid, path_text
                        ),
                    )
                    .for_process(&sample.name, sample.pid),
                );
            }
            self.log
                .line(&event_body(true, sample, "Window not responding", 0.0, None));
            return;
        }

        let times = match self.view.cpu_times(sample.pid) {
            Ok(times) => times,
            Err(_) => return,
        };
        let instant = match self
            .history
            .sample(sample.pid, times.kernel_100ns, times.user_100ns)
        {
            None => CpuSample::Percent(0.0),
            Some(delta) => {
                CpuSample::Percent(instantaneous_percent(delta.delta_100ns, delta.elapsed_secs))
            }
        };
        let average = CpuSample::Percent(lifetime_average_percent(
            times.total_100ns(),
            times.age.as_secs_f64(),
        ));
        let mem_mb = sample.memory_bytes.map(mb_from_bytes);

        let suspicion = classify_system(
            instant,
            average,
            mem_mb,
            false,
            cfg.cpu_threshold_percent,
            cfg.mem_threshold_mb,
        );
        let Some(suspicion) = suspicion else {
            return;
        };

        if self.cooldowns.should_fire(&sample.name) {
            self.notifier.notify(
                &Notification::new(
                    Severity::Warning,
                    "Suspicious System Process",
                    format!(
                        "System process {} (PID {}) is using excessive resources.\nCPU: {:.1}% (inst) / {:.1}% (avg)  Memory: {} MB\nPath: {}\n(This could be normal activity; check the path if concerned.)",
                        sample.name,
                        sample.pid,
                        instant.value_or_zero(),
                        average.value_or_zero(),
                        mem_mb.unwrap_or(0),
                        path_text
                    ),
                )
                .for_process(&sample.name, sample.pid),
            );
        }
        let logged_cpu = if instant.value_or_zero() > 0.0 {
            instant.value_or_zero()
        } else {
            average.value_or_zero()
        };
        self.log.line(&event_body(
            true,
            sample,
            &describe_suspicion(suspicion),
            logged_cpu,
            mem_mb,
        ));
    }
}

/// The multi-line log body shared by terminations and suspicious-system
/// reports.
fn event_body(
    suspicious: bool,
    sample: &ProcessSample,
    reason: &str,
    cpu: f32,
    mem_mb: Option<u64>,
) -> String {
    let mem_text = match mem_mb {
        Some(mb) => format!("{} MB", mb),
        None => "N/A".to_string(),
    };
    let path_text = sample
        .exe
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "Path unavailable".to_string());
    if suspicious {
        format!(
            "SUSPICIOUS SYSTEM PROCESS: {} (PID {})\n  Reason: {}\n  CPU: {:.1}%  Memory: {}\n  Path: {}\n  This may indicate malware infection. (If this is normal system activity, you can ignore this warning.)",
            sample.name, sample.pid, reason, cpu, mem_text, path_text
        )
    } else {
        format!(
            "Terminated process: {} (PID {})\n  Reason: {}\n  CPU: {:.1}%  Memory: {}\n  Path: {}",
            sample.name, sample.pid, reason, cpu, mem_text, path_text
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BUILTIN_PROTECTED_NAMES, CONFIG_FILE, TERMINATE_RETRY_LIMIT};
    use crate::logic::hung::TopLevelWindow;
    use crate::logic::notifier::test_support::RecordingNotifier;
    use crate::logic::terminate::{ProcessKiller, TerminateError};
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// Shared-handle fake: tests keep a clone and mutate the process table
    /// between cycles.
    #[derive(Clone)]
    struct FakeView {
        samples: Arc<Mutex<Vec<ProcessSample>>>,
        times: Arc<Mutex<HashMap<u32, CpuTimes>>>,
        fail_snapshots: Arc<Mutex<u32>>,
    }

    impl FakeView {
        fn new() -> Self {
            FakeView {
                samples: Arc::new(Mutex::new(Vec::new())),
                times: Arc::new(Mutex::new(HashMap::new())),
                fail_snapshots: Arc::new(Mutex::new(0)),
            }
        }

        fn add(&self, pid: u32, name: &str, exe: Option<&str>, mem_mb: u64) {
            self.samples.lock().push(ProcessSample {
                pid,
                name: name.to_string(),
                exe: exe.map(PathBuf::from),
                memory_bytes: Some(mem_mb * 1024 * 1024),
            });
            self.times.lock().insert(
                pid,
                CpuTimes {
                    kernel_100ns: 0,
                    user_100ns: 0,
                    age: Duration::from_secs(60),
                },
            );
        }

        fn advance_cpu(&self, pid: u32, delta_100ns: u64) {
            if let Some(t) = self.times.lock().get_mut(&pid) {
                t.user_100ns += delta_100ns;
            }
        }

        fn clear(&self) {
            self.samples.lock().clear();
        }
    }

    impl SystemView for FakeView {
        fn snapshot(&mut self) -> Result<Vec<ProcessSample>, SnapshotError> {
            let mut failures = self.fail_snapshots.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SnapshotError("simulated".to_string()));
            }
            Ok(self.samples.lock().clone())
        }

        fn cpu_times(&self, pid: u32) -> io::Result<CpuTimes> {
            self.times
                .lock()
                .get(&pid)
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
        }
    }

    struct NoWindows;

    impl WindowProbe for NoWindows {
        fn visible_windows(&self) -> Vec<TopLevelWindow> {
            Vec::new()
        }

        fn is_responsive(&self, _: &TopLevelWindow, _: Duration) -> bool {
            true
        }
    }

    struct HungWindows(Vec<u32>);

    impl WindowProbe for HungWindows {
        fn visible_windows(&self) -> Vec<TopLevelWindow> {
            self.0
                .iter()
                .enumerate()
                .map(|(i, &pid)| TopLevelWindow { handle: i, pid })
                .collect()
        }

        fn is_responsive(&self, _: &TopLevelWindow, _: Duration) -> bool {
            false
        }
    }

    struct KillLog {
        killed: Mutex<Vec<u32>>,
        refuse: HashSet<u32>,
    }

    struct SharedKiller(Arc<KillLog>);

    impl ProcessKiller for SharedKiller {
        fn kill(&self, pid: u32) -> Result<(), TerminateError> {
            if self.0.refuse.contains(&pid) {
                return Err(TerminateError::AccessDenied);
            }
            self.0.killed.lock().push(pid);
            Ok(())
        }
    }

    struct Fixture {
        monitor: Monitor,
        view: FakeView,
        config: Arc<ConfigManager>,
        history: Arc<HistoryStore>,
        notifier: Arc<RecordingNotifier>,
        kills: Arc<KillLog>,
        log_path: PathBuf,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn cycle(&mut self) -> Duration {
            let cfg = self.config.snapshot();
            self.monitor.run_cycle(&cfg)
        }

        fn killed(&self) -> Vec<u32> {
            self.kills.killed.lock().clone()
        }

        fn log(&self) -> String {
            std::fs::read_to_string(&self.log_path).unwrap_or_default()
        }
    }

    fn fixture(view: FakeView, probe: Box<dyn WindowProbe>, config_text: &str) -> Fixture {
        fixture_refusing(view, probe, config_text, HashSet::new())
    }

    fn fixture_refusing(
        view: FakeView,
        probe: Box<dyn WindowProbe>,
        config_text: &str,
        refuse: HashSet<u32>,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), config_text).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let shutdown = Arc::new(Shutdown::new());
        let log = Arc::new(LogWriter::new(dir.path(), notifier.clone(), shutdown.clone()));
        let log_path = log.path();
        let config = Arc::new(ConfigManager::new(dir.path(), log.clone(), notifier.clone()));
        let history = Arc::new(HistoryStore::new());
        let kills = Arc::new(KillLog {
            killed: Mutex::new(Vec::new()),
            refuse,
        });
        let terminator = Terminator::new(
            Box::new(SharedKiller(kills.clone())),
            notifier.clone(),
            log.clone(),
            history.clone(),
        );
        let monitor = Monitor::new(
            Box::new(view.clone()),
            probe,
            terminator,
            config.clone(),
            history.clone(),
            log,
            Arc::new(CooldownTable::new(Duration::from_secs(300))),
            notifier.clone(),
            shutdown,
            Arc::new(RuntimeFlags::new(true)),
        );
        Fixture {
            monitor,
            view,
            config,
            history,
            notifier,
            kills,
            log_path,
            _dir: dir,
        }
    }

    const BASIC_CFG: &str = "[Settings]\nCpuThresholdPercent=80\nMemThresholdMb=500\n";

    #[test]
    fn cpu_hog_terminated_on_second_sample() {
        let view = FakeView::new();
        view.add(100, "hog.exe", Some("/opt/hog"), 10);
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);

        // First cycle only seeds the history.
        f.cycle();
        assert!(f.killed().is_empty());

        // Far more CPU time than the elapsed interval allows.
        std::thread::sleep(Duration::from_millis(20));
        f.view.advance_cpu(100, 600_000_000);
        f.cycle();

        assert_eq!(f.killed(), vec![100]);
        let log = f.log();
        assert!(log.contains("Terminated process: hog.exe (PID 100)"));
        assert!(log.contains("Reason: High CPU:"));
        assert!(log.contains("Successfully terminated process hog.exe (PID 100)"));
    }

    #[test]
    fn memory_hog_terminated_on_first_sighting() {
        let view = FakeView::new();
        view.add(200, "leaky.exe", Some("/opt/leaky"), 900);
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);
        f.cycle();
        assert_eq!(f.killed(), vec![200]);
        assert!(f.log().contains("High memory: 900 MB (threshold 500 MB)"));
    }

    #[test]
    fn excluded_process_untouched() {
        let view = FakeView::new();
        view.add(300, "sacred.exe", Some("/opt/sacred"), 4000);
        let mut f = fixture(
            view,
            Box::new(NoWindows),
            "[Settings]\nMemThresholdMb=500\nExcludeProcesses=SACRED.exe\n",
        );
        f.cycle();
        assert!(f.killed().is_empty());
        assert!(!f.log().contains("sacred.exe"));
    }

    #[test]
    fn hung_normal_process_terminated() {
        let view = FakeView::new();
        view.add(400, "frozen.exe", Some("/opt/frozen"), 10);
        let mut f = fixture(view, Box::new(HungWindows(vec![400])), BASIC_CFG);
        f.cycle();
        assert_eq!(f.killed(), vec![400]);
        assert!(f.log().contains("Window not responding"));
    }

    #[test]
    fn suspicious_system_process_reported_not_killed() {
        let name = BUILTIN_PROTECTED_NAMES[0];
        let exe = if cfg!(windows) {
            format!("C:\\Windows\\System32\\{name}")
        } else {
            format!("/usr/sbin/{name}")
        };
        let view = FakeView::new();
        view.add(500, name, Some(&exe), 900);
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);
        f.cycle();

        // Memory over threshold on a protected process: reported only.
        assert!(f.killed().is_empty());
        let log = f.log();
        assert!(log.contains("SUSPICIOUS SYSTEM PROCESS:"));
        assert!(log.contains("High memory: 900 MB"));
        assert!(log.contains("This may indicate malware infection."));
        let suspicious_alerts = |f: &Fixture| {
            f.notifier
                .titles()
                .iter()
                .filter(|t| *t == "Suspicious System Process")
                .count()
        };
        assert_eq!(suspicious_alerts(&f), 1);

        // Second cycle inside the cooldown window: logged again, but no
        // second notification.
        f.cycle();
        assert_eq!(suspicious_alerts(&f), 1);
        assert_eq!(f.log().matches("SUSPICIOUS SYSTEM PROCESS:").count(), 2);
    }

    #[test]
    fn snapshot_failure_backs_off_and_recovers() {
        let view = FakeView::new();
        view.add(600, "fine.exe", Some("/opt/fine"), 10);
        *view.fail_snapshots.lock() = 2;
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);
        let interval = Duration::from_millis(f.config.snapshot().monitor_interval_ms);

        assert_eq!(f.cycle(), interval);
        assert_eq!(f.cycle(), (interval * 2).min(MAX_BACKOFF_WAIT));
        assert_eq!(f.cycle(), interval);

        let log = f.log();
        assert!(log.contains("will retry with backoff"));
        assert!(log.contains("Snapshot succeeded after 2 failures."));
    }

    #[test]
    fn backoff_wait_caps() {
        let interval = Duration::from_millis(5000);
        assert_eq!(backoff_wait(interval, 0), interval);
        assert_eq!(backoff_wait(interval, 1), interval);
        assert_eq!(backoff_wait(interval, 2), Duration::from_millis(10000));
        assert_eq!(backoff_wait(interval, 4), Duration::from_millis(40000));
        // Both the shift cap and the absolute cap hold.
        assert_eq!(backoff_wait(interval, 50), MAX_BACKOFF_WAIT);
        assert_eq!(
            backoff_wait(Duration::from_millis(1000), 8),
            MAX_BACKOFF_WAIT
        );
    }

    #[test]
    fn vanished_process_history_swept() {
        let view = FakeView::new();
        view.add(700, "brief.exe", Some("/opt/brief"), 10);
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);
        f.cycle();
        assert_eq!(f.history.len(), 1);

        f.view.clear();
        f.cycle();
        assert_eq!(f.history.len(), 0);
    }

    #[test]
    fn uninspectable_hung_process_uses_hang_budget() {
        let view = FakeView::new();
        view.add(800, "opaque.exe", None, 10);
        // No CPU-times entry: the query fails every cycle.
        view.times.lock().remove(&800);
        let refuse: HashSet<u32> = [800].into_iter().collect();
        let mut f = fixture_refusing(view, Box::new(HungWindows(vec![800])), BASIC_CFG, refuse);
        for _ in 0..TERMINATE_RETRY_LIMIT + 2 {
            f.cycle();
        }
        let log = f.log();
        assert!(log.contains(
            "Process opaque.exe (PID 800) termination attempts exhausted, will stop trying."
        ));
        // One exhaustion line total, despite the extra cycles.
        assert_eq!(
            log.lines()
                .filter(|l| l.contains("attempts exhausted"))
                .count(),
            1
        );
    }

    #[test]
    fn runtime_flags_toggle_and_resume_latch() {
        let flags = RuntimeFlags::new(false);
        assert!(!flags.monitoring());
        flags.set_monitoring(true);
        assert!(flags.monitoring());

        flags.flag_resume();
        assert!(flags.take_resume());
        // The latch is consumed by the read.
        assert!(!flags.take_resume());
    }

    #[test]
    fn scheduler_exits_promptly_on_shutdown() {
        let view = FakeView::new();
        let mut f = fixture(view, Box::new(NoWindows), BASIC_CFG);
        f.monitor.shutdown.trigger();
        let start = std::time::Instant::now();
        f.monitor.run();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn healthy_process_resets_retry_budget() {
        let view = FakeView::new();
        view.add(900, "flappy.exe", Some("/opt/flappy"), 900);
        let refuse: HashSet<u32> = [900].into_iter().collect();
        let mut f = fixture_refusing(view, Box::new(NoWindows), BASIC_CFG, refuse);
        // Burn most of the budget on failures.
        for _ in 0..TERMINATE_RETRY_LIMIT - 1 {
            f.cycle();
        }
        assert!(!f.history.is_exhausted(900, Trigger::Resource));

        // Process drops below the memory threshold: budget resets.
        f.view.samples.lock()[0].memory_bytes = Some(10 * 1024 * 1024);
        f.cycle();

        // Back over the threshold; the full budget is available again.
        f.view.samples.lock()[0].memory_bytes = Some(900 * 1024 * 1024);
        for _ in 0..TERMINATE_RETRY_LIMIT - 1 {
            f.cycle();
        }
        assert!(!f.history.is_exhausted(900, Trigger::Resource));
    }
}
