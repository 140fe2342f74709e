//! Win32 bindings: process times, forced termination, system-directory
//! checks and the hung-window probe.

use std::io;
use std::path::Path;
use std::time::Duration;

use windows_sys::Win32::Foundation::{CloseHandle, FILETIME, HANDLE, HWND, LPARAM};
use windows_sys::Win32::System::SystemInformation::GetSystemTimeAsFileTime;
use windows_sys::Win32::System::Threading::{
    GetProcessTimes, OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_TERMINATE,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, IsWindowVisible, SendMessageTimeoutW,
    SMTO_ABORTIFHUNG, SMTO_NORMAL, WM_NULL,
};

use super::CpuTimes;
use crate::logic::hung::{TopLevelWindow, WindowProbe};
use crate::logic::terminate::TerminateError;

const ERROR_ACCESS_DENIED: i32 = 5;

fn filetime_100ns(ft: &FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64
}

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn open(pid: u32, access: u32) -> io::Result<OwnedHandle> {
    let handle = unsafe { OpenProcess(access, 0, pid) };
    if handle == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(OwnedHandle(handle))
    }
}

pub fn process_cpu_times(pid: u32) -> io::Result<CpuTimes> {
    let handle = open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
    let mut creation = FILETIME { dwLowDateTime: 0, dwHighDateTime: 0 };
    let mut exit = FILETIME { dwLowDateTime: 0, dwHighDateTime: 0 };
    let mut kernel = FILETIME { dwLowDateTime: 0, dwHighDateTime: 0 };
    let mut user = FILETIME { dwLowDateTime: 0, dwHighDateTime: 0 };
    let ok = unsafe {
        GetProcessTimes(handle.0, &mut creation, &mut exit, &mut kernel, &mut user)
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    let mut now = FILETIME { dwLowDateTime: 0, dwHighDateTime: 0 };
    unsafe { GetSystemTimeAsFileTime(&mut now) };
    let age_100ns = filetime_100ns(&now).saturating_sub(filetime_100ns(&creation));
    Ok(CpuTimes {
        kernel_100ns: filetime_100ns(&kernel),
        user_100ns: filetime_100ns(&user),
        age: Duration::from_nanos(age_100ns.saturating_mul(100)),
    })
}

pub fn terminate_process(pid: u32) -> Result<(), TerminateError> {
    let handle = open(pid, PROCESS_TERMINATE).map_err(classify)?;
    let ok = unsafe { TerminateProcess(handle.0, 1) };
    if ok == 0 {
        Err(classify(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn classify(e: io::Error) -> TerminateError {
    match e.raw_os_error() {
        Some(ERROR_ACCESS_DENIED) => TerminateError::AccessDenied,
        _ if e.kind() == io::ErrorKind::NotFound => TerminateError::NotFound,
        _ => TerminateError::Os(e),
    }
}

/// True when `path` sits under a protected OS directory.
pub fn is_system_path(path: &Path) -> bool {
    let root = std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string());
    let lower = path.to_string_lossy().to_lowercase();
    let root = root.to_lowercase();
    [
        format!("{root}\\system32\\"),
        format!("{root}\\syswow64\\"),
        format!("{root}\\system32\\drivers\\"),
    ]
    .iter()
    .any(|prefix| lower.starts_with(prefix.as_str()))
}

pub struct NativeWindowProbe;

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> i32 {
    let out = &mut *(lparam as *mut Vec<TopLevelWindow>);
    if IsWindowVisible(hwnd) != 0 {
        let mut pid = 0u32;
        GetWindowThreadProcessId(hwnd, &mut pid);
        if pid != 0 {
            out.push(TopLevelWindow {
                handle: hwnd as usize,
                pid,
            });
        }
    }
    1
}

impl WindowProbe for NativeWindowProbe {
    fn visible_windows(&self) -> Vec<TopLevelWindow> {
        let mut windows: Vec<TopLevelWindow> = Vec::new();
        unsafe {
            EnumWindows(Some(collect_window), &mut windows as *mut _ as LPARAM);
        }
        windows
    }

    fn is_responsive(&self, window: &TopLevelWindow, timeout: Duration) -> bool {
        let mut result: usize = 0;
        let sent = unsafe {
            SendMessageTimeoutW(
                window.handle as HWND,
                WM_NULL,
                0,
                0,
                SMTO_ABORTIFHUNG | SMTO_NORMAL,
                timeout.as_millis() as u32,
                &mut result,
            )
        };
        sent != 0
    }
}
