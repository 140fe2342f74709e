//! OS-specific process and window access.
//!
//! Everything above this module works in 100-nanosecond CPU-time ticks and
//! plain pids; the per-OS files translate to and from the native APIs.

use std::time::Duration;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{is_system_path, process_cpu_times, terminate_process, NativeWindowProbe};

#[cfg(unix)]
mod linux;
#[cfg(unix)]
pub use self::linux::{is_system_path, process_cpu_times, terminate_process, NativeWindowProbe};

/// CPU time accumulators for one process, in 100ns ticks, plus the process
/// age used for lifetime averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub kernel_100ns: u64,
    pub user_100ns: u64,
    pub age: Duration,
}

impl CpuTimes {
    pub fn total_100ns(&self) -> u64 {
        self.kernel_100ns + self.user_100ns
    }
}
