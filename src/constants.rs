//! Tunable limits, defaults and file names shared across the engine.

use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// CONFIGURATION DEFAULTS AND RANGES
// ============================================================================

pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CPU_THRESHOLD_PERCENT: u32 = 80;
pub const DEFAULT_MEM_THRESHOLD_MB: u64 = 500;
pub const DEFAULT_HANG_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LOG_MAX_SIZE_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_HUNG_WINDOWS: u32 = 500;

pub const MIN_MONITOR_INTERVAL_MS: u64 = 1000;
pub const MAX_MONITOR_INTERVAL_MS: u64 = 60000;
pub const MIN_CPU_THRESHOLD: u32 = 1;
pub const MAX_CPU_THRESHOLD: u32 = 100;
pub const MIN_MEM_THRESHOLD_MB: u64 = 1;
pub const MAX_MEM_THRESHOLD_MB: u64 = 65536;
pub const MIN_HANG_TIMEOUT_MS: u64 = 1000;
pub const MAX_HANG_TIMEOUT_MS: u64 = 30000;
pub const MIN_LOG_SIZE_BYTES: u64 = 1024;
pub const MAX_LOG_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const MIN_MAX_HUNG_WINDOWS: u32 = 10;
pub const MAX_MAX_HUNG_WINDOWS: u32 = 5000;

/// Upper bound on user exclusion-list entries.
pub const MAX_EXCLUDE_COUNT: usize = 32;
/// Longest accepted exclusion token; longer tokens are truncated with a warning.
pub const MAX_EXCLUDE_NAME_LEN: usize = 259;

// ============================================================================
// RETRY / BACKOFF
// ============================================================================

/// Consecutive failed termination attempts before giving up on a process.
pub const TERMINATE_RETRY_LIMIT: u32 = 5;

pub const LOG_RENAME_RETRY_LIMIT: usize = 10;
pub const LOG_RENAME_DELAYS_MS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 5000, 5000, 5000, 5000];

pub const LOG_WRITE_RETRY_LIMIT: usize = 5;
pub const LOG_WRITE_DELAYS_MS: [u64; 5] = [100, 200, 400, 800, 1600];

/// Cap for the exponential wait after consecutive snapshot failures.
pub const MAX_BACKOFF_WAIT: Duration = Duration::from_secs(60);
pub const MAX_BACKOFF_SHIFT: u32 = 10;

pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// ADVISORY COOLDOWNS
// ============================================================================

pub const SUSPICIOUS_ALERT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const CONFIG_FAIL_ALERT_COOLDOWN: Duration = Duration::from_secs(10 * 60);
pub const ENCODING_WARNING_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const WARNING_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const LOG_FAIL_ALERT_COOLDOWN: Duration = Duration::from_secs(60 * 60);
pub const COOLDOWN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// FILES
// ============================================================================

pub const CONFIG_FILE: &str = "config.ini";
pub const LOG_FILE: &str = "monitor.log";
pub const LOG_FILE_OLD: &str = "monitor.log.old";
pub const LOG_TEMP_FILE: &str = "monitor.log.tmp";

// ============================================================================
// BUILT-IN PROTECTED PROCESS NAMES
// ============================================================================

/// Processes on this list that also live under a system directory are never
/// terminated, only reported when suspicious.
#[cfg(windows)]
pub const BUILTIN_PROTECTED_NAMES: &[&str] = &[
    "csrss.exe", "services.exe", "lsass.exe", "lsm.exe", "smss.exe", "wininit.exe",
    "winlogon.exe", "system", "system.exe", "svchost.exe", "dwm.exe",
    "conhost.exe", "spoolsv.exe", "taskhost.exe", "taskhostw.exe",
    "explorer.exe", "fontdrvhost.exe", "SearchIndexer.exe", "SearchHost.exe",
    "RuntimeBroker.exe", "SecurityHealthService.exe", "SecurityHealthSystray.exe",
    "SgrmBroker.exe", "StartMenuExperienceHost.exe", "TextInputHost.exe",
    "Widgets.exe", "WindowsTerminal.exe", "wlanext.exe",
    "WmiPrvSE.exe", "WUDFHost.exe", "dllhost.exe", "taskeng.exe",
    "audiodg.exe", "LogonUI.exe", "userinit.exe",
];

#[cfg(not(windows))]
pub const BUILTIN_PROTECTED_NAMES: &[&str] = &[
    "systemd", "init", "kthreadd", "dbus-daemon", "sshd", "login",
    "NetworkManager", "polkitd", "cron", "crond", "rsyslogd", "journald",
    "systemd-journald", "systemd-logind", "systemd-udevd", "agetty",
];
