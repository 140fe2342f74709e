//! Hot-reloadable `config.ini` handling.
//!
//! The active configuration is an immutable `Arc<Config>` snapshot swapped
//! wholesale on reload; consumers grab one per cycle and never observe a
//! half-applied file. The file's modification time is polled on the
//! scheduler tick; a parse or read failure keeps the last-known-good
//! settings and retries on the next poll.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::constants::*;
use crate::logic::logwriter::LogWriter;
use crate::logic::notifier::{Notification, Notifier, Severity};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub monitor_interval_ms: u64,
    pub cpu_threshold_percent: u32,
    pub mem_threshold_mb: u64,
    pub hang_timeout_ms: u64,
    pub log_max_size_bytes: u64,
    pub max_hung_windows: u32,
    pub notify_on_termination: bool,
    pub start_monitoring_on_launch: bool,
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            cpu_threshold_percent: DEFAULT_CPU_THRESHOLD_PERCENT,
            mem_threshold_mb: DEFAULT_MEM_THRESHOLD_MB,
            hang_timeout_ms: DEFAULT_HANG_TIMEOUT_MS,
            log_max_size_bytes: DEFAULT_LOG_MAX_SIZE_BYTES,
            max_hung_windows: DEFAULT_MAX_HUNG_WINDOWS,
            notify_on_termination: false,
            start_monitoring_on_launch: true,
            exclude: Vec::new(),
        }
    }
}

struct ReloadState {
    last_mtime: Option<SystemTime>,
    load_failed: bool,
    last_poll: Option<Instant>,
    last_clamp_advisory: Option<Instant>,
    last_exclude_advisory: Option<Instant>,
    last_encoding_advisory: Option<Instant>,
    last_fail_advisory: Option<Instant>,
}

pub struct ConfigManager {
    path: PathBuf,
    active: RwLock<Arc<Config>>,
    state: Mutex<ReloadState>,
    log: Arc<LogWriter>,
    notifier: Arc<dyn Notifier>,
}

impl ConfigManager {
    /// Load (or create) `config.ini` in `dir`. A broken file at startup
    /// falls back to compiled defaults with an advisory; the next poll keeps
    /// retrying the file.
    pub fn new(dir: &Path, log: Arc<LogWriter>, notifier: Arc<dyn Notifier>) -> Self {
        let manager = ConfigManager {
            path: dir.join(CONFIG_FILE),
            active: RwLock::new(Arc::new(Config::default())),
            state: Mutex::new(ReloadState {
                last_mtime: None,
                load_failed: false,
                last_poll: None,
                last_clamp_advisory: None,
                last_exclude_advisory: None,
                last_encoding_advisory: None,
                last_fail_advisory: None,
            }),
            log,
            notifier,
        };

        if !manager.path.exists() {
            manager.write_default_file();
        }
        match manager.load() {
            Ok(cfg) => {
                *manager.active.write() = Arc::new(cfg);
                manager.state.lock().last_mtime = mtime_of(&manager.path);
            }
            Err(e) => {
                log::error!("initial config load failed: {e}");
                manager.state.lock().load_failed = true;
                manager.notifier.notify(&Notification::new(
                    Severity::Warning,
                    "Configuration Error",
                    "Failed to load config.ini. Using default settings. Please check the file format.".to_string(),
                ));
            }
        }
        manager
    }

    /// The currently active settings. Cheap; clone of an `Arc`.
    pub fn snapshot(&self) -> Arc<Config> {
        self.active.read().clone()
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the file for changes. Time-boxed internally; callers invoke it
    /// every tick and actual filesystem work happens at most every 5 s.
    /// `monitoring_active` gates the failure advisory, matching the rule
    /// that a paused monitor stays quiet.
    pub fn poll(&self, monitoring_active: bool) {
        let (due, retry_failed) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let due = match state.last_poll {
                Some(t) => now.duration_since(t) >= CONFIG_POLL_INTERVAL,
                None => true,
            };
            if due {
                state.last_poll = Some(now);
            }
            (due, state.load_failed)
        };
        if !due {
            return;
        }

        let current_mtime = mtime_of(&self.path);
        let changed = {
            let state = self.state.lock();
            current_mtime != state.last_mtime
        };
        if !changed && !retry_failed {
            return;
        }

        if !self.path.exists() {
            self.write_default_file();
        }

        match self.load() {
            Ok(cfg) => {
                *self.active.write() = Arc::new(cfg);
                let mut state = self.state.lock();
                state.last_mtime = mtime_of(&self.path);
                state.load_failed = false;
                drop(state);
                self.log.line("Configuration reloaded from file.");
            }
            Err(e) => {
                log::warn!("config reload failed: {e}");
                self.log
                    .line("ERROR: Failed to reload configuration; will retry on next check.");
                let advise = {
                    let mut state = self.state.lock();
                    state.load_failed = true;
                    monitoring_active
                        && cooldown_due(&mut state.last_fail_advisory, CONFIG_FAIL_ALERT_COOLDOWN)
                };
                if advise {
                    self.notifier.notify(&Notification::new(
                        Severity::Warning,
                        "Process Monitor",
                        "Failed to reload config, using previous settings".to_string(),
                    ));
                }
            }
        }
    }

    fn load(&self) -> std::io::Result<Config> {
        let raw = fs::read(&self.path)?;
        self.sniff_encoding(&raw);

        let text = String::from_utf8_lossy(&raw);
        // A UTF-8 BOM decodes to U+FEFF, which is not whitespace; left in
        // place it would break the [Settings] header match.
        let text = text.trim_start_matches('\u{feff}');
        let mut cfg = Config::default();
        let mut clamped = false;
        let mut exclude_warning = false;
        let mut in_settings = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                in_settings = line.eq_ignore_ascii_case("[Settings]");
                continue;
            }
            if !in_settings {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "MonitorIntervalMs" => {
                    cfg.monitor_interval_ms = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_MONITOR_INTERVAL_MS,
                        MIN_MONITOR_INTERVAL_MS,
                        MAX_MONITOR_INTERVAL_MS,
                        &mut clamped,
                    )
                }
                "CpuThresholdPercent" => {
                    cfg.cpu_threshold_percent = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_CPU_THRESHOLD_PERCENT as u64,
                        MIN_CPU_THRESHOLD as u64,
                        MAX_CPU_THRESHOLD as u64,
                        &mut clamped,
                    ) as u32
                }
                "MemThresholdMb" => {
                    cfg.mem_threshold_mb = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_MEM_THRESHOLD_MB,
                        MIN_MEM_THRESHOLD_MB,
                        MAX_MEM_THRESHOLD_MB,
                        &mut clamped,
                    )
                }
                "HangTimeoutMs" => {
                    cfg.hang_timeout_ms = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_HANG_TIMEOUT_MS,
                        MIN_HANG_TIMEOUT_MS,
                        MAX_HANG_TIMEOUT_MS,
                        &mut clamped,
                    )
                }
                "LogMaxSizeBytes" => {
                    cfg.log_max_size_bytes = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_LOG_MAX_SIZE_BYTES,
                        MIN_LOG_SIZE_BYTES,
                        MAX_LOG_SIZE_BYTES,
                        &mut clamped,
                    )
                }
                "MaxHungWindows" => {
                    cfg.max_hung_windows = self.clamped_u64(
                        key,
                        value,
                        DEFAULT_MAX_HUNG_WINDOWS as u64,
                        MIN_MAX_HUNG_WINDOWS as u64,
                        MAX_MAX_HUNG_WINDOWS as u64,
                        &mut clamped,
                    ) as u32
                }
                "NotifyOnTermination" => {
                    cfg.notify_on_termination = value.parse::<i64>().map(|v| v != 0).unwrap_or(false)
                }
                "StartMonitoringOnLaunch" => {
                    cfg.start_monitoring_on_launch =
                        value.parse::<i64>().map(|v| v != 0).unwrap_or(true)
                }
                "ExcludeProcesses" => {
                    cfg.exclude = self.parse_exclude_list(value, &mut exclude_warning)
                }
                // Unknown keys are deliberately ignored.
                _ => {}
            }
        }

        let (clamp_due, exclude_due) = {
            let mut state = self.state.lock();
            (
                clamped && cooldown_due(&mut state.last_clamp_advisory, WARNING_COOLDOWN),
                exclude_warning && cooldown_due(&mut state.last_exclude_advisory, WARNING_COOLDOWN),
            )
        };
        if clamp_due {
            self.notifier.notify(&Notification::new(
                Severity::Info,
                "Configuration Notice",
                "Some settings were outside allowed range and have been adjusted. Check log for details.".to_string(),
            ));
        }
        if exclude_due {
            self.notifier.notify(&Notification::new(
                Severity::Warning,
                "Exclude List Notice",
                "Some entries in ExcludeProcesses were invalid (path separators, wildcards, or too long). They have been ignored. Check log for details.".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Parse a numeric value, defaulting on garbage and clamping to range
    /// with a log line when the written value was out of bounds.
    fn clamped_u64(
        &self,
        key: &str,
        value: &str,
        default: u64,
        min: u64,
        max: u64,
        clamped: &mut bool,
    ) -> u64 {
        let parsed = value.parse::<u64>().unwrap_or(default);
        let adjusted = parsed.clamp(min, max);
        if adjusted != parsed {
            *clamped = true;
            self.log.line(&format!(
                "Config {} adjusted from {} to {} (range {}-{})",
                key, parsed, adjusted, min, max
            ));
        }
        adjusted
    }

    fn parse_exclude_list(&self, value: &str, had_warning: &mut bool) -> Vec<String> {
        let mut out = Vec::new();
        for token in value.split([',', ';']).map(str::trim).filter(|t| !t.is_empty()) {
            if out.len() >= MAX_EXCLUDE_COUNT {
                self.log.line(&format!(
                    "Warning: Exclusion list truncated to {} entries (max)",
                    MAX_EXCLUDE_COUNT
                ));
                *had_warning = true;
                break;
            }
            if token.contains('*') || token.contains('?') {
                self.log.line(&format!(
                    "Warning: Exclude entry '{}' contains wildcard (* or ?) and will be ignored. Wildcards are not supported.",
                    token
                ));
                *had_warning = true;
            } else if token.contains('\\') || token.contains('/') {
                self.log.line(&format!(
                    "Warning: Exclude entry '{}' contains a path separator and will be ignored. Use only file names.",
                    token
                ));
                *had_warning = true;
            } else if token.chars().count() > MAX_EXCLUDE_NAME_LEN {
                self.log.line(&format!(
                    "Warning: Exclude entry '{}' is too long and has been truncated to {} characters.",
                    token, MAX_EXCLUDE_NAME_LEN
                ));
                *had_warning = true;
                out.push(token.chars().take(MAX_EXCLUDE_NAME_LEN).collect());
            } else {
                out.push(token.to_string());
            }
        }
        out
    }

    /// Warn once in a long while when the file looks like it was saved with
    /// a BOM or non-ASCII text; loading still proceeds best-effort.
    fn sniff_encoding(&self, raw: &[u8]) {
        let head = &raw[..raw.len().min(256)];
        if head.is_empty() {
            return;
        }
        let has_bom = head.starts_with(&[0xFF, 0xFE]) || head.starts_with(&[0xEF, 0xBB, 0xBF]);
        let high_bit = head.iter().any(|b| *b > 127);
        if !has_bom && !high_bit {
            return;
        }
        let due = {
            let mut state = self.state.lock();
            cooldown_due(&mut state.last_encoding_advisory, ENCODING_WARNING_COOLDOWN)
        };
        if !due {
            return;
        }
        if has_bom {
            self.log.line("NOTE: Configuration file appears to contain a Byte Order Mark (BOM). Please re-save config.ini as plain ASCII/ANSI text.");
            self.notifier.notify(&Notification::new(
                Severity::Warning,
                "Config Encoding",
                "config.ini has a BOM. Re-save it as plain ASCII/ANSI text.".to_string(),
            ));
        } else {
            self.log.line("NOTE: Configuration file contains non-ASCII characters. Please re-save config.ini as plain ASCII/ANSI text.");
            self.notifier.notify(&Notification::new(
                Severity::Warning,
                "Config Encoding",
                "config.ini may be UTF-8. Re-save it as plain ASCII/ANSI text.".to_string(),
            ));
        }
    }

    fn write_default_file(&self) {
        let result = fs::File::create(&self.path).and_then(|mut f| {
            f.write_all(DEFAULT_CONFIG_TEXT.as_bytes())
        });
        if let Err(e) = result {
            log::error!("failed to create default {}: {e}", self.path.display());
            self.notifier.notify(&Notification::new(
                Severity::Warning,
                "Configuration Error",
                "Failed to create default config.ini. Please check write permissions in the program folder.".to_string(),
            ));
        }
    }
}

const DEFAULT_CONFIG_TEXT: &str = "\
[Settings]
MonitorIntervalMs=5000
CpuThresholdPercent=80
MemThresholdMb=500
HangTimeoutMs=5000
LogMaxSizeBytes=1048576
MaxHungWindows=500
NotifyOnTermination=0
StartMonitoringOnLaunch=1
ExcludeProcesses=

; Process Monitor Configuration File
; All times are in milliseconds.
; Edit values as needed. The program will automatically reload changes.
; StartMonitoringOnLaunch: 1 to start monitoring automatically, 0 to start stopped.
; NotifyOnTermination: 1 to show a notification when a normal process is terminated, 0 to only log.
; ExcludeProcesses: comma or semicolon separated list (e.g., notepad.exe,calc.exe)
; Note: CPU threshold is total process CPU time (may exceed 100% on multi-core).
; MaxHungWindows: limit number of windows to check for hanging (10-5000).
";

fn mtime_of(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True when the cooldown slot is free; claims it.
fn cooldown_due(slot: &mut Option<Instant>, window: std::time::Duration) -> bool {
    let now = Instant::now();
    let due = match *slot {
        Some(t) => now.duration_since(t) >= window,
        None => true,
    };
    if due {
        *slot = Some(now);
    }
    due
}
