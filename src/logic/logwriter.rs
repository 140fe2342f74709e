//! Durable append-only event log with size-bounded rotation.
//!
//! Every engine event becomes one timestamped UTF-8 line in `monitor.log`.
//! When the file outgrows the configured limit it is rotated to a `.old`
//! sibling via a two-step rename (live -> `.tmp` -> `.old`) so a crash
//! mid-rotation cannot silently lose the rotated file. If the rename keeps
//! failing (file locked by a viewer), the live file is truncated in place
//! instead of growing without bound.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::constants::{
    LOG_FAIL_ALERT_COOLDOWN, LOG_FILE, LOG_FILE_OLD, LOG_RENAME_DELAYS_MS,
    LOG_RENAME_RETRY_LIMIT, LOG_TEMP_FILE, LOG_WRITE_DELAYS_MS, LOG_WRITE_RETRY_LIMIT,
};
use crate::logic::notifier::{Notification, Notifier, Severity};
use crate::logic::shutdown::Shutdown;

struct LogInner {
    file: Option<File>,
    path: PathBuf,
    old_path: PathBuf,
    tmp_path: PathBuf,
}

pub struct LogWriter {
    inner: Mutex<LogInner>,
    last_fail_warning: Mutex<Option<Instant>>,
    notifier: Arc<dyn Notifier>,
    shutdown: Arc<Shutdown>,
}

impl LogWriter {
    /// Creates the writer rooted in `dir`. A `.tmp` artifact left behind by
    /// a crash mid-rotation is removed here.
    pub fn new(dir: &Path, notifier: Arc<dyn Notifier>, shutdown: Arc<Shutdown>) -> Self {
        let tmp_path = dir.join(LOG_TEMP_FILE);
        let _ = fs::remove_file(&tmp_path);
        LogWriter {
            inner: Mutex::new(LogInner {
                file: None,
                path: dir.join(LOG_FILE),
                old_path: dir.join(LOG_FILE_OLD),
                tmp_path,
            }),
            last_fail_warning: Mutex::new(None),
            notifier,
            shutdown,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Append one timestamped line. Failures are retried briefly, then the
    /// line is dropped: logging must never block or crash enforcement.
    pub fn line(&self, message: &str) {
        let stamped = format!(
            "[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        self.write_raw(stamped.as_bytes());
    }

    fn write_raw(&self, bytes: &[u8]) {
        let mut disk_full = false;
        {
            let mut inner = self.inner.lock();
            if !ensure_open(&mut inner) {
                drop(inner);
                self.warn_once("Log Error", "Failed to create log file. Please check disk space and write permissions.");
                return;
            }
            let mut done = false;
            for retry in 0..LOG_WRITE_RETRY_LIMIT {
                let result = inner
                    .file
                    .as_mut()
                    .map(|f| f.write_all(bytes).and_then(|_| f.flush()));
                match result {
                    Some(Ok(())) => {
                        done = true;
                        break;
                    }
                    Some(Err(e)) => {
                        if is_disk_full(&e) {
                            disk_full = true;
                        }
                    }
                    None => break,
                }
                if self.shutdown.is_triggered() {
                    break;
                }
                if retry + 1 < LOG_WRITE_RETRY_LIMIT {
                    std::thread::sleep(Duration::from_millis(LOG_WRITE_DELAYS_MS[retry]));
                }
            }
            if !done {
                // Reopen on the next write in case the handle went bad.
                inner.file = None;
            }
        }
        if disk_full {
            self.warn_once("Log Error", "Disk space full. Log may not be written.");
        }
    }

    /// Rotate the log to its `.old` sibling when it exceeds `max_bytes`.
    /// Called before each scan cycle.
    pub fn rotate_if_needed(&self, max_bytes: u64) {
        enum Outcome {
            Renamed,
            Truncated,
            TruncateFailed,
        }

        let outcome = {
            let mut inner = self.inner.lock();
            let size = match current_size(&inner) {
                Some(size) => size,
                None => return,
            };
            if size <= max_bytes {
                return;
            }

            // The open handle would block the rename on Windows.
            inner.file = None;
            let _ = fs::remove_file(&inner.old_path);
            let _ = fs::remove_file(&inner.tmp_path);

            let mut renamed = false;
            for retry in 0..LOG_RENAME_RETRY_LIMIT {
                if fs::rename(&inner.path, &inner.tmp_path).is_ok() {
                    if fs::rename(&inner.tmp_path, &inner.old_path).is_ok() {
                        renamed = true;
                        break;
                    }
                    // Put the live file back so we never lose it.
                    let _ = fs::rename(&inner.tmp_path, &inner.path);
                }
                if self.shutdown.is_triggered() {
                    break;
                }
                if retry + 1 < LOG_RENAME_RETRY_LIMIT {
                    std::thread::sleep(Duration::from_millis(LOG_RENAME_DELAYS_MS[retry]));
                }
            }

            if renamed {
                Outcome::Renamed
            } else {
                match OpenOptions::new().write(true).truncate(true).open(&inner.path) {
                    Ok(_) => Outcome::Truncated,
                    Err(_) => Outcome::TruncateFailed,
                }
            }
        };

        // Log after releasing the writer lock: line() re-acquires it.
        match outcome {
            Outcome::Renamed => self.line("Log rotated successfully."),
            Outcome::Truncated => {
                self.line(&format!(
                    "WARNING: Log rotation failed after {} attempts; attempting to truncate.",
                    LOG_RENAME_RETRY_LIMIT
                ));
                self.warn_once(
                    "Log Rotation Failed",
                    "Log file may be locked by another program. Please close any program that might be using monitor.log.",
                );
                self.line("Log file truncated successfully.");
            }
            Outcome::TruncateFailed => {
                self.line("ERROR: Failed to truncate log file. Log may continue to grow.");
            }
        }
    }

    fn warn_once(&self, title: &str, body: &str) {
        let now = Instant::now();
        let mut last = self.last_fail_warning.lock();
        let due = match *last {
            Some(t) => now.duration_since(t) >= LOG_FAIL_ALERT_COOLDOWN,
            None => true,
        };
        if due {
            *last = Some(now);
            self.notifier
                .notify(&Notification::new(Severity::Warning, title, body.to_string()));
        }
    }
}

fn ensure_open(inner: &mut LogInner) -> bool {
    if inner.file.is_some() {
        return true;
    }
    match OpenOptions::new().create(true).append(true).open(&inner.path) {
        Ok(f) => {
            inner.file = Some(f);
            true
        }
        Err(e) => {
            log::error!("failed to open {}: {}", inner.path.display(), e);
            false
        }
    }
}

fn current_size(inner: &LogInner) -> Option<u64> {
    match inner.file.as_ref() {
        Some(f) => f.metadata().ok().map(|m| m.len()),
        None => match fs::metadata(&inner.path) {
            Ok(m) => Some(m.len()),
            Err(_) => None,
        },
    }
}

fn is_disk_full(e: &std::io::Error) -> bool {
    // ENOSPC on Unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on Windows.
    match e.raw_os_error() {
        Some(code) => {
            if cfg!(windows) {
                code == 112 || code == 39
            } else {
                code == 28
            }
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::notifier::test_support::RecordingNotifier;

    fn writer(dir: &Path) -> (LogWriter, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let w = LogWriter::new(dir, notifier.clone(), Arc::new(Shutdown::new()));
        (w, notifier)
    }

    #[test]
    fn lines_are_timestamped_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _) = writer(dir.path());
        w.line("hello world");
        let content = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(content.ends_with("hello world\n"));
        // "[YYYY-MM-DD HH:MM:SS] " prefix.
        assert_eq!(content.as_bytes()[0], b'[');
        assert_eq!(&content[11..12], " ");
        assert_eq!(&content[20..22], "] ");
    }

    #[test]
    fn stale_temp_file_removed_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_TEMP_FILE), b"leftover").unwrap();
        let (_w, _) = writer(dir.path());
        assert!(!dir.path().join(LOG_TEMP_FILE).exists());
    }

    #[test]
    fn rotation_moves_exact_bytes_and_empties_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _) = writer(dir.path());
        w.line("0123456789");
        let before = fs::read(dir.path().join(LOG_FILE)).unwrap();
        assert!(before.len() > 10);

        // Limit below the current size: exactly one rotation.
        w.rotate_if_needed(before.len() as u64 - 1);

        let old = fs::read(dir.path().join(LOG_FILE_OLD)).unwrap();
        assert_eq!(old, before);
        // The live file now only holds the rotation notice.
        let live = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(live.contains("Log rotated successfully."));
        assert!(!live.contains("0123456789"));
    }

    #[test]
    fn rotation_skipped_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _) = writer(dir.path());
        w.line("short");
        let before = fs::read(dir.path().join(LOG_FILE)).unwrap();
        w.rotate_if_needed(u64::MAX);
        assert!(!dir.path().join(LOG_FILE_OLD).exists());
        assert_eq!(fs::read(dir.path().join(LOG_FILE)).unwrap(), before);
    }

    #[test]
    fn rotation_replaces_previous_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _) = writer(dir.path());
        fs::write(dir.path().join(LOG_FILE_OLD), b"ancient").unwrap();
        w.line("fresh contents");
        let before = fs::read(dir.path().join(LOG_FILE)).unwrap();
        w.rotate_if_needed(1);
        assert_eq!(fs::read(dir.path().join(LOG_FILE_OLD)).unwrap(), before);
    }

    #[test]
    fn missing_log_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _) = writer(dir.path());
        // No write yet, nothing to rotate.
        w.rotate_if_needed(0);
        assert!(!dir.path().join(LOG_FILE_OLD).exists());
    }
}
