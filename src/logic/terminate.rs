//! Forced termination of offending processes.
//!
//! The OS call lives behind `ProcessKiller` so the retry and advisory logic
//! can be exercised without killing anything. Failures escalate the
//! trigger's retry state in the history store; after the budget is spent a
//! single exhaustion line is logged and further attempts are suppressed
//! until the process stops being abnormal.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::logic::history::{HistoryStore, Trigger};
use crate::logic::logwriter::LogWriter;
use crate::logic::notifier::{Notification, Notifier, Severity};
use crate::platform;

#[derive(Debug)]
pub enum TerminateError {
    /// The OS refused access; typically the daemon lacks privileges.
    AccessDenied,
    /// The process was gone before we got to it.
    NotFound,
    Os(io::Error),
}

impl fmt::Display for TerminateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateError::AccessDenied => write!(f, "access denied"),
            TerminateError::NotFound => write!(f, "process not found"),
            TerminateError::Os(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TerminateError {}

pub trait ProcessKiller: Send + Sync {
    fn kill(&self, pid: u32) -> Result<(), TerminateError>;
}

/// Kills through the real OS interface.
pub struct NativeKiller;

impl ProcessKiller for NativeKiller {
    fn kill(&self, pid: u32) -> Result<(), TerminateError> {
        platform::terminate_process(pid)
    }
}

pub struct Terminator {
    killer: Box<dyn ProcessKiller>,
    access_denied_notified: AtomicBool,
    notifier: Arc<dyn Notifier>,
    log: Arc<LogWriter>,
    history: Arc<HistoryStore>,
}

impl Terminator {
    pub fn new(
        killer: Box<dyn ProcessKiller>,
        notifier: Arc<dyn Notifier>,
        log: Arc<LogWriter>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Terminator {
            killer,
            access_denied_notified: AtomicBool::new(false),
            notifier,
            log,
            history,
        }
    }

    /// Attempt to terminate `pid`. Returns true on success. Every failure,
    /// including a refused handle, spends one unit of the trigger's retry
    /// budget so a permanently untouchable process goes quiet instead of
    /// producing an error line every cycle.
    pub fn enforce(&self, pid: u32, name: &str, trigger: Trigger) -> bool {
        match self.killer.kill(pid) {
            Ok(()) => {
                self.log.line(&format!(
                    "Successfully terminated process {} (PID {})",
                    name, pid
                ));
                self.history.remove(pid);
                true
            }
            Err(TerminateError::NotFound) => {
                // Raced with a normal exit; nothing left to enforce.
                self.history.remove(pid);
                true
            }
            Err(e) => {
                self.log.line(&format!(
                    "ERROR: Failed to terminate process {} (PID {}): {}",
                    name, pid, e
                ));
                if matches!(e, TerminateError::AccessDenied)
                    && !self.access_denied_notified.swap(true, Ordering::Relaxed)
                {
                    self.notifier.notify(&Notification::new(
                        Severity::Warning,
                        "Permission Notice",
                        "Some processes could not be terminated due to insufficient privileges. Run with administrator rights to manage them.".to_string(),
                    ));
                }
                self.history.record_failure(pid, trigger);
                if self.history.claim_exhaustion_log(pid, trigger) {
                    self.log.line(&format!(
                        "Process {} (PID {}) termination attempts exhausted, will stop trying.",
                        name, pid
                    ));
                }
                false
            }
        }
    }
}
