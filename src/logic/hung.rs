//! Hung-window detection.
//!
//! A process is "hung" when at least one of its visible top-level windows
//! fails to answer a no-op message within the configured timeout. The probe
//! itself is behind a trait so the set-building logic is testable and the
//! non-windowing platforms simply report no windows.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::logic::logwriter::LogWriter;
use crate::logic::shutdown::Shutdown;

/// One visible top-level window and its owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevelWindow {
    pub handle: usize,
    pub pid: u32,
}

pub trait WindowProbe: Send {
    /// All currently visible top-level windows.
    fn visible_windows(&self) -> Vec<TopLevelWindow>;

    /// Synchronously ping one window; false when it did not answer within
    /// `timeout`.
    fn is_responsive(&self, window: &TopLevelWindow, timeout: Duration) -> bool;
}

/// Pids with at least one unresponsive window, rebuilt each scan cycle.
#[derive(Debug, Default)]
pub struct HungWindowSet {
    pids: HashSet<u32>,
}

impl HungWindowSet {
    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }
}

/// Probe visible windows and collect the owning pids of the unresponsive
/// ones. Stops at `max_probes` windows (a runaway window count would stretch
/// the cycle unboundedly, each probe can block for the full timeout) and
/// aborts early on shutdown; both cases return the partial set.
pub fn build_hung_set(
    probe: &dyn WindowProbe,
    timeout: Duration,
    max_probes: u32,
    shutdown: &Shutdown,
    log: &Arc<LogWriter>,
) -> HungWindowSet {
    let mut set = HungWindowSet::default();
    let windows = probe.visible_windows();

    if windows.len() > max_probes as usize {
        log.line(&format!(
            "WARNING: Reached maximum number of windows to check (MaxHungWindows={}). Hang detection may be incomplete this cycle.",
            max_probes
        ));
    }

    for window in windows.iter().take(max_probes as usize) {
        if shutdown.is_triggered() {
            break;
        }
        // One hung pid is enough; skip its remaining windows.
        if set.pids.contains(&window.pid) {
            continue;
        }
        if !probe.is_responsive(window, timeout) {
            set.pids.insert(window.pid);
        }
    }
    set
}
