//! Process-wide cancellation signal.
//!
//! Every wait in the engine (interval sleep, backoff wait, retry delay,
//! window probing) goes through this so that requesting shutdown interrupts
//! the scheduler within one probe timeout instead of a full scan.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub struct Shutdown {
    triggered: Mutex<bool>,
    cond: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            triggered: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raise the signal and wake every waiter.
    pub fn trigger(&self) {
        let mut flag = self.triggered.lock();
        *flag = true;
        self.cond.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Sleep for up to `timeout`, returning early if the signal is raised.
    /// Returns true when shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.triggered.lock();
        if *flag {
            return true;
        }
        self.cond.wait_for(&mut flag, timeout);
        *flag
    }

    /// Block until the signal is raised.
    pub fn wait(&self) {
        let mut flag = self.triggered.lock();
        while !*flag {
            self.cond.wait(&mut flag);
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
