//! Per-process-name alert rate limiting.
//!
//! Suspicious-system-process alerts can fire every cycle for the same
//! process; this table ensures at most one per name per cooldown window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct CooldownTable {
    window: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        CooldownTable {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when an alert for `name` may fire now, and records the
    /// firing. Name comparison is case-insensitive.
    pub fn should_fire(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let key = name.to_lowercase();
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(last) => {
                if now.duration_since(*last) < self.window {
                    false
                } else {
                    *last = now;
                    true
                }
            }
            None => {
                entries.insert(key, now);
                true
            }
        }
    }

    /// Drop entries whose cooldown has expired; called periodically so the
    /// table does not grow with every process name ever alerted on.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.entries
            .lock()
            .retain(|_, last| now.duration_since(*last) <= window);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
