//! Per-process sample history and termination-attempt bookkeeping.
//!
//! One record per live pid: the CPU time accumulators from the previous
//! sample (for delta computation) and two independent retry state machines,
//! one per trigger kind. Records for vanished processes are swept at the
//! end of each scan via the unseen mark.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::constants::TERMINATE_RETRY_LIMIT;

/// What condition is driving enforcement against a process. The two
/// triggers keep separate retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Resource,
    Hang,
}

/// Termination retry progress for one (process, trigger) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    #[default]
    Clean,
    Escalating(u32),
    Exhausted {
        logged: bool,
    },
}

impl RetryState {
    /// Advance after a failed termination attempt.
    fn record_failure(&mut self) {
        *self = match *self {
            RetryState::Clean => RetryState::Escalating(1),
            RetryState::Escalating(n) if n + 1 >= TERMINATE_RETRY_LIMIT => {
                RetryState::Exhausted { logged: false }
            }
            RetryState::Escalating(n) => RetryState::Escalating(n + 1),
            exhausted @ RetryState::Exhausted { .. } => exhausted,
        };
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryState::Exhausted { .. })
    }

    /// Claim the one-time exhaustion log line. Returns true exactly once
    /// per exhaustion.
    fn try_mark_logged(&mut self) -> bool {
        if let RetryState::Exhausted { logged } = self {
            if !*logged {
                *logged = true;
                return true;
            }
        }
        false
    }
}

#[derive(Debug)]
struct ProcessRecord {
    kernel_100ns: u64,
    user_100ns: u64,
    sampled_at: Instant,
    resource_retry: RetryState,
    hang_retry: RetryState,
    seen: bool,
}

/// A CPU delta between two samples, with the wall time that elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuDelta {
    pub delta_100ns: u64,
    pub elapsed_secs: f64,
}

pub struct HistoryStore {
    records: Mutex<HashMap<u32, ProcessRecord>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        HistoryStore {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record a CPU-time sample for `pid`, returning the delta against the
    /// previous sample. A first sighting seeds the accumulators and returns
    /// `None`: the process gets one grace cycle before any CPU judgement.
    pub fn sample(&self, pid: u32, kernel_100ns: u64, user_100ns: u64) -> Option<CpuDelta> {
        let now = Instant::now();
        let mut records = self.records.lock();
        match records.get_mut(&pid) {
            Some(rec) => {
                rec.seen = true;
                let prev_total = rec.kernel_100ns + rec.user_100ns;
                let total = kernel_100ns + user_100ns;
                // A pid can be recycled mid-run; a shrinking accumulator
                // means a different process, so treat it as a fresh start.
                let delta = total.saturating_sub(prev_total);
                let elapsed = now.duration_since(rec.sampled_at).as_secs_f64();
                rec.kernel_100ns = kernel_100ns;
                rec.user_100ns = user_100ns;
                rec.sampled_at = now;
                if total < prev_total {
                    None
                } else {
                    Some(CpuDelta {
                        delta_100ns: delta,
                        elapsed_secs: elapsed,
                    })
                }
            }
            None => {
                records.insert(
                    pid,
                    ProcessRecord {
                        kernel_100ns,
                        user_100ns,
                        sampled_at: now,
                        resource_retry: RetryState::Clean,
                        hang_retry: RetryState::Clean,
                        seen: true,
                    },
                );
                None
            }
        }
    }

    /// Mark `pid` live without a CPU sample (time query failed but the
    /// process still exists, e.g. access denied).
    pub fn touch(&self, pid: u32) {
        let now = Instant::now();
        let mut records = self.records.lock();
        records
            .entry(pid)
            .and_modify(|rec| rec.seen = true)
            .or_insert_with(|| ProcessRecord {
                kernel_100ns: 0,
                user_100ns: 0,
                sampled_at: now,
                resource_retry: RetryState::Clean,
                hang_retry: RetryState::Clean,
                seen: true,
            });
    }

    pub fn record_failure(&self, pid: u32, trigger: Trigger) {
        let mut records = self.records.lock();
        if let Some(rec) = records.get_mut(&pid) {
            retry_mut(rec, trigger).record_failure();
        }
    }

    pub fn is_exhausted(&self, pid: u32, trigger: Trigger) -> bool {
        let mut records = self.records.lock();
        records
            .get_mut(&pid)
            .map(|rec| retry_mut(rec, trigger).is_exhausted())
            .unwrap_or(false)
    }

    /// Claim the one-time exhaustion log for (pid, trigger). True exactly
    /// once per exhaustion episode.
    pub fn claim_exhaustion_log(&self, pid: u32, trigger: Trigger) -> bool {
        let mut records = self.records.lock();
        records
            .get_mut(&pid)
            .map(|rec| retry_mut(rec, trigger).try_mark_logged())
            .unwrap_or(false)
    }

    /// Reset one trigger's retry state, used when the process stops being
    /// abnormal for that trigger.
    pub fn reset_trigger(&self, pid: u32, trigger: Trigger) {
        let mut records = self.records.lock();
        if let Some(rec) = records.get_mut(&pid) {
            *retry_mut(rec, trigger) = RetryState::Clean;
        }
    }

    /// Drop the record entirely (process terminated or exited).
    pub fn remove(&self, pid: u32) {
        self.records.lock().remove(&pid);
    }

    /// Called at scan start; `sweep` later drops everything still unseen.
    pub fn mark_all_unseen(&self) {
        for rec in self.records.lock().values_mut() {
            rec.seen = false;
        }
    }

    pub fn sweep(&self) {
        self.records.lock().retain(|_, rec| rec.seen);
    }

    /// Drop all records, e.g. after a system resume when the elapsed wall
    /// time no longer corresponds to CPU opportunity.
    pub fn reset_all(&self) {
        self.records.lock().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_mut(rec: &mut ProcessRecord, trigger: Trigger) -> &mut RetryState {
    match trigger {
        Trigger::Resource => &mut rec.resource_retry,
        Trigger::Hang => &mut rec.hang_retry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_and_returns_none() {
        let store = HistoryStore::new();
        assert!(store.sample(100, 5000, 5000).is_none());
        let delta = store.sample(100, 8000, 7000).unwrap();
        assert_eq!(delta.delta_100ns, 5000);
        assert!(delta.elapsed_secs >= 0.0);
    }

    #[test]
    fn shrinking_accumulator_reseeds() {
        let store = HistoryStore::new();
        store.sample(7, 1_000_000, 1_000_000);
        // Recycled pid: totals went backwards.
        assert!(store.sample(7, 10, 10).is_none());
        let delta = store.sample(7, 20, 30).unwrap();
        assert_eq!(delta.delta_100ns, 30);
    }

    #[test]
    fn retry_state_escalates_then_exhausts_once() {
        let mut state = RetryState::Clean;
        for _ in 0..TERMINATE_RETRY_LIMIT {
            assert!(!state.is_exhausted());
            state.record_failure();
        }
        assert!(state.is_exhausted());
        assert!(state.try_mark_logged());
        assert!(!state.try_mark_logged());
        // Further failures keep the logged mark.
        state.record_failure();
        assert!(!state.try_mark_logged());
    }

    #[test]
    fn triggers_have_independent_budgets() {
        let store = HistoryStore::new();
        store.touch(42);
        for _ in 0..TERMINATE_RETRY_LIMIT {
            store.record_failure(42, Trigger::Resource);
        }
        assert!(store.is_exhausted(42, Trigger::Resource));
        assert!(!store.is_exhausted(42, Trigger::Hang));

        store.reset_trigger(42, Trigger::Resource);
        assert!(!store.is_exhausted(42, Trigger::Resource));
    }

    #[test]
    fn exhaustion_log_claimed_exactly_once() {
        let store = HistoryStore::new();
        store.touch(9);
        for _ in 0..TERMINATE_RETRY_LIMIT {
            store.record_failure(9, Trigger::Hang);
        }
        assert!(store.claim_exhaustion_log(9, Trigger::Hang));
        assert!(!store.claim_exhaustion_log(9, Trigger::Hang));
        assert!(!store.claim_exhaustion_log(9, Trigger::Resource));
    }

    #[test]
    fn sweep_drops_only_unseen() {
        let store = HistoryStore::new();
        store.touch(1);
        store.touch(2);
        store.mark_all_unseen();
        store.touch(2);
        store.sweep();
        assert_eq!(store.len(), 1);
        // The survivor keeps its record: next sample yields a delta.
        assert!(store.sample(2, 0, 0).is_some());
    }

    #[test]
    fn reset_all_clears_everything() {
        let store = HistoryStore::new();
        store.touch(1);
        store.touch(2);
        store.reset_all();
        assert_eq!(store.len(), 0);
        // After reset a pid is a fresh sighting again.
        assert!(store.sample(1, 100, 100).is_none());
    }

    #[test]
    fn remove_forgets_retry_state() {
        let store = HistoryStore::new();
        store.touch(5);
        for _ in 0..TERMINATE_RETRY_LIMIT {
            store.record_failure(5, Trigger::Resource);
        }
        store.remove(5);
        assert!(!store.is_exhausted(5, Trigger::Resource));
    }
}
