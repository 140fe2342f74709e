//! CPU and memory measurement arithmetic.
//!
//! All process CPU time arrives as 100-nanosecond tick accumulators; the
//! functions here turn deltas into percentages of total machine capacity.
//! They are pure so the formulas can be pinned down by tests.

/// A CPU reading. `Unavailable` means the time query failed for this
/// process; callers treat it as zero for thresholds but must not log it as
/// a measured 0%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuSample {
    Unavailable,
    Percent(f32),
}

impl CpuSample {
    pub fn value_or_zero(self) -> f32 {
        match self {
            CpuSample::Unavailable => 0.0,
            CpuSample::Percent(p) => p,
        }
    }
}

/// Instantaneous CPU percent over an elapsed wall interval.
///
/// `delta_100ns` is the growth of kernel+user time since the previous
/// sample. 10000 ticks make a millisecond, so ticks/10000 is CPU
/// milliseconds; divided by elapsed seconds that is CPU-ms per wall second,
/// and dividing by 10 lands on percent (1000 ms busy per second = 100%).
pub fn instantaneous_percent(delta_100ns: u64, elapsed_secs: f64) -> f32 {
    if elapsed_secs <= 0.0 || delta_100ns == 0 {
        return 0.0;
    }
    let pct = (delta_100ns as f64 / 10000.0) / elapsed_secs / 10.0;
    if pct < 0.0 {
        0.0
    } else {
        pct as f32
    }
}

/// Average CPU percent over a process's whole lifetime. Used only for
/// protected system processes, where one busy interval is not evidence.
pub fn lifetime_average_percent(total_100ns: u64, age_secs: f64) -> f32 {
    instantaneous_percent(total_100ns, age_secs)
}

/// Working-set bytes to whole megabytes.
pub fn mb_from_bytes(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}
