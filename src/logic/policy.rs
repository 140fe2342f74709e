//! Classification rules: who gets ignored, who gets reported, who gets
//! terminated, and the exact reason attached to each decision.

use std::path::Path;

use crate::constants::BUILTIN_PROTECTED_NAMES;
use crate::logic::measure::CpuSample;
use crate::platform;

/// Where a process lands before any threshold is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Own pid or user exclusion-list match; not examined, not logged.
    Ignored,
    /// Built-in protected name under a system directory; reported when
    /// suspicious, never terminated.
    SystemProtected,
    /// Everything else; eligible for termination.
    Normal,
}

pub fn route(pid: u32, own_pid: u32, name: &str, exe: Option<&Path>, excludes: &[String]) -> Route {
    if pid == own_pid {
        return Route::Ignored;
    }
    if excludes.iter().any(|e| e.eq_ignore_ascii_case(name)) {
        return Route::Ignored;
    }
    // A protected name outside a system directory is an impostor and goes
    // through the normal rules. An unreadable path fails safe: better to
    // spare an impostor than kill the real csrss.
    let builtin = BUILTIN_PROTECTED_NAMES
        .iter()
        .any(|b| b.eq_ignore_ascii_case(name));
    if builtin && exe.map(platform::is_system_path).unwrap_or(true) {
        return Route::SystemProtected;
    }
    Route::Normal
}

/// An abnormal finding for a normal process, in precedence order: the first
/// matching condition is the one acted on and logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Abnormality {
    Cpu(f32),
    Memory(u64),
    Hang,
}

pub fn classify_normal(
    cpu: CpuSample,
    mem_mb: Option<u64>,
    hung: bool,
    cpu_threshold_percent: u32,
    mem_threshold_mb: u64,
) -> Option<Abnormality> {
    if let CpuSample::Percent(pct) = cpu {
        if pct > cpu_threshold_percent as f32 {
            return Some(Abnormality::Cpu(pct));
        }
    }
    if let Some(mb) = mem_mb {
        if mb > mem_threshold_mb {
            return Some(Abnormality::Memory(mb));
        }
    }
    if hung {
        return Some(Abnormality::Hang);
    }
    None
}

pub fn describe_abnormality(
    abnormality: Abnormality,
    cpu_threshold_percent: u32,
    mem_threshold_mb: u64,
) -> String {
    match abnormality {
        Abnormality::Cpu(pct) => {
            format!("High CPU: {:.1}% (threshold {}%)", pct, cpu_threshold_percent)
        }
        Abnormality::Memory(mb) => {
            format!("High memory: {} MB (threshold {} MB)", mb, mem_threshold_mb)
        }
        Abnormality::Hang => "Window not responding".to_string(),
    }
}

/// A suspicious finding for a system-protected process. The average-CPU
/// check exists because one busy interval is normal for system services;
/// sustained load over the process lifetime is not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suspicion {
    Hung,
    InstantCpu(f32),
    AverageCpu(f32),
    Memory(u64),
}

pub fn classify_system(
    instant_cpu: CpuSample,
    average_cpu: CpuSample,
    mem_mb: Option<u64>,
    hung: bool,
    cpu_threshold_percent: u32,
    mem_threshold_mb: u64,
) -> Option<Suspicion> {
    if hung {
        return Some(Suspicion::Hung);
    }
    if let CpuSample::Percent(pct) = instant_cpu {
        if pct > cpu_threshold_percent as f32 {
            return Some(Suspicion::InstantCpu(pct));
        }
    }
    if let CpuSample::Percent(pct) = average_cpu {
        if pct > cpu_threshold_percent as f32 {
            return Some(Suspicion::AverageCpu(pct));
        }
    }
    if let Some(mb) = mem_mb {
        if mb > mem_threshold_mb {
            return Some(Suspicion::Memory(mb));
        }
    }
    None
}

pub fn describe_suspicion(suspicion: Suspicion) -> String {
    match suspicion {
        Suspicion::Hung => "Window not responding".to_string(),
        Suspicion::InstantCpu(pct) => format!("High instantaneous CPU: {:.1}%", pct),
        Suspicion::AverageCpu(pct) => format!("High average CPU: {:.1}%", pct),
        Suspicion::Memory(mb) => format!("High memory: {} MB", mb),
    }
}
