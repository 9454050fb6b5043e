//! Resource samplers.
//!
//! # Responsibilities
//! - Report memory, CPU and disk usage of an instance as fractions in `[0, 1]`
//! - Refresh OS counters once per collection cycle
//!
//! # Design Decisions
//! - Instances with a `pid` are sampled per process, others from the host
//! - Disk usage is always host-wide
//! - `FixedSampler` gives deterministic readings for tests and demos

use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::Serialize;
use sysinfo::{Disks, Pid, System};

use crate::registry::Instance;

/// Resource usage fractions for one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSample {
    pub memory: f64,
    pub cpu: f64,
    pub disk: f64,
}

impl ResourceSample {
    pub fn new(memory: f64, cpu: f64, disk: f64) -> Self {
        Self { memory, cpu, disk }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),

    #[error("no reading configured")]
    NoReading,

    #[error("sampler unavailable: {0}")]
    Unavailable(String),
}

/// Source of resource readings.
pub trait ResourceSampler: Send + Sync {
    /// Called once at the start of every collection cycle.
    fn begin_cycle(&self) {}

    fn sample(&self, instance: &Instance) -> Result<ResourceSample, SampleError>;
}

struct SystemState {
    system: System,
    disks: Disks,
}

/// OS-backed sampler using `sysinfo`.
pub struct SystemSampler {
    state: Mutex<SystemState>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        Self {
            state: Mutex::new(SystemState {
                system,
                disks: Disks::new_with_refreshed_list(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SystemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn fraction(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64).clamp(0.0, 1.0)
    }
}

fn disk_fraction(disks: &Disks) -> f64 {
    let (total, available) = disks
        .list()
        .iter()
        .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
    fraction(total.saturating_sub(available), total)
}

impl ResourceSampler for SystemSampler {
    fn begin_cycle(&self) {
        let mut state = self.lock();
        state.system.refresh_memory();
        state.system.refresh_cpu();
        state.disks.refresh();
    }

    fn sample(&self, instance: &Instance) -> Result<ResourceSample, SampleError> {
        let mut state = self.lock();
        let disk = disk_fraction(&state.disks);
        let total_memory = state.system.total_memory();

        match instance.pid {
            Some(pid) => {
                let sys_pid = Pid::from_u32(pid);
                if !state.system.refresh_process(sys_pid) {
                    return Err(SampleError::ProcessNotFound(pid));
                }
                let cores = state.system.cpus().len().max(1) as f64;
                let process = state
                    .system
                    .process(sys_pid)
                    .ok_or(SampleError::ProcessNotFound(pid))?;
                Ok(ResourceSample {
                    memory: fraction(process.memory(), total_memory),
                    cpu: (f64::from(process.cpu_usage()) / 100.0 / cores).clamp(0.0, 1.0),
                    disk,
                })
            }
            None => Ok(ResourceSample {
                memory: fraction(state.system.used_memory(), total_memory),
                cpu: (f64::from(state.system.global_cpu_info().cpu_usage()) / 100.0).clamp(0.0, 1.0),
                disk,
            }),
        }
    }
}

/// Deterministic sampler: a default reading plus per-instance overrides.
#[derive(Debug, Default)]
pub struct FixedSampler {
    default: Option<ResourceSample>,
    overrides: DashMap<String, Result<ResourceSample, SampleError>>,
}

impl FixedSampler {
    /// Every instance reports `reading` unless overridden.
    pub fn new(reading: ResourceSample) -> Self {
        Self {
            default: Some(reading),
            overrides: DashMap::new(),
        }
    }

    /// No default; instances without an override fail with [`SampleError::NoReading`].
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, reading: ResourceSample) {
        self.overrides.insert(id.to_string(), Ok(reading));
    }

    pub fn fail(&self, id: &str, error: SampleError) {
        self.overrides.insert(id.to_string(), Err(error));
    }
}

impl ResourceSampler for FixedSampler {
    fn sample(&self, instance: &Instance) -> Result<ResourceSample, SampleError> {
        match self.overrides.get(&instance.id) {
            Some(reading) => reading.value().clone(),
            None => self.default.ok_or(SampleError::NoReading),
        }
    }
}
