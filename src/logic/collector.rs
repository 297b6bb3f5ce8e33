//! Collector Engine - periodic system-wide resource sampling
//!
//! Reads CPU, memory and disk utilization from an OS metrics provider on a
//! fixed interval and appends one Metric Sample per tick to the store.
//! Provider failures skip the tick; only store corruption stops the loop.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use thiserror::Error;

use super::features::{MetricSample, ResourceUsage};
use super::scheduler::{spawn_periodic, TaskHandle};
use super::store::{Store, StoreError};

// ============================================================================
// PROVIDER
// ============================================================================

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("metrics unavailable: {0}")]
    Platform(String),

    #[error("provider call exceeded {0:?}")]
    Timeout(Duration),

    /// A previous call that timed out is still running
    #[error("provider busy with a previous call")]
    Busy,

    #[error("provider task failed: {0}")]
    Task(String),
}

/// Source of system-wide utilization. Calls may block; the collector runs
/// them on the blocking pool under a timeout.
pub trait MetricsProvider: Send + 'static {
    fn sample(&mut self) -> Result<ResourceUsage, ProviderError>;
}

/// sysinfo-backed provider
pub struct SysinfoProvider {
    system: System,
    disks: Disks,
    disk_path: PathBuf,
}

impl SysinfoProvider {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; take the baseline now
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            disk_path: disk_path.into(),
        }
    }

    fn cpu_percent(&mut self) -> Result<f64, ProviderError> {
        self.system.refresh_cpu();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(ProviderError::Platform("no CPUs reported".into()));
        }
        let total: f64 = cpus.iter().map(|c| c.cpu_usage() as f64).sum();
        Ok(total / cpus.len() as f64)
    }

    fn mem_percent(&mut self) -> Result<f64, ProviderError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProviderError::Platform("total memory reported as 0".into()));
        }
        Ok(self.system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn disk_percent(&mut self) -> Result<f64, ProviderError> {
        self.disks.refresh();

        // Longest mount point containing the configured path
        let disk = self
            .disks
            .list()
            .iter()
            .filter(|d| self.disk_path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| ProviderError::Platform(format!("no disk mounted at {:?}", self.disk_path)))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(ProviderError::Platform(format!("{:?} reports zero size", disk.mount_point())));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok(used as f64 / total as f64 * 100.0)
    }
}

impl MetricsProvider for SysinfoProvider {
    fn sample(&mut self) -> Result<ResourceUsage, ProviderError> {
        Ok(ResourceUsage {
            cpu_percent: self.cpu_percent()?.clamp(0.0, 100.0),
            mem_percent: self.mem_percent()?.clamp(0.0, 100.0),
            disk_percent: self.disk_percent()?.clamp(0.0, 100.0),
        })
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Stored,
    /// Provider failed or timed out; nothing written
    Skipped,
    /// Sample rejected by the store (validation / ordering)
    Discarded,
}

#[derive(Debug, Default)]
struct CollectorCounters {
    ticks: AtomicU64,
    stored: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStats {
    pub ticks: u64,
    pub stored: u64,
    pub skipped: u64,
    pub discarded: u64,
}

pub struct Collector {
    provider: Arc<Mutex<Box<dyn MetricsProvider>>>,
    store: Arc<Store>,
    timeout: Duration,
    counters: CollectorCounters,
}

impl Collector {
    pub fn new(provider: Box<dyn MetricsProvider>, store: Arc<Store>, timeout: Duration) -> Self {
        Self {
            provider: Arc::new(Mutex::new(provider)),
            store,
            timeout,
            counters: CollectorCounters::default(),
        }
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }

    /// One sampling tick. `Err` only for fatal store errors.
    pub async fn tick(&self) -> Result<TickOutcome, StoreError> {
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let usage = match self.read_provider().await {
            Ok(usage) => usage,
            Err(e) => {
                log::warn!("Collector tick skipped: {}", e);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(TickOutcome::Skipped);
            }
        };

        let sample = MetricSample::from_usage(Utc::now(), usage);
        let store = self.store.clone();
        let written = match tokio::task::spawn_blocking(move || store.append(&sample)).await {
            Ok(written) => written,
            Err(e) => {
                log::warn!("Collector tick skipped, append task failed: {}", e);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(TickOutcome::Skipped);
            }
        };

        match written {
            Ok(()) => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Sample stored: cpu {:.1}% mem {:.1}% disk {:.1}%",
                    sample.cpu_percent,
                    sample.mem_percent,
                    sample.disk_percent
                );
                Ok(TickOutcome::Stored)
            }
            Err(e) if e.is_fatal() => {
                log::error!("Store corrupted, collector cannot continue: {}", e);
                Err(e)
            }
            Err(e) if e.is_rejection() => {
                log::warn!("Sample discarded: {}", e);
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                Ok(TickOutcome::Discarded)
            }
            Err(e) => {
                log::warn!("Collector tick skipped, store write failed: {}", e);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                Ok(TickOutcome::Skipped)
            }
        }
    }

    async fn read_provider(&self) -> Result<ResourceUsage, ProviderError> {
        let provider = self.provider.clone();
        let call = tokio::task::spawn_blocking(move || {
            let mut guard = provider.try_lock().ok_or(ProviderError::Busy)?;
            guard.sample()
        });

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(ProviderError::Task(e.to_string())),
            Ok(Ok(result)) => result,
        }
    }

    /// Start the sampling loop. Stops itself on store corruption.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> TaskHandle {
        spawn_periodic("Collector", interval, move || {
            let collector = self.clone();
            async move {
                match collector.tick().await {
                    Ok(_) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            }
        })
    }
}
