//! Process monitoring for the relay daemon.
//!
//! Admission is unbounded by default, so the daemon keeps an eye on its own
//! footprint instead. Periodically logs:
//! - process memory and CPU usage
//! - registered connection count
//! - relay counters since startup
//!
//! and warns when memory or CPU cross their thresholds.
//!
//! # Panic-Free Guarantees
//!
//! All code follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Uses pattern matching and `unwrap_or` for fallible operations

use std::process;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;
use crate::stats::{RelayStats, StatsSnapshot};

/// Memory usage warning threshold in MB.
pub const HIGH_MEMORY_THRESHOLD_MB: u64 = 256;

/// CPU usage warning threshold (percentage).
pub const HIGH_CPU_THRESHOLD_PERCENT: f32 = 80.0;

/// Current process metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProcessMetrics {
    /// Memory usage in bytes
    pub memory_bytes: u64,

    /// Memory usage in megabytes (convenience)
    pub memory_mb: u64,

    /// CPU usage as percentage (0.0 - 100.0+)
    pub cpu_percent: f32,

    pub memory_high: bool,
    pub cpu_high: bool,
}

impl ProcessMetrics {
    /// Returns true if any metric is above its threshold.
    pub fn is_any_high(&self) -> bool {
        self.memory_high || self.cpu_high
    }
}

/// Samples resource usage of the current process.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
    memory_threshold_mb: u64,
    cpu_threshold_percent: f32,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self::with_thresholds(HIGH_MEMORY_THRESHOLD_MB, HIGH_CPU_THRESHOLD_PERCENT)
    }

    pub fn with_thresholds(memory_threshold_mb: u64, cpu_threshold_percent: f32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
            memory_threshold_mb,
            cpu_threshold_percent,
        }
    }

    /// Refreshes process information and returns current metrics.
    ///
    /// CPU usage is measured against the previous refresh, so the first
    /// call after construction reports 0%.
    pub fn refresh(&mut self) -> ProcessMetrics {
        // refresh_all() is required for CPU calculation to work
        self.system.refresh_all();

        let (memory_bytes, cpu_percent) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory(), p.cpu_usage()))
            .unwrap_or((0, 0.0));

        let memory_mb = memory_bytes / 1024 / 1024;

        ProcessMetrics {
            memory_bytes,
            memory_mb,
            cpu_percent,
            memory_high: memory_mb > self.memory_threshold_mb,
            cpu_high: cpu_percent > self.cpu_threshold_percent,
        }
    }

    pub fn memory_threshold_mb(&self) -> u64 {
        self.memory_threshold_mb
    }

    pub fn cpu_threshold_percent(&self) -> f32 {
        self.cpu_threshold_percent
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortest accepted sampling period.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Spawns the periodic monitoring task.
///
/// Stops when `cancel_token` is cancelled. Periods below 10ms are raised to
/// 10ms.
pub fn spawn_monitor_task(
    registry: ConnectionRegistry,
    stats: Arc<RelayStats>,
    period: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new();
        let period = period.max(MIN_PERIOD);
        let mut tick = interval(period);

        // Baseline for CPU calculation
        let _ = monitor.refresh();

        info!(
            memory_threshold_mb = monitor.memory_threshold_mb(),
            cpu_threshold_percent = monitor.cpu_threshold_percent(),
            interval_secs = period.as_secs(),
            "Process monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Process monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let metrics = monitor.refresh();
                    let connections = registry.len().await;
                    log_metrics(&metrics, &monitor, connections, &stats.snapshot());
                }
            }
        }

        debug!("Process monitor task completed");
    })
}

fn log_metrics(
    metrics: &ProcessMetrics,
    monitor: &ProcessMonitor,
    connections: usize,
    stats: &StatsSnapshot,
) {
    if metrics.memory_high {
        warn!(
            memory_mb = metrics.memory_mb,
            threshold_mb = monitor.memory_threshold_mb(),
            connections,
            "HIGH MEMORY: Relay memory usage above threshold"
        );
    } else if metrics.cpu_high {
        warn!(
            cpu_percent = format!("{:.1}", metrics.cpu_percent),
            threshold_percent = monitor.cpu_threshold_percent(),
            connections,
            "HIGH CPU: Relay CPU usage above threshold"
        );
    }

    info!(
        memory_mb = metrics.memory_mb,
        cpu_percent = format!("{:.1}", metrics.cpu_percent),
        connections,
        datagrams = stats.datagrams_received,
        broadcasts = stats.broadcasts,
        delivered = stats.messages_delivered,
        evictions = stats.evictions,
        accepted = stats.connections_accepted,
        rejected = stats.connections_rejected,
        "Relay status"
    );
}
