//! Periodic CPU/memory sampling into `system_metrics`.

use chrono::Utc;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, System};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{MetricsHandle, SystemMetric};

struct ProcessSampler {
    system: System,
}

impl ProcessSampler {
    fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Sample this process's CPU percent and resident memory in MB.
    fn sample(&mut self) -> Option<(f64, f64)> {
        let pid = sysinfo::get_current_pid().ok()?;
        self.system.refresh_pids_specifics(
            &[pid],
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );
        let process = self.system.process(pid)?;
        let cpu = process.cpu_usage() as f64;
        let memory_mb = process.memory() as f64 / 1024.0 / 1024.0;
        Some((cpu, memory_mb))
    }
}

/// Spawn the sampler loop. Each tick records `cpu_usage_percent` and
/// `memory_usage_mb` rows tagged with the service name.
pub fn spawn_system_sampler(
    handle: MetricsHandle,
    service_name: String,
    sample_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sampler = ProcessSampler::new();
        let mut interval = tokio::time::interval(sample_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so the CPU counter has a
        // baseline to diff against.
        interval.tick().await;

        loop {
            interval.tick().await;
            match sampler.sample() {
                Some((cpu, memory_mb)) => {
                    let now = Utc::now();
                    debug!(cpu, memory_mb, "Sampled process stats");
                    handle.record_system(SystemMetric {
                        timestamp: now,
                        service_name: service_name.clone(),
                        metric_name: "cpu_usage_percent".into(),
                        metric_value: cpu,
                        unit: "percent".into(),
                    });
                    handle.record_system(SystemMetric {
                        timestamp: now,
                        service_name: service_name.clone(),
                        metric_name: "memory_usage_mb".into(),
                        metric_value: memory_mb,
                        unit: "megabytes".into(),
                    });
                }
                None => warn!("Could not sample process stats"),
            }
        }
    })
}
