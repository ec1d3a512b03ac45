//! Simulation statistics.
//!
//! Shared counters the workers update on every request and the reporter
//! snapshots on an interval. Locking is a plain `std::sync::Mutex`; the
//! critical sections are a handful of hash-map bumps.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    response_time_total: Duration,
    status_codes: HashMap<u16, u64>,
    endpoints_hit: HashMap<String, u64>,
    error_count: u64,
    last_error: Option<String>,
}

pub struct SimulationStats {
    started: Instant,
    inner: Mutex<Inner>,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,
    pub avg_response_time_ms: f64,
    pub status_codes: Vec<(u16, u64)>,
    /// Up to ten busiest `METHOD path` keys, descending.
    pub top_endpoints: Vec<(String, u64)>,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record one request outcome. Statuses below 400 count as success.
    pub fn record(
        &self,
        method: &str,
        endpoint: &str,
        status_code: u16,
        response_time: Duration,
        error: Option<&str>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_requests += 1;
        if status_code < 400 {
            inner.successful_requests += 1;
        } else {
            inner.failed_requests += 1;
        }
        inner.response_time_total += response_time;
        *inner.status_codes.entry(status_code).or_default() += 1;
        *inner
            .endpoints_hit
            .entry(format!("{method} {endpoint}"))
            .or_default() += 1;
        if let Some(e) = error {
            inner.error_count += 1;
            inner.last_error = Some(e.to_string());
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap();
        let elapsed = self.started.elapsed();

        let avg_response_time_ms = if inner.total_requests > 0 {
            inner.response_time_total.as_secs_f64() * 1000.0 / inner.total_requests as f64
        } else {
            0.0
        };
        let requests_per_second = if elapsed.as_secs_f64() > 0.0 {
            inner.total_requests as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let mut status_codes: Vec<_> = inner.status_codes.iter().map(|(&k, &v)| (k, v)).collect();
        status_codes.sort_unstable();

        let mut top_endpoints: Vec<_> = inner
            .endpoints_hit
            .iter()
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        top_endpoints.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_endpoints.truncate(10);

        StatsSnapshot {
            elapsed,
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            requests_per_second,
            avg_response_time_ms,
            status_codes,
            top_endpoints,
            error_count: inner.error_count,
            last_error: inner.last_error.clone(),
        }
    }
}

impl Default for SimulationStats {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
