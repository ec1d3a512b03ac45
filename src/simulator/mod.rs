//! Synthetic load simulator.
//!
//! Spawns a pool of session workers that replay realistic user journeys
//! against the running APIs. Each worker loops: pick a user type and region
//! by weight, open a session, issue its budget of weighted endpoint calls
//! with think-time pauses, then rest briefly and start the next session.
//! A global rate gate paces the whole pool to the configured target RPS.

pub mod session;
pub mod stats;
pub mod traffic;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, RegionConfig, ReportingConfig, SimulationConfig, UserTypeConfig};
use crate::datagen;

use session::UserSession;
use stats::SimulationStats;
use traffic::{EndpointCall, TrafficPlan};

const HEALTH_ATTEMPTS: u32 = 30;
const HEALTH_RETRY: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Rate gate
// ---------------------------------------------------------------------------

/// Paces callers to a target rate by handing out evenly spaced send slots.
pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateGate {
    pub fn new(requests_per_second: f64) -> Self {
        let rps = requests_per_second.max(0.001);
        Self {
            interval: Duration::from_secs_f64(1.0 / rps),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until the next send slot is due. The slot is claimed under the
    /// lock so the wait itself happens without blocking other callers.
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            if *next <= now {
                *next = now + self.interval;
                Duration::ZERO
            } else {
                let wait = *next - now;
                *next += self.interval;
                wait
            }
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct LoadSimulator {
    config: SimulationConfig,
    reporting: ReportingConfig,
    client: reqwest::Client,
    plan: Arc<TrafficPlan>,
    stats: Arc<SimulationStats>,
    gate: Arc<RateGate>,
    running: watch::Sender<bool>,
}

impl LoadSimulator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let sim = config.simulation.clone();
        let plan = TrafficPlan::from_config(&sim.services);
        if plan.is_empty() {
            bail!("traffic plan is empty, no endpoints configured");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let (running, _) = watch::channel(true);
        Ok(Self {
            gate: Arc::new(RateGate::new(sim.requests_per_second)),
            reporting: config.reporting.clone(),
            client,
            plan: Arc::new(plan),
            stats: Arc::new(SimulationStats::new()),
            config: sim,
            running,
        })
    }

    pub fn stats(&self) -> Arc<SimulationStats> {
        Arc::clone(&self.stats)
    }

    /// Signal all workers to wind down after their current request.
    pub fn stop(&self) {
        let _ = self.running.send(false);
    }

    /// Poll every target's `/health` until all respond or attempts run out.
    pub async fn wait_for_services(&self) -> Result<()> {
        for (name, base_url) in self.plan.targets() {
            let url = format!("{base_url}/health");
            let mut ready = false;
            for attempt in 1..=HEALTH_ATTEMPTS {
                match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        info!(service = %name, attempts = attempt, "Service is ready");
                        ready = true;
                        break;
                    }
                    Ok(resp) => {
                        debug!(service = %name, status = %resp.status(), attempt, "Service not ready yet");
                    }
                    Err(e) => {
                        debug!(service = %name, error = %e, attempt, "Service not reachable yet");
                    }
                }
                sleep(HEALTH_RETRY).await;
            }
            if !ready {
                bail!("service '{name}' at {base_url} did not become healthy");
            }
        }
        Ok(())
    }

    /// Run the simulation until the configured duration elapses or `stop`
    /// is called. Returns after all workers have wound down.
    pub async fn run(&self) -> Result<()> {
        info!(
            workers = self.config.workers,
            rps = self.config.requests_per_second,
            duration_minutes = self.config.duration_minutes,
            endpoints = self.plan.len(),
            "Starting load simulation"
        );

        let ramp_step = if self.config.workers > 1 && self.config.ramp_up_secs > 0 {
            Duration::from_secs_f64(
                self.config.ramp_up_secs as f64 / self.config.workers as f64,
            )
        } else {
            Duration::ZERO
        };

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let worker = SessionWorker {
                worker_id,
                client: self.client.clone(),
                plan: Arc::clone(&self.plan),
                stats: Arc::clone(&self.stats),
                gate: Arc::clone(&self.gate),
                user_types: self.config.user_types.clone(),
                regions: self.config.regions.clone(),
                detailed: self.reporting.detailed,
            };
            let running = self.running.subscribe();
            let start_delay = ramp_step * worker_id as u32;
            handles.push(tokio::spawn(async move {
                if !start_delay.is_zero() {
                    sleep(start_delay).await;
                }
                worker.run(running).await;
            }));
        }

        let reporter = tokio::spawn(report_loop(
            Arc::clone(&self.stats),
            self.reporting.stats_interval_secs,
            self.running.subscribe(),
        ));

        let mut running = self.running.subscribe();
        if self.config.duration_minutes > 0 {
            let deadline = Duration::from_secs(self.config.duration_minutes * 60);
            tokio::select! {
                _ = sleep(deadline) => {
                    info!("Simulation duration reached, stopping workers");
                    self.stop();
                }
                _ = stopped(&mut running) => {}
            }
        } else {
            stopped(&mut running).await;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Session worker panicked");
            }
        }
        reporter.abort();

        let snap = self.stats.snapshot();
        info!(
            total = snap.total_requests,
            success = snap.successful_requests,
            failed = snap.failed_requests,
            rps = format!("{:.1}", snap.requests_per_second),
            avg_ms = format!("{:.1}", snap.avg_response_time_ms),
            elapsed_secs = snap.elapsed.as_secs(),
            "Simulation finished"
        );
        Ok(())
    }
}

async fn stopped(running: &mut watch::Receiver<bool>) {
    while *running.borrow() {
        if running.changed().await.is_err() {
            break;
        }
    }
}

async fn report_loop(
    stats: Arc<SimulationStats>,
    interval_secs: u64,
    mut running: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = stats.snapshot();
                info!(
                    total = snap.total_requests,
                    success = snap.successful_requests,
                    failed = snap.failed_requests,
                    rps = format!("{:.1}", snap.requests_per_second),
                    avg_ms = format!("{:.1}", snap.avg_response_time_ms),
                    "Simulation progress"
                );
                for (endpoint, hits) in &snap.top_endpoints {
                    debug!(endpoint = %endpoint, hits, "Endpoint traffic");
                }
            }
            _ = stopped(&mut running) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Session worker
// ---------------------------------------------------------------------------

struct SessionWorker {
    worker_id: usize,
    client: reqwest::Client,
    plan: Arc<TrafficPlan>,
    stats: Arc<SimulationStats>,
    gate: Arc<RateGate>,
    user_types: Vec<UserTypeConfig>,
    regions: Vec<RegionConfig>,
    detailed: bool,
}

impl SessionWorker {
    async fn run(&self, running: watch::Receiver<bool>) {
        debug!(worker = self.worker_id, "Session worker started");
        while *running.borrow() {
            let mut session = self.open_session();
            debug!(
                worker = self.worker_id,
                session = %session.session_id,
                user_type = %session.user_type,
                region = %session.region,
                "New session"
            );

            while *running.borrow() && session.should_continue() {
                let call = match self.plan.select(&session.user_type) {
                    Some(call) => call.clone(),
                    None => break,
                };
                self.gate.acquire().await;
                self.perform(&session, &call).await;
                session.record_request();
                sleep(session.think_time()).await;
            }

            debug!(
                worker = self.worker_id,
                session = %session.session_id,
                requests = session.requests_made(),
                "Session ended"
            );
            let pause = {
                let mut rng = rand::thread_rng();
                Duration::from_secs_f64(rng.gen_range(1.0..3.0))
            };
            sleep(pause).await;
        }
        debug!(worker = self.worker_id, "Session worker stopped");
    }

    fn open_session(&self) -> UserSession {
        let mut rng = rand::thread_rng();
        let user_type = pick_weighted(&mut rng, &self.user_types, |u| u.weight);
        let region = pick_weighted(&mut rng, &self.regions, |r| r.weight);
        UserSession::new(user_type, region)
    }

    async fn perform(&self, session: &UserSession, call: &EndpointCall) {
        let (url, body) = {
            let path = match &call.path_param {
                Some(param) => {
                    let value = datagen::path_param(param);
                    call.path
                        .replace("{id}", &value)
                        .replace("{item_id}", &value)
                }
                None => call.path.clone(),
            };
            let body = match (&call.method[..], &call.payload) {
                ("POST" | "PUT", Some(name)) => Some(datagen::payload(name)),
                _ => None,
            };
            (format!("{}{}", call.base_url, path), body)
        };

        let mut request = match call.method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => {
                warn!(method = %other, "Unsupported method in traffic plan");
                return;
            }
        };
        for (name, value) in session.headers() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let started = Instant::now();
        match request.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let elapsed = started.elapsed();
                if self.detailed {
                    debug!(
                        method = %call.method,
                        url = %url,
                        status,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Simulated request"
                    );
                }
                self.stats
                    .record(&call.method, &call.path, status, elapsed, None);
            }
            Err(e) => {
                let elapsed = started.elapsed();
                warn!(method = %call.method, url = %url, error = %e, "Simulated request failed");
                self.stats.record(
                    &call.method,
                    &call.path,
                    500,
                    elapsed,
                    Some(&e.to_string()),
                );
            }
        }
    }
}

/// Weighted pick over a non-empty slice. Falls back to the first element if
/// the weights cannot form a distribution.
fn pick_weighted<'a, T>(
    rng: &mut impl Rng,
    items: &'a [T],
    weight: impl Fn(&T) -> f64,
) -> &'a T {
    match WeightedIndex::new(items.iter().map(&weight)) {
        Ok(dist) => &items[dist.sample(rng)],
        Err(_) => &items[0],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
