//! Traffic plan built from the `[[simulation.services]]` config.
//!
//! Flattens every service / endpoint / method combination into one weighted
//! list so a worker can pick the next call with a single draw.

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::config::TargetServiceConfig;

/// One concrete call the simulator can make.
#[derive(Debug, Clone)]
pub struct EndpointCall {
    pub service: String,
    pub base_url: String,
    pub path: String,
    pub method: String,
    pub weight: f64,
    /// User types that hit this endpoint. Empty means everyone.
    pub user_types: Vec<String>,
    pub payload: Option<String>,
    pub path_param: Option<String>,
}

pub struct TrafficPlan {
    calls: Vec<EndpointCall>,
}

impl TrafficPlan {
    pub fn from_config(services: &[TargetServiceConfig]) -> Self {
        let mut calls = Vec::new();
        for service in services {
            for endpoint in &service.endpoints {
                for method in &endpoint.methods {
                    calls.push(EndpointCall {
                        service: service.name.clone(),
                        base_url: service.base_url.trim_end_matches('/').to_string(),
                        path: endpoint.path.clone(),
                        method: method.to_uppercase(),
                        weight: endpoint.weight,
                        user_types: endpoint.user_types.clone(),
                        payload: endpoint.payload.clone(),
                        path_param: endpoint.path_param.clone(),
                    });
                }
            }
        }
        Self { calls }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Unique `(service name, base_url)` pairs, for health checking.
    pub fn targets(&self) -> Vec<(String, String)> {
        let mut targets: Vec<(String, String)> = Vec::new();
        for call in &self.calls {
            if !targets.iter().any(|(_, url)| url == &call.base_url) {
                targets.push((call.service.clone(), call.base_url.clone()));
            }
        }
        targets
    }

    /// Weighted pick of the next call for the given user type. Falls back to
    /// the full plan when no endpoint names the type.
    pub fn select(&self, user_type: &str) -> Option<&EndpointCall> {
        if self.calls.is_empty() {
            return None;
        }
        let eligible: Vec<&EndpointCall> = self
            .calls
            .iter()
            .filter(|c| c.user_types.is_empty() || c.user_types.iter().any(|u| u == user_type))
            .collect();

        let mut rng = rand::thread_rng();
        if eligible.is_empty() {
            return self.calls.choose(&mut rng);
        }
        match WeightedIndex::new(eligible.iter().map(|c| c.weight)) {
            Ok(dist) => Some(eligible[dist.sample(&mut rng)]),
            Err(_) => eligible.choose(&mut rng).copied(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
