//! Request-metrics middleware.
//!
//! Times every request and emits a `request_metrics` row to the analytics
//! sink: timing, sizes, session/user identity from headers, client IP
//! from forwarding headers, and a simulated geographic region derived by
//! hashing the client IP over a fixed region list. Handlers contribute
//! business fields by inserting a [`BusinessMetrics`] into the response
//! extensions.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

use super::ApiContext;
use crate::analytics::RequestMetric;

const REGIONS: &[&str] = &["US-East", "US-West", "EU-West", "EU-Central", "APAC", "LATAM"];

/// Business fields a handler can attach to its response.
#[derive(Debug, Clone, Default)]
pub struct BusinessMetrics {
    pub product_id: Option<String>,
    pub category: Option<String>,
    pub transaction_amount: Option<f64>,
    pub cart_items_count: Option<u32>,
}

pub async fn record_metrics(
    State(ctx): State<ApiContext>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let timestamp = Utc::now();

    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let headers = request.headers().clone();
    let request_size = content_length(&headers);

    let session_id = session_id(&headers);
    let user_id = user_id(&headers, &session_id);
    let user_agent = header_str(&headers, "user-agent").unwrap_or("Unknown").to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip_address = client_ip(&headers, peer);
    let geographic_region = region_for_ip(&ip_address).to_string();

    let response = next.run(request).await;

    let status = response.status();
    let business = response
        .extensions()
        .get::<BusinessMetrics>()
        .cloned()
        .unwrap_or_default();

    ctx.metrics.record_request(RequestMetric {
        timestamp,
        service_name: ctx.service_name.clone(),
        endpoint,
        method,
        status_code: status.as_u16(),
        response_time_ms: started.elapsed().as_millis() as u32,
        request_size_bytes: request_size,
        response_size_bytes: content_length(response.headers()),
        user_id,
        session_id,
        user_agent,
        ip_address,
        geographic_region,
        product_id: business.product_id,
        category: business.category,
        transaction_amount: business.transaction_amount,
        cart_items_count: business.cart_items_count,
        error_message: if status.as_u16() >= 400 {
            Some(format!("HTTP {}", status.as_u16()))
        } else {
            None
        },
        request_id: Uuid::new_v4().to_string(),
    });

    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn content_length(headers: &HeaderMap) -> u32 {
    header_str(headers, "content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// `X-Session-ID` header, or a fresh UUID for sessionless callers.
fn session_id(headers: &HeaderMap) -> String {
    header_str(headers, "x-session-id")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// `X-User-ID` header, or an id derived deterministically from the
/// session so a session's requests group under one user.
fn user_id(headers: &HeaderMap, session_id: &str) -> String {
    header_str(headers, "x-user-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("user_{:04}", stable_hash(session_id) % 1000))
}

/// Forwarded headers first, then `X-Real-IP`, then the peer address for
/// direct connections.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real) = header_str(headers, "x-real-ip") {
        return real.to_string();
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Demo stand-in for GeoIP: stable hash of the IP over a fixed list.
fn region_for_ip(ip: &str) -> &'static str {
    REGIONS[(stable_hash(ip) % REGIONS.len() as u64) as usize]
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
