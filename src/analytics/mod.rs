//! Analytics pipeline into ClickHouse.
//!
//! Metrics travel over an unbounded channel to a background task that
//! batches rows and POSTs plain-SQL `INSERT` statements to the ClickHouse
//! HTTP endpoint. Delivery is best-effort: a failed insert is logged and
//! the rows are dropped, never surfaced to the request path.

pub mod system;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;

const REQUEST_COLUMNS: &str = "timestamp, service_name, endpoint, method, status_code, \
     response_time_ms, request_size_bytes, response_size_bytes, user_id, session_id, \
     user_agent, ip_address, geographic_region, product_id, category, transaction_amount, \
     cart_items_count, error_message, request_id";

const SYSTEM_COLUMNS: &str = "timestamp, service_name, metric_name, metric_value, unit";

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One row of `request_metrics`, produced by the API middleware and the
/// load simulator's target services.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    pub timestamp: DateTime<Utc>,
    pub service_name: String,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: u32,
    pub request_size_bytes: u32,
    pub response_size_bytes: u32,
    pub user_id: String,
    pub session_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub geographic_region: String,
    pub product_id: Option<String>,
    pub category: Option<String>,
    pub transaction_amount: Option<f64>,
    pub cart_items_count: Option<u32>,
    pub error_message: Option<String>,
    pub request_id: String,
}

/// One row of `system_metrics` (CPU, memory).
#[derive(Debug, Clone)]
pub struct SystemMetric {
    pub timestamp: DateTime<Utc>,
    pub service_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub unit: String,
}

#[derive(Debug)]
enum Row {
    Request(RequestMetric),
    System(SystemMetric),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap cloneable producer side of the sink. A disabled handle drops
/// everything, which is what tests and `analytics.enabled = false` use.
#[derive(Clone)]
pub struct MetricsHandle {
    tx: Option<mpsc::UnboundedSender<Row>>,
}

impl MetricsHandle {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn record_request(&self, metric: RequestMetric) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Row::Request(metric));
        }
    }

    pub fn record_system(&self, metric: SystemMetric) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Row::System(metric));
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

pub struct MetricsSink;

impl MetricsSink {
    /// Spawn the background flusher and return the producer handle.
    ///
    /// Rows are flushed when `max_batch` accumulate or every
    /// `flush_interval_secs`, whichever comes first.
    pub fn spawn(cfg: &AnalyticsConfig) -> Result<MetricsHandle> {
        if !cfg.enabled {
            return Ok(MetricsHandle::disabled());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for ClickHouse")?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = cfg.url.clone();
        let database = cfg.database.clone();
        let max_batch = cfg.max_batch.max(1);
        let flush_interval = Duration::from_secs(cfg.flush_interval_secs.max(1));

        tokio::spawn(async move {
            let mut requests: Vec<RequestMetric> = Vec::new();
            let mut systems: Vec<SystemMetric> = Vec::new();
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    row = rx.recv() => match row {
                        Some(Row::Request(m)) => {
                            requests.push(m);
                            if requests.len() >= max_batch {
                                flush_requests(&client, &url, &database, &mut requests).await;
                            }
                        }
                        Some(Row::System(m)) => {
                            systems.push(m);
                            if systems.len() >= max_batch {
                                flush_systems(&client, &url, &database, &mut systems).await;
                            }
                        }
                        None => {
                            flush_requests(&client, &url, &database, &mut requests).await;
                            flush_systems(&client, &url, &database, &mut systems).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        flush_requests(&client, &url, &database, &mut requests).await;
                        flush_systems(&client, &url, &database, &mut systems).await;
                    }
                }
            }
            debug!("Metrics sink stopped");
        });

        Ok(MetricsHandle { tx: Some(tx) })
    }
}

async fn flush_requests(client: &Client, url: &str, db: &str, rows: &mut Vec<RequestMetric>) {
    if rows.is_empty() {
        return;
    }
    let sql = request_insert_sql(db, rows);
    let count = rows.len();
    rows.clear();
    post_sql(client, url, sql, count, "request_metrics").await;
}

async fn flush_systems(client: &Client, url: &str, db: &str, rows: &mut Vec<SystemMetric>) {
    if rows.is_empty() {
        return;
    }
    let sql = system_insert_sql(db, rows);
    let count = rows.len();
    rows.clear();
    post_sql(client, url, sql, count, "system_metrics").await;
}

async fn post_sql(client: &Client, url: &str, sql: String, count: usize, table: &str) {
    match client
        .post(url)
        .header("Content-Type", "text/plain")
        .body(sql)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            debug!(count, table, "Flushed metrics batch");
        }
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, table, dropped = count, body = %body, "ClickHouse rejected insert");
        }
        Err(e) => {
            warn!(error = %e, table, dropped = count, "Failed to reach ClickHouse");
        }
    }
}

// ---------------------------------------------------------------------------
// SQL rendering
// ---------------------------------------------------------------------------

/// Escape a string for a single-quoted ClickHouse literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

fn quoted(value: &str) -> String {
    format!("'{}'", escape(value))
}

fn quoted_opt(value: &Option<String>) -> String {
    match value {
        Some(v) => quoted(v),
        None => "NULL".to_string(),
    }
}

fn number_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NULL".to_string(),
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn request_insert_sql(db: &str, rows: &[RequestMetric]) -> String {
    let mut sql = format!("INSERT INTO {db}.request_metrics ({REQUEST_COLUMNS}) VALUES ");
    for (i, m) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let _ = write!(
            sql,
            "('{}', {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            format_ts(&m.timestamp),
            quoted(&m.service_name),
            quoted(&m.endpoint),
            quoted(&m.method),
            m.status_code,
            m.response_time_ms,
            m.request_size_bytes,
            m.response_size_bytes,
            quoted(&m.user_id),
            quoted(&m.session_id),
            quoted(&m.user_agent),
            quoted(&m.ip_address),
            quoted(&m.geographic_region),
            quoted_opt(&m.product_id),
            quoted_opt(&m.category),
            number_opt(&m.transaction_amount),
            number_opt(&m.cart_items_count),
            quoted_opt(&m.error_message),
            quoted(&m.request_id),
        );
    }
    sql
}

fn system_insert_sql(db: &str, rows: &[SystemMetric]) -> String {
    let mut sql = format!("INSERT INTO {db}.system_metrics ({SYSTEM_COLUMNS}) VALUES ");
    for (i, m) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let _ = write!(
            sql,
            "('{}', {}, {}, {}, {})",
            format_ts(&m.timestamp),
            quoted(&m.service_name),
            quoted(&m.metric_name),
            m.metric_value,
            quoted(&m.unit),
        );
    }
    sql
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metric() -> RequestMetric {
        RequestMetric {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            service_name: "crud-api".into(),
            endpoint: "/products/3".into(),
            method: "GET".into(),
            status_code: 200,
            response_time_ms: 12,
            request_size_bytes: 0,
            response_size_bytes: 412,
            user_id: "user_0042".into(),
            session_id: "sess-1".into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".into(),
            ip_address: "10.1.2.3".into(),
            geographic_region: "EU-West".into(),
            product_id: Some("3".into()),
            category: Some("Books".into()),
            transaction_amount: None,
            cart_items_count: None,
            error_message: None,
            request_id: "req-1".into(),
        }
    }

    #[test]
    fn escape_quotes_and_backslashes() {
        assert_eq!(escape("it's"), "it''s");
        assert_eq!(escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn request_sql_single_row() {
        let sql = request_insert_sql("analytics", &[metric()]);
        assert!(sql.starts_with("INSERT INTO analytics.request_metrics (timestamp,"));
        assert!(sql.contains("'2026-03-01 12:00:00.000'"));
        assert!(sql.contains("'crud-api'"));
        assert!(sql.contains("'Books'"));
        // absent optionals render as bare NULL
        assert!(sql.contains(", NULL, NULL, NULL,"));
    }

    #[test]
    fn request_sql_multiple_rows_comma_separated() {
        let sql = request_insert_sql("analytics", &[metric(), metric()]);
        assert_eq!(sql.matches("('2026-03-01").count(), 2);
        assert!(sql.contains("),("));
    }

    #[test]
    fn request_sql_escapes_user_agent() {
        let mut m = metric();
        m.user_agent = "bad'agent".into();
        m.error_message = Some("HTTP 500: can't".into());
        let sql = request_insert_sql("analytics", &[m]);
        assert!(sql.contains("'bad''agent'"));
        assert!(sql.contains("'HTTP 500: can''t'"));
    }

    #[test]
    fn system_sql_row() {
        let row = SystemMetric {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            service_name: "shop-api".into(),
            metric_name: "cpu_usage_percent".into(),
            metric_value: 13.5,
            unit: "percent".into(),
        };
        let sql = system_insert_sql("analytics", &[row]);
        assert!(sql.contains("system_metrics"));
        assert!(sql.contains("'cpu_usage_percent', 13.5, 'percent'"));
    }

    #[test]
    fn disabled_handle_accepts_rows() {
        let handle = MetricsHandle::disabled();
        assert!(!handle.is_enabled());
        handle.record_request(metric());
        handle.record_system(SystemMetric {
            timestamp: Utc::now(),
            service_name: "x".into(),
            metric_name: "y".into(),
            metric_value: 1.0,
            unit: "z".into(),
        });
    }
}
