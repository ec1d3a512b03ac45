//! HTTP API services.
//!
//! Two axum routers share one context (store + metrics handle): the CRUD
//! API (users, products) and the shop API (cart, checkout, orders). Both
//! carry the request-metrics middleware and permissive CORS for local
//! demo use.

pub mod crud;
pub mod error;
pub mod metrics;
pub mod shop;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::analytics::MetricsHandle;
use crate::store::Store;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn Store>,
    pub metrics: MetricsHandle,
    pub service_name: String,
}

/// Offset/limit pagination via `skip`/`limit` query params.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /health
pub async fn health(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(json!({ "status": "healthy", "service": ctx.service_name }))
}

/// Attach the metrics middleware, CORS, and state.
fn finish(routes: Router<ApiContext>, ctx: ApiContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            metrics::record_metrics,
        ))
        .layer(cors)
        .with_state(ctx)
}

/// Router for the users/products CRUD API.
pub fn build_crud_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/users", get(crud::list_users).post(crud::create_user))
        .route("/users/:id", get(crud::get_user))
        .route(
            "/products",
            get(crud::list_products).post(crud::create_product),
        )
        .route(
            "/products/:id",
            get(crud::get_product)
                .put(crud::update_product)
                .delete(crud::delete_product),
        )
        .route("/demo/generate-users", post(crud::generate_demo_users));

    finish(routes, ctx)
}

/// Router for the cart/checkout/orders API.
pub fn build_shop_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/cart", get(shop::get_cart).post(shop::add_to_cart))
        .route("/cart/:item_id", axum::routing::put(shop::update_cart_item))
        .route("/checkout", post(shop::checkout))
        .route("/orders", get(shop::list_orders))
        .route("/orders/:id", get(shop::get_order))
        .route("/demo/generate-orders", post(shop::generate_demo_orders));

    finish(routes, ctx)
}

/// Bind and serve a router until ctrl-c.
pub async fn serve(router: Router, port: u16, service_name: &str) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!(port, service = service_name, "API server listening");

    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("API server error")
}
