//! Cart, checkout, and order handlers (shop API).
//!
//! There is no auth layer in this demo; the acting user is a random
//! seeded user picked per request.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use super::metrics::BusinessMetrics;
use super::{ApiContext, Page};
use crate::datagen;
use crate::types::{AddToCart, CartView, CheckoutRequest, OrderDetailView, OrderItemView};

fn with_business(mut response: Response, business: BusinessMetrics) -> Response {
    response.extensions_mut().insert(business);
    response
}

/// Pick the acting user from the seeded users.
async fn acting_user(ctx: &ApiContext) -> Result<i32, ApiError> {
    let ids = ctx.store.user_ids().await?;
    let picked = {
        let mut rng = rand::thread_rng();
        ids.choose(&mut rng).copied()
    };
    picked.ok_or_else(|| ApiError::BadRequest("No users in database".into()))
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

/// GET /cart
pub async fn get_cart(State(ctx): State<ApiContext>) -> Result<Response, ApiError> {
    let user_id = acting_user(&ctx).await?;
    let snapshot = ctx.store.active_cart(user_id).await?;
    let view = CartView::assemble(&snapshot.cart, &snapshot.items);

    let items = view.total_items.max(0) as u32;
    Ok(with_business(
        Json(view).into_response(),
        BusinessMetrics {
            cart_items_count: Some(items),
            ..Default::default()
        },
    ))
}

/// POST /cart
pub async fn add_to_cart(
    State(ctx): State<ApiContext>,
    Json(add): Json<AddToCart>,
) -> Result<Response, ApiError> {
    let user_id = acting_user(&ctx).await?;
    let (snapshot, category_id) = ctx.store.add_cart_item(user_id, &add).await?;
    let view = CartView::assemble(&snapshot.cart, &snapshot.items);

    let items = view.total_items.max(0) as u32;
    Ok(with_business(
        Json(view).into_response(),
        BusinessMetrics {
            product_id: Some(add.product_id.to_string()),
            category: Some(format!("category_{category_id}")),
            cart_items_count: Some(items),
            ..Default::default()
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct QuantityParam {
    pub quantity: i32,
}

/// PUT /cart/:item_id
///
/// Quantity comes from the `quantity` query parameter or a JSON body with
/// the same field; zero removes the line.
pub async fn update_cart_item(
    State(ctx): State<ApiContext>,
    Path(item_id): Path<i32>,
    query: Option<Query<QuantityParam>>,
    body: Option<Json<QuantityParam>>,
) -> Result<Response, ApiError> {
    let quantity = query
        .map(|Query(q)| q.quantity)
        .or_else(|| body.map(|Json(b)| b.quantity))
        .ok_or_else(|| ApiError::BadRequest("quantity is required".into()))?;

    let user_id = acting_user(&ctx).await?;
    let touched = ctx
        .store
        .update_cart_item(user_id, item_id, quantity)
        .await?;

    Ok(with_business(
        Json(json!({ "message": "Cart updated successfully" })).into_response(),
        BusinessMetrics {
            product_id: Some(touched.product_id.to_string()),
            category: Some(format!("category_{}", touched.category_id)),
            ..Default::default()
        },
    ))
}

// ---------------------------------------------------------------------------
// Checkout & orders
// ---------------------------------------------------------------------------

/// POST /checkout
pub async fn checkout(
    State(ctx): State<ApiContext>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Response, ApiError> {
    let user_id = acting_user(&ctx).await?;
    let (order, line_count) = ctx.store.checkout(user_id, &req.shipping_address).await?;

    info!(
        order_id = order.id,
        user_id,
        total = %order.total_amount,
        "Checkout complete"
    );

    let amount = order.total_amount.to_f64();
    Ok(with_business(
        Json(order).into_response(),
        BusinessMetrics {
            transaction_amount: amount,
            cart_items_count: Some(line_count),
            ..Default::default()
        },
    ))
}

/// GET /orders
pub async fn list_orders(
    State(ctx): State<ApiContext>,
    Query(page): Query<Page>,
) -> Result<Response, ApiError> {
    let user_id = acting_user(&ctx).await?;
    let orders = ctx.store.list_orders(user_id, page.skip, page.limit).await?;
    Ok(Json(orders).into_response())
}

/// GET /orders/:id
pub async fn get_order(
    State(ctx): State<ApiContext>,
    Path(order_id): Path<i32>,
) -> Result<Response, ApiError> {
    let user_id = acting_user(&ctx).await?;
    let (order, items) = ctx.store.get_order(user_id, order_id).await?;

    let views: Vec<OrderItemView> = items
        .iter()
        .map(|(item, product_name)| OrderItemView {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            price_at_time: item.price_at_time,
            product_name: product_name.clone(),
        })
        .collect();

    let amount = order.total_amount.to_f64();
    let count = views.len() as u32;
    let detail = OrderDetailView {
        id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount,
        status: order.status,
        shipping_address: order.shipping_address,
        created_at: order.created_at,
        items: views,
    };

    Ok(with_business(
        Json(detail).into_response(),
        BusinessMetrics {
            transaction_amount: amount,
            cart_items_count: Some(count),
            ..Default::default()
        },
    ))
}

// ---------------------------------------------------------------------------
// Demo seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SeedCount {
    #[serde(default = "default_order_count")]
    pub count: u32,
}

fn default_order_count() -> u32 {
    5
}

const DEMO_STATUSES: &[&str] = &["pending", "confirmed", "shipped"];

/// POST /demo/generate-orders
pub async fn generate_demo_orders(
    State(ctx): State<ApiContext>,
    Query(seed): Query<SeedCount>,
) -> Result<Response, ApiError> {
    let users = ctx.store.user_ids().await?;
    let products = ctx.store.list_products(0, 10).await?;

    if users.is_empty() || products.is_empty() {
        return Err(ApiError::BadRequest(
            "Need users and products in database first".into(),
        ));
    }

    let mut created = 0;
    for _ in 0..seed.count {
        let (user_id, status, address, lines) = {
            let mut rng = rand::thread_rng();
            let user_id = *users.choose(&mut rng).unwrap();
            let status = *DEMO_STATUSES.choose(&mut rng).unwrap();
            let line_count = rng.gen_range(1..=5).min(products.len());
            let lines: Vec<(i32, i32)> = products
                .choose_multiple(&mut rng, line_count)
                .map(|p| (p.id, rng.gen_range(1..=3)))
                .collect();
            (user_id, status, datagen::street_address(), lines)
        };

        ctx.store
            .insert_demo_order(user_id, status, &address, &lines)
            .await?;
        created += 1;
    }

    info!(count = created, "Generated demo orders");
    Ok(Json(json!({
        "message": format!("Generated {created} demo orders"),
        "count": created,
    }))
    .into_response())
}
