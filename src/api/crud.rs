//! Users and products handlers (CRUD API).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use super::metrics::BusinessMetrics;
use super::{ApiContext, Page};
use crate::datagen;
use crate::types::{NewProduct, NewUser, ProductPatch};

/// Attach business metrics to an already-built response.
fn with_business(mut response: Response, business: BusinessMetrics) -> Response {
    response.extensions_mut().insert(business);
    response
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /users
pub async fn list_users(
    State(ctx): State<ApiContext>,
    Query(page): Query<Page>,
) -> Result<Response, ApiError> {
    let users = ctx.store.list_users(page.skip, page.limit).await?;
    Ok(Json(users).into_response())
}

/// POST /users
pub async fn create_user(
    State(ctx): State<ApiContext>,
    Json(new): Json<NewUser>,
) -> Result<Response, ApiError> {
    let user = ctx.store.create_user(&new).await?;
    Ok(with_business(
        Json(user).into_response(),
        BusinessMetrics {
            category: Some("user_management".into()),
            ..Default::default()
        },
    ))
}

/// GET /users/:id
pub async fn get_user(
    State(ctx): State<ApiContext>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let user = ctx.store.get_user(id).await?;
    Ok(Json(user).into_response())
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// GET /products
pub async fn list_products(
    State(ctx): State<ApiContext>,
    Query(page): Query<Page>,
) -> Result<Response, ApiError> {
    let products = ctx.store.list_products(page.skip, page.limit).await?;
    Ok(Json(products).into_response())
}

/// POST /products
pub async fn create_product(
    State(ctx): State<ApiContext>,
    Json(new): Json<NewProduct>,
) -> Result<Response, ApiError> {
    let product = ctx.store.create_product(&new).await?;
    let category = category_label(&ctx, product.category_id).await?;
    Ok(with_business(
        Json(product.clone()).into_response(),
        BusinessMetrics {
            product_id: Some(product.id.to_string()),
            category: Some(category),
            ..Default::default()
        },
    ))
}

/// GET /products/:id
pub async fn get_product(
    State(ctx): State<ApiContext>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let product = ctx.store.get_product(id).await?;
    let category = category_label(&ctx, product.category_id).await?;
    Ok(with_business(
        Json(product.clone()).into_response(),
        BusinessMetrics {
            product_id: Some(product.id.to_string()),
            category: Some(category),
            ..Default::default()
        },
    ))
}

/// PUT /products/:id
pub async fn update_product(
    State(ctx): State<ApiContext>,
    Path(id): Path<i32>,
    Json(patch): Json<ProductPatch>,
) -> Result<Response, ApiError> {
    let product = ctx.store.update_product(id, &patch).await?;
    let category = category_label(&ctx, product.category_id).await?;
    Ok(with_business(
        Json(product.clone()).into_response(),
        BusinessMetrics {
            product_id: Some(product.id.to_string()),
            category: Some(category),
            ..Default::default()
        },
    ))
}

/// DELETE /products/:id (soft delete)
pub async fn delete_product(
    State(ctx): State<ApiContext>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let product = ctx.store.delete_product(id).await?;
    let category = category_label(&ctx, product.category_id).await?;
    Ok(with_business(
        Json(json!({ "message": "Product deleted successfully" })).into_response(),
        BusinessMetrics {
            product_id: Some(product.id.to_string()),
            category: Some(category),
            ..Default::default()
        },
    ))
}

async fn category_label(ctx: &ApiContext, category_id: i32) -> Result<String, ApiError> {
    Ok(ctx
        .store
        .category_name(category_id)
        .await?
        .unwrap_or_else(|| "unknown".to_string()))
}

// ---------------------------------------------------------------------------
// Demo seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SeedCount {
    #[serde(default = "default_user_count")]
    pub count: u32,
}

fn default_user_count() -> u32 {
    10
}

/// POST /demo/generate-users
pub async fn generate_demo_users(
    State(ctx): State<ApiContext>,
    Query(seed): Query<SeedCount>,
) -> Result<Response, ApiError> {
    let mut created = 0;
    for _ in 0..seed.count {
        let new = {
            let mut rng = rand::thread_rng();
            let username = format!("{}{}", datagen::username(), rng.gen_range(1..10_000));
            NewUser {
                email: datagen::email(&username),
                username,
                first_name: datagen::first_name().to_string(),
                last_name: datagen::last_name().to_string(),
            }
        };
        ctx.store.create_user(&new).await?;
        created += 1;
    }

    info!(count = created, "Generated demo users");
    Ok(Json(json!({
        "message": format!("Generated {created} demo users"),
        "count": created,
    }))
    .into_response())
}
