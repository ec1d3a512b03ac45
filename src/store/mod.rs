//! Persistence layer.
//!
//! Defines the `Store` trait both API services are written against, and
//! the Postgres implementation (`PgStore`). Tests substitute an in-memory
//! implementation so routers can be exercised without a database.

pub mod pg;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    AddToCart, Cart, CartItem, NewProduct, NewUser, Order, OrderItem, Product, ProductPatch, User,
};

pub use pg::PgStore;

/// Errors a store operation can produce. API handlers map these onto
/// HTTP statuses; everything else is a 500.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Uniqueness violation (username, email, SKU).
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient stock")]
    OutOfStock,
    #[error("Cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// An active cart together with its lines and their product names.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub cart: Cart,
    pub items: Vec<(CartItem, String)>,
}

/// What a cart line mutation touched, for business metrics.
#[derive(Debug, Clone, Copy)]
pub struct CartMutation {
    pub product_id: i32,
    pub category_id: i32,
    pub removed: bool,
}

/// Storage operations needed by the CRUD and shop APIs.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Users -----------------------------------------------------------

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;
    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError>;
    async fn get_user(&self, id: i32) -> Result<User, StoreError>;
    /// Ids of active users; the shop API draws its acting user from these.
    async fn user_ids(&self) -> Result<Vec<i32>, StoreError>;

    // -- Products --------------------------------------------------------

    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<Product>, StoreError>;
    async fn create_product(&self, new: &NewProduct) -> Result<Product, StoreError>;
    async fn get_product(&self, id: i32) -> Result<Product, StoreError>;
    async fn update_product(&self, id: i32, patch: &ProductPatch) -> Result<Product, StoreError>;
    /// Soft delete; returns the row as it was before deactivation.
    async fn delete_product(&self, id: i32) -> Result<Product, StoreError>;
    async fn category_name(&self, id: i32) -> Result<Option<String>, StoreError>;

    // -- Carts -----------------------------------------------------------

    /// The user's active cart, created on first touch.
    async fn active_cart(&self, user_id: i32) -> Result<CartSnapshot, StoreError>;
    /// Add a product to the active cart, merging quantity when the product
    /// is already present and snapshotting the current price.
    /// Returns the updated cart and the product's category id.
    async fn add_cart_item(
        &self,
        user_id: i32,
        add: &AddToCart,
    ) -> Result<(CartSnapshot, i32), StoreError>;
    /// Change a line's quantity; `quantity <= 0` removes the line.
    async fn update_cart_item(
        &self,
        user_id: i32,
        item_id: i32,
        quantity: i32,
    ) -> Result<CartMutation, StoreError>;

    // -- Orders ----------------------------------------------------------

    /// Turn the active cart into an order: snapshot prices, decrement
    /// stock, mark the cart checked out. Atomic. Errors on an empty cart.
    /// Returns the order and the number of cart lines it consumed.
    async fn checkout(
        &self,
        user_id: i32,
        shipping_address: &str,
    ) -> Result<(Order, u32), StoreError>;
    async fn list_orders(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError>;
    async fn get_order(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<(Order, Vec<(OrderItem, String)>), StoreError>;
    /// Insert a ready-made order (demo seeding); lines are
    /// `(product_id, quantity)` pairs priced at the current catalog price.
    async fn insert_demo_order(
        &self,
        user_id: i32,
        status: &str,
        shipping_address: &str,
        lines: &[(i32, i32)],
    ) -> Result<Order, StoreError>;
}
