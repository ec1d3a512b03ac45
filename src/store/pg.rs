//! Postgres store backed by sqlx.
//!
//! Connects a pool, runs the embedded migrations, and implements the
//! `Store` trait with plain runtime-checked queries. Checkout and demo
//! order insertion run inside transactions; everything else is a single
//! statement or a short read-modify-write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::{CartMutation, CartSnapshot, Store, StoreError};
use crate::config::PostgresConfig;
use crate::types::{
    AddToCart, Cart, CartItem, NewProduct, NewUser, Order, OrderItem, Product, ProductPatch, User,
};

/// A cart/order line joined with its product name.
#[derive(sqlx::FromRow)]
struct LineRow {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_at_time: Decimal,
    pub added_at: chrono::DateTime<chrono::Utc>,
    pub product_name: String,
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool and apply migrations.
    pub async fn connect(cfg: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await
            .context("Failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        info!(max_connections = cfg.max_connections, "Postgres pool ready");
        Ok(Self { pool })
    }

    async fn cart_lines(&self, cart_id: i32) -> Result<Vec<(CartItem, String)>, StoreError> {
        let rows = sqlx::query_as::<_, LineRow>(
            "SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.price_at_time, \
                    ci.added_at, p.name AS product_name \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 ORDER BY ci.id",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    CartItem {
                        id: r.id,
                        cart_id: r.cart_id,
                        product_id: r.product_id,
                        quantity: r.quantity,
                        price_at_time: r.price_at_time,
                        added_at: r.added_at,
                    },
                    r.product_name,
                )
            })
            .collect())
    }

    async fn get_or_create_cart(&self, user_id: i32) -> Result<Cart, StoreError> {
        if let Some(cart) = sqlx::query_as::<_, Cart>(
            "SELECT * FROM carts WHERE user_id = $1 AND status = 'active' LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(cart);
        }

        let cart = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (user_id, status) VALUES ($1, 'active') RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(cart)
    }
}

#[async_trait]
impl Store for PgStore {
    // -- Users -----------------------------------------------------------

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE is_active ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let taken: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1 LIMIT 1")
                .bind(&new.username)
                .fetch_optional(&self.pool)
                .await?;
        if taken.is_some() {
            return Err(StoreError::Conflict("Username already exists".into()));
        }

        let taken: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1 LIMIT 1")
            .bind(&new.email)
            .fetch_optional(&self.pool)
            .await?;
        if taken.is_some() {
            return Err(StoreError::Conflict("Email already exists".into()));
        }

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, first_name, last_name) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user(&self, id: i32) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("User"))
    }

    async fn user_ids(&self) -> Result<Vec<i32>, StoreError> {
        let ids: Vec<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE is_active ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    // -- Products --------------------------------------------------------

    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<Product>, StoreError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    async fn create_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let taken: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM products WHERE sku = $1 LIMIT 1")
                .bind(&new.sku)
                .fetch_optional(&self.pool)
                .await?;
        if taken.is_some() {
            return Err(StoreError::Conflict("SKU already exists".into()));
        }

        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, description, price, category_id, stock_quantity, sku) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.category_id)
        .bind(new.stock_quantity)
        .bind(&new.sku)
        .fetch_one(&self.pool)
        .await?;

        Ok(product)
    }

    async fn get_product(&self, id: i32) -> Result<Product, StoreError> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND is_active")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("Product"))
    }

    async fn update_product(&self, id: i32, patch: &ProductPatch) -> Result<Product, StoreError> {
        sqlx::query_as::<_, Product>(
            "UPDATE products SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                price = COALESCE($4, price), \
                stock_quantity = COALESCE($5, stock_quantity), \
                updated_at = now() \
             WHERE id = $1 AND is_active RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.price)
        .bind(patch.stock_quantity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("Product"))
    }

    async fn delete_product(&self, id: i32) -> Result<Product, StoreError> {
        let product = self.get_product(id).await?;
        sqlx::query("UPDATE products SET is_active = FALSE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(product)
    }

    async fn category_name(&self, id: i32) -> Result<Option<String>, StoreError> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name.map(|(n,)| n))
    }

    // -- Carts -----------------------------------------------------------

    async fn active_cart(&self, user_id: i32) -> Result<CartSnapshot, StoreError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let items = self.cart_lines(cart.id).await?;
        Ok(CartSnapshot { cart, items })
    }

    async fn add_cart_item(
        &self,
        user_id: i32,
        add: &AddToCart,
    ) -> Result<(CartSnapshot, i32), StoreError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let product = self.get_product(add.product_id).await?;

        if product.stock_quantity < add.quantity {
            return Err(StoreError::OutOfStock);
        }

        let existing: Option<CartItem> = sqlx::query_as(
            "SELECT * FROM cart_items WHERE cart_id = $1 AND product_id = $2 LIMIT 1",
        )
        .bind(cart.id)
        .bind(add.product_id)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(item) => {
                // Merge quantity, refresh to the current price.
                sqlx::query(
                    "UPDATE cart_items SET quantity = quantity + $2, price_at_time = $3 \
                     WHERE id = $1",
                )
                .bind(item.id)
                .bind(add.quantity)
                .bind(product.price)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO cart_items (cart_id, product_id, quantity, price_at_time) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(cart.id)
                .bind(add.product_id)
                .bind(add.quantity)
                .bind(product.price)
                .execute(&self.pool)
                .await?;
            }
        }

        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(cart.id)
            .execute(&self.pool)
            .await?;

        let items = self.cart_lines(cart.id).await?;
        Ok((CartSnapshot { cart, items }, product.category_id))
    }

    async fn update_cart_item(
        &self,
        user_id: i32,
        item_id: i32,
        quantity: i32,
    ) -> Result<CartMutation, StoreError> {
        let item: Option<CartItem> = sqlx::query_as(
            "SELECT ci.* FROM cart_items ci \
             JOIN carts c ON c.id = ci.cart_id \
             WHERE ci.id = $1 AND c.user_id = $2 AND c.status = 'active'",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let item = item.ok_or(StoreError::NotFound("Cart item"))?;
        let product = self.get_product(item.product_id).await?;

        let removed = if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(item.id)
                .execute(&self.pool)
                .await?;
            true
        } else {
            if product.stock_quantity < quantity {
                return Err(StoreError::OutOfStock);
            }
            sqlx::query(
                "UPDATE cart_items SET quantity = $2, price_at_time = $3 WHERE id = $1",
            )
            .bind(item.id)
            .bind(quantity)
            .bind(product.price)
            .execute(&self.pool)
            .await?;
            false
        };

        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(item.cart_id)
            .execute(&self.pool)
            .await?;

        Ok(CartMutation {
            product_id: product.id,
            category_id: product.category_id,
            removed,
        })
    }

    // -- Orders ----------------------------------------------------------

    async fn checkout(
        &self,
        user_id: i32,
        shipping_address: &str,
    ) -> Result<(Order, u32), StoreError> {
        let mut tx = self.pool.begin().await?;

        let cart: Option<Cart> = sqlx::query_as(
            "SELECT * FROM carts WHERE user_id = $1 AND status = 'active' LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let cart = cart.ok_or(StoreError::EmptyCart)?;

        let items: Vec<CartItem> =
            sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY id")
                .bind(cart.id)
                .fetch_all(&mut *tx)
                .await?;
        if items.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let total: Decimal = items
            .iter()
            .map(|i| i.price_at_time * Decimal::from(i.quantity))
            .sum();

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, total_amount, status, shipping_address) \
             VALUES ($1, $2, 'pending', $3) RETURNING *",
        )
        .bind(user_id)
        .bind(total)
        .bind(shipping_address)
        .fetch_one(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, price_at_time) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price_at_time)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity - $2 WHERE id = $1",
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE carts SET status = 'checked_out', updated_at = now() WHERE id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((order, items.len() as u32))
    }

    async fn list_orders(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY id OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn get_order(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<(Order, Vec<(OrderItem, String)>), StoreError> {
        let order: Option<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
                .bind(order_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let order = order.ok_or(StoreError::NotFound("Order"))?;

        #[derive(sqlx::FromRow)]
        struct OrderLineRow {
            id: i32,
            order_id: i32,
            product_id: i32,
            quantity: i32,
            price_at_time: Decimal,
            created_at: chrono::DateTime<chrono::Utc>,
            product_name: String,
        }

        let rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price_at_time, \
                    oi.created_at, p.name AS product_name \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|r| {
                (
                    OrderItem {
                        id: r.id,
                        order_id: r.order_id,
                        product_id: r.product_id,
                        quantity: r.quantity,
                        price_at_time: r.price_at_time,
                        created_at: r.created_at,
                    },
                    r.product_name,
                )
            })
            .collect();

        Ok((order, items))
    }

    async fn insert_demo_order(
        &self,
        user_id: i32,
        status: &str,
        shipping_address: &str,
        lines: &[(i32, i32)],
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut total = Decimal::ZERO;
        let mut priced = Vec::with_capacity(lines.len());
        for &(product_id, quantity) in lines {
            let price: Option<(Decimal,)> =
                sqlx::query_as("SELECT price FROM products WHERE id = $1 AND is_active")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (price,) = price.ok_or(StoreError::NotFound("Product"))?;
            total += price * Decimal::from(quantity);
            priced.push((product_id, quantity, price));
        }

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, total_amount, status, shipping_address) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(user_id)
        .bind(total)
        .bind(status)
        .bind(shipping_address)
        .fetch_one(&mut *tx)
        .await?;

        for (product_id, quantity, price) in priced {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, price_at_time) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order.id)
            .bind(product_id)
            .bind(quantity)
            .bind(price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }
}
