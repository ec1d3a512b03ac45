//! In-memory store for integration testing.
//!
//! Provides a deterministic `Store` implementation backed by plain
//! vectors behind a mutex, so the routers and the simulator can be
//! exercised without Postgres.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;

use storefront::store::{CartMutation, CartSnapshot, Store, StoreError};
use storefront::types::*;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    categories: Vec<Category>,
    products: Vec<Product>,
    carts: Vec<Cart>,
    cart_items: Vec<CartItem>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    next_id: i32,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn active_cart_id(&self, user_id: i32) -> Option<i32> {
        self.carts
            .iter()
            .find(|c| c.user_id == user_id && c.status == "active")
            .map(|c| c.id)
    }

    fn ensure_cart(&mut self, user_id: i32) -> i32 {
        if let Some(id) = self.active_cart_id(user_id) {
            return id;
        }
        let id = self.next_id();
        self.carts.push(Cart {
            id,
            user_id,
            status: "active".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        id
    }

    fn product_name(&self, id: i32) -> String {
        self.products
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "unknown".into())
    }

    fn snapshot(&self, cart_id: i32) -> CartSnapshot {
        let cart = self
            .carts
            .iter()
            .find(|c| c.id == cart_id)
            .cloned()
            .unwrap();
        let items = self
            .cart_items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| (i.clone(), self.product_name(i.product_id)))
            .collect();
        CartSnapshot { cart, items }
    }
}

/// All state is in-memory and fully controllable from test code.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        let id = inner.next_id();
        inner.categories.push(Category {
            id,
            name: "Electronics".into(),
            description: "Gadgets and devices".into(),
            created_at: Utc::now(),
        });
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A store preloaded with one user and three products, with known ids
    /// for deterministic assertions. A single user keeps multi-request
    /// shop flows deterministic: the acting user is drawn at random per
    /// request, so carts only connect across requests when there is
    /// exactly one candidate.
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            let id = inner.next_id();
            inner.users.push(User {
                id,
                username: "alice_demo".into(),
                email: "alice@example.com".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                is_active: true,
            });
            for (name, price, stock, sku) in [
                ("Wireless Mouse", dec!(29.99), 100, "SKU10001"),
                ("Mechanical Keyboard", dec!(89.99), 50, "SKU10002"),
                ("USB-C Hub", dec!(49.99), 2, "SKU10003"),
            ] {
                let id = inner.next_id();
                inner.products.push(Product {
                    id,
                    name: name.into(),
                    description: format!("{name} for testing"),
                    price,
                    category_id: 1,
                    stock_quantity: stock,
                    sku: sku.into(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    is_active: true,
                });
            }
        }
        store
    }

    pub fn first_product_id(&self) -> i32 {
        self.inner.lock().unwrap().products[0].id
    }

    pub fn product_stock(&self, id: i32) -> i32 {
        self.inner
            .lock()
            .unwrap()
            .products
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.stock_quantity)
            .unwrap_or(-1)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.is_active)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .users
            .iter()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(StoreError::Conflict(
                "Username or email already registered".into(),
            ));
        }
        let id = inner.next_id();
        let user = User {
            id,
            username: new.username.clone(),
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_active: true,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i32) -> Result<User, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .iter()
            .find(|u| u.id == id && u.is_active)
            .cloned()
            .ok_or(StoreError::NotFound("User"))
    }

    async fn user_ids(&self) -> Result<Vec<i32>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.is_active)
            .map(|u| u.id)
            .collect())
    }

    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .products
            .iter()
            .filter(|p| p.is_active)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.products.iter().any(|p| p.sku == new.sku) {
            return Err(StoreError::Conflict("SKU already exists".into()));
        }
        let id = inner.next_id();
        let product = Product {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            price: new.price,
            category_id: new.category_id,
            stock_quantity: new.stock_quantity,
            sku: new.sku.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_active: true,
        };
        inner.products.push(product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: i32) -> Result<Product, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .products
            .iter()
            .find(|p| p.id == id && p.is_active)
            .cloned()
            .ok_or(StoreError::NotFound("Product"))
    }

    async fn update_product(&self, id: i32, patch: &ProductPatch) -> Result<Product, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let product = inner
            .products
            .iter_mut()
            .find(|p| p.id == id && p.is_active)
            .ok_or(StoreError::NotFound("Product"))?;
        if let Some(name) = &patch.name {
            product.name = name.clone();
        }
        if let Some(description) = &patch.description {
            product.description = description.clone();
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(stock) = patch.stock_quantity {
            product.stock_quantity = stock;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: i32) -> Result<Product, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let product = inner
            .products
            .iter_mut()
            .find(|p| p.id == id && p.is_active)
            .ok_or(StoreError::NotFound("Product"))?;
        let before = product.clone();
        product.is_active = false;
        product.updated_at = Utc::now();
        Ok(before)
    }

    async fn category_name(&self, id: i32) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone()))
    }

    async fn active_cart(&self, user_id: i32) -> Result<CartSnapshot, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let cart_id = inner.ensure_cart(user_id);
        Ok(inner.snapshot(cart_id))
    }

    async fn add_cart_item(
        &self,
        user_id: i32,
        add: &AddToCart,
    ) -> Result<(CartSnapshot, i32), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let (price, category_id, stock) = inner
            .products
            .iter()
            .find(|p| p.id == add.product_id && p.is_active)
            .map(|p| (p.price, p.category_id, p.stock_quantity))
            .ok_or(StoreError::NotFound("Product"))?;
        if stock < add.quantity {
            return Err(StoreError::OutOfStock);
        }
        let cart_id = inner.ensure_cart(user_id);

        if let Some(existing) = inner
            .cart_items
            .iter_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == add.product_id)
        {
            existing.quantity += add.quantity;
            existing.price_at_time = price;
        } else {
            let id = inner.next_id();
            inner.cart_items.push(CartItem {
                id,
                cart_id,
                product_id: add.product_id,
                quantity: add.quantity,
                price_at_time: price,
                added_at: Utc::now(),
            });
        }
        Ok((inner.snapshot(cart_id), category_id))
    }

    async fn update_cart_item(
        &self,
        user_id: i32,
        item_id: i32,
        quantity: i32,
    ) -> Result<CartMutation, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let cart_id = inner
            .active_cart_id(user_id)
            .ok_or(StoreError::NotFound("Cart item"))?;
        let idx = inner
            .cart_items
            .iter()
            .position(|i| i.id == item_id && i.cart_id == cart_id)
            .ok_or(StoreError::NotFound("Cart item"))?;
        let product_id = inner.cart_items[idx].product_id;
        let (price, category_id, stock) = inner
            .products
            .iter()
            .find(|p| p.id == product_id && p.is_active)
            .map(|p| (p.price, p.category_id, p.stock_quantity))
            .ok_or(StoreError::NotFound("Product"))?;

        let removed = quantity <= 0;
        if removed {
            inner.cart_items.remove(idx);
        } else {
            if stock < quantity {
                return Err(StoreError::OutOfStock);
            }
            inner.cart_items[idx].quantity = quantity;
            inner.cart_items[idx].price_at_time = price;
        }
        Ok(CartMutation {
            product_id,
            category_id,
            removed,
        })
    }

    async fn checkout(
        &self,
        user_id: i32,
        shipping_address: &str,
    ) -> Result<(Order, u32), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let cart_id = inner
            .active_cart_id(user_id)
            .ok_or(StoreError::EmptyCart)?;
        let lines: Vec<CartItem> = inner
            .cart_items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect();
        if lines.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let total_amount = lines
            .iter()
            .map(|l| l.price_at_time * rust_decimal::Decimal::from(l.quantity))
            .sum();
        let order_id = inner.next_id();
        let order = Order {
            id: order_id,
            user_id,
            total_amount,
            status: "pending".into(),
            shipping_address: shipping_address.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        inner.orders.push(order.clone());

        for line in &lines {
            let id = inner.next_id();
            inner.order_items.push(OrderItem {
                id,
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_time: line.price_at_time,
                created_at: Utc::now(),
            });
            if let Some(product) = inner.products.iter_mut().find(|p| p.id == line.product_id) {
                product.stock_quantity -= line.quantity;
            }
        }

        inner.cart_items.retain(|i| i.cart_id != cart_id);
        if let Some(cart) = inner.carts.iter_mut().find(|c| c.id == cart_id) {
            cart.status = "checked_out".into();
        }

        Ok((order, lines.len() as u32))
    }

    async fn list_orders(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_order(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<(Order, Vec<(OrderItem, String)>), StoreError> {
        let inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .iter()
            .find(|o| o.id == order_id && o.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound("Order"))?;
        let items = inner
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| (i.clone(), inner.product_name(i.product_id)))
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
        let mut inner = self.inner.lock().unwrap();
        let mut priced = Vec::with_capacity(lines.len());
        for &(product_id, quantity) in lines {
            let price = inner
                .products
                .iter()
                .find(|p| p.id == product_id)
                .map(|p| p.price)
                .ok_or(StoreError::NotFound("Product"))?;
            priced.push((product_id, quantity, price));
        }

        let total_amount = priced
            .iter()
            .map(|&(_, q, price)| price * rust_decimal::Decimal::from(q))
            .sum();
        let order_id = inner.next_id();
        let order = Order {
            id: order_id,
            user_id,
            total_amount,
            status: status.to_string(),
            shipping_address: shipping_address.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        inner.orders.push(order.clone());
        for (product_id, quantity, price) in priced {
            let id = inner.next_id();
            inner.order_items.push(OrderItem {
                id,
                order_id,
                product_id,
                quantity,
                price_at_time: price,
                created_at: Utc::now(),
            });
        }
        Ok(order)
    }
}
