//! Domain types shared by the APIs, the store layer, and the simulator.
//!
//! Row structs mirror the relational schema (`users`, `categories`,
//! `products`, `carts`, `cart_items`, `orders`, `order_items`). View
//! structs are the JSON shapes the APIs return; prices are `Decimal`
//! end to end and serialize as plain numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category_id: i32,
    pub stock_quantity: i32,
    pub sku: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: i32,
    pub user_id: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_at_time: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub total_amount: Decimal,
    pub status: String,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_at_time: Decimal,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category_id: i32,
    #[serde(default)]
    pub stock_quantity: i32,
    pub sku: String,
}

/// Partial product update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCart {
    pub product_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: String,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemView {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_at_time: Decimal,
    pub product_name: String,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub id: i32,
    pub user_id: i32,
    pub status: String,
    pub items: Vec<CartItemView>,
    pub total_amount: Decimal,
    pub total_items: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemView {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_at_time: Decimal,
    pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailView {
    pub id: i32,
    pub user_id: i32,
    pub total_amount: Decimal,
    pub status: String,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl CartView {
    /// Assemble a cart view from raw rows, computing per-line and
    /// whole-cart totals.
    pub fn assemble(cart: &Cart, items: &[(CartItem, String)]) -> Self {
        let mut views = Vec::with_capacity(items.len());
        let mut total_amount = Decimal::ZERO;
        let mut total_items = 0;

        for (item, product_name) in items {
            let line_total = item.price_at_time * Decimal::from(item.quantity);
            total_amount += line_total;
            total_items += item.quantity;
            views.push(CartItemView {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_time: item.price_at_time,
                product_name: product_name.clone(),
                total_price: line_total,
            });
        }

        Self {
            id: cart.id,
            user_id: cart.user_id,
            status: cart.status.clone(),
            items: views,
            total_amount,
            total_items,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cart() -> Cart {
        Cart {
            id: 1,
            user_id: 3,
            status: "active".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(id: i32, product_id: i32, quantity: i32, price: Decimal) -> CartItem {
        CartItem {
            id,
            cart_id: 1,
            product_id,
            quantity,
            price_at_time: price,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn cart_view_totals() {
        let items = vec![
            (item(1, 10, 2, dec!(9.99)), "Widget".to_string()),
            (item(2, 11, 1, dec!(100.00)), "Gadget".to_string()),
        ];
        let view = CartView::assemble(&cart(), &items);

        assert_eq!(view.total_items, 3);
        assert_eq!(view.total_amount, dec!(119.98));
        assert_eq!(view.items[0].total_price, dec!(19.98));
        assert_eq!(view.items[1].product_name, "Gadget");
    }

    #[test]
    fn cart_view_empty() {
        let view = CartView::assemble(&cart(), &[]);
        assert_eq!(view.total_items, 0);
        assert_eq!(view.total_amount, Decimal::ZERO);
        assert!(view.items.is_empty());
    }

    #[test]
    fn add_to_cart_default_quantity() {
        let parsed: AddToCart = serde_json::from_str(r#"{"product_id": 4}"#).unwrap();
        assert_eq!(parsed.quantity, 1);
    }

    #[test]
    fn product_patch_absent_fields() {
        let parsed: ProductPatch = serde_json::from_str(r#"{"price": 12.5}"#).unwrap();
        assert!(parsed.name.is_none());
        assert_eq!(parsed.price, Some(dec!(12.5)));
    }
}
