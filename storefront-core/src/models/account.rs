use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::Product;

/// Registered customer. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            created_at: Utc::now(),
        }
    }
}

/// Emails are matched trimmed and case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CartEntry {
    pub id: Uuid,
    pub product_id: i64,
    pub quantity: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i64,
    pub item_total: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: f64,
}

impl CartView {
    /// Price cart entries at current catalog prices. Entries whose product
    /// left the catalog are skipped.
    pub fn price(entries: Vec<CartEntry>, products: &HashMap<i64, Product>) -> Self {
        let items: Vec<CartLine> = entries
            .into_iter()
            .filter_map(|entry| {
                let product = products.get(&entry.product_id)?.clone();
                Some(CartLine {
                    id: entry.id,
                    item_total: product.price * entry.quantity as f64,
                    quantity: entry.quantity,
                    product,
                })
            })
            .collect();
        let subtotal = items.iter().map(|line| line.item_total).sum();
        Self { items, subtotal }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WishlistEntry {
    pub id: Uuid,
    pub product_id: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistLine {
    pub id: Uuid,
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WishlistView {
    pub items: Vec<WishlistLine>,
}

impl WishlistView {
    pub fn resolve(entries: Vec<WishlistEntry>, products: &HashMap<i64, Product>) -> Self {
        let items = entries
            .into_iter()
            .filter_map(|entry| {
                Some(WishlistLine {
                    id: entry.id,
                    product: products.get(&entry.product_id)?.clone(),
                    added_at: entry.added_at,
                })
            })
            .collect();
        Self { items }
    }
}

/// Order line frozen at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub title: String,
    pub price: f64,
    pub quantity: i64,
    pub item_total: f64,
}

pub const ORDER_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: String,
    pub shipping_address: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_cart(user_id: Uuid, cart: &CartView, shipping_address: serde_json::Value) -> Self {
        let items = cart
            .items
            .iter()
            .map(|line| OrderItem {
                product_id: line.product.id,
                title: line.product.title.clone(),
                price: line.product.price,
                quantity: line.quantity,
                item_total: line.item_total,
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            user_id,
            items,
            total_amount: cart.subtotal,
            status: ORDER_STATUS_COMPLETED.to_string(),
            shipping_address,
            created_at: Utc::now(),
        }
    }
}

/// Message left through the contact form.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn new(name: &str, email: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            message: message.trim().to_string(),
            received_at: Utc::now(),
        }
    }
}
