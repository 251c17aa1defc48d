//! Shop subsystem: registration, login, cart, wishlist, checkout and the
//! contact form.
//!
//! Cart and wishlist lines are priced against the live catalog on every read;
//! checkout freezes the priced lines into an order and empties the cart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use storefront_core::auth::{hash_password, verify_password};
use storefront_core::{
    AccountStore, AuthError, CartView, ContactMessage, Order, Product, ProductStore,
    StorefrontError, TokenIssuer, User, WishlistView,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(StorefrontError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<StorefrontError> for ShopError {
    fn from(e: StorefrontError) -> Self {
        match e {
            StorefrontError::Conflict(msg) => ShopError::Conflict(msg),
            other => ShopError::Store(other),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

/// Body returned by register and login.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub token_type: &'static str,
}

fn session(tokens: &TokenIssuer, user: User) -> Result<Session, ShopError> {
    Ok(Session {
        access_token: tokens.issue(user.id)?,
        token_type: "bearer",
        user,
    })
}

fn require(field: &str, value: &str) -> Result<(), ShopError> {
    if value.trim().is_empty() {
        return Err(ShopError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), ShopError> {
    require("email", email)?;
    if !email.contains('@') {
        return Err(ShopError::InvalidInput("email is not valid".to_string()));
    }
    Ok(())
}

fn require_quantity(quantity: i64) -> Result<(), ShopError> {
    if quantity < 1 {
        return Err(ShopError::InvalidInput(format!(
            "quantity must be at least 1, got {quantity}"
        )));
    }
    Ok(())
}

// ============================================================================
// Accounts
// ============================================================================

pub async fn register(
    accounts: &dyn AccountStore,
    tokens: &TokenIssuer,
    req: RegisterRequest,
) -> Result<Session, ShopError> {
    require("name", &req.name)?;
    require_email(&req.email)?;
    require("password", &req.password)?;

    // Argon2 is CPU-bound
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ShopError::Task(e.to_string()))??;

    let user = User::new(&req.name, &req.email, hash);
    accounts.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    session(tokens, user)
}

pub async fn login(
    accounts: &dyn AccountStore,
    tokens: &TokenIssuer,
    req: LoginRequest,
) -> Result<Session, ShopError> {
    let user = accounts
        .find_user_by_email(&req.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let (password, hash) = (req.password, user.password_hash.clone());
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ShopError::Task(e.to_string()))?;
    if !valid {
        return Err(AuthError::InvalidCredentials.into());
    }

    session(tokens, user)
}

/// User behind a bearer token.
pub async fn authenticate(
    accounts: &dyn AccountStore,
    tokens: &TokenIssuer,
    token: &str,
) -> Result<User, ShopError> {
    let user_id = tokens.verify(token)?;
    accounts
        .get_user(user_id)
        .await?
        .ok_or_else(|| AuthError::InvalidToken("user not found".to_string()).into())
}

// ============================================================================
// Cart and wishlist
// ============================================================================

async fn products_by_id(
    store: &dyn ProductStore,
    ids: impl IntoIterator<Item = i64>,
) -> Result<HashMap<i64, Product>, StorefrontError> {
    let mut products = HashMap::new();
    for id in ids {
        if products.contains_key(&id) {
            continue;
        }
        if let Some(p) = store.get_product(id).await? {
            products.insert(id, p);
        }
    }
    Ok(products)
}

async fn require_product(store: &dyn ProductStore, product_id: i64) -> Result<(), ShopError> {
    match store.get_product(product_id).await? {
        Some(_) => Ok(()),
        None => Err(ShopError::NotFound("Product not found")),
    }
}

pub async fn cart(
    accounts: &dyn AccountStore,
    store: &dyn ProductStore,
    user_id: Uuid,
) -> Result<CartView, ShopError> {
    let entries = accounts.cart(user_id).await?;
    let products = products_by_id(store, entries.iter().map(|e| e.product_id).collect::<Vec<_>>()).await?;
    Ok(CartView::price(entries, &products))
}

pub async fn add_to_cart(
    accounts: &dyn AccountStore,
    store: &dyn ProductStore,
    user_id: Uuid,
    product_id: i64,
    quantity: i64,
) -> Result<(), ShopError> {
    require_quantity(quantity)?;
    require_product(store, product_id).await?;
    accounts.add_to_cart(user_id, product_id, quantity).await?;
    Ok(())
}

pub async fn update_cart(
    accounts: &dyn AccountStore,
    user_id: Uuid,
    product_id: i64,
    quantity: i64,
) -> Result<(), ShopError> {
    require_quantity(quantity)?;
    if !accounts.set_cart_quantity(user_id, product_id, quantity).await? {
        return Err(ShopError::NotFound("Cart item not found"));
    }
    Ok(())
}

pub async fn remove_from_cart(
    accounts: &dyn AccountStore,
    user_id: Uuid,
    product_id: i64,
) -> Result<(), ShopError> {
    if !accounts.remove_from_cart(user_id, product_id).await? {
        return Err(ShopError::NotFound("Cart item not found"));
    }
    Ok(())
}

pub async fn wishlist(
    accounts: &dyn AccountStore,
    store: &dyn ProductStore,
    user_id: Uuid,
) -> Result<WishlistView, ShopError> {
    let entries = accounts.wishlist(user_id).await?;
    let products = products_by_id(store, entries.iter().map(|e| e.product_id).collect::<Vec<_>>()).await?;
    Ok(WishlistView::resolve(entries, &products))
}

/// True when the product was added, false when it was already there.
pub async fn add_to_wishlist(
    accounts: &dyn AccountStore,
    store: &dyn ProductStore,
    user_id: Uuid,
    product_id: i64,
) -> Result<bool, ShopError> {
    require_product(store, product_id).await?;
    Ok(accounts.add_to_wishlist(user_id, product_id).await?)
}

pub async fn remove_from_wishlist(
    accounts: &dyn AccountStore,
    user_id: Uuid,
    product_id: i64,
) -> Result<(), ShopError> {
    if !accounts.remove_from_wishlist(user_id, product_id).await? {
        return Err(ShopError::NotFound("Wishlist item not found"));
    }
    Ok(())
}

// ============================================================================
// Orders and contact
// ============================================================================

/// Price the cart at current catalog prices, store the order and empty the
/// cart. The shipping address must be a JSON object.
pub async fn checkout(
    accounts: &dyn AccountStore,
    store: &dyn ProductStore,
    user_id: Uuid,
    shipping_address: serde_json::Value,
) -> Result<Order, ShopError> {
    if !shipping_address.is_object() {
        return Err(ShopError::InvalidInput(
            "shipping_address must be an object".to_string(),
        ));
    }

    let entries = accounts.cart(user_id).await?;
    if entries.is_empty() {
        return Err(ShopError::InvalidInput("Cart is empty".to_string()));
    }

    let products = products_by_id(store, entries.iter().map(|e| e.product_id).collect::<Vec<_>>()).await?;
    let priced = CartView::price(entries, &products);
    if priced.is_empty() {
        return Err(ShopError::InvalidInput(
            "None of the cart items are still available".to_string(),
        ));
    }

    let order = Order::from_cart(user_id, &priced, shipping_address);
    accounts.place_order(&order).await?;
    Ok(order)
}

pub async fn orders(accounts: &dyn AccountStore, user_id: Uuid) -> Result<Vec<Order>, ShopError> {
    Ok(accounts.orders(user_id).await?)
}

pub async fn submit_contact(
    accounts: &dyn AccountStore,
    req: ContactRequest,
) -> Result<ContactMessage, ShopError> {
    require("name", &req.name)?;
    require_email(&req.email)?;
    require("message", &req.message)?;

    let message = ContactMessage::new(&req.name, &req.email, &req.message);
    accounts.save_contact_message(&message).await?;
    tracing::info!(message_id = %message.id, from = %message.email, "Contact message received");
    Ok(message)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::testing::catalog;
    use storefront_core::{MemoryAccountStore, MemoryProductStore};

    struct Shop {
        accounts: MemoryAccountStore,
        store: MemoryProductStore,
        tokens: TokenIssuer,
    }

    fn shop() -> Shop {
        Shop {
            accounts: MemoryAccountStore::new(),
            store: MemoryProductStore::with_products(catalog()),
            tokens: TokenIssuer::new("test-secret", 1),
        }
    }

    fn registration(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ana".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
        }
    }

    async fn registered(shop: &Shop) -> User {
        register(&shop.accounts, &shop.tokens, registration("ana@example.com"))
            .await
            .unwrap()
            .user
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let shop = shop();
        let created = register(&shop.accounts, &shop.tokens, registration("ana@example.com"))
            .await
            .unwrap();
        assert_eq!(created.token_type, "bearer");
        assert_eq!(
            shop.tokens.verify(&created.access_token).unwrap(),
            created.user.id
        );

        let again = login(
            &shop.accounts,
            &shop.tokens,
            LoginRequest {
                email: "ANA@example.com".to_string(),
                password: "correct horse".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(again.user.id, created.user.id);

        let user = authenticate(&shop.accounts, &shop.tokens, &again.access_token)
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_blank_fields() {
        let shop = shop();
        registered(&shop).await;

        assert!(matches!(
            register(&shop.accounts, &shop.tokens, registration("ana@example.com")).await,
            Err(ShopError::Conflict(_))
        ));

        let mut blank = registration("bo@example.com");
        blank.password = "  ".to_string();
        assert!(matches!(
            register(&shop.accounts, &shop.tokens, blank).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert!(matches!(
            register(&shop.accounts, &shop.tokens, registration("not-an-email")).await,
            Err(ShopError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_invalid_credentials() {
        let shop = shop();
        registered(&shop).await;

        for (email, password) in [("ana@example.com", "wrong"), ("nobody@example.com", "x")] {
            let req = LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            };
            assert!(matches!(
                login(&shop.accounts, &shop.tokens, req).await,
                Err(ShopError::Auth(AuthError::InvalidCredentials))
            ));
        }
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_is_rejected() {
        let shop = shop();
        let token = shop.tokens.issue(Uuid::new_v4()).unwrap();
        assert!(matches!(
            authenticate(&shop.accounts, &shop.tokens, &token).await,
            Err(ShopError::Auth(AuthError::InvalidToken(_)))
        ));
    }

    #[tokio::test]
    async fn test_cart_lifecycle() {
        let shop = shop();
        let uid = registered(&shop).await.id;

        add_to_cart(&shop.accounts, &shop.store, uid, 1, 2).await.unwrap();
        add_to_cart(&shop.accounts, &shop.store, uid, 2, 1).await.unwrap();
        let view = cart(&shop.accounts, &shop.store, uid).await.unwrap();
        assert_eq!(view.items.len(), 2);
        assert!((view.subtotal - (22.3 * 2.0 + 49.9)).abs() < 1e-9);

        update_cart(&shop.accounts, uid, 1, 1).await.unwrap();
        remove_from_cart(&shop.accounts, uid, 2).await.unwrap();
        let view = cart(&shop.accounts, &shop.store, uid).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 1);

        assert!(matches!(
            remove_from_cart(&shop.accounts, uid, 2).await,
            Err(ShopError::NotFound("Cart item not found"))
        ));
        assert!(matches!(
            update_cart(&shop.accounts, uid, 3, 1).await,
            Err(ShopError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cart_rejects_unknown_product_and_bad_quantity() {
        let shop = shop();
        let uid = registered(&shop).await.id;

        assert!(matches!(
            add_to_cart(&shop.accounts, &shop.store, uid, 999, 1).await,
            Err(ShopError::NotFound("Product not found"))
        ));
        assert!(matches!(
            add_to_cart(&shop.accounts, &shop.store, uid, 1, 0).await,
            Err(ShopError::InvalidInput(_))
        ));
        add_to_cart(&shop.accounts, &shop.store, uid, 1, 1).await.unwrap();
        assert!(matches!(
            update_cart(&shop.accounts, uid, 1, -2).await,
            Err(ShopError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_wishlist_lifecycle() {
        let shop = shop();
        let uid = registered(&shop).await.id;

        assert!(add_to_wishlist(&shop.accounts, &shop.store, uid, 3).await.unwrap());
        assert!(!add_to_wishlist(&shop.accounts, &shop.store, uid, 3).await.unwrap());
        let view = wishlist(&shop.accounts, &shop.store, uid).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].product.title, "Gold Ring");

        remove_from_wishlist(&shop.accounts, uid, 3).await.unwrap();
        assert!(matches!(
            remove_from_wishlist(&shop.accounts, uid, 3).await,
            Err(ShopError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_checkout_prices_cart_and_empties_it() {
        let shop = shop();
        let uid = registered(&shop).await.id;
        add_to_cart(&shop.accounts, &shop.store, uid, 3, 2).await.unwrap();

        let address = serde_json::json!({ "street": "1 Rua Augusta", "city": "Lisbon" });
        let order = checkout(&shop.accounts, &shop.store, uid, address).await.unwrap();

        assert_eq!(order.total_amount, 336.0);
        assert_eq!(order.items[0].title, "Gold Ring");
        assert_eq!(order.items[0].quantity, 2);
        assert!(cart(&shop.accounts, &shop.store, uid).await.unwrap().is_empty());
        assert_eq!(orders(&shop.accounts, uid).await.unwrap()[0].id, order.id);
    }

    #[tokio::test]
    async fn test_checkout_uses_price_at_checkout_time() {
        let shop = shop();
        let uid = registered(&shop).await.id;
        add_to_cart(&shop.accounts, &shop.store, uid, 1, 1).await.unwrap();

        let mut repriced = catalog();
        repriced[0].price = 30.0;
        shop.store.replace_all(&repriced).await.unwrap();

        let order = checkout(&shop.accounts, &shop.store, uid, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(order.total_amount, 30.0);
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart_and_bad_address() {
        let shop = shop();
        let uid = registered(&shop).await.id;

        assert!(matches!(
            checkout(&shop.accounts, &shop.store, uid, serde_json::json!({})).await,
            Err(ShopError::InvalidInput(msg)) if msg == "Cart is empty"
        ));

        add_to_cart(&shop.accounts, &shop.store, uid, 1, 1).await.unwrap();
        assert!(matches!(
            checkout(&shop.accounts, &shop.store, uid, serde_json::json!("somewhere")).await,
            Err(ShopError::InvalidInput(_))
        ));

        // every product in the cart left the catalog
        shop.store.replace_all(&[]).await.unwrap();
        assert!(matches!(
            checkout(&shop.accounts, &shop.store, uid, serde_json::json!({})).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert!(orders(&shop.accounts, uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contact_message_is_stored() {
        let shop = shop();
        let req = ContactRequest {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            message: "Do you ship to Madeira?".to_string(),
        };
        submit_contact(&shop.accounts, req).await.unwrap();
        assert_eq!(shop.accounts.contact_messages().await.len(), 1);

        let blank = ContactRequest {
            message: " ".to_string(),
            ..ContactRequest::default()
        };
        assert!(matches!(
            submit_contact(&shop.accounts, blank).await,
            Err(ShopError::InvalidInput(_))
        ));
    }
}
