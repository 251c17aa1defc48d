//! Storefront HTTP REST API
//!
//! Axum-based HTTP server exposing catalog browse, the shopping-assistant
//! search, customer accounts with cart, wishlist and orders, the contact form
//! and the admin sync trigger.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints (all under `/api`):
//! - GET  /                      service banner
//! - GET  /health                DB, model and catalog status
//! - GET  /products              filtered, sorted, paged catalog listing
//! - GET  /products/:id          single product
//! - POST /ai/query              semantic product search with reply text
//! - POST /auth/register         create an account, returns a bearer token
//! - POST /auth/login            exchange credentials for a bearer token
//! - GET  /auth/me               current user (bearer)
//! - GET  /cart                  priced cart (bearer)
//! - POST /cart                  add a product, merging quantities (bearer)
//! - PUT  /cart                  set a line's quantity (bearer)
//! - DELETE /cart/:product_id    drop a line (bearer)
//! - GET  /wishlist              wishlist products (bearer)
//! - POST /wishlist              add a product (bearer)
//! - DELETE /wishlist/:product_id
//! - POST /orders/checkout       turn the cart into an order (bearer)
//! - GET  /orders                order history, newest first (bearer)
//! - POST /contact               store a contact form message
//! - POST /admin/sync-products   replace the catalog from the product feed

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use storefront_core::similarity::check_limit;
use storefront_core::{
    AccountStore, AuthError, ProductQuery, ProductStore, StorefrontConfig, TokenIssuer, User,
};
use storefront_sync::{sync_catalog, FeedClient, SyncError};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::search::SearchService;
use crate::subsystems::shop::{self, ContactRequest, LoginRequest, RegisterRequest, ShopError};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub config: StorefrontConfig,
    pub store: Arc<dyn ProductStore>,
    pub search: Arc<SearchService>,
    pub feed: Arc<FeedClient>,
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<TokenIssuer>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api", get(root_handler))
        .route("/api/", get(root_handler))
        .route("/api/health", get(health_handler))
        .route("/api/products", get(list_products_handler))
        .route("/api/products/:id", get(get_product_handler))
        .route("/api/ai/query", post(ai_query_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(me_handler))
        .route(
            "/api/cart",
            get(cart_handler).post(add_to_cart_handler).put(update_cart_handler),
        )
        .route("/api/cart/:product_id", delete(remove_from_cart_handler))
        .route("/api/wishlist", get(wishlist_handler).post(add_to_wishlist_handler))
        .route("/api/wishlist/:product_id", delete(remove_from_wishlist_handler))
        .route("/api/orders", get(orders_handler))
        .route("/api/orders/checkout", post(checkout_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/admin/sync-products", post(sync_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Storefront HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct AiQueryRequest {
    pub query: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub product_id: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: serde_json::Value,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn into_body(self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error,
            "status": self.status,
        })
    }
}

fn error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (status, ErrorResponse::new(msg).into_body())
}

fn shop_error(e: ShopError) -> (StatusCode, serde_json::Value) {
    let status = match &e {
        ShopError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ShopError::NotFound(_) => StatusCode::NOT_FOUND,
        ShopError::Conflict(_) => StatusCode::CONFLICT,
        ShopError::Auth(AuthError::InvalidCredentials | AuthError::InvalidToken(_)) => {
            StatusCode::UNAUTHORIZED
        }
        ShopError::Auth(_) | ShopError::Store(_) | ShopError::Task(_) => {
            tracing::error!(error = %e, "Shop request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error(status, e.to_string())
}

fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, ShopError>,
) -> (StatusCode, serde_json::Value) {
    match result {
        Ok(body) => (status, serde_json::json!(body)),
        Err(e) => shop_error(e),
    }
}

fn message(text: &str) -> serde_json::Value {
    serde_json::json!({ "message": text })
}

// ============================================================================
// Bearer authentication
// ============================================================================

/// Customer resolved from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Resolve the header value to a user, or the 401 body to send back.
pub async fn authenticate_inner(
    state: &HttpState,
    authorization: Option<&str>,
) -> Result<User, (StatusCode, serde_json::Value)> {
    let token = authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Not authenticated"))?;

    shop::authenticate(state.accounts.as_ref(), &state.tokens, token)
        .await
        .map_err(|e| match e {
            ShopError::Auth(_) => error(StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            other => shop_error(other),
        })
}

#[axum::async_trait]
impl FromRequestParts<Arc<HttpState>> for AuthUser {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HttpState>,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        authenticate_inner(state, authorization)
            .await
            .map(AuthUser)
            .map_err(|(status, body)| (status, Json(body)))
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner root: service banner (pure, no IO).
pub fn root_inner() -> serde_json::Value {
    serde_json::json!({
        "message": "Storefront API",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// Inner health check: store, model and catalog status.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let database = match state.store.health().await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    let catalog_version = match state.store.catalog_version().await {
        Ok(v) => serde_json::json!(v),
        Err(e) => serde_json::json!(format!("unavailable: {}", e)),
    };

    let provider = state.search.provider();

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "store": state.store.name(),
            "embedding": {
                "available": provider.is_available(),
                "backend": provider.model_name(),
                "dimensions": provider.dimensions(),
            },
            "catalog_version": catalog_version,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// Inner product listing.
pub async fn list_products_inner(
    store: &dyn ProductStore,
    query: ProductQuery,
) -> (StatusCode, serde_json::Value) {
    match store.list_products(&query).await {
        Ok(page) => (StatusCode::OK, serde_json::json!(page)),
        Err(e) => {
            tracing::error!(error = %e, "Product listing failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Inner product lookup: 404 when the id is not in the catalog.
pub async fn get_product_inner(store: &dyn ProductStore, id: i64) -> (StatusCode, serde_json::Value) {
    match store.get_product(id).await {
        Ok(Some(product)) => (StatusCode::OK, serde_json::json!(product)),
        Ok(None) => error(StatusCode::NOT_FOUND, "Product not found"),
        Err(e) => {
            tracing::error!(error = %e, id, "Product lookup failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Inner assistant query: validates input, then runs the search boundary.
/// Search failures still answer 200 with the apology reply.
pub async fn ai_query_inner(state: &HttpState, req: AiQueryRequest) -> (StatusCode, serde_json::Value) {
    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return error(StatusCode::BAD_REQUEST, "query field is required"),
    };

    if let Some(limit) = req.limit {
        if let Err(e) = check_limit(limit) {
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
    }

    let outcome = state
        .search
        .answer_query(state.store.as_ref(), &query, req.limit)
        .await;

    (StatusCode::OK, serde_json::json!(outcome))
}

pub async fn register_inner(state: &HttpState, req: RegisterRequest) -> (StatusCode, serde_json::Value) {
    respond(
        StatusCode::CREATED,
        shop::register(state.accounts.as_ref(), &state.tokens, req).await,
    )
}

pub async fn login_inner(state: &HttpState, req: LoginRequest) -> (StatusCode, serde_json::Value) {
    respond(
        StatusCode::OK,
        shop::login(state.accounts.as_ref(), &state.tokens, req).await,
    )
}

pub async fn cart_inner(state: &HttpState, user: &User) -> (StatusCode, serde_json::Value) {
    respond(
        StatusCode::OK,
        shop::cart(state.accounts.as_ref(), state.store.as_ref(), user.id).await,
    )
}

pub async fn add_to_cart_inner(
    state: &HttpState,
    user: &User,
    req: CartItemRequest,
) -> (StatusCode, serde_json::Value) {
    let result = shop::add_to_cart(
        state.accounts.as_ref(),
        state.store.as_ref(),
        user.id,
        req.product_id,
        req.quantity,
    )
    .await;
    respond(StatusCode::OK, result.map(|()| message("Item added to cart")))
}

pub async fn update_cart_inner(
    state: &HttpState,
    user: &User,
    req: CartItemRequest,
) -> (StatusCode, serde_json::Value) {
    let result =
        shop::update_cart(state.accounts.as_ref(), user.id, req.product_id, req.quantity).await;
    respond(StatusCode::OK, result.map(|()| message("Cart updated")))
}

pub async fn remove_from_cart_inner(
    state: &HttpState,
    user: &User,
    product_id: i64,
) -> (StatusCode, serde_json::Value) {
    let result = shop::remove_from_cart(state.accounts.as_ref(), user.id, product_id).await;
    respond(StatusCode::OK, result.map(|()| message("Item removed from cart")))
}

pub async fn wishlist_inner(state: &HttpState, user: &User) -> (StatusCode, serde_json::Value) {
    respond(
        StatusCode::OK,
        shop::wishlist(state.accounts.as_ref(), state.store.as_ref(), user.id).await,
    )
}

/// 201 when the product was added, 200 when it was already listed.
pub async fn add_to_wishlist_inner(
    state: &HttpState,
    user: &User,
    req: WishlistRequest,
) -> (StatusCode, serde_json::Value) {
    match shop::add_to_wishlist(
        state.accounts.as_ref(),
        state.store.as_ref(),
        user.id,
        req.product_id,
    )
    .await
    {
        Ok(true) => (StatusCode::CREATED, message("Added to wishlist")),
        Ok(false) => (StatusCode::OK, message("Already in wishlist")),
        Err(e) => shop_error(e),
    }
}

pub async fn remove_from_wishlist_inner(
    state: &HttpState,
    user: &User,
    product_id: i64,
) -> (StatusCode, serde_json::Value) {
    let result = shop::remove_from_wishlist(state.accounts.as_ref(), user.id, product_id).await;
    respond(StatusCode::OK, result.map(|()| message("Removed from wishlist")))
}

pub async fn checkout_inner(
    state: &HttpState,
    user: &User,
    req: CheckoutRequest,
) -> (StatusCode, serde_json::Value) {
    let result = shop::checkout(
        state.accounts.as_ref(),
        state.store.as_ref(),
        user.id,
        req.shipping_address,
    )
    .await;
    if let Ok(order) = &result {
        tracing::info!(order_id = %order.id, user_id = %user.id, total = order.total_amount, "Order placed");
    }
    respond(StatusCode::CREATED, result)
}

pub async fn orders_inner(state: &HttpState, user: &User) -> (StatusCode, serde_json::Value) {
    respond(StatusCode::OK, shop::orders(state.accounts.as_ref(), user.id).await)
}

pub async fn contact_inner(state: &HttpState, req: ContactRequest) -> (StatusCode, serde_json::Value) {
    let result = shop::submit_contact(state.accounts.as_ref(), req).await;
    respond(
        StatusCode::OK,
        result.map(|m| serde_json::json!({ "message": "Message received", "id": m.id })),
    )
}

/// Inner sync: replace the catalog from the feed.
pub async fn sync_inner(feed: &FeedClient, store: &dyn ProductStore) -> (StatusCode, serde_json::Value) {
    match sync_catalog(feed, store).await {
        Ok(report) => (
            StatusCode::OK,
            serde_json::json!({
                "message": format!("Successfully synced {} products", report.count),
                "count": report.count,
                "version": report.version,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Catalog sync failed");
            let status = match e {
                SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            error(status, format!("Sync failed: {}", e))
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn list_products_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ProductQuery>,
) -> impl IntoResponse {
    let (status, body) = list_products_inner(state.store.as_ref(), query).await;
    (status, Json(body))
}

pub async fn get_product_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = get_product_inner(state.store.as_ref(), id).await;
    (status, Json(body))
}

pub async fn ai_query_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<AiQueryRequest>,
) -> impl IntoResponse {
    let (status, body) = ai_query_inner(&state, req).await;
    (status, Json(body))
}

pub async fn register_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let (status, body) = register_inner(&state, req).await;
    (status, Json(body))
}

pub async fn login_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let (status, body) = login_inner(&state, req).await;
    (status, Json(body))
}

pub async fn me_handler(AuthUser(user): AuthUser) -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!(user)))
}

pub async fn cart_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
) -> impl IntoResponse {
    let (status, body) = cart_inner(&state, &user).await;
    (status, Json(body))
}

pub async fn add_to_cart_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CartItemRequest>,
) -> impl IntoResponse {
    let (status, body) = add_to_cart_inner(&state, &user, req).await;
    (status, Json(body))
}

pub async fn update_cart_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CartItemRequest>,
) -> impl IntoResponse {
    let (status, body) = update_cart_inner(&state, &user, req).await;
    (status, Json(body))
}

pub async fn remove_from_cart_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = remove_from_cart_inner(&state, &user, product_id).await;
    (status, Json(body))
}

pub async fn wishlist_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
) -> impl IntoResponse {
    let (status, body) = wishlist_inner(&state, &user).await;
    (status, Json(body))
}

pub async fn add_to_wishlist_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<WishlistRequest>,
) -> impl IntoResponse {
    let (status, body) = add_to_wishlist_inner(&state, &user, req).await;
    (status, Json(body))
}

pub async fn remove_from_wishlist_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = remove_from_wishlist_inner(&state, &user, product_id).await;
    (status, Json(body))
}

pub async fn checkout_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> impl IntoResponse {
    let (status, body) = checkout_inner(&state, &user, req).await;
    (status, Json(body))
}

pub async fn orders_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(user): AuthUser,
) -> impl IntoResponse {
    let (status, body) = orders_inner(&state, &user).await;
    (status, Json(body))
}

pub async fn contact_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ContactRequest>,
) -> impl IntoResponse {
    let (status, body) = contact_inner(&state, req).await;
    (status, Json(body))
}

pub async fn sync_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = sync_inner(&state.feed, state.store.as_ref()).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests, calling inner functions directly
// ============================================================================
