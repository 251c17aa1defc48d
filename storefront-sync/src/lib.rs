//! Catalog sync: wholesale replacement of the product store from the
//! third-party product feed.
//!
//! A sync fetches the whole feed, and only when that succeeds replaces the
//! store contents in one step. A failed fetch leaves the catalog as it was.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use storefront_core::config::SyncConfig;
use storefront_core::{Product, ProductStore, StorefrontError};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned HTTP {status}: {body}")]
    Feed { status: u16, body: String },

    #[error("Feed payload is not a product list: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StorefrontError),
}

/// Outcome of one successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub count: usize,
    pub version: i64,
}

/// HTTP client for the product feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(
            config.feed_url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the feed and decode it as a JSON array of products.
    pub async fn fetch_products(&self) -> Result<Vec<Product>, SyncError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), url = %self.url, "Product feed error");
            return Err(SyncError::Feed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Fetch the feed and replace the catalog with it.
pub async fn sync_catalog(
    feed: &FeedClient,
    store: &dyn ProductStore,
) -> Result<SyncReport, SyncError> {
    let products = feed.fetch_products().await?;
    let version = store.replace_all(&products).await?;

    tracing::info!(
        count = products.len(),
        version,
        store = store.name(),
        "Synced products from feed"
    );

    Ok(SyncReport {
        count: products.len(),
        version,
    })
}

/// Periodic sync. Returns immediately when `interval_minutes` is 0; otherwise
/// runs until the shutdown signal fires. The first run happens one interval
/// after start, since startup sync is handled separately.
pub async fn run_sync_loop(
    feed: Arc<FeedClient>,
    store: Arc<dyn ProductStore>,
    interval_minutes: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    if interval_minutes == 0 {
        tracing::info!("Periodic catalog sync disabled via config");
        return;
    }

    let period = Duration::from_secs(interval_minutes * 60);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(interval_min = interval_minutes, feed = feed.url(), "Catalog sync loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync_catalog(&feed, store.as_ref()).await {
                    tracing::warn!(error = %e, "Scheduled catalog sync failed: keeping current catalog");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Catalog sync loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
