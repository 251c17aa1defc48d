//! Search subsystem: semantic product search for the assistant endpoint
//!
//! Flow for one query:
//! - embed the query with the shared `EmbeddingProvider`
//! - fetch the corpus vectors from the cache (embedding the catalog on a miss)
//! - rank by cosine similarity, drop weak hits, cut to `limit`
//! - compose the reply text
//!
//! `answer_query` is the boundary: any failure, including a timeout, becomes
//! the apology outcome and is logged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use storefront_core::config::SearchConfig;
use storefront_core::similarity::{check_limit, rank};
use storefront_core::{EmbeddingProvider, ProductStore, RankedResult, SearchError, SearchOutcome};

use super::catalog::CorpusCache;
use super::compose::{apology, compose, TemplateGenerator, TextGenerator};

pub struct SearchService {
    provider: Arc<EmbeddingProvider>,
    cache: CorpusCache,
    generator: Arc<dyn TextGenerator>,
    default_limit: i64,
    /// `None` runs searches without a deadline.
    timeout: Option<Duration>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("provider", &self.provider)
            .field("generator", &self.generator.name())
            .field("default_limit", &self.default_limit)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SearchService {
    pub fn new(provider: Arc<EmbeddingProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            cache: CorpusCache::new(config.cache_corpus),
            generator: Arc::new(TemplateGenerator),
            default_limit: i64::from(config.default_limit),
            timeout: (config.request_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.request_timeout_seconds)),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    /// Ranked hits for `query`. `None` uses the configured default limit.
    pub async fn search(
        &self,
        store: &dyn ProductStore,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Vec<RankedResult>, SearchError> {
        let query_vector = self.provider.embed_query(query).await?;
        let limit = limit.unwrap_or(self.default_limit);
        check_limit(limit)?;

        let corpus = self.cache.corpus(store, &self.provider).await?;
        if corpus.is_empty() {
            tracing::debug!("Catalog is empty; no results");
            return Ok(Vec::new());
        }

        rank(&query_vector, &corpus.vectors, &corpus.products, limit)
    }

    /// Search and compose a reply. Never fails.
    pub async fn answer_query(
        &self,
        store: &dyn ProductStore,
        query: &str,
        limit: Option<i64>,
    ) -> SearchOutcome {
        let start = Instant::now();

        let result = match self.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.search(store, query, limit))
                .await
                .unwrap_or_else(|_| Err(SearchError::Timeout(deadline.as_secs()))),
            None => self.search(store, query, limit).await,
        };

        match result {
            Ok(results) => {
                tracing::info!(
                    results = results.len(),
                    took_ms = start.elapsed().as_millis() as u64,
                    "Product search complete"
                );
                compose(self.generator.as_ref(), query, results).await
            }
            Err(e) => {
                tracing::error!(error = %e, "Product search failed");
                apology()
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
