//! Catalog loader and corpus cache
//!
//! Turns every product into the text the embedding model sees
//! (`title description category`) and keeps the resulting corpus vectors for
//! as long as the catalog version and the embedding model stay the same.

use std::sync::Arc;

use storefront_core::{EmbeddingProvider, Product, ProductStore, SearchError, StorefrontError};
use tokio::sync::RwLock;

/// Text embedded for one product. Fixed order, single spaces.
pub fn product_text(product: &Product) -> String {
    format!(
        "{} {} {}",
        product.title, product.description, product.category
    )
}

/// Read the full catalog and pair every product with its text. An empty
/// catalog yields an empty corpus.
pub async fn load_corpus(store: &dyn ProductStore) -> Result<Vec<(Product, String)>, StorefrontError> {
    let products = store.list_all_products().await?;
    Ok(products
        .into_iter()
        .map(|p| {
            let text = product_text(&p);
            (p, text)
        })
        .collect())
}

/// Catalog products with their embeddings, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub products: Arc<Vec<Product>>,
    pub vectors: Arc<Vec<Vec<f32>>>,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }
}

#[derive(Debug)]
struct CachedCorpus {
    version: i64,
    model: String,
    corpus: Corpus,
}

/// Single-entry memo of the embedded corpus keyed by (catalog version, model).
#[derive(Debug)]
pub struct CorpusCache {
    enabled: bool,
    entry: RwLock<Option<CachedCorpus>>,
}

impl CorpusCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entry: RwLock::new(None),
        }
    }

    /// Cached corpus for the current catalog, embedding it first when the
    /// catalog or the model changed since the last call.
    pub async fn corpus(
        &self,
        store: &dyn ProductStore,
        provider: &EmbeddingProvider,
    ) -> Result<Corpus, SearchError> {
        let model = provider.model_name().unwrap_or_default().to_string();

        if !self.enabled {
            return embed_corpus(store, provider).await;
        }

        let version = store.catalog_version().await?;
        if let Some(hit) = self.lookup(version, &model).await {
            tracing::debug!(version, model = %model, "Corpus cache hit");
            return Ok(hit);
        }

        let corpus = embed_corpus(store, provider).await?;

        // A sync may have landed while embedding; only cache a stable snapshot.
        if store.catalog_version().await? == version {
            let mut entry = self.entry.write().await;
            *entry = Some(CachedCorpus {
                version,
                model: model.clone(),
                corpus: corpus.clone(),
            });
            tracing::debug!(version, model = %model, size = corpus.len(), "Corpus cache refreshed");
        }

        Ok(corpus)
    }

    async fn lookup(&self, version: i64, model: &str) -> Option<Corpus> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|c| c.version == version && c.model == model)
            .map(|c| c.corpus.clone())
    }
}

async fn embed_corpus(
    store: &dyn ProductStore,
    provider: &EmbeddingProvider,
) -> Result<Corpus, SearchError> {
    let (products, texts): (Vec<Product>, Vec<String>) = load_corpus(store).await?.into_iter().unzip();

    if products.is_empty() {
        return Ok(Corpus::default());
    }

    let vectors = provider.embed(&texts).await?;
    Ok(Corpus {
        products: Arc::new(products),
        vectors: Arc::new(vectors),
    })
}

// ============================================================================
// TESTS
// ============================================================================
