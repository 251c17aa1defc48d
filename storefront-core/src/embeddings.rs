//! Embeddings module for Storefront: product and query vectors
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **ONNX**: local embeddings via `all-MiniLM-L6-v2` (384-dim)
//! - **Hashing**: deterministic feature-hashing embeddings, no model file needed
//!
//! `EmbeddingProvider` owns the backend chosen at startup. A backend that fails
//! to load leaves the provider disabled; every call then returns
//! `EmbeddingError::ModelUnavailable` until the process restarts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Default ONNX (all-MiniLM-L6-v2) embedding dimensions
pub const ONNX_DIMENSIONS: usize = 384;

/// Default hashing embedder dimensions
pub const HASHING_DIMENSIONS: usize = 384;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding models.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed every text, returning one vector per input in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text. Defaults to a one-element batch.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Returns the embedding dimension (e.g., 384).
    fn dimensions(&self) -> usize;

    /// Backend name for logging and cache keys.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid embedding: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Backend returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("ONNX model not found at {path}: place all-MiniLM-L6-v2.onnx and its tokenizer there")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Unknown embedding backend '{0}' (expected 'onnx' or 'hashing')")]
    UnknownBackend(String),
}

// ============================================================================
// Config types
// ============================================================================

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
}

/// Hashing backend configuration
#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub dimensions: usize,
}

/// Configuration union for the backend factory.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Onnx(OnnxConfig),
    Hashing(HashingConfig),
}

impl BackendConfig {
    /// Reads `[embedding] backend` to select ONNX or hashing.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        match config.backend.as_str() {
            "onnx" => {
                let (model_path, tokenizer_path) =
                    crate::onnx_embedder::resolve_onnx_paths(&config.onnx_model);
                Ok(BackendConfig::Onnx(OnnxConfig {
                    model_path,
                    tokenizer_path,
                    dimensions: config.onnx_dimensions as usize,
                }))
            }
            "hashing" => Ok(BackendConfig::Hashing(HashingConfig {
                dimensions: config.hashing_dimensions as usize,
            })),
            other => Err(EmbeddingError::UnknownBackend(other.to_string())),
        }
    }
}

/// Create the appropriate backend from configuration.
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    match config {
        BackendConfig::Onnx(c) => Ok(Box::new(crate::onnx_embedder::OnnxEmbeddingClient::new(c)?)),
        BackendConfig::Hashing(c) => Ok(Box::new(HashingEmbeddingClient::new(c.dimensions))),
    }
}

// ============================================================================
// HashingEmbeddingClient
// ============================================================================

/// Feature-hashing bag-of-words embedder.
///
/// Each lower-cased alphanumeric token lands in one bucket with a hash-derived
/// sign; the result is L2-normalised. Texts sharing words score higher than
/// texts that do not, which is enough for tests and offline development.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingClient {
    dimensions: usize,
}

impl HashingEmbeddingClient {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let idx = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }

        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingBackend for HashingEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// ============================================================================
// EmbeddingProvider
// ============================================================================

/// Process-scoped handle to the embedding model, loaded once at startup and
/// shared read-only through `Arc`.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Option<Arc<dyn EmbeddingBackend>>,
    unavailable_reason: Option<String>,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("backend", &self.model_name())
            .field("unavailable_reason", &self.unavailable_reason)
            .finish()
    }
}

impl EmbeddingProvider {
    /// Load the configured backend. A load failure is logged and yields a
    /// disabled provider instead of an error.
    pub fn load(config: BackendConfig) -> Self {
        match create_backend(config) {
            Ok(backend) => {
                tracing::info!(
                    backend = backend.name(),
                    dimensions = backend.dimensions(),
                    "Embedding model loaded"
                );
                Self::from_backend(Arc::from(backend))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load embedding model: semantic search disabled");
                Self::disabled(e.to_string())
            }
        }
    }

    pub fn from_backend(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend: Some(backend),
            unavailable_reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.backend.as_ref().map(|b| b.dimensions())
    }

    fn backend(&self) -> Result<&Arc<dyn EmbeddingBackend>, EmbeddingError> {
        self.backend.as_ref().ok_or_else(|| {
            EmbeddingError::ModelUnavailable(
                self.unavailable_reason
                    .clone()
                    .unwrap_or_else(|| "model not loaded".to_string()),
            )
        })
    }

    /// Embed a batch. Every returned vector is checked against the backend's
    /// dimension so one comparison batch never mixes shapes.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let backend = self.backend()?;

        let vectors = backend.embed_batch(texts).await.map_err(|e| match e {
            EmbeddingError::ModelUnavailable(_) => e,
            other => EmbeddingError::ModelUnavailable(other.to_string()),
        })?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }

        let expected = backend.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::InvalidDimensions {
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
