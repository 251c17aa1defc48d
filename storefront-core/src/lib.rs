pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod onnx_embedder;
pub mod similarity;
pub mod store;

pub use accounts::{AccountStore, MemoryAccountStore, PgAccountStore};
pub use auth::{AuthError, TokenIssuer};
pub use config::StorefrontConfig;
pub use embeddings::{
    create_backend, BackendConfig, EmbeddingBackend, EmbeddingError, EmbeddingProvider,
    HashingConfig, HashingEmbeddingClient, OnnxConfig, HASHING_DIMENSIONS, ONNX_DIMENSIONS,
};
pub use error::{SearchError, StorefrontError};
pub use models::{
    CartEntry, CartView, ContactMessage, Order, OrderItem, Product, ProductPage, ProductQuery,
    ProductSort, RankedResult, Rating, SearchOutcome, User, WishlistEntry, WishlistView,
};
pub use onnx_embedder::OnnxEmbeddingClient;
pub use store::{MemoryProductStore, PgProductStore, ProductStore};
