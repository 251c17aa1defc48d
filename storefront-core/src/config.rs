use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StorefrontConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `onnx` or `hashing`
    pub backend: String,
    /// Path to the ONNX model. Empty means the default model directory.
    #[serde(default)]
    pub onnx_model: String,
    #[serde(default = "default_onnx_dimensions")]
    pub onnx_dimensions: u32,
    #[serde(default = "default_hashing_dimensions")]
    pub hashing_dimensions: u32,
}

fn default_onnx_dimensions() -> u32 {
    384
}

fn default_hashing_dimensions() -> u32 {
    384
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub default_limit: u32,
    pub request_timeout_seconds: u64,
    /// Keep corpus vectors between searches until the catalog version changes.
    pub cache_corpus: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            request_timeout_seconds: 30,
            cache_corpus: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    pub feed_url: String,
    pub on_startup: bool,
    /// 0 disables the periodic sync.
    pub interval_minutes: u64,
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://fakestoreapi.com/products".to_string(),
            on_startup: true,
            interval_minutes: 0,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Signing secret used when none is configured. Fine for development only.
pub const DEV_JWT_SECRET: &str = "storefront-dev-secret";

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
        }
    }
}

impl AuthConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl StorefrontConfig {
    /// Load from a TOML file, then apply `STOREFRONT__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(env_overrides())
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix("STOREFRONT")
        .separator("__")
        .try_parsing(true)
}
