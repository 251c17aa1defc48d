//! Product store: the catalog the search subsystem reads from.
//!
//! The catalog is replaced wholesale by the feed sync; every replace bumps a
//! catalog version so readers can tell when cached corpus vectors are stale.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::RwLock;

use crate::error::StorefrontError;
use crate::models::{Product, ProductPage, ProductQuery};

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every product, in id order.
    async fn list_all_products(&self) -> Result<Vec<Product>, StorefrontError>;

    /// Incremented by every `replace_all`.
    async fn catalog_version(&self) -> Result<i64, StorefrontError>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StorefrontError>;

    async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, StorefrontError>;

    /// Replace the whole catalog atomically. Returns the new catalog version.
    async fn replace_all(&self, products: &[Product]) -> Result<i64, StorefrontError>;

    /// Backend description for health output.
    async fn health(&self) -> Result<String, StorefrontError>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// PgProductStore
// ============================================================================

const PRODUCT_COLUMNS: &str =
    "id, title, price, description, category, image, rating_rate, rating_count";

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    qb.push(" WHERE TRUE");

    if let Some(term) = query.search_term() {
        let pattern = format!("%{}%", escape_like(term));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = query.category_term() {
        qb.push(" AND category ILIKE ")
            .push_bind(format!("%{}%", escape_like(category)));
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn list_all_products(&self) -> Result<Vec<Product>, StorefrontError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn catalog_version(&self) -> Result<i64, StorefrontError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM catalog_state WHERE singleton")
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StorefrontError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, StorefrontError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filters(&mut page_qb, query);
        page_qb
            .push(" ORDER BY ")
            .push(query.sort.order_by())
            .push(" LIMIT ")
            .push_bind(query.limit())
            .push(" OFFSET ")
            .push_bind(query.offset());

        let data = page_qb
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ProductPage::new(data, total, query))
    }

    async fn replace_all(&self, products: &[Product]) -> Result<i64, StorefrontError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM products").execute(&mut *tx).await?;

        for p in products {
            sqlx::query(
                r#"
                INSERT INTO products
                    (id, title, price, description, category, image, rating_rate, rating_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    price = EXCLUDED.price,
                    description = EXCLUDED.description,
                    category = EXCLUDED.category,
                    image = EXCLUDED.image,
                    rating_rate = EXCLUDED.rating_rate,
                    rating_count = EXCLUDED.rating_count
                "#,
            )
            .bind(p.id)
            .bind(&p.title)
            .bind(p.price)
            .bind(&p.description)
            .bind(&p.category)
            .bind(&p.image)
            .bind(p.rating.rate)
            .bind(p.rating.count)
            .execute(&mut *tx)
            .await?;
        }

        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO catalog_state (singleton, version, synced_at)
            VALUES (TRUE, 1, now())
            ON CONFLICT (singleton) DO UPDATE
                SET version = catalog_state.version + 1, synced_at = now()
            RETURNING version
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(count = products.len(), version, "Catalog replaced");
        Ok(version)
    }

    async fn health(&self) -> Result<String, StorefrontError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// ============================================================================
// MemoryProductStore
// ============================================================================

#[derive(Debug, Default)]
struct MemoryCatalog {
    products: Vec<Product>,
    version: i64,
}

/// In-process catalog for tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    inner: RwLock<MemoryCatalog>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `products` already loaded at catalog version 1.
    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            inner: RwLock::new(MemoryCatalog {
                products: dedupe_by_id(products),
                version: 1,
            }),
        }
    }
}

fn dedupe_by_id(products: impl IntoIterator<Item = Product>) -> Vec<Product> {
    products
        .into_iter()
        .map(|p| (p.id, p))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn list_all_products(&self) -> Result<Vec<Product>, StorefrontError> {
        Ok(self.inner.read().await.products.clone())
    }

    async fn catalog_version(&self) -> Result<i64, StorefrontError> {
        Ok(self.inner.read().await.version)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StorefrontError> {
        Ok(self
            .inner
            .read()
            .await
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, StorefrontError> {
        let catalog = self.inner.read().await;

        let mut matching: Vec<&Product> =
            catalog.products.iter().filter(|p| query.matches(p)).collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total = matching.len() as i64;
        let data = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit()).unwrap_or(0))
            .cloned()
            .collect();

        Ok(ProductPage::new(data, total, query))
    }

    async fn replace_all(&self, products: &[Product]) -> Result<i64, StorefrontError> {
        let mut catalog = self.inner.write().await;
        catalog.products = dedupe_by_id(products.iter().cloned());
        catalog.version += 1;
        Ok(catalog.version)
    }

    async fn health(&self) -> Result<String, StorefrontError> {
        Ok("in-memory".to_string())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
