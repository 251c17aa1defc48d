use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Catalog entry as served by the product feed. Missing feed fields fall back
/// to empty strings and zeroes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    #[sqlx(flatten)]
    pub rating: Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rating {
    #[serde(default)]
    #[sqlx(rename = "rating_rate")]
    pub rate: f64,
    #[serde(default)]
    #[sqlx(rename = "rating_count")]
    pub count: i64,
}

impl Product {
    /// One-line description shown next to a search hit.
    pub fn summary(&self) -> String {
        format!(
            "Found {} in {} category for ${}",
            self.title, self.category, self.price
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Id,
    PriceAsc,
    PriceDesc,
    Rating,
}

impl ProductSort {
    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let primary = match self {
            ProductSort::Id => Ordering::Equal,
            ProductSort::PriceAsc => a.price.total_cmp(&b.price),
            ProductSort::PriceDesc => b.price.total_cmp(&a.price),
            ProductSort::Rating => b.rating.rate.total_cmp(&a.rating.rate),
        };
        primary.then(a.id.cmp(&b.id))
    }

    /// `ORDER BY` clause for the Postgres store.
    pub fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Id => "id ASC",
            ProductSort::PriceAsc => "price ASC, id ASC",
            ProductSort::PriceDesc => "price DESC, id ASC",
            ProductSort::Rating => "rating_rate DESC, id ASC",
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Catalog browse filters. Deserialized straight from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip. Saturates instead of overflowing for huge page numbers.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn category_term(&self) -> Option<&str> {
        self.category.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            if !product.title.to_lowercase().contains(&term)
                && !product.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if let Some(category) = self.category_term() {
            if !product
                .category
                .to_lowercase()
                .contains(&category.to_lowercase())
            {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl ProductPage {
    pub fn new(data: Vec<Product>, total: i64, query: &ProductQuery) -> Self {
        let limit = query.limit();
        Self {
            data,
            total,
            page: query.page(),
            limit,
            pages: (total + limit - 1) / limit,
        }
    }
}
