use serde::{Deserialize, Serialize};

use super::product::Product;

/// One ranked catalog hit. Built per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub product_id: i64,
    pub title: String,
    pub price: f64,
    pub image: String,
    pub category: String,
    pub score: f32,
    pub summary: String,
}

impl RankedResult {
    pub fn from_product(product: &Product, score: f32) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            price: product.price,
            image: product.image.clone(),
            category: product.category.clone(),
            score,
            summary: product.summary(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub reply_text: String,
    pub results: Vec<RankedResult>,
}
