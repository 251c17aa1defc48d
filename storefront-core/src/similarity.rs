//! Cosine ranking of catalog vectors against a query vector.

use crate::error::SearchError;
use crate::models::{Product, RankedResult};

/// Hits scoring at or below this are dropped.
pub const MIN_SCORE: f32 = 0.1;

/// Result count when the caller gives none.
pub const DEFAULT_LIMIT: i64 = 10;

/// `dot(a, b) / (|a| * |b|)`. Zero-magnitude inputs and mismatched lengths
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Validate a caller-supplied result limit.
pub fn check_limit(limit: i64) -> Result<usize, SearchError> {
    if limit <= 0 {
        return Err(SearchError::InvalidArgument(format!(
            "limit must be a positive integer, got {limit}"
        )));
    }
    Ok(limit as usize)
}

/// Rank `products` by similarity of their vectors to `query`.
///
/// Sort is stable, so equal scores keep corpus order. Entries scoring
/// `<= MIN_SCORE` are dropped, then the list is cut to `limit`.
pub fn rank(
    query: &[f32],
    corpus_vectors: &[Vec<f32>],
    corpus_products: &[Product],
    limit: i64,
) -> Result<Vec<RankedResult>, SearchError> {
    let limit = check_limit(limit)?;

    let scored: Vec<(usize, f32)> = corpus_vectors
        .iter()
        .take(corpus_products.len())
        .map(|v| cosine_similarity(query, v))
        .enumerate()
        .collect();

    Ok(top_hits(scored, limit)
        .into_iter()
        .map(|(idx, score)| RankedResult::from_product(&corpus_products[idx], score))
        .collect())
}

/// Strictly above `MIN_SCORE`; a score of exactly 0.1 is dropped.
pub fn passes_threshold(score: f32) -> bool {
    score > MIN_SCORE
}

/// Stable descending sort of `(corpus index, score)` pairs, threshold, cut.
fn top_hits(mut scored: Vec<(usize, f32)>, limit: usize) -> Vec<(usize, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .into_iter()
        .filter(|(_, score)| passes_threshold(*score))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbeddingClient;

    fn product(id: i64, title: &str) -> Product {
        Product {
            id,
            title: title.to_string(),
            price: 10.0,
            category: "clothing".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let v = vec![0.3, -1.2, 4.5, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let q = vec![1.0, 2.0, 3.0];
        let v = vec![-0.5, 2.5, 0.25];
        assert_eq!(cosine_similarity(&q, &v), cosine_similarity(&v, &q));
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_mismatched_dimensions_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_sorts_descending_and_filters_threshold() {
        let query = vec![1.0, 0.0];
        let vectors = vec![
            vec![1.0, 1.0],  // ~0.707
            vec![0.0, 1.0],  // 0.0, dropped
            vec![1.0, 0.0],  // 1.0
            vec![0.1, 1.0],  // ~0.0995, dropped
            vec![1.0, -1.0], // ~0.707
        ];
        let products: Vec<Product> = (1..=5).map(|i| product(i, &format!("p{i}"))).collect();

        let results = rank(&query, &vectors, &products, DEFAULT_LIMIT).unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.product_id).collect();
        assert_eq!(ids, vec![3, 1, 5], "ties keep corpus order");
        assert!(results.iter().all(|r| r.score > MIN_SCORE));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_score_equal_to_threshold_is_dropped() {
        assert!(!passes_threshold(MIN_SCORE));
        assert!(passes_threshold(f32::from_bits(MIN_SCORE.to_bits() + 1)));

        let scored = vec![(0, 0.5), (1, MIN_SCORE), (2, 0.2), (3, 0.05)];
        assert_eq!(top_hits(scored, 10), vec![(0, 0.5), (2, 0.2)]);
    }

    #[test]
    fn test_rank_respects_limit() {
        let query = vec![1.0, 0.0];
        let vectors: Vec<Vec<f32>> = (0..8).map(|_| vec![1.0, 0.1]).collect();
        let products: Vec<Product> = (1..=8).map(|i| product(i, "same")).collect();

        let results = rank(&query, &vectors, &products, 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.product_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_rank_rejects_non_positive_limit() {
        let query = vec![1.0];
        for limit in [0, -1, -50] {
            match rank(&query, &[], &[], limit) {
                Err(SearchError::InvalidArgument(msg)) => assert!(msg.contains("limit")),
                other => panic!("Expected InvalidArgument for {limit}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_rank_empty_corpus_is_empty() {
        let results = rank(&[1.0, 0.0], &[], &[], DEFAULT_LIMIT).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rank_result_carries_product_fields() {
        let query = vec![1.0, 0.0];
        let mut p = product(42, "Red Shirt");
        p.price = 22.3;
        p.image = "https://img.example/42.jpg".to_string();

        let results = rank(&query, &[vec![1.0, 0.0]], &[p], 1).unwrap();
        let hit = &results[0];
        assert_eq!(hit.product_id, 42);
        assert_eq!(hit.title, "Red Shirt");
        assert_eq!(hit.image, "https://img.example/42.jpg");
        assert_eq!(hit.category, "clothing");
        assert_eq!(hit.summary, "Found Red Shirt in clothing category for $22.3");
    }

    #[test]
    fn test_shirt_query_prefers_shirt_product() {
        let embedder = HashingEmbeddingClient::new(384);
        let products = vec![product(1, "red shirt"), product(2, "blue jeans")];
        let texts = ["red shirt clothing", "blue jeans clothing"];
        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| embedder.embed_sync(t)).collect();
        let query = embedder.embed_sync("shirt");

        let results = rank(&query, &vectors, &products, DEFAULT_LIMIT).unwrap();

        assert_eq!(results[0].product_id, 1);
        if let Some(jeans) = results.iter().find(|r| r.product_id == 2) {
            assert!(results[0].score > jeans.score);
        }
    }
}
