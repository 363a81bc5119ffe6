//! Ranking fusion utilities.
//!
//! Pure implementations of cosine similarity and Reciprocal Rank
//! Fusion (RRF) for merging the dense and sparse ranked lists of a
//! hybrid search.

use crate::types::ScoredPoint;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if either vector is zero-length, empty, or mismatched.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Reciprocal Rank Fusion — merge two ranked result lists.
///
/// Each point's fused score = sum of 1/(k + rank + 1) across the lists
/// it appears in. Standard value is k=60. Results are deduplicated by
/// id and sorted by fused score descending.
pub fn reciprocal_rank_fusion(
    dense: &[ScoredPoint],
    sparse: &[ScoredPoint],
    k: u32,
    limit: usize,
) -> Vec<ScoredPoint> {
    use std::collections::HashMap;

    let k = k as f32;
    let mut scores: HashMap<String, (f32, ScoredPoint)> = HashMap::new();

    for list in [dense, sparse] {
        for (rank, point) in list.iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(point.id.clone())
                .and_modify(|(score, _)| *score += rrf_score)
                .or_insert_with(|| (rrf_score, point.clone()));
        }
    }

    let mut results: Vec<ScoredPoint> = scores
        .into_values()
        .map(|(score, mut point)| {
            point.score = score;
            point
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}
