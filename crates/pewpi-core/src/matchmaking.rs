//! Deterministic embedding matchmaking.
//!
//! Embeddings are seeded pseudo-random unit vectors: the embedding of a key
//! is a function of the key alone, so matches are reproducible across runs.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::market::seed_for_symbol;

pub const EMBED_DIMS: usize = 16;

/// Deterministic unit vector for a key. Components are drawn uniformly from
/// [-1, 1) using a SmallRng seeded from the key's FNV-1a hash, then
/// normalized.
pub fn embed(key: &str) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed_for_symbol(key));
    let mut v: Vec<f64> = (0..EMBED_DIMS)
        .map(|_| rng.random::<f64>() * 2.0 - 1.0)
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Cosine similarity in [-1, 1]. Zero vectors yield 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Rank candidates by embedding similarity to `key`, best first.
/// Ties break on candidate name so the order is stable.
pub fn rank_matches(key: &str, candidates: &[String]) -> Vec<(String, f64)> {
    let anchor = embed(key);
    let mut scored: Vec<(String, f64)> = candidates
        .iter()
        .map(|c| (c.clone(), cosine_similarity(&anchor, &embed(c))))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored
}
