use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera::index::distance::compute_distance;
use tessera::types::DistanceMetric;

/// `n` vectors of dimension `dims` with uniform values in [-1, 1].
pub fn random_vectors(n: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

/// Indices of the `k` nearest vectors by exhaustive scan, ties by index.
pub fn brute_force_knn(
    vectors: &[Vec<f32>],
    query: &[f32],
    k: usize,
    metric: DistanceMetric,
) -> Vec<usize> {
    let mut scored: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (compute_distance(query, v, metric), i))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, i)| i).collect()
}

/// Zero-padded key so lexical and numeric order agree.
pub fn doc_key(prefix: &str, i: usize) -> String {
    format!("{prefix}{i:05}")
}
