use std::collections::HashSet;

use tessera::error::TesseraError;
use tessera::types::SearchResults;

/// Assert the result keys are exactly `expected`, in order.
pub fn assert_keys(results: &SearchResults, expected: &[&str]) {
    assert_eq!(
        results.keys(),
        expected,
        "unexpected result keys (total = {})",
        results.total
    );
}

/// Assert the hits are ordered by non-decreasing score.
pub fn assert_non_decreasing_scores(results: &SearchResults) {
    let scores: Vec<f32> = results
        .hits
        .iter()
        .map(|h| h.score.expect("knn hit without a score"))
        .collect();
    assert!(
        scores.windows(2).all(|w| w[0] <= w[1]),
        "scores are not non-decreasing: {scores:?}"
    );
}

/// Fraction of the true top-k found in the returned keys.
pub fn recall_at_k(results: &SearchResults, ground_truth: &[String], k: usize) -> f64 {
    let k = k.min(ground_truth.len());
    if k == 0 {
        return 1.0;
    }
    let truth: HashSet<&str> = ground_truth.iter().take(k).map(String::as_str).collect();
    let found = results
        .keys()
        .into_iter()
        .take(k)
        .filter(|key| truth.contains(key))
        .count();
    found as f64 / k as f64
}

pub fn assert_malformed<T: std::fmt::Debug>(result: Result<T, TesseraError>) {
    match result {
        Err(TesseraError::MalformedQuery { .. }) => {}
        other => panic!("expected MalformedQuery, got: {other:?}"),
    }
}

pub fn assert_dimension_mismatch<T: std::fmt::Debug>(result: Result<T, TesseraError>) {
    match result {
        Err(TesseraError::DimensionMismatch { .. }) => {}
        other => panic!("expected DimensionMismatch, got: {other:?}"),
    }
}
