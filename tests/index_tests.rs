mod common;

use assert_approx_eq::assert_approx_eq;
use proptest::prelude::*;
use roaring::RoaringBitmap;

use common::vectors::{brute_force_knn, random_vectors};

use tessera::error::TesseraError;
use tessera::index::distance::{
    compute_distance, cosine_distance, euclidean_distance, inner_product_distance,
};
use tessera::index::hnsw::MIN_TOMBSTONES_FOR_REBUILD;
use tessera::index::traits::VectorIndex;
use tessera::index::{FlatIndex, HnswConfig, HnswIndex};
use tessera::types::DistanceMetric;

fn seeded(metric: DistanceMetric) -> HnswConfig {
    HnswConfig {
        seed: Some(42),
        ..HnswConfig::new(metric).with_m(8)
    }
}

// ─── Distance tests ───

#[test]
fn test_cosine_known_values() {
    let a = [1.0, 0.0, 0.0];
    let b = [0.0, 1.0, 0.0];
    assert_approx_eq!(cosine_distance(&a, &b), 1.0, 1e-6);
    assert_approx_eq!(cosine_distance(&a, &a), 0.0, 1e-6);
    assert_approx_eq!(cosine_distance(&a, &[-1.0, 0.0, 0.0]), 2.0, 1e-6);
}

#[test]
fn test_cosine_zero_vector() {
    assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 2.0]), 1.0);
}

#[test]
fn test_euclidean_known_values() {
    let d = euclidean_distance(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
    assert_approx_eq!(d, 27.0, 1e-4);
}

#[test]
fn test_inner_product_known_values() {
    let d = inner_product_distance(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
    assert_approx_eq!(d, -31.0, 1e-4);
}

#[test]
fn test_distance_dispatch() {
    let a = [0.6, 0.8];
    let b = [0.8, 0.6];
    assert_eq!(
        compute_distance(&a, &b, DistanceMetric::Cosine),
        cosine_distance(&a, &b)
    );
    assert_eq!(
        compute_distance(&a, &b, DistanceMetric::L2),
        euclidean_distance(&a, &b)
    );
    assert_eq!(
        compute_distance(&a, &b, DistanceMetric::InnerProduct),
        inner_product_distance(&a, &b)
    );
}

proptest! {
    #[test]
    fn prop_cosine_distance_bounded(
        a in prop::collection::vec(-10.0f32..10.0, 8),
        b in prop::collection::vec(-10.0f32..10.0, 8),
    ) {
        let d = cosine_distance(&a, &b);
        prop_assert!((0.0..=2.0).contains(&d));
    }

    #[test]
    fn prop_euclidean_symmetric(
        a in prop::collection::vec(-10.0f32..10.0, 8),
        b in prop::collection::vec(-10.0f32..10.0, 8),
    ) {
        prop_assert_eq!(euclidean_distance(&a, &b), euclidean_distance(&b, &a));
    }
}

// ─── FLAT tests ───

#[test]
fn test_flat_exact_order() {
    let mut idx = FlatIndex::new(2, DistanceMetric::L2);
    idx.insert(0, &[0.0, 0.0]).unwrap();
    idx.insert(1, &[1.0, 0.0]).unwrap();
    idx.insert(2, &[5.0, 5.0]).unwrap();
    let res = idx.search(&[0.9, 0.0], 3, None, None, None).unwrap();
    let ids: Vec<u32> = res.iter().map(|&(_, id)| id).collect();
    assert_eq!(ids, vec![1, 0, 2]);
}

#[test]
fn test_flat_filter_restricts_candidates() {
    let mut idx = FlatIndex::new(2, DistanceMetric::L2);
    idx.insert(0, &[0.0, 0.0]).unwrap();
    idx.insert(1, &[1.0, 0.0]).unwrap();
    let allowed: RoaringBitmap = [0u32].into_iter().collect();
    let res = idx.search(&[1.0, 0.0], 2, None, Some(&allowed), None).unwrap();
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].1, 0);
}

#[test]
fn test_flat_dimension_mismatch() {
    let mut idx = FlatIndex::new(3, DistanceMetric::Cosine);
    assert!(matches!(
        idx.insert(0, &[1.0, 2.0]),
        Err(TesseraError::DimensionMismatch { expected: 3, actual: 2 })
    ));
    assert!(idx.is_empty());
    assert!(idx.search(&[1.0], 1, None, None, None).is_err());
}

#[test]
fn test_flat_huge_k_returns_everything() {
    let mut idx = FlatIndex::new(2, DistanceMetric::L2);
    for i in 0..3u32 {
        idx.insert(i, &[i as f32, 0.0]).unwrap();
    }
    let res = idx.search(&[0.0, 0.0], usize::MAX, Some(usize::MAX), None, None).unwrap();
    assert_eq!(res.len(), 3);
}

// ─── HNSW tests ───

#[test]
fn test_hnsw_three_vectors_all_returned_in_order() {
    let mut idx = HnswIndex::new(3, seeded(DistanceMetric::Cosine));
    idx.insert(0, &[1.0, 0.0, 0.0]).unwrap();
    idx.insert(1, &[0.9, 0.1, 0.0]).unwrap();
    idx.insert(2, &[0.0, 0.0, 1.0]).unwrap();

    let res = idx.search(&[1.0, 0.05, 0.0], 3, None, None, None).unwrap();
    assert_eq!(res.len(), 3);
    assert!(res.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(res[2].1, 2);
}

#[test]
fn test_hnsw_huge_k_and_ef_are_capped_by_graph_size() {
    let mut idx = HnswIndex::new(3, seeded(DistanceMetric::L2));
    idx.insert(0, &[0.0, 0.0, 0.0]).unwrap();
    idx.insert(1, &[1.0, 0.0, 0.0]).unwrap();
    idx.insert(2, &[2.0, 0.0, 0.0]).unwrap();

    let res = idx.search(&[0.0; 3], usize::MAX / 2, None, None, None).unwrap();
    assert_eq!(res.iter().map(|&(_, id)| id).collect::<Vec<_>>(), vec![0, 1, 2]);

    let res = idx.search(&[0.0; 3], 1, Some(usize::MAX), None, None).unwrap();
    assert_eq!(res[0].1, 0);

    let allowed: RoaringBitmap = [2u32].into_iter().collect();
    let res = idx
        .search(&[0.0; 3], usize::MAX, Some(usize::MAX), Some(&allowed), None)
        .unwrap();
    assert_eq!(res, vec![(4.0, 2)]);
}

#[test]
fn test_hnsw_dimension_mismatch_inserts_nothing() {
    let mut idx = HnswIndex::new(4, seeded(DistanceMetric::L2));
    let err = idx.insert(0, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::DimensionMismatch { expected: 4, actual: 2 }
    ));
    assert_eq!(idx.node_count(), 0);
    assert!(idx.search(&[1.0; 5], 1, None, None, None).is_err());
}

#[test]
fn test_hnsw_recall_against_brute_force() {
    let dim = 16;
    let vectors = random_vectors(500, dim, 7);
    let mut idx = HnswIndex::new(dim, seeded(DistanceMetric::L2));
    for (i, v) in vectors.iter().enumerate() {
        idx.insert(i as u32, v).unwrap();
    }

    let queries = random_vectors(20, dim, 99);
    let mut hits = 0;
    for q in &queries {
        let truth = brute_force_knn(&vectors, q, 10, DistanceMetric::L2);
        let got: Vec<usize> = idx
            .search(q, 10, Some(64), None, None)
            .unwrap()
            .into_iter()
            .take(10)
            .map(|(_, id)| id as usize)
            .collect();
        hits += truth.iter().filter(|id| got.contains(id)).count();
    }
    let recall = hits as f64 / (queries.len() * 10) as f64;
    assert!(recall >= 0.9, "recall@10 = {recall:.3}");
}

#[test]
fn test_hnsw_filtered_search_respects_filter() {
    let vectors = random_vectors(200, 8, 3);
    let mut idx = HnswIndex::new(8, seeded(DistanceMetric::Cosine));
    for (i, v) in vectors.iter().enumerate() {
        idx.insert(i as u32, v).unwrap();
    }
    let allowed: RoaringBitmap = (0..200u32).filter(|i| i % 10 == 0).collect();
    let res = idx
        .search(&vectors[5], 5, None, Some(&allowed), None)
        .unwrap();
    assert!(res.len() >= 5);
    assert!(res.iter().all(|(_, id)| allowed.contains(*id)));
}

#[test]
fn test_hnsw_update_replaces_vector() {
    let mut idx = HnswIndex::new(2, seeded(DistanceMetric::L2));
    idx.insert(0, &[0.0, 0.0]).unwrap();
    idx.insert(1, &[10.0, 10.0]).unwrap();
    idx.insert(0, &[10.0, 10.5]).unwrap();

    assert_eq!(idx.len(), 2);
    assert_eq!(idx.tombstones(), 1);
    let res = idx.search(&[0.0, 0.0], 2, None, None, None).unwrap();
    assert_eq!(res.len(), 2);
    assert_eq!(idx.vector(0), Some(&[10.0, 10.5][..]));
}

#[test]
fn test_hnsw_identical_reinsert_is_noop() {
    let mut idx = HnswIndex::new(2, seeded(DistanceMetric::L2));
    idx.insert(0, &[1.0, 1.0]).unwrap();
    idx.insert(0, &[1.0, 1.0]).unwrap();
    assert_eq!(idx.node_count(), 1);
    assert_eq!(idx.tombstones(), 0);
}

#[test]
fn test_hnsw_remove_and_rebuild() {
    let vectors = random_vectors(200, 4, 11);
    let mut idx = HnswIndex::new(4, seeded(DistanceMetric::L2));
    for (i, v) in vectors.iter().enumerate() {
        idx.insert(i as u32, v).unwrap();
    }
    for i in 0..150u32 {
        assert!(idx.remove(i));
    }
    assert!(!idx.remove(0));
    assert_eq!(idx.len(), 50);
    // 150 tombstones > 50 live triggered a rebuild along the way.
    assert!(idx.tombstones() < MIN_TOMBSTONES_FOR_REBUILD + 50);

    let res = idx.search(&vectors[160], 1, Some(50), None, None).unwrap();
    assert_eq!(res[0].1, 160);
    assert!(res.iter().all(|(_, id)| *id >= 150));
}

#[test]
fn test_hnsw_reinsert_after_everything_deleted() {
    let mut idx = HnswIndex::new(2, seeded(DistanceMetric::L2));
    idx.insert(0, &[0.0, 0.0]).unwrap();
    idx.remove(0);
    idx.insert(1, &[1.0, 1.0]).unwrap();
    let res = idx.search(&[1.0, 1.0], 1, None, None, None).unwrap();
    assert_eq!(res[0].1, 1);
}
