mod common;

use common::assertions::{
    assert_dimension_mismatch, assert_keys, assert_malformed, assert_non_decreasing_scores,
    recall_at_k,
};
use common::vectors::{brute_force_knn, doc_key, random_vectors};

use tessera::config::EngineConfig;
use tessera::engine::{DocumentCommands, Engine, SearchCommands};
use tessera::query::SearchOptions;
use tessera::schema::{FieldSpec, IndexDefinition};
use tessera::types::{DistanceMetric, FieldValue, Fields};

fn vector_doc(v: &[f32], color: &str) -> Fields {
    Fields::from([
        ("vec".to_string(), FieldValue::Vector(v.to_vec())),
        ("color".to_string(), FieldValue::text(color)),
    ])
}

fn engine_with(field: FieldSpec, config: EngineConfig) -> Engine {
    let engine = Engine::new(config);
    engine
        .define_index(
            IndexDefinition::new("idx:vec")
                .prefix("doc:")
                .field(field)
                .field(FieldSpec::tag("color")),
        )
        .unwrap();
    engine
}

fn seeded_config() -> EngineConfig {
    EngineConfig {
        hnsw_seed: Some(42),
        ..EngineConfig::default()
    }
}

#[test]
fn test_knn_over_exactly_k_documents() {
    for metric in [DistanceMetric::L2, DistanceMetric::Cosine, DistanceMetric::InnerProduct] {
        let engine = engine_with(FieldSpec::vector("vec", 3, metric), seeded_config());
        engine.put("doc:a", vector_doc(&[1.0, 0.0, 0.0], "red")).unwrap();
        engine.put("doc:b", vector_doc(&[0.0, 1.0, 0.0], "blue")).unwrap();
        engine.put("doc:c", vector_doc(&[0.7, 0.7, 0.0], "red")).unwrap();

        let results = engine
            .search(
                "idx:vec",
                "*=>[KNN 3 @vec $q]",
                &SearchOptions::new().param("q", vec![1.0f32, 0.1, 0.0]),
            )
            .unwrap();
        assert_eq!(results.total, 3, "metric {metric}");
        assert_eq!(results.hits.len(), 3, "metric {metric}");
        assert_non_decreasing_scores(&results);
        assert_eq!(results.hits[0].key, "doc:a", "metric {metric}");
    }
}

#[test]
fn test_knn_ties_break_by_key() {
    let engine = engine_with(
        FieldSpec::vector("vec", 2, DistanceMetric::L2).flat(),
        seeded_config(),
    );
    for key in ["doc:c", "doc:a", "doc:b"] {
        engine.put(key, vector_doc(&[1.0, 1.0], "red")).unwrap();
    }
    let results = engine
        .search(
            "idx:vec",
            "*=>[KNN 2 @vec $q]",
            &SearchOptions::new().param("q", vec![0.0f32, 0.0]),
        )
        .unwrap();
    assert_keys(&results, &["doc:a", "doc:b"]);
}

#[test]
fn test_hybrid_query_never_returns_filtered_out_documents() {
    let engine = engine_with(FieldSpec::vector("vec", 2, DistanceMetric::L2), seeded_config());
    // The blue documents are the global nearest neighbours of the query.
    engine.put("doc:1", vector_doc(&[0.0, 0.0], "blue")).unwrap();
    engine.put("doc:2", vector_doc(&[0.1, 0.0], "blue")).unwrap();
    engine.put("doc:3", vector_doc(&[5.0, 5.0], "red")).unwrap();
    engine.put("doc:4", vector_doc(&[9.0, 9.0], "red")).unwrap();

    let results = engine
        .search(
            "idx:vec",
            "(@color:{red})=>[KNN 3 @vec $q AS dist]",
            &SearchOptions::new().param("q", vec![0.0f32, 0.0]),
        )
        .unwrap();
    assert_keys(&results, &["doc:3", "doc:4"]);
    let FieldValue::Number(d) = results.hits[0].fields["dist"] else {
        panic!("distance alias should be numeric");
    };
    assert!(d > 0.0);
}

#[test]
fn test_filtered_graph_search_respects_filter() {
    // A low threshold forces the graph path instead of the exact scan.
    let config = EngineConfig {
        brute_force_threshold: 50,
        ..seeded_config()
    };
    let engine = engine_with(FieldSpec::vector("vec", 8, DistanceMetric::L2), config);
    let vectors = random_vectors(600, 8, 11);
    for (i, v) in vectors.iter().enumerate() {
        let color = if i % 3 == 0 { "red" } else { "blue" };
        engine.put(&doc_key("doc:", i), vector_doc(v, color)).unwrap();
    }

    let red: Vec<usize> = (0..vectors.len()).filter(|i| i % 3 == 0).collect();
    let red_vectors: Vec<Vec<f32>> = red.iter().map(|&i| vectors[i].clone()).collect();
    let queries = random_vectors(20, 8, 99);
    let mut total_recall = 0.0;
    for q in &queries {
        let results = engine
            .search(
                "idx:vec",
                "(@color:{red})=>[KNN 10 @vec $q EF_RUNTIME 100]",
                &SearchOptions::new().param("q", q.clone()),
            )
            .unwrap();
        assert_eq!(results.hits.len(), 10);
        for hit in &results.hits {
            assert_eq!(hit.fields["color"], FieldValue::text("red"), "{}", hit.key);
        }
        assert_non_decreasing_scores(&results);

        let truth: Vec<String> = brute_force_knn(&red_vectors, q, 10, DistanceMetric::L2)
            .into_iter()
            .map(|j| doc_key("doc:", red[j]))
            .collect();
        total_recall += recall_at_k(&results, &truth, 10);
    }
    let recall = total_recall / queries.len() as f64;
    assert!(recall >= 0.85, "filtered recall {recall:.3}");
}

#[test]
fn test_hnsw_recall_against_exact_scan() {
    let engine = engine_with(FieldSpec::vector("vec", 16, DistanceMetric::Cosine), seeded_config());
    let vectors = random_vectors(1000, 16, 5);
    for (i, v) in vectors.iter().enumerate() {
        engine.put(&doc_key("doc:", i), vector_doc(v, "any")).unwrap();
    }

    let queries = random_vectors(25, 16, 77);
    let mut total_recall = 0.0;
    for q in &queries {
        let results = engine
            .search(
                "idx:vec",
                "*=>[KNN $k @vec $q EF_RUNTIME 128]",
                &SearchOptions::new().param("q", q.clone()).param("k", 10.0),
            )
            .unwrap();
        let truth: Vec<String> = brute_force_knn(&vectors, q, 10, DistanceMetric::Cosine)
            .into_iter()
            .map(|i| doc_key("doc:", i))
            .collect();
        total_recall += recall_at_k(&results, &truth, 10);
    }
    let recall = total_recall / queries.len() as f64;
    assert!(recall >= 0.9, "recall@10 {recall:.3}");
}

#[test]
fn test_deleted_and_updated_vectors() {
    let engine = engine_with(FieldSpec::vector("vec", 2, DistanceMetric::L2), seeded_config());
    engine.put("doc:1", vector_doc(&[0.0, 0.0], "red")).unwrap();
    engine.put("doc:2", vector_doc(&[1.0, 0.0], "red")).unwrap();
    engine.put("doc:3", vector_doc(&[2.0, 0.0], "red")).unwrap();

    let opts = SearchOptions::new().param("q", vec![0.0f32, 0.0]);
    engine.delete("doc:1");
    let results = engine.search("idx:vec", "*=>[KNN 1 @vec $q]", &opts).unwrap();
    assert_keys(&results, &["doc:2"]);

    engine.put("doc:3", vector_doc(&[-0.1, 0.0], "red")).unwrap();
    let results = engine.search("idx:vec", "*=>[KNN 2 @vec $q]", &opts).unwrap();
    assert_keys(&results, &["doc:3", "doc:2"]);
}

#[test]
fn test_sort_by_distance_alias_descending() {
    let engine = engine_with(FieldSpec::vector("vec", 2, DistanceMetric::L2), seeded_config());
    engine.put("doc:1", vector_doc(&[0.0, 0.0], "red")).unwrap();
    engine.put("doc:2", vector_doc(&[1.0, 0.0], "red")).unwrap();
    engine.put("doc:3", vector_doc(&[2.0, 0.0], "red")).unwrap();

    let results = engine
        .search(
            "idx:vec",
            "*=>[KNN 3 @vec $q AS dist]",
            &SearchOptions::new()
                .param("q", vec![0.0f32, 0.0])
                .sort_by("dist", false)
                .return_fields(["dist"]),
        )
        .unwrap();
    assert_keys(&results, &["doc:3", "doc:2", "doc:1"]);
    assert_eq!(results.hits[0].fields.len(), 1);
}

#[test]
fn test_query_vector_dimension_mismatch() {
    let engine = engine_with(FieldSpec::vector("vec", 3, DistanceMetric::L2), seeded_config());
    engine.put("doc:1", vector_doc(&[0.0, 0.0, 1.0], "red")).unwrap();

    assert_dimension_mismatch(engine.search(
        "idx:vec",
        "*=>[KNN 1 @vec $q]",
        &SearchOptions::new().param("q", vec![1.0f32, 0.0]),
    ));
    assert_dimension_mismatch(engine.put("doc:2", vector_doc(&[1.0, 2.0, 3.0, 4.0], "red")));
    assert!(engine.get("doc:2").is_none());
}

#[test]
fn test_knn_parameter_errors() {
    let engine = engine_with(FieldSpec::vector("vec", 2, DistanceMetric::L2), seeded_config());
    engine.put("doc:1", vector_doc(&[0.0, 0.0], "red")).unwrap();

    assert_malformed(engine.search("idx:vec", "*=>[KNN 1 @vec $q]", &SearchOptions::new()));
    assert_malformed(engine.search(
        "idx:vec",
        "*=>[KNN 1 @vec $q]",
        &SearchOptions::new().param("q", "not a vector"),
    ));
    assert_malformed(engine.search(
        "idx:vec",
        "*=>[KNN 1 @color $q]",
        &SearchOptions::new().param("q", vec![0.0f32, 0.0]),
    ));
}
