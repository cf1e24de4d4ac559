//! Graph build and query latency, plus the filtered KNN path end to end.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera::config::EngineConfig;
use tessera::engine::{DocumentCommands, Engine, SearchCommands};
use tessera::index::{HnswConfig, HnswIndex, VectorIndex};
use tessera::query::SearchOptions;
use tessera::schema::{FieldSpec, IndexDefinition};
use tessera::types::{DistanceMetric, FieldValue, Fields};

const DIM: usize = 64;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn build_graph(vectors: &[Vec<f32>]) -> HnswIndex {
    let mut config = HnswConfig::new(DistanceMetric::Cosine);
    config.seed = Some(1);
    let mut index = HnswIndex::new(DIM, config);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(i as u32, v).unwrap();
    }
    index
}

fn bench_hnsw_insert(c: &mut Criterion) {
    let vectors = random_vectors(2_000, DIM, 7);
    c.bench_function("hnsw_insert_2k", |b| {
        b.iter(|| black_box(build_graph(&vectors)))
    });
}

fn bench_hnsw_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_search");
    let index = build_graph(&random_vectors(10_000, DIM, 7));
    let queries = random_vectors(100, DIM, 8);

    for ef in [10usize, 64, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(ef), &ef, |b, &ef| {
            let mut i = 0;
            b.iter(|| {
                let q = &queries[i % queries.len()];
                i += 1;
                black_box(index.search(q, 10, Some(ef), None, None).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_hybrid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_search");
    let engine = Engine::new(EngineConfig {
        hnsw_seed: Some(1),
        ..EngineConfig::default()
    });
    engine
        .define_index(
            IndexDefinition::new("idx:bench")
                .field(FieldSpec::tag("bucket"))
                .field(FieldSpec::vector("vec", DIM, DistanceMetric::Cosine)),
        )
        .unwrap();
    for (i, v) in random_vectors(10_000, DIM, 9).into_iter().enumerate() {
        let fields = Fields::from([
            ("bucket".to_string(), FieldValue::text(format!("b{}", i % 100))),
            ("vec".to_string(), FieldValue::Vector(v)),
        ]);
        engine.put(&format!("doc:{i}"), fields).unwrap();
    }
    let query = random_vectors(1, DIM, 10).remove(0);

    // 1% selectivity lands on the exact scan, the wide filter on the graph.
    for (label, filter) in [("narrow", "@bucket:{b7}"), ("wide", "-@bucket:{b7}"), ("none", "*")] {
        let q = format!("{filter}=>[KNN 10 @vec $q]");
        let opts = SearchOptions::new().param("q", query.clone());
        group.bench_function(label, |b| {
            b.iter(|| black_box(engine.search("idx:bench", &q, &opts).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hnsw_insert, bench_hnsw_search, bench_hybrid_search);
criterion_main!(benches);
