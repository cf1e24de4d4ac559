#![allow(dead_code)]

pub mod assertions;
pub mod vectors;

use tessera::config::EngineConfig;
use tessera::engine::Engine;
use tessera::schema::{FieldSpec, IndexDefinition};
use tessera::types::{DistanceMetric, FieldValue, Fields};

/// Engine with a fixed HNSW seed so graph-dependent results are reproducible.
pub fn seeded_engine() -> Engine {
    Engine::new(EngineConfig {
        hnsw_seed: Some(7),
        ..EngineConfig::default()
    })
}

/// `idx:products` over `product:*` keys: text name, tag category, numeric
/// price, geo store and a 3-dim L2 vector.
pub fn products_index() -> IndexDefinition {
    IndexDefinition::new("idx:products")
        .prefix("product:")
        .field(FieldSpec::text("name"))
        .field(FieldSpec::tag("category"))
        .field(FieldSpec::numeric("price"))
        .field(FieldSpec::geo("store"))
        .field(FieldSpec::vector("embedding", 3, DistanceMetric::L2))
}

pub fn product(name: &str, category: &str, price: f64, embedding: [f32; 3]) -> Fields {
    Fields::from([
        ("name".to_string(), FieldValue::text(name)),
        ("category".to_string(), FieldValue::text(category)),
        ("price".to_string(), FieldValue::Number(price)),
        ("embedding".to_string(), FieldValue::Vector(embedding.to_vec())),
    ])
}
