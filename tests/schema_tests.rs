use serde_json::json;

use tessera::error::TesseraError;
use tessera::schema::{definition_from_json, DocumentKind, FieldKind, FieldSpec, IndexDefinition};
use tessera::types::DistanceMetric;

fn products() -> IndexDefinition {
    IndexDefinition::new("idx:products")
        .prefix("product:")
        .field(FieldSpec::text("name"))
        .field(FieldSpec::tag("category"))
        .field(FieldSpec::numeric("price"))
        .field(FieldSpec::vector("embedding", 4, DistanceMetric::Cosine))
}

#[test]
fn test_valid_definition() {
    assert!(products().validate(1024).is_ok());
}

#[test]
fn test_prefix_matching() {
    let def = products();
    assert!(def.matches_key("product:1"));
    assert!(!def.matches_key("user:1"));
    assert!(IndexDefinition::new("all").matches_key("anything"));
}

#[test]
fn test_rejects_zero_dimension() {
    let def = IndexDefinition::new("v").field(FieldSpec::vector("v", 0, DistanceMetric::L2));
    assert!(matches!(
        def.validate(1024),
        Err(TesseraError::InvalidFieldSpec(_))
    ));
}

#[test]
fn test_rejects_duplicate_names() {
    let def = IndexDefinition::new("dup")
        .field(FieldSpec::text("a"))
        .field(FieldSpec::numeric("b").alias("a"));
    assert!(def.validate(1024).is_err());
}

#[test]
fn test_rejects_json_path_without_root() {
    let def = IndexDefinition::new("j")
        .on(DocumentKind::Json)
        .field(FieldSpec::text("name"));
    assert!(def.validate(1024).is_err());
}

#[test]
fn test_from_json_rejects_unknown_type_and_metric() {
    let unknown_type = json!({
        "name": "x",
        "fields": [{ "path": "a", "type": "blob" }]
    });
    assert!(matches!(
        definition_from_json(unknown_type),
        Err(TesseraError::InvalidFieldSpec(_))
    ));

    let bad_metric = json!({
        "name": "x",
        "fields": [{ "path": "v", "type": "vector", "dim": 3, "distance_metric": "hamming" }]
    });
    assert!(definition_from_json(bad_metric).is_err());

    let negative_dim = json!({
        "name": "x",
        "fields": [{ "path": "v", "type": "vector", "dim": -3, "distance_metric": "l2" }]
    });
    assert!(definition_from_json(negative_dim).is_err());
}

#[test]
fn test_from_json_round_trips_options() {
    let def = definition_from_json(json!({
        "name": "idx:docs",
        "on": "json",
        "prefixes": ["doc:"],
        "fields": [
            { "path": "$.title", "alias": "title", "type": "text", "weight": 2.0 },
            { "path": "$.seasons", "alias": "seasons", "type": "tag", "separator": ";" },
            { "path": "$.vec", "alias": "vec", "type": "vector", "algorithm": "flat",
              "dim": 8, "distance_metric": "ip" }
        ]
    }))
    .unwrap();
    assert_eq!(def.on, DocumentKind::Json);
    assert_eq!(def.field_by_name("title").unwrap().path, "$.title");
    assert!(matches!(
        def.field_by_name("seasons").unwrap().kind,
        FieldKind::Tag { separator: ';', .. }
    ));
    assert!(def.validate(1024).is_ok());
}
