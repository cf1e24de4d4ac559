use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TesseraError};

/// A unique identifier for a document in the store.
pub type DocumentKey = String;

/// Field name -> typed value. Ordered so snapshots and responses are stable.
pub type Fields = BTreeMap<String, FieldValue>;

/// A (longitude, latitude) pair. Longitude always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Typed field values a document can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Tags(Vec<String>),
    Vector(Vec<f32>),
    Geo(GeoPoint),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Tags(tags.into_iter().map(Into::into).collect())
    }

    /// Reject NaN and infinite components. JSON snapshots and responses
    /// cannot represent them.
    pub fn check_finite(&self, field: &str) -> Result<()> {
        let finite = match self {
            FieldValue::Number(n) => n.is_finite(),
            FieldValue::Vector(v) => v.iter().all(|x| x.is_finite()),
            FieldValue::Geo(p) => p.lon.is_finite() && p.lat.is_finite(),
            FieldValue::Text(_) | FieldValue::Tags(_) => true,
        };
        if finite {
            Ok(())
        } else {
            Err(TesseraError::invalid_value(
                field,
                format!("{} value must be finite", self.kind()),
            ))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
            FieldValue::Tags(_) => "tags",
            FieldValue::Vector(_) => "vector",
            FieldValue::Geo(_) => "geo",
        }
    }
}

/// A stored document: its key, current version and full field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: DocumentKey,
    pub version: u64,
    pub fields: Fields,
}

/// Distance metric for vector comparison. Lower distance means more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    L2,
    #[serde(alias = "ip")]
    InnerProduct,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::L2 => write!(f, "l2"),
            DistanceMetric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" => Ok(DistanceMetric::InnerProduct),
            other => Err(TesseraError::InvalidFieldSpec(format!(
                "unsupported distance metric '{other}' (expected cosine, l2 or ip)"
            ))),
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: DocumentKey,
    /// Text relevance (higher is better) or KNN distance (lower is better).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub fields: Fields,
}

/// A page of search hits plus the number of matches before paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn keys(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.key.as_str()).collect()
    }
}

/// Check every value of a document before it is stored.
pub fn check_fields(fields: &Fields) -> Result<()> {
    fields
        .iter()
        .try_for_each(|(name, value)| value.check_finite(name))
}

/// Flatten a JSON document into typed fields keyed by JSON path (`$.a.b`).
///
/// Strings become text, numbers become numbers, arrays of strings become tag
/// sets, arrays of numbers become vectors and `{"lon", "lat"}` objects become
/// geo points. Nulls are skipped.
pub fn fields_from_json(value: &serde_json::Value) -> Result<Fields> {
    let mut fields = Fields::new();
    match value {
        serde_json::Value::Object(_) => flatten_json("$", value, &mut fields)?,
        _ => {
            return Err(TesseraError::invalid_value(
                "$",
                "JSON document root must be an object",
            ))
        }
    }
    Ok(fields)
}

fn flatten_json(path: &str, value: &serde_json::Value, out: &mut Fields) -> Result<()> {
    use serde_json::Value;

    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(path.to_string(), FieldValue::Text(b.to_string()));
        }
        Value::Number(n) => {
            let v = n
                .as_f64()
                .ok_or_else(|| TesseraError::invalid_value(path, "number out of range"))?;
            out.insert(path.to_string(), FieldValue::Number(v));
        }
        Value::String(s) => {
            out.insert(path.to_string(), FieldValue::Text(s.clone()));
        }
        Value::Object(map) => {
            if let Some(point) = as_geo_object(map) {
                out.insert(path.to_string(), FieldValue::Geo(point));
                return Ok(());
            }
            for (k, v) in map {
                flatten_json(&format!("{path}.{k}"), v, out)?;
            }
        }
        Value::Array(items) => {
            if items.iter().all(Value::is_string) {
                let tags = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                out.insert(path.to_string(), FieldValue::Tags(tags));
            } else if items.iter().all(Value::is_number) {
                let vector = items
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                out.insert(path.to_string(), FieldValue::Vector(vector));
            } else {
                return Err(TesseraError::invalid_value(
                    path,
                    "arrays must hold only strings or only numbers",
                ));
            }
        }
    }
    Ok(())
}

fn as_geo_object(map: &serde_json::Map<String, serde_json::Value>) -> Option<GeoPoint> {
    if map.len() != 2 {
        return None;
    }
    let lon = map.get("lon")?.as_f64()?;
    let lat = map.get("lat")?.as_f64()?;
    Some(GeoPoint { lon, lat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_json() {
        let doc = json!({
            "name": "Noise-cancelling Bluetooth headphones",
            "price": 99.98,
            "meta": { "seasons": ["winter", "summer"], "stock": 12 },
            "embedding": [0.1, 0.2, 0.3],
            "location": { "lon": -122.41, "lat": 37.77 },
            "discontinued": null
        });
        let fields = fields_from_json(&doc).unwrap();

        assert_eq!(
            fields.get("$.name"),
            Some(&FieldValue::text("Noise-cancelling Bluetooth headphones"))
        );
        assert_eq!(fields.get("$.price"), Some(&FieldValue::Number(99.98)));
        assert_eq!(
            fields.get("$.meta.seasons"),
            Some(&FieldValue::tags(["winter", "summer"]))
        );
        assert_eq!(fields.get("$.meta.stock"), Some(&FieldValue::Number(12.0)));
        assert_eq!(
            fields.get("$.embedding"),
            Some(&FieldValue::Vector(vec![0.1, 0.2, 0.3]))
        );
        assert_eq!(
            fields.get("$.location"),
            Some(&FieldValue::Geo(GeoPoint::new(-122.41, 37.77)))
        );
        assert!(!fields.contains_key("$.discontinued"));
    }

    #[test]
    fn test_flatten_rejects_mixed_arrays_and_scalars() {
        assert!(fields_from_json(&json!({ "a": ["x", 1] })).is_err());
        assert!(fields_from_json(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("COSINE".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!("IP".parse::<DistanceMetric>().unwrap(), DistanceMetric::InnerProduct);
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        assert!(FieldValue::Number(f64::NAN).check_finite("n").is_err());
        assert!(FieldValue::Vector(vec![0.1, f32::INFINITY]).check_finite("v").is_err());
        assert!(FieldValue::Geo(GeoPoint::new(f64::NAN, 1.0)).check_finite("g").is_err());
        assert!(FieldValue::Number(-0.0).check_finite("n").is_ok());

        // 1e300 overflows f32 when flattened into a vector.
        let fields = fields_from_json(&json!({ "v": [1e300, 0.0] })).unwrap();
        assert!(matches!(
            check_fields(&fields),
            Err(TesseraError::InvalidFieldValue { field, .. }) if field == "$.v"
        ));
    }
}
