//! Tessera: in-process document indexing and vector similarity search.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod metrics;
pub mod persistence;
pub mod query;
pub mod schema;
pub mod server;
pub mod store;
pub mod types;

pub use cancel::CancelToken;
pub use config::{Config, EngineConfig};
pub use engine::{DocumentCommands, Engine, SearchCommands, WriteMode};
pub use error::{Result, TesseraError};
pub use query::{QueryParam, SearchOptions};
pub use schema::{DocumentKind, FieldSpec, IndexDefinition, IndexInfo};
pub use types::{Document, DistanceMetric, FieldValue, Fields, GeoPoint, SearchHit, SearchResults};
