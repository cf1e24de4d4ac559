//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `TESSERA_*` environment variables (loaded from `.env` by the binary).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TesseraError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on `limit` for a single search page.
    pub max_limit: usize,
    /// Per-request timeout for searches, in milliseconds.
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8700,
            max_limit: 10_000,
            request_timeout_ms: 30_000,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Engine tuning. Vector field options override the HNSW defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_runtime: usize,
    pub hnsw_max_layers: usize,
    /// Fixed seed for HNSW level assignment. `None` seeds from entropy.
    pub hnsw_seed: Option<u64>,
    pub max_dimension: usize,
    /// Filtered KNN falls back to an exact scan at or below this many candidates.
    pub brute_force_threshold: usize,
    /// Stop words dropped by the text tokenizer.
    pub stop_words: Vec<String>,
}

pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_runtime: 10,
            hnsw_max_layers: 16,
            hnsw_seed: None,
            max_dimension: 32_768,
            brute_force_threshold: 1_000,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot directory. `None` keeps everything in memory only.
    pub data_dir: Option<PathBuf>,
    pub snapshot_on_shutdown: bool,
}

impl Config {
    /// Load config from an optional TOML file, then apply env overrides.
    ///
    /// Without an explicit path, `TESSERA_CONFIG` is consulted.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("TESSERA_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(&p).map_err(|e| {
                    TesseraError::Config(format!("failed to read {}: {e}", p.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| TesseraError::Config(e.to_string()))
    }

    /// Apply `TESSERA_*` overrides. The lookup is injected for testability.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TESSERA_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("TESSERA_PORT") {
            self.server.port = parse_env("TESSERA_PORT", &v)?;
        }
        if let Some(v) = lookup("TESSERA_MAX_LIMIT") {
            self.server.max_limit = parse_env("TESSERA_MAX_LIMIT", &v)?;
        }
        if let Some(v) = lookup("TESSERA_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TESSERA_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = lookup("TESSERA_HNSW_M") {
            self.engine.hnsw_m = parse_env("TESSERA_HNSW_M", &v)?;
        }
        if let Some(v) = lookup("TESSERA_HNSW_EF_RUNTIME") {
            self.engine.hnsw_ef_runtime = parse_env("TESSERA_HNSW_EF_RUNTIME", &v)?;
        }
        if let Some(v) = lookup("TESSERA_HNSW_SEED") {
            self.engine.hnsw_seed = Some(parse_env("TESSERA_HNSW_SEED", &v)?);
        }
        if let Some(v) = lookup("TESSERA_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(v));
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.hnsw_m < 2 {
            return Err(TesseraError::Config("engine.hnsw_m must be >= 2".into()));
        }
        if self.engine.hnsw_ef_construction == 0 {
            return Err(TesseraError::Config(
                "engine.hnsw_ef_construction must be > 0".into(),
            ));
        }
        if self.engine.hnsw_ef_runtime == 0 {
            return Err(TesseraError::Config(
                "engine.hnsw_ef_runtime must be > 0".into(),
            ));
        }
        if self.engine.hnsw_max_layers == 0 {
            return Err(TesseraError::Config(
                "engine.hnsw_max_layers must be > 0".into(),
            ));
        }
        if self.server.max_limit == 0 {
            return Err(TesseraError::Config("server.max_limit must be > 0".into()));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(TesseraError::Config(format!(
                "logging.format must be 'text' or 'json', got '{other}'"
            ))),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TesseraError::Config(format!("{name}: cannot parse '{raw}'")))
}
