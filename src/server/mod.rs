pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, TesseraError};

/// Shared application state injected into all handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: Config) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Run a synchronous engine call on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| TesseraError::Internal(format!("engine task failed: {e}")))?
    }
}
