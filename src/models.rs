use std::sync::Arc;

use crate::config::Config;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }
}

/// Body of a successful `POST /upload`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}
