pub mod config;
pub mod drafts;
pub mod dynamo;
pub mod error;
pub mod geometry;
pub mod plans;
pub mod policy;
pub mod repository;
pub mod s3;
pub mod store;
pub mod types;
pub mod users;

use std::sync::Arc;

use config::Config;

/// Shared application state
pub struct AppState<S, B> {
    pub store: Arc<S>,
    pub blobs: B,
    pub config: Config,
}

impl<S, B> AppState<S, B> {
    pub fn new(store: S, blobs: B, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(store),
            blobs,
            config,
        })
    }
}
