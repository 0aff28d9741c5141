//! Shared application state handed to every Axum handler.

use crate::assembly::AssemblyService;
use crate::chunk_store::ChunkStore;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::registry::Registry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<Registry>,
    pub chunk_store: Arc<ChunkStore>,
    pub assembly: Arc<AssemblyService>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let registry = Registry::load(config.metadata_dir()).await?;
        let chunk_store = ChunkStore::new(config.chunks_dir()).await?;
        let assembly = AssemblyService::new(config.files_dir()).await?;

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            chunk_store: Arc::new(chunk_store),
            assembly: Arc::new(assembly),
        })
    }
}
