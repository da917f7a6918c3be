//! rollcalld — HTTP service that registers student faces and matches probe
//! images against the registered set.
//!
//! The binary in `main.rs` wires these components together; integration
//! tests drive the same router with a stub extractor.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use store::{JsonFileStore, RecordStore, StoreError};

use std::sync::Arc;

use rollcall_core::FaceExtractor;

/// Prepare the data directory, load the store, start the engine and build
/// the router.
pub async fn build_app(
    config: Config,
    extractor: Box<dyn FaceExtractor>,
) -> anyhow::Result<axum::Router> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let store = JsonFileStore::load(&config.store_path).await?;
    let engine = spawn_engine(extractor)?;
    let state = AppState::new(config, Arc::new(store), engine);

    Ok(create_router(state))
}
