//! Shared state handed to every request handler.

use std::sync::Arc;

use rollcall_core::Matcher;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub engine: EngineHandle,
    pub matcher: Arc<dyn Matcher>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>, engine: EngineHandle) -> Self {
        let matcher: Arc<dyn Matcher> = Arc::from(config.match_strategy.matcher());
        Self {
            config: Arc::new(config),
            store,
            engine,
            matcher,
        }
    }
}
