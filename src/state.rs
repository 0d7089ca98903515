use std::sync::Arc;

use crate::config::Config;
use crate::db::DocumentStore;
use crate::ws::GroupRegistry;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<GroupRegistry>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(GroupRegistry::new()),
        }
    }
}
