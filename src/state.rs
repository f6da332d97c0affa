//! Shared state for services and routes: configuration store and connection pools.

use crate::config::ConfigStore;
use crate::sql::ConnectionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<dyn ConfigStore>,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: Arc<dyn ConfigStore>, connections: ConnectionRegistry) -> Self {
        AppState {
            config,
            connections: Arc::new(connections),
        }
    }
}
