//! Shared application state for the canvas server.

use std::sync::Arc;

use canvas::engine::Engine;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Board, cooldown gate, subscriber registry and mutation pipeline.
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
