//! Shared application state for axum handlers.

use std::sync::Arc;

use homewatch_app::ports::StatusProvider;

/// Application state shared across all axum handlers.
///
/// `Clone` is implemented manually so the provider itself does not need to
/// be `Clone`; only the `Arc` is cloned.
pub struct AppState<S> {
    /// Read-only view of the controller core.
    pub status: Arc<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            status: Arc::clone(&self.status),
        }
    }
}

impl<S: StatusProvider> AppState<S> {
    /// Create the state from a provider already shared with background tasks.
    pub fn new(status: Arc<S>) -> Self {
        Self { status }
    }
}
