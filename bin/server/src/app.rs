//! Router assembly.

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, forward_auth};

/// Builds the router.
///
/// The proxy sends every request to the same handler, so there are no
/// routes; the fallback sees all paths and dispatches on the forwarded URI.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(forward_auth)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
