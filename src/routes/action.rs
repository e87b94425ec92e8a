//! Action invocation route.

use crate::handlers::action::invoke_action;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::post, Router};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted invocation body. Import dumps arrive inline as data URLs.
pub const MAX_ACTION_BODY_BYTES: usize = 16 * 1024 * 1024;

/// `POST /action/:typename/:action_name`.
pub fn action_routes(state: AppState) -> Router {
    Router::new()
        .route("/action/:typename/:action_name", post(invoke_action))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_ACTION_BODY_BYTES)),
        )
        .with_state(state)
}
