//! Declaration routes: POST replaces one kind and reloads, GET lists it.

use crate::handlers::config::{
    get_actions, get_relations, get_snapshot, get_tables, post_actions, post_reload, post_relations, post_tables,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn config_routes(state: AppState) -> Router {
    Router::new()
        .route("/config/tables", post(post_tables).get(get_tables))
        .route("/config/relations", post(post_relations).get(get_relations))
        .route("/config/actions", post(post_actions).get(get_actions))
        .route("/config/snapshot", get(get_snapshot))
        .route("/config/reload", post(post_reload))
        .with_state(state)
}
