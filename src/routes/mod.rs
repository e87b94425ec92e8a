mod action;
mod common;
mod config;

pub use action::{action_routes, MAX_ACTION_BODY_BYTES};
pub use common::{common_routes, common_routes_with_ready};
pub use config::config_routes;
