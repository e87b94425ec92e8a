//! HTTP handlers for action invocation and declaration ingestion.

pub mod action;
pub mod config;
pub use action::*;
pub use config::*;
