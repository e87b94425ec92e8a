//! Health, readiness and version routes.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
    /// Declarations skipped by the last build.
    diagnostics: usize,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// 503 until the database answers. Skipped declarations do not make the engine unready.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let diagnostics = state.snapshot().diagnostics.len();
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ok",
                database: "ok",
                diagnostics,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyBody {
                    status: "degraded",
                    database: "unavailable",
                    diagnostics,
                }),
            )
        }
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Serialize)]
struct InfoBody {
    name: &'static str,
    version: &'static str,
    tables: usize,
    actions: usize,
    diagnostics: usize,
}

async fn info(State(state): State<AppState>) -> Json<InfoBody> {
    let snapshot = state.snapshot();
    Json(InfoBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        tables: snapshot.schema.tables.len(),
        actions: snapshot.actions.len(),
        diagnostics: snapshot.diagnostics.len(),
    })
}

/// Stateless routes: GET /health, GET /version, GET /info (name and version only).
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/info", get(version))
}

/// Adds GET /ready (database ping) and a GET /info that reports the loaded snapshot.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/info", get(info))
        .with_state(state)
}
