use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::domain::block_structure;
use crate::shared::blocking;
use crate::shared::error::AppResult;
use crate::shared::request_cache::RequestCache;
use crate::shared::time::now_unix_seconds;

use super::manager::GatewayAppState;
use super::sso;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    version: &'static str,
    ts: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "campus-hub",
        version: env!("CARGO_PKG_VERSION"),
        ts: now_unix_seconds(),
    })
}

async fn root() -> &'static str {
    "Campus Hub is running"
}

#[derive(Debug, Serialize)]
struct BlockStructureConfigResponse {
    num_versions_to_keep: i64,
    cache_timeout_in_seconds: i64,
    switches: Vec<SwitchState>,
}

#[derive(Debug, Serialize)]
struct SwitchState {
    name: &'static str,
    enabled: bool,
}

/// Effective block structure configuration, as the subsystem would see it for
/// one request: both tunables go through a request-scoped cache, the switches
/// through the switch store.
async fn block_structure_config(State(state): State<GatewayAppState>) -> Response {
    let db = state.db.clone();
    let switches = state.switches.clone();
    let result = blocking::run(
        "block_structure_config",
        move || -> AppResult<BlockStructureConfigResponse> {
            let request_cache = RequestCache::new();
            let num_versions_to_keep =
                block_structure::num_versions_to_keep(&db, &request_cache)?;
            let cache_timeout_in_seconds =
                block_structure::cache_timeout_in_seconds(&db, &request_cache)?;

            let mut switch_states = Vec::new();
            for name in [
                block_structure::INVALIDATE_CACHE_ON_PUBLISH,
                block_structure::STORAGE_BACKING_FOR_CACHE,
                block_structure::RAISE_ERROR_WHEN_NOT_FOUND,
                block_structure::PRUNE_OLD_VERSIONS,
            ] {
                switch_states.push(SwitchState {
                    name,
                    enabled: block_structure::switch_is_enabled(&db, &switches, name)?,
                });
            }

            Ok(BlockStructureConfigResponse {
                num_versions_to_keep,
                cache_timeout_in_seconds,
                switches: switch_states,
            })
        },
    )
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            tracing::error!("block structure config read failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

pub(super) fn build_router(state: GatewayAppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/saml/metadata.xml", get(sso::saml_metadata))
        .route("/auth/inactive", get(sso::inactive_user))
        .route("/auth/custom-entry", get(sso::custom_auth_entry))
        .route("/config/block-structure", get(block_structure_config))
        .with_state(state)
}
