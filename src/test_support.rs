//! Usage: Public test helpers for integration tests.

use crate::domain::{block_structure, catalog, saml};
use crate::gateway::manager::{self, GatewayAppState, RunningGateway};
use crate::infra::{db, program_cache, settings};
use crate::shared::error::AppResult;
use crate::shared::request_cache::RequestCache;
use crate::shared::time::now_unix_seconds;
use axum::extract::{Host, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

fn serialize_json(value: impl serde::Serialize) -> AppResult<serde_json::Value> {
    Ok(serde_json::to_value(value)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize json: {e}"))?)
}

fn test_runtime() -> AppResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: failed to build tokio runtime: {e}").into())
}

pub fn app_data_dir() -> AppResult<PathBuf> {
    crate::infra::app_paths::app_data_dir()
}

pub fn db_path() -> AppResult<PathBuf> {
    db::db_path()
}

pub fn init_db() -> AppResult<()> {
    db::init().map(|_| ())
}

// -- settings --

pub fn settings_get_json() -> AppResult<serde_json::Value> {
    serialize_json(settings::read()?)
}

pub fn settings_set_json(value: serde_json::Value) -> AppResult<serde_json::Value> {
    let parsed: settings::AppSettings = serde_json::from_value(value)
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid settings json: {e}"))?;
    serialize_json(settings::write(&parsed)?)
}

/// Current settings with the browser-test profile applied (not persisted).
pub fn browser_test_profile_json() -> AppResult<serde_json::Value> {
    let mut current = settings::read()?;
    settings::browser_test_overrides(&mut current);
    serialize_json(current)
}

// -- block structure config --

pub fn block_structure_update(
    num_versions_to_keep: Option<i64>,
    cache_timeout_in_seconds: Option<i64>,
) -> AppResult<()> {
    let db = db::init()?;
    block_structure::update(&db, num_versions_to_keep, cache_timeout_in_seconds).map(|_| ())
}

/// Both accessors read through one fresh request cache, as one request sees them.
pub fn block_structure_effective_json() -> AppResult<serde_json::Value> {
    let db = db::init()?;
    let request_cache = RequestCache::new();
    serialize_json(serde_json::json!({
        "num_versions_to_keep": block_structure::num_versions_to_keep(&db, &request_cache)?,
        "cache_timeout_in_seconds": block_structure::cache_timeout_in_seconds(&db, &request_cache)?,
    }))
}

// -- saml / catalog config rows --

pub fn saml_update(enabled: bool, entity_id: &str, public_cert: &str) -> AppResult<()> {
    let db = db::init()?;
    saml::update(&db, enabled, entity_id, public_cert, "", "Campus Hub Test", "").map(|_| ())
}

pub fn catalog_update(enabled: bool, internal_api_url: &str, page_size: i64) -> AppResult<()> {
    let db = db::init()?;
    catalog::update(&db, enabled, internal_api_url, "catalog_worker", page_size, 0).map(|_| ())
}

// -- program cache --

pub fn program_cache_entry_count() -> AppResult<i64> {
    let db = db::init()?;
    program_cache::entry_count(&db)
}

pub fn program_cache_get_json(cache_key: &str) -> AppResult<Option<serde_json::Value>> {
    let db = db::init()?;
    program_cache::get(&db, cache_key)
}

pub fn cached_program_uuids() -> AppResult<Vec<String>> {
    let db = db::init()?;
    program_cache::cached_program_uuids(&db)
}

// -- gateway round-trips --

#[derive(Debug, Clone)]
pub struct HttpProbe {
    pub status: u16,
    pub content_type: String,
    pub location: String,
    pub body: String,
}

/// A gateway bound to an ephemeral port, with direct access to the same
/// state the handlers see (entry store, switch store, db).
pub struct TestGateway {
    rt: tokio::runtime::Runtime,
    state: GatewayAppState,
    running: Option<RunningGateway>,
    client: reqwest::Client,
}

impl TestGateway {
    pub fn start() -> AppResult<Self> {
        let rt = test_runtime()?;
        let db = db::init()?;
        let state = GatewayAppState::new(db);
        let running = rt.block_on(manager::spawn(state.clone(), 0))?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: failed to build http client: {e}"))?;

        Ok(Self {
            rt,
            state,
            running: Some(running),
            client,
        })
    }

    pub fn base_url(&self) -> String {
        self.running
            .as_ref()
            .map(|r| r.base_url())
            .unwrap_or_default()
    }

    pub fn get(&self, path_and_query: &str) -> AppResult<HttpProbe> {
        let url = format!("{}{path_and_query}", self.base_url());
        self.rt.block_on(async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: request to {url} failed: {e}"))?;

            let status = response.status().as_u16();
            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            let content_type = header("content-type");
            let location = header("location");
            let body = response
                .text()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: failed to read response body: {e}"))?;

            Ok(HttpProbe {
                status,
                content_type,
                location,
                body,
            })
        })
    }

    /// Register a pipeline payload in the live entry store; returns the token.
    pub fn register_entry(
        &self,
        post_url: &str,
        user_data: serde_json::Value,
    ) -> AppResult<String> {
        let secret_key = settings::read()?.secret_key;
        self.state
            .entry_store
            .register(post_url, &user_data, &secret_key, now_unix_seconds())
    }

    /// Flip a switch through the live store so its cache is invalidated.
    pub fn set_switch(&self, namespace: &str, name: &str, active: bool) -> AppResult<()> {
        self.state
            .switches
            .set_active(&self.state.db, namespace, name, active, None)
            .map(|_| ())
    }

    pub fn update_block_structure(
        &self,
        num_versions_to_keep: Option<i64>,
        cache_timeout_in_seconds: Option<i64>,
    ) -> AppResult<()> {
        block_structure::update(&self.state.db, num_versions_to_keep, cache_timeout_in_seconds)
            .map(|_| ())
    }

    pub fn update_saml(&self, enabled: bool, entity_id: &str, public_cert: &str) -> AppResult<()> {
        saml::update(
            &self.state.db,
            enabled,
            entity_id,
            public_cert,
            "",
            "Campus Hub Test",
            "tech@campus.test",
        )
        .map(|_| ())
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            self.rt.block_on(running.shutdown());
        }
    }
}

// -- catalog stub + cache-programs command --

#[derive(Clone)]
struct CatalogStubState {
    programs: Arc<Vec<serde_json::Value>>,
    page_size: usize,
}

async fn catalog_stub_programs(
    State(stub): State<CatalogStubState>,
    Host(host): Host,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let page: usize = params
        .get("page")
        .and_then(|v| v.parse().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(1);
    let start = (page - 1) * stub.page_size;
    let end = (start + stub.page_size).min(stub.programs.len());
    let results: Vec<serde_json::Value> = stub
        .programs
        .get(start..end)
        .unwrap_or_default()
        .to_vec();

    let next = if end < stub.programs.len() {
        serde_json::Value::String(format!(
            "http://{host}/programs/?exclude_utilities=1&page_size={}&page={}",
            stub.page_size,
            page + 1
        ))
    } else {
        serde_json::Value::Null
    };

    Json(serde_json::json!({
        "count": stub.programs.len(),
        "next": next,
        "results": results,
    }))
}

/// Run the cache-programs command against an in-process catalog stub serving
/// `programs` with real pagination. Returns the warm summary as JSON.
pub fn cache_programs_with_stub(
    programs: Vec<serde_json::Value>,
    page_size: i64,
    commit: bool,
) -> AppResult<serde_json::Value> {
    let rt = test_runtime()?;
    let db = db::init()?;

    rt.block_on(async {
        let stub_state = CatalogStubState {
            programs: Arc::new(programs),
            page_size: usize::try_from(page_size.max(1)).unwrap_or(1),
        };
        let router = Router::new()
            .route("/programs/", get(catalog_stub_programs))
            .with_state(stub_state);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| format!("SYSTEM_ERROR: catalog stub bind failed: {e}"))?;
        let port = listener
            .local_addr()
            .map_err(|e| format!("SYSTEM_ERROR: catalog stub local_addr failed: {e}"))?
            .port();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let stub_url = format!("http://127.0.0.1:{port}");
        catalog::update(&db, true, &stub_url, "catalog_worker", page_size, 0)?;

        let settings = settings::read()?;
        let summary = crate::commands::cache_programs::run(&db, &settings, commit).await;

        let _ = shutdown_tx.send(());
        let _ = server.await;

        serialize_json(summary?)
    })
}

/// Run the cache-programs command with no catalog integration configured.
pub fn cache_programs_unconfigured(commit: bool) -> AppResult<serde_json::Value> {
    let rt = test_runtime()?;
    let db = db::init()?;
    let settings = settings::read()?;
    let summary = rt.block_on(crate::commands::cache_programs::run(&db, &settings, commit))?;
    serialize_json(summary)
}

/// Run the cache-programs command with the integration row present but disabled.
pub fn cache_programs_disabled(commit: bool) -> AppResult<serde_json::Value> {
    let rt = test_runtime()?;
    let db = db::init()?;
    catalog::update(&db, false, "http://catalog.invalid/api/v1", "catalog_worker", 20, 0)?;
    let settings = settings::read()?;
    let summary = rt.block_on(crate::commands::cache_programs::run(&db, &settings, commit))?;
    serialize_json(summary)
}
