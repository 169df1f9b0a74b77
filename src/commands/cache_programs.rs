//! Usage: Management command used to cache program data.
//!
//! Requests every available program from the discovery service, caching each
//! in its own cache entry with an indefinite expiration. Meant to be run on a
//! scheduled basis; it should be the only code updating these cache entries.

use crate::domain::catalog::{self, WarmSummary};
use crate::infra::db::{self, Db};
use crate::infra::settings::{self, AppSettings};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::time::Duration;

const CATALOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns `None` when the catalog integration is disabled (nothing fetched).
pub(crate) async fn run(
    db: &Db,
    settings: &AppSettings,
    commit: bool,
) -> AppResult<Option<WarmSummary>> {
    let integration = {
        let db = db.clone();
        blocking::run("cache_programs_read_integration", move || {
            catalog::current(&db)
        })
        .await?
    };

    let (api_url, page_size) = match settings.catalog_api_url_override.as_deref() {
        Some(override_url) => {
            tracing::info!(api_url = override_url, "using catalog api url override");
            (
                override_url.to_string(),
                integration
                    .as_ref()
                    .map(|row| row.page_size)
                    .unwrap_or(catalog::DEFAULT_PAGE_SIZE),
            )
        }
        None => match integration {
            Some(row) if row.enabled => (row.internal_api_url.clone(), row.page_size),
            Some(_) => {
                tracing::warn!("catalog integration is disabled, skipping program cache warm");
                return Ok(None);
            }
            None => {
                tracing::warn!("catalog integration is not configured, skipping program cache warm");
                return Ok(None);
            }
        },
    };

    tracing::info!("Loading programs from the catalog.");

    let client = reqwest::Client::builder()
        .timeout(CATALOG_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: failed to build http client: {e}"))?;
    let programs = catalog::fetch_programs(&client, &api_url, page_size).await?;

    let summary = {
        let db = db.clone();
        blocking::run("cache_programs_warm", move || {
            catalog::warm_program_cache(&db, &programs, commit)
        })
        .await?
    };

    if summary.committed {
        tracing::info!(
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            "program cache warmed"
        );
    } else {
        tracing::info!(
            total = summary.total,
            would_write = summary.written,
            skipped = summary.skipped,
            "dry run complete, pass --commit to write the program cache"
        );
    }

    Ok(Some(summary))
}

/// CLI entry point: resolves settings and the default database.
pub async fn run_from_env(commit: bool) -> AppResult<Option<WarmSummary>> {
    let settings = blocking::run("cache_programs_read_settings", settings::read).await?;
    let db = blocking::run("cache_programs_db_init", db::init).await?;
    run(&db, &settings, commit).await
}
