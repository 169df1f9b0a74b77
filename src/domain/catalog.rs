//! Usage: Catalog (discovery service) integration config and program fetching.

use crate::infra::db::Db;
use crate::infra::program_cache;
use crate::shared::error::{db_err, AppResult};
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

const MAX_PROGRAM_PAGES: usize = 200;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// One row of the append-only catalog integration table ("current row"
/// convention: the newest row is authoritative).
#[derive(Debug, Clone, Serialize)]
pub struct CatalogIntegration {
    pub id: i64,
    pub enabled: bool,
    pub internal_api_url: String,
    pub service_username: String,
    pub page_size: i64,
    pub cache_ttl: i64,
    pub changed_at: i64,
}

pub fn current(db: &Db) -> AppResult<Option<CatalogIntegration>> {
    let conn = db.open_connection()?;
    conn.query_row(
        "SELECT id, enabled, internal_api_url, service_username, page_size, cache_ttl, changed_at \
         FROM catalog_integration ORDER BY id DESC LIMIT 1",
        [],
        |row| {
            Ok(CatalogIntegration {
                id: row.get(0)?,
                enabled: row.get::<_, i64>(1)? != 0,
                internal_api_url: row.get(2)?,
                service_username: row.get(3)?,
                page_size: row.get(4)?,
                cache_ttl: row.get(5)?,
                changed_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| db_err!("failed to read catalog integration: {e}"))
}

pub fn update(
    db: &Db,
    enabled: bool,
    internal_api_url: &str,
    service_username: &str,
    page_size: i64,
    cache_ttl: i64,
) -> AppResult<CatalogIntegration> {
    let internal_api_url = internal_api_url.trim().trim_end_matches('/').to_string();
    if internal_api_url.is_empty() {
        return Err("SEC_INVALID_INPUT: internal_api_url must not be empty".into());
    }
    // Validate early to avoid runtime fetch errors.
    reqwest::Url::parse(&internal_api_url)
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid internal_api_url={internal_api_url}: {e}"))?;
    if page_size < 1 {
        return Err("SEC_INVALID_INPUT: page_size must be >= 1".into());
    }
    if cache_ttl < 0 {
        return Err("SEC_INVALID_INPUT: cache_ttl must be >= 0".into());
    }

    let now = now_unix_seconds();
    let conn = db.open_connection()?;
    conn.execute(
        "INSERT INTO catalog_integration \
         (enabled, internal_api_url, service_username, page_size, cache_ttl, changed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            i64::from(enabled),
            internal_api_url,
            service_username.trim(),
            page_size,
            cache_ttl,
            now
        ],
    )
    .map_err(|e| db_err!("failed to insert catalog integration: {e}"))?;
    let id = conn.last_insert_rowid();

    tracing::info!(id, enabled, api_url = %internal_api_url, "catalog integration updated");

    Ok(CatalogIntegration {
        id,
        enabled,
        internal_api_url,
        service_username: service_username.trim().to_string(),
        page_size,
        cache_ttl,
        changed_at: now,
    })
}

/// Split one discovery API page into its results and the `next` page URL.
fn parse_programs_page(page: &serde_json::Value) -> AppResult<(Vec<serde_json::Value>, Option<String>)> {
    let results = page
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "SYSTEM_ERROR: catalog response missing results array".to_string())?
        .clone();
    let next = page
        .get("next")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    Ok((results, next))
}

/// Request every available program from the discovery service, following
/// paginated `next` links.
pub async fn fetch_programs(
    client: &reqwest::Client,
    api_url: &str,
    page_size: i64,
) -> AppResult<Vec<serde_json::Value>> {
    let base = api_url.trim_end_matches('/');
    let mut url = format!("{base}/programs/?exclude_utilities=1&page_size={page_size}");
    let mut programs: Vec<serde_json::Value> = Vec::new();

    for _ in 0..MAX_PROGRAM_PAGES {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: catalog request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "SYSTEM_ERROR: catalog returned status {status} for {url}"
            )
            .into());
        }

        let page: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: catalog response is not json: {e}"))?;
        let (results, next) = parse_programs_page(&page)?;
        tracing::debug!(page_results = results.len(), "catalog page fetched");
        programs.extend(results);

        match next {
            Some(next_url) => url = next_url,
            None => return Ok(programs),
        }
    }

    Err(format!("SYSTEM_ERROR: catalog pagination exceeded {MAX_PROGRAM_PAGES} pages").into())
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub uuids: Vec<String>,
    pub committed: bool,
}

/// Cache each program in its own entry plus one entry holding the uuid list.
/// Without `commit` this is a dry run that only reports what would be written.
pub fn warm_program_cache(
    db: &Db,
    programs: &[serde_json::Value],
    commit: bool,
) -> AppResult<WarmSummary> {
    let mut uuids: Vec<String> = Vec::with_capacity(programs.len());
    let mut written = 0usize;
    let mut skipped = 0usize;

    for program in programs {
        let Some(uuid) = program
            .get("uuid")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            skipped += 1;
            tracing::warn!("program without uuid skipped");
            continue;
        };

        if commit {
            program_cache::put(db, &program_cache::program_cache_key(uuid), program)?;
        }
        written += 1;
        uuids.push(uuid.to_string());
    }

    if commit {
        let uuid_list = serde_json::to_value(&uuids)
            .map_err(|e| format!("SYSTEM_ERROR: failed to serialize uuid list: {e}"))?;
        program_cache::put(db, program_cache::PROGRAM_UUIDS_CACHE_KEY, &uuid_list)?;
    }

    Ok(WarmSummary {
        total: programs.len(),
        written,
        skipped,
        uuids,
        committed: commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db;

    fn test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = db::init_at(&dir.path().join("catalog.db")).expect("init db");
        (dir, db)
    }

    // -- parse_programs_page --

    #[test]
    fn parse_programs_page_reads_results_and_next() {
        let page = serde_json::json!({
            "count": 3,
            "next": "http://catalog.local/api/v1/programs/?page=2",
            "results": [{"uuid": "a"}, {"uuid": "b"}]
        });
        let (results, next) = parse_programs_page(&page).expect("parse");
        assert_eq!(results.len(), 2);
        assert_eq!(
            next.as_deref(),
            Some("http://catalog.local/api/v1/programs/?page=2")
        );
    }

    #[test]
    fn parse_programs_page_treats_null_next_as_last_page() {
        let page = serde_json::json!({"count": 1, "next": null, "results": [{"uuid": "a"}]});
        let (results, next) = parse_programs_page(&page).expect("parse");
        assert_eq!(results.len(), 1);
        assert!(next.is_none());
    }

    #[test]
    fn parse_programs_page_rejects_missing_results() {
        let page = serde_json::json!({"count": 0});
        assert!(parse_programs_page(&page).is_err());
    }

    // -- update / current --

    #[test]
    fn current_returns_newest_row() {
        let (_dir, db) = test_db();
        update(&db, false, "http://old.local/api/v1", "worker", 20, 0).expect("first");
        update(&db, true, "http://catalog.local/api/v1", "worker", 50, 3600).expect("second");

        let row = current(&db).expect("read").expect("row");
        assert!(row.enabled);
        assert_eq!(row.internal_api_url, "http://catalog.local/api/v1");
        assert_eq!(row.page_size, 50);
    }

    #[test]
    fn update_rejects_bad_inputs() {
        let (_dir, db) = test_db();
        assert!(update(&db, true, "", "worker", 20, 0).is_err());
        assert!(update(&db, true, "not a url", "worker", 20, 0).is_err());
        assert!(update(&db, true, "http://ok.local", "worker", 0, 0).is_err());
        assert!(update(&db, true, "http://ok.local", "worker", 20, -1).is_err());
    }

    // -- warm_program_cache --

    fn sample_programs() -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({"uuid": "aaa", "title": "Data Science"}),
            serde_json::json!({"uuid": "bbb", "title": "Statistics"}),
            serde_json::json!({"title": "no uuid here"}),
        ]
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let (_dir, db) = test_db();
        let summary = warm_program_cache(&db, &sample_programs(), false).expect("warm");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.committed);
        assert_eq!(program_cache::entry_count(&db).expect("count"), 0);
    }

    #[test]
    fn commit_writes_per_program_entries_and_uuid_list() {
        let (_dir, db) = test_db();
        let summary = warm_program_cache(&db, &sample_programs(), true).expect("warm");
        assert_eq!(summary.written, 2);
        assert!(summary.committed);

        // Two program entries plus the uuid list.
        assert_eq!(program_cache::entry_count(&db).expect("count"), 3);
        let cached = program_cache::get(&db, "program.aaa")
            .expect("get")
            .expect("entry");
        assert_eq!(cached["title"], "Data Science");
        assert_eq!(
            program_cache::cached_program_uuids(&db).expect("uuids"),
            vec!["aaa".to_string(), "bbb".to_string()]
        );
    }
}
