//! Usage: Cache entries for catalog program data (indefinite expiration).
//!
//! Entries are written by the cache-programs management command, which is
//! meant to be the only writer, and read by catalog consumers.

use crate::infra::db::Db;
use crate::shared::error::{db_err, AppResult};
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, OptionalExtension};

pub const PROGRAM_UUIDS_CACHE_KEY: &str = "program.uuids";

pub fn program_cache_key(uuid: &str) -> String {
    format!("program.{uuid}")
}

pub fn put(db: &Db, cache_key: &str, payload: &serde_json::Value) -> AppResult<()> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize cache payload: {e}"))?;
    let conn = db.open_connection()?;
    conn.execute(
        r#"
INSERT INTO program_cache (cache_key, payload_json, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(cache_key)
DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at
"#,
        params![cache_key, payload_json, now_unix_seconds()],
    )
    .map_err(|e| db_err!("failed to write cache entry {cache_key}: {e}"))?;
    Ok(())
}

pub fn get(db: &Db, cache_key: &str) -> AppResult<Option<serde_json::Value>> {
    let conn = db.open_connection()?;
    let payload_json: Option<String> = conn
        .query_row(
            "SELECT payload_json FROM program_cache WHERE cache_key = ?1",
            params![cache_key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| db_err!("failed to read cache entry {cache_key}: {e}"))?;

    match payload_json {
        None => Ok(None),
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .map_err(|e| format!("SYSTEM_ERROR: corrupt cache entry {cache_key}: {e}"))?;
            Ok(Some(value))
        }
    }
}

/// The uuid list written alongside per-program entries; empty when never warmed.
pub fn cached_program_uuids(db: &Db) -> AppResult<Vec<String>> {
    match get(db, PROGRAM_UUIDS_CACHE_KEY)? {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| format!("SYSTEM_ERROR: corrupt program uuid list: {e}").into()),
    }
}

pub fn entry_count(db: &Db) -> AppResult<i64> {
    let conn = db.open_connection()?;
    conn.query_row("SELECT COUNT(*) FROM program_cache", [], |row| row.get(0))
        .map_err(|e| db_err!("failed to count cache entries: {e}"))
}
