//! Usage: Baseline schema at version 1 for fresh installs.
//!
//! Configuration tables follow the append-only "current row" convention:
//! admin updates insert a new row and the newest row is authoritative.

use rusqlite::Connection;

pub(super) fn create_baseline_v1(conn: &mut Connection) -> Result<(), String> {
    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS block_structure_config (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  enabled INTEGER NOT NULL DEFAULT 1,
  num_versions_to_keep INTEGER,
  cache_timeout_in_seconds INTEGER,
  changed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS feature_switches (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  namespace TEXT NOT NULL,
  name TEXT NOT NULL,
  active INTEGER NOT NULL DEFAULT 0,
  note TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE(namespace, name)
);

CREATE TABLE IF NOT EXISTS catalog_integration (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  enabled INTEGER NOT NULL DEFAULT 0,
  internal_api_url TEXT NOT NULL,
  service_username TEXT NOT NULL DEFAULT '',
  page_size INTEGER NOT NULL DEFAULT 20,
  cache_ttl INTEGER NOT NULL DEFAULT 0,
  changed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS program_cache (
  cache_key TEXT PRIMARY KEY,
  payload_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS saml_configuration (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  enabled INTEGER NOT NULL DEFAULT 0,
  entity_id TEXT NOT NULL,
  public_cert TEXT NOT NULL DEFAULT '',
  private_key TEXT NOT NULL DEFAULT '',
  org_display_name TEXT NOT NULL DEFAULT '',
  changed_at INTEGER NOT NULL
);

PRAGMA user_version = 1;
"#,
    )
    .map_err(|e| format!("failed to create baseline schema: {e}"))?;

    tx.commit()
        .map_err(|e| format!("failed to commit baseline schema: {e}"))?;

    Ok(())
}
