//! Usage: Namespaced feature switches (default-off) with a short-lived read cache.
//!
//! Switches alter optional behavior without code changes. A switch that has no
//! row in the store is off. The store is an explicit value owned by the
//! application state and passed by reference; the per-namespace row cache is
//! the store's own policy (callers wanting request-lifetime staleness memoize
//! on top via `RequestCache`).

use crate::infra::db::Db;
use crate::shared::error::{db_err, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_seconds;
use rusqlite::params;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SWITCH_CACHE_TTL: Duration = Duration::from_secs(5);
const MAX_SWITCH_NAME_LEN: usize = 100;

/// A named switch namespace plus the prefix its decisions are logged with.
#[derive(Debug, Clone, Copy)]
pub struct SwitchNamespace {
    pub namespace: &'static str,
    pub log_prefix: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchRow {
    pub namespace: String,
    pub name: String,
    pub active: bool,
    pub note: Option<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
struct CachedNamespace {
    active: HashSet<String>,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
pub struct SwitchStore {
    cache: Mutex<HashMap<String, CachedNamespace>>,
}

fn validate_switch_ident(kind: &str, value: &str) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SWITCH_NAME_LEN {
        return Err(format!("SEC_INVALID_INPUT: invalid switch {kind}: {value:?}").into());
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
    {
        return Err(format!(
            "SEC_INVALID_INPUT: switch {kind} must be lowercase alphanumeric/underscore: {value:?}"
        )
        .into());
    }
    Ok(())
}

impl SwitchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is enabled inside `ns`. Missing rows read as disabled.
    pub fn is_enabled(&self, db: &Db, ns: &SwitchNamespace, name: &str) -> AppResult<bool> {
        validate_switch_ident("name", name)?;

        let active = self.load_active(db, ns.namespace)?;
        let enabled = active.contains(name);
        tracing::debug!(
            namespace = ns.namespace,
            switch = name,
            enabled,
            "{}switch consulted",
            ns.log_prefix
        );
        Ok(enabled)
    }

    /// Create or update a switch row and drop the namespace from the cache.
    pub fn set_active(
        &self,
        db: &Db,
        namespace: &str,
        name: &str,
        active: bool,
        note: Option<&str>,
    ) -> AppResult<SwitchRow> {
        validate_switch_ident("namespace", namespace)?;
        validate_switch_ident("name", name)?;

        let now = now_unix_seconds();
        let conn = db.open_connection()?;
        conn.execute(
            r#"
INSERT INTO feature_switches (namespace, name, active, note, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?5)
ON CONFLICT(namespace, name)
DO UPDATE SET active = excluded.active, note = excluded.note, updated_at = excluded.updated_at
"#,
            params![namespace, name, i64::from(active), note, now],
        )
        .map_err(|e| db_err!("failed to upsert switch {namespace}.{name}: {e}"))?;

        self.invalidate(namespace);
        tracing::info!(namespace, switch = name, active, "feature switch updated");

        Ok(SwitchRow {
            namespace: namespace.to_string(),
            name: name.to_string(),
            active,
            note: note.map(str::to_string),
            updated_at: now,
        })
    }

    pub fn list(&self, db: &Db, namespace: &str) -> AppResult<Vec<SwitchRow>> {
        validate_switch_ident("namespace", namespace)?;

        let conn = db.open_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT namespace, name, active, note, updated_at FROM feature_switches \
                 WHERE namespace = ?1 ORDER BY name",
            )
            .map_err(|e| db_err!("failed to prepare switch list: {e}"))?;
        let rows = stmt
            .query_map(params![namespace], |row| {
                Ok(SwitchRow {
                    namespace: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get::<_, i64>(2)? != 0,
                    note: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })
            .map_err(|e| db_err!("failed to list switches: {e}"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_err!("failed to read switch row: {e}"))?;
        Ok(rows)
    }

    pub fn invalidate(&self, namespace: &str) {
        self.cache.lock_or_recover().remove(namespace);
    }

    fn load_active(&self, db: &Db, namespace: &str) -> AppResult<HashSet<String>> {
        {
            let guard = self.cache.lock_or_recover();
            if let Some(cached) = guard.get(namespace) {
                if cached.loaded_at.elapsed() < SWITCH_CACHE_TTL {
                    return Ok(cached.active.clone());
                }
            }
        }

        let conn = db.open_connection()?;
        let mut stmt = conn
            .prepare("SELECT name FROM feature_switches WHERE namespace = ?1 AND active = 1")
            .map_err(|e| db_err!("failed to prepare switch query: {e}"))?;
        let active = stmt
            .query_map(params![namespace], |row| row.get::<_, String>(0))
            .map_err(|e| db_err!("failed to query switches: {e}"))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| db_err!("failed to read switch name: {e}"))?;

        self.cache.lock_or_recover().insert(
            namespace.to_string(),
            CachedNamespace {
                active: active.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(active)
    }
}
