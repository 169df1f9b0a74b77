//! Usage: Configuration accessors and gating switches for the block structure subsystem.

use crate::infra::db::Db;
use crate::infra::switches::{SwitchNamespace, SwitchStore};
use crate::shared::error::{db_err, AppResult};
use crate::shared::request_cache::RequestCache;
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Switch namespace for the block structure subsystem.
pub const SWITCH_NAMESPACE: SwitchNamespace = SwitchNamespace {
    namespace: "block_structure",
    log_prefix: "BlockStructure: ",
};

// Switches (independent toggles, off unless a row enables them)
pub const INVALIDATE_CACHE_ON_PUBLISH: &str = "invalidate_cache_on_publish";
pub const STORAGE_BACKING_FOR_CACHE: &str = "storage_backing_for_cache";
pub const RAISE_ERROR_WHEN_NOT_FOUND: &str = "raise_error_when_not_found";
pub const PRUNE_OLD_VERSIONS: &str = "prune_old_versions";

pub const DEFAULT_NUM_VERSIONS_TO_KEEP: i64 = 5;
pub const DEFAULT_CACHE_TIMEOUT_IN_SECONDS: i64 = 86400;

const REQUEST_CACHE_KEY_NUM_VERSIONS: &str = "block_structure.num_versions_to_keep";
const REQUEST_CACHE_KEY_CACHE_TIMEOUT: &str = "block_structure.cache_timeout_in_seconds";

/// One row of the append-only configuration table. The newest row is the
/// authoritative "current" configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BlockStructureConfig {
    pub id: i64,
    pub enabled: bool,
    pub num_versions_to_keep: Option<i64>,
    pub cache_timeout_in_seconds: Option<i64>,
    pub changed_at: i64,
}

pub fn current(db: &Db) -> AppResult<Option<BlockStructureConfig>> {
    let conn = db.open_connection()?;
    conn.query_row(
        "SELECT id, enabled, num_versions_to_keep, cache_timeout_in_seconds, changed_at \
         FROM block_structure_config ORDER BY id DESC LIMIT 1",
        [],
        |row| {
            Ok(BlockStructureConfig {
                id: row.get(0)?,
                enabled: row.get::<_, i64>(1)? != 0,
                num_versions_to_keep: row.get(2)?,
                cache_timeout_in_seconds: row.get(3)?,
                changed_at: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| db_err!("failed to read block structure config: {e}"))
}

/// Record a new current configuration (admin write; inserts, never updates).
pub fn update(
    db: &Db,
    num_versions_to_keep: Option<i64>,
    cache_timeout_in_seconds: Option<i64>,
) -> AppResult<BlockStructureConfig> {
    if let Some(num) = num_versions_to_keep {
        if num < 0 {
            return Err("SEC_INVALID_INPUT: num_versions_to_keep must be >= 0".into());
        }
    }
    if let Some(timeout) = cache_timeout_in_seconds {
        if timeout < 0 {
            return Err("SEC_INVALID_INPUT: cache_timeout_in_seconds must be >= 0".into());
        }
    }

    let now = now_unix_seconds();
    let conn = db.open_connection()?;
    conn.execute(
        "INSERT INTO block_structure_config \
         (enabled, num_versions_to_keep, cache_timeout_in_seconds, changed_at) \
         VALUES (1, ?1, ?2, ?3)",
        params![num_versions_to_keep, cache_timeout_in_seconds, now],
    )
    .map_err(|e| db_err!("failed to insert block structure config: {e}"))?;
    let id = conn.last_insert_rowid();

    tracing::info!(
        id,
        num_versions_to_keep,
        cache_timeout_in_seconds,
        "block structure config updated"
    );

    Ok(BlockStructureConfig {
        id,
        enabled: true,
        num_versions_to_keep,
        cache_timeout_in_seconds,
        changed_at: now,
    })
}

/// Current setting for the number of historical structure versions to retain,
/// memoized for the lifetime of `cache` (one inbound request).
pub fn num_versions_to_keep(db: &Db, cache: &RequestCache) -> AppResult<i64> {
    cache.get_or_try_init(REQUEST_CACHE_KEY_NUM_VERSIONS, || {
        Ok(current(db)?
            .and_then(|cfg| cfg.num_versions_to_keep)
            .unwrap_or(DEFAULT_NUM_VERSIONS_TO_KEEP))
    })
}

/// Current structure cache timeout in seconds, memoized like
/// [`num_versions_to_keep`].
pub fn cache_timeout_in_seconds(db: &Db, cache: &RequestCache) -> AppResult<i64> {
    cache.get_or_try_init(REQUEST_CACHE_KEY_CACHE_TIMEOUT, || {
        Ok(current(db)?
            .and_then(|cfg| cfg.cache_timeout_in_seconds)
            .unwrap_or(DEFAULT_CACHE_TIMEOUT_IN_SECONDS))
    })
}

/// Whether one of the block structure switches is enabled (off by default).
pub fn switch_is_enabled(db: &Db, switches: &SwitchStore, name: &str) -> AppResult<bool> {
    switches.is_enabled(db, &SWITCH_NAMESPACE, name)
}
