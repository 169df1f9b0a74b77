//! Usage: SQLite connection setup, schema migrations, and common DB helpers.

mod migrations;

use crate::infra::app_paths;
use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "campus-hub.db";
const BUSY_TIMEOUT_DEFAULT: Duration = Duration::from_millis(2000);
const POOL_MAX_SIZE_DEFAULT: u32 = 8;
const POOL_MIN_IDLE_DEFAULT: u32 = 1;
const POOL_CONNECTION_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);
const PRAGMA_SYNCHRONOUS_DEFAULT: &str = "NORMAL";
const PRAGMA_MMAP_SIZE_DEFAULT: i64 = 268_435_456;
const DB_OPTIMIZE_STAMP_FILE_NAME: &str = "db_optimize.stamp";
const DB_OPTIMIZE_MIN_INTERVAL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
struct DbRuntimeConfig {
    busy_timeout: Duration,
    pool_max_size: u32,
    pool_min_idle: u32,
    pool_connection_timeout: Duration,
    pragma_synchronous: String,
    pragma_mmap_size: i64,
}

impl DbRuntimeConfig {
    fn from_env() -> Self {
        Self::from_env_get(|key| env::var(key).ok())
    }

    fn from_env_get(mut get: impl FnMut(&str) -> Option<String>) -> Self {
        let busy_timeout = get("CAMPUS_DB_BUSY_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(BUSY_TIMEOUT_DEFAULT);

        let pool_max_size = get("CAMPUS_DB_POOL_MAX_SIZE")
            .as_deref()
            .and_then(parse_u32_trimmed)
            .filter(|v| *v > 0)
            .unwrap_or(POOL_MAX_SIZE_DEFAULT);

        let pool_min_idle_raw = get("CAMPUS_DB_POOL_MIN_IDLE")
            .as_deref()
            .and_then(parse_u32_trimmed)
            .unwrap_or(POOL_MIN_IDLE_DEFAULT);
        let pool_min_idle = pool_min_idle_raw.min(pool_max_size);

        let pool_connection_timeout = get("CAMPUS_DB_POOL_CONNECTION_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(POOL_CONNECTION_TIMEOUT_DEFAULT);

        let pragma_synchronous = get("CAMPUS_DB_PRAGMA_SYNCHRONOUS")
            .as_deref()
            .and_then(parse_pragma_synchronous)
            .unwrap_or_else(|| PRAGMA_SYNCHRONOUS_DEFAULT.to_string());

        let pragma_mmap_size = get("CAMPUS_DB_PRAGMA_MMAP_SIZE")
            .as_deref()
            .and_then(parse_i64_trimmed)
            .filter(|v| *v >= 0)
            .unwrap_or(PRAGMA_MMAP_SIZE_DEFAULT);

        Self {
            busy_timeout,
            pool_max_size,
            pool_min_idle,
            pool_connection_timeout,
            pragma_synchronous,
            pragma_mmap_size,
        }
    }
}

fn parse_u32_trimmed(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u32>().ok()
}

fn parse_u64_trimmed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn parse_i64_trimmed(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

fn parse_pragma_synchronous(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "OFF" | "NORMAL" | "FULL" | "EXTRA" => Some(normalized),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub fn open_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| db_err!("failed to get connection from pool: {e}"))
    }
}

pub fn db_path() -> AppResult<PathBuf> {
    Ok(app_paths::app_data_dir()?.join(DB_FILE_NAME))
}

pub fn init() -> AppResult<Db> {
    init_at(&db_path()?)
}

pub fn init_at(path: &Path) -> AppResult<Db> {
    let path_hint = path.display().to_string();

    let config = DbRuntimeConfig::from_env();
    if config.pool_min_idle < POOL_MIN_IDLE_DEFAULT {
        tracing::warn!(
            pool_min_idle = config.pool_min_idle,
            pool_min_idle_default = POOL_MIN_IDLE_DEFAULT,
            "sqlite pool min idle lowered from default"
        );
    }
    tracing::debug!(
        busy_timeout_ms = config.busy_timeout.as_millis(),
        pool_max_size = config.pool_max_size,
        pool_min_idle = config.pool_min_idle,
        pool_connection_timeout_ms = config.pool_connection_timeout.as_millis(),
        pragma_synchronous = %config.pragma_synchronous,
        pragma_mmap_size = config.pragma_mmap_size,
        db_optimize_enabled = db_optimize_enabled(),
        "sqlite runtime config"
    );

    let manager = SqliteConnectionManager::file(path).with_init({
        let config = config.clone();
        move |conn| {
            conn.busy_timeout(config.busy_timeout)?;
            configure_connection(conn, &config)
        }
    });

    let pool = Pool::builder()
        .max_size(config.pool_max_size)
        .min_idle(Some(config.pool_min_idle))
        .connection_timeout(config.pool_connection_timeout)
        .build(manager)
        .map_err(|e| db_err!("failed to create db pool: {e}"))?;
    let mut conn = pool
        .get()
        .map_err(|e| db_err!("failed to get startup connection: {e}"))?;

    migrations::apply_migrations(&mut conn)
        .map_err(|e| format!("sqlite migration failed at {path_hint}: {e}"))?;

    maybe_run_db_optimize(path, &conn);

    Ok(Db { pool })
}

fn db_optimize_enabled() -> bool {
    env::var("CAMPUS_DB_ENABLE_OPTIMIZE")
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| v == "1" || v == "true" || v == "yes")
}

fn maybe_run_db_optimize(db_path: &Path, conn: &Connection) {
    if !db_optimize_enabled() {
        return;
    }

    let now = now_unix_seconds();
    let stamp_path = match db_path.parent() {
        Some(dir) => dir.join(DB_OPTIMIZE_STAMP_FILE_NAME),
        None => {
            tracing::warn!("sqlite optimize skipped: db path has no parent dir");
            return;
        }
    };

    let last_run = std::fs::read_to_string(&stamp_path)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);

    if last_run > 0 && now.saturating_sub(last_run) < DB_OPTIMIZE_MIN_INTERVAL_SECS {
        tracing::debug!(
            last_run = last_run,
            now = now,
            "sqlite optimize skipped (recently ran)"
        );
        return;
    }

    if let Err(err) = conn.execute_batch("PRAGMA optimize;") {
        tracing::warn!("sqlite optimize failed: {err}");
        return;
    }

    if let Err(err) = std::fs::write(&stamp_path, format!("{now}\n")) {
        tracing::warn!(
            path = %stamp_path.display(),
            "sqlite optimize ran but failed to write stamp file: {err}"
        );
        return;
    }

    tracing::info!("sqlite optimize completed");
}

fn configure_connection(conn: &Connection, config: &DbRuntimeConfig) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA synchronous = {synchronous};
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = {mmap_size};
"#,
        synchronous = config.pragma_synchronous.as_str(),
        mmap_size = config.pragma_mmap_size
    ))?;

    Ok(())
}
