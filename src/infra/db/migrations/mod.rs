//! Usage: SQLite schema migrations (user_version + incremental upgrades).

mod baseline_v1;
mod ensure;
mod v1_to_v2;

use rusqlite::Connection;

const LATEST_SCHEMA_VERSION: i64 = 2;
const MAX_COMPAT_SCHEMA_VERSION: i64 = 4;

pub(super) fn apply_migrations(conn: &mut Connection) -> crate::shared::error::AppResult<()> {
    let mut user_version = read_user_version(conn)?;

    if user_version < 0 || user_version > MAX_COMPAT_SCHEMA_VERSION {
        return Err(format!(
            "unsupported sqlite schema version: user_version={user_version} (expected 0..={MAX_COMPAT_SCHEMA_VERSION})"
        )
        .into());
    }

    let start_version = user_version;

    // Fresh install: create complete schema at v1
    if user_version == 0 {
        baseline_v1::create_baseline_v1(conn)?;
        user_version = read_user_version(conn)?;
        tracing::info!(to_version = user_version, "sqlite baseline schema created");
    }

    while user_version < LATEST_SCHEMA_VERSION {
        let from_version = user_version;
        match user_version {
            1 => v1_to_v2::migrate_v1_to_v2(conn)?,
            v => {
                tracing::error!(
                    version = v,
                    "unsupported sqlite schema version during migration"
                );
                return Err(format!(
                    "unsupported sqlite schema version: user_version={v} (expected 1..={MAX_COMPAT_SCHEMA_VERSION})"
                )
                .into());
            }
        }
        user_version = read_user_version(conn)?;
        tracing::info!(
            from_version = from_version,
            to_version = user_version,
            "sqlite migration step completed"
        );
    }

    if start_version < user_version && start_version > 0 {
        tracing::info!(
            from_version = start_version,
            to_version = user_version,
            "sqlite migrations completed"
        );
    }

    // Idempotent ensure patches (always run)
    ensure::apply_ensure_patches(conn)?;

    Ok(())
}

fn read_user_version(conn: &Connection) -> Result<i64, String> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| format!("failed to read sqlite user_version: {e}"))
}
