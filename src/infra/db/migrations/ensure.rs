//! Usage: Idempotent schema patches applied on every startup.

use rusqlite::Connection;

pub(super) fn apply_ensure_patches(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        r#"
CREATE INDEX IF NOT EXISTS idx_feature_switches_namespace ON feature_switches(namespace);
CREATE INDEX IF NOT EXISTS idx_program_cache_updated_at ON program_cache(updated_at);
"#,
    )
    .map_err(|e| format!("failed to apply ensure patches: {e}"))?;

    Ok(())
}
