//! Usage: v1 -> v2: add a technical contact column to the SAML configuration.

use rusqlite::Connection;

pub(super) fn migrate_v1_to_v2(conn: &mut Connection) -> Result<(), String> {
    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
ALTER TABLE saml_configuration ADD COLUMN technical_contact_email TEXT NOT NULL DEFAULT '';

PRAGMA user_version = 2;
"#,
    )
    .map_err(|e| format!("failed to migrate v1 to v2: {e}"))?;

    tx.commit()
        .map_err(|e| format!("failed to commit v1 to v2 migration: {e}"))?;

    Ok(())
}
