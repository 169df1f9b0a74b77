//! Usage: SAML Service Provider configuration and metadata generation.
//!
//! The metadata XML is what an operator hands to any Shibboleth / SAML
//! Identity Provider that should be able to sign users into this instance.

use crate::infra::db::Db;
use crate::infra::settings::AppSettings;
use crate::shared::error::{db_err, AppResult};
use crate::shared::time::now_unix_seconds;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Path the IdP posts assertions back to. A trailing slash is appended when
/// missing, matching the platform's URL conventions.
const SAML_COMPLETE_PATH: &str = "/auth/complete/tpa-saml";

/// One row of the append-only SAML configuration table ("current row"
/// convention: the newest row is authoritative).
#[derive(Debug, Clone, Serialize)]
pub struct SamlConfiguration {
    pub id: i64,
    pub enabled: bool,
    pub entity_id: String,
    pub public_cert: String,
    pub private_key: String,
    pub org_display_name: String,
    pub technical_contact_email: String,
    pub changed_at: i64,
}

pub fn current(db: &Db) -> AppResult<Option<SamlConfiguration>> {
    let conn = db.open_connection()?;
    conn.query_row(
        "SELECT id, enabled, entity_id, public_cert, private_key, org_display_name, \
         technical_contact_email, changed_at \
         FROM saml_configuration ORDER BY id DESC LIMIT 1",
        [],
        |row| {
            Ok(SamlConfiguration {
                id: row.get(0)?,
                enabled: row.get::<_, i64>(1)? != 0,
                entity_id: row.get(2)?,
                public_cert: row.get(3)?,
                private_key: row.get(4)?,
                org_display_name: row.get(5)?,
                technical_contact_email: row.get(6)?,
                changed_at: row.get(7)?,
            })
        },
    )
    .optional()
    .map_err(|e| db_err!("failed to read saml configuration: {e}"))
}

/// Whether SAML auth is configured and switched on for this instance.
pub fn is_enabled(db: &Db) -> AppResult<bool> {
    Ok(current(db)?.map(|cfg| cfg.enabled).unwrap_or(false))
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    db: &Db,
    enabled: bool,
    entity_id: &str,
    public_cert: &str,
    private_key: &str,
    org_display_name: &str,
    technical_contact_email: &str,
) -> AppResult<SamlConfiguration> {
    let entity_id = entity_id.trim().to_string();
    if entity_id.is_empty() {
        return Err("SEC_INVALID_INPUT: entity_id must not be empty".into());
    }

    let now = now_unix_seconds();
    let conn = db.open_connection()?;
    conn.execute(
        "INSERT INTO saml_configuration \
         (enabled, entity_id, public_cert, private_key, org_display_name, \
          technical_contact_email, changed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            i64::from(enabled),
            entity_id,
            public_cert.trim(),
            private_key.trim(),
            org_display_name.trim(),
            technical_contact_email.trim(),
            now
        ],
    )
    .map_err(|e| db_err!("failed to insert saml configuration: {e}"))?;
    let id = conn.last_insert_rowid();

    tracing::info!(id, enabled, entity_id = %entity_id, "saml configuration updated");

    Ok(SamlConfiguration {
        id,
        enabled,
        entity_id,
        public_cert: public_cert.trim().to_string(),
        private_key: private_key.trim().to_string(),
        org_display_name: org_display_name.trim().to_string(),
        technical_contact_email: technical_contact_email.trim().to_string(),
        changed_at: now,
    })
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Strip PEM armor and whitespace, leaving the bare base64 certificate body.
fn normalize_cert(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .collect::<Vec<_>>()
        .join("")
        .split_whitespace()
        .collect()
}

/// Generate Service Provider metadata for this platform instance.
///
/// Returns the XML and a list of generation errors; callers must treat the
/// XML as unusable whenever the error list is non-empty.
pub fn generate_sp_metadata(
    config: &SamlConfiguration,
    settings: &AppSettings,
) -> (String, Vec<String>) {
    let mut errors: Vec<String> = Vec::new();

    let entity_id = config.entity_id.trim();
    if entity_id.is_empty() {
        errors.push("invalid entity id".to_string());
    }

    let root = settings.lms_root_url.trim_end_matches('/');
    if reqwest::Url::parse(root).is_err() {
        errors.push(format!("invalid platform root URL: {root}"));
    }

    let mut complete_url = format!("{root}{SAML_COMPLETE_PATH}");
    if !complete_url.ends_with('/') {
        complete_url.push('/'); // Required for consistency
    }

    let cert_body = normalize_cert(&config.public_cert);
    if !cert_body.is_empty() {
        if let Err(e) = BASE64.decode(cert_body.as_bytes()) {
            errors.push(format!("invalid public certificate: {e}"));
        }
    }

    let key_descriptor = if cert_body.is_empty() {
        String::new()
    } else {
        format!(
            r#"
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{cert}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#,
            cert = xml_escape(&cert_body)
        )
    };

    let organization = if config.org_display_name.trim().is_empty() {
        String::new()
    } else {
        format!(
            r#"
  <md:Organization>
    <md:OrganizationName xml:lang="en">{name}</md:OrganizationName>
    <md:OrganizationDisplayName xml:lang="en">{name}</md:OrganizationDisplayName>
    <md:OrganizationURL xml:lang="en">{url}</md:OrganizationURL>
  </md:Organization>"#,
            name = xml_escape(config.org_display_name.trim()),
            url = xml_escape(root)
        )
    };

    let contact = if config.technical_contact_email.trim().is_empty() {
        String::new()
    } else {
        format!(
            r#"
  <md:ContactPerson contactType="technical">
    <md:EmailAddress>{email}</md:EmailAddress>
  </md:ContactPerson>"#,
            email = xml_escape(config.technical_contact_email.trim())
        )
    };

    let metadata = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="false" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">{key_descriptor}
    <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="{acs_url}" index="1"/>
  </md:SPSSODescriptor>{organization}{contact}
</md:EntityDescriptor>
"#,
        entity_id = xml_escape(entity_id),
        acs_url = xml_escape(&complete_url),
    );

    (metadata, errors)
}
