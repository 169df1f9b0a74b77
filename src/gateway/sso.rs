//! Usage: SSO completion endpoints (SAML metadata, inactive-user redirect, custom auth entry).

use crate::domain::saml;
use crate::infra::settings::{self, AppSettings};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use std::collections::HashMap;

use super::entry_store::CustomAuthPayload;
use super::manager::GatewayAppState;

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn internal_error(err: crate::shared::error::AppError) -> Response {
    tracing::error!("sso request failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Service Provider metadata for this platform instance. Operators send this
/// XML to any Identity Provider that should be able to sign users in.
pub(super) async fn saml_metadata(State(state): State<GatewayAppState>) -> Response {
    let db = state.db.clone();
    let result = blocking::run(
        "saml_metadata",
        move || -> AppResult<Option<(String, Vec<String>)>> {
            let Some(config) = saml::current(&db)? else {
                return Ok(None);
            };
            if !config.enabled {
                return Ok(None);
            }
            let settings = settings::read()?;
            Ok(Some(saml::generate_sp_metadata(&config, &settings)))
        },
    )
    .await;

    match result {
        Ok(None) => not_found(),
        Ok(Some((metadata, errors))) => {
            if errors.is_empty() {
                ([(header::CONTENT_TYPE, "text/xml")], metadata).into_response()
            } else {
                let joined = errors.join(", ");
                tracing::error!(errors = %joined, "saml metadata generation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, joined).into_response()
            }
        }
        Err(err) => internal_error(err),
    }
}

/// Where the inactive-user endpoint should send the browser.
///
/// Only relative paths and absolute URLs on the platform origin are honored;
/// anything else falls back to the dashboard.
fn resolve_redirect_target(settings: &AppSettings, next: Option<&str>) -> String {
    let Some(next) = next.map(str::trim).filter(|v| !v.is_empty()) else {
        return settings.dashboard_url();
    };

    if next.starts_with('/') && !next.starts_with("//") {
        let root = settings.lms_root_url.trim_end_matches('/');
        return format!("{root}{next}");
    }

    if let (Ok(url), Ok(root)) = (
        reqwest::Url::parse(next),
        reqwest::Url::parse(&settings.lms_root_url),
    ) {
        if url.origin() == root.origin() {
            return next.to_string();
        }
    }

    tracing::warn!(next, "rejected off-origin next parameter");
    settings.dashboard_url()
}

/// A newly registered user has completed the auth pipeline. Their account is
/// not yet activated, but we let them log in this once. `next` may point at a
/// course enrollment flow; otherwise the dashboard explains activation.
pub(super) async fn inactive_user(
    State(_state): State<GatewayAppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let next = params.get("next").cloned();
    let result = blocking::run("inactive_user", move || -> AppResult<String> {
        let settings = settings::read()?;
        Ok(resolve_redirect_target(&settings, next.as_deref()))
    })
    .await;

    match result {
        // Plain 302 so user agents re-issue a GET, matching the platform's
        // historical redirect behavior.
        Ok(target) => (StatusCode::FOUND, [(header::LOCATION, target)]).into_response(),
        Err(err) => internal_error(err),
    }
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_entry_page(payload: &CustomAuthPayload) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Signing in…</title></head>
<body onload="document.forms[0].submit()">
<noscript><p>Press the button below to continue signing in.</p></noscript>
<form method="post" action="{post_url}">
<input type="hidden" name="data" value="{data}"/>
<input type="hidden" name="hmac" value="{hmac}"/>
<noscript><button type="submit">Continue</button></noscript>
</form>
</body>
</html>
"#,
        post_url = html_escape(&payload.post_url),
        data = html_escape(&payload.data),
        hmac = html_escape(&payload.hmac),
    )
}

/// Hand SSO data from the auth pipeline to a custom login/register form
/// (possibly on another server). A redirect cannot carry a POST body, so this
/// page re-posts the signed payload from the browser.
pub(super) async fn custom_auth_entry(
    State(state): State<GatewayAppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(token) = params.get("tpa_entry").map(|v| v.trim()).filter(|v| !v.is_empty())
    else {
        return not_found();
    };

    match state.entry_store.take(token, now_unix_seconds()) {
        None => not_found(),
        Some(payload) => Html(render_entry_page(&payload)).into_response(),
    }
}
