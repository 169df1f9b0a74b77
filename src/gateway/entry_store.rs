//! Usage: One-shot store for SSO pipeline payloads awaiting the custom auth entry form.
//!
//! The auth pipeline registers the data destined for an external login/register
//! form; the custom-entry view pops it exactly once. Entries expire after a
//! short TTL and the store is bounded, with expired entries evicted first.

use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::{mask_token, sign_payload_hex};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

const DEFAULT_ENTRY_TTL_SECS: i64 = 300;
const MAX_PENDING_ENTRIES: usize = 5000;
const ENTRY_TOKEN_LEN: usize = 32;

/// The three opaque fields the custom auth form posts onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomAuthPayload {
    pub post_url: String,
    /// User data as base64 encoded JSON. Base64 so that whitespace or key
    /// ordering cannot affect the signature.
    pub data: String,
    /// Hex HMAC-SHA256 of `data` under the platform secret key.
    pub hmac: String,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    payload: CustomAuthPayload,
    expires_at: i64,
}

#[derive(Debug)]
pub struct EntryStore {
    ttl_secs: i64,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore {
    pub fn new() -> Self {
        Self {
            ttl_secs: DEFAULT_ENTRY_TTL_SECS,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Store a signed payload for `post_url` and return its one-shot token.
    pub fn register(
        &self,
        post_url: &str,
        user_data: &serde_json::Value,
        secret_key: &str,
        now_unix: i64,
    ) -> AppResult<String> {
        let post_url = post_url.trim();
        reqwest::Url::parse(post_url)
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid post_url={post_url}: {e}"))?;

        let data_json = serde_json::to_string(user_data)
            .map_err(|e| format!("SYSTEM_ERROR: failed to serialize pipeline data: {e}"))?;
        let data = BASE64.encode(data_json.as_bytes());
        let hmac = sign_payload_hex(secret_key, &data)?;

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ENTRY_TOKEN_LEN)
            .map(char::from)
            .collect();

        let mut guard = self.pending.lock_or_recover();
        if guard.len() >= MAX_PENDING_ENTRIES {
            drop_expired(&mut guard, now_unix);
            if guard.len() >= MAX_PENDING_ENTRIES {
                guard.clear();
            }
        }

        guard.insert(
            token.clone(),
            PendingEntry {
                payload: CustomAuthPayload {
                    post_url: post_url.to_string(),
                    data,
                    hmac,
                },
                expires_at: now_unix.saturating_add(self.ttl_secs.max(1)),
            },
        );

        tracing::debug!(token = %mask_token(&token), "custom auth entry payload registered");
        Ok(token)
    }

    /// Pop the payload for `token`. Expired or unknown tokens return `None`;
    /// either way the token is spent afterwards.
    pub fn take(&self, token: &str, now_unix: i64) -> Option<CustomAuthPayload> {
        let mut guard = self.pending.lock_or_recover();
        let entry = guard.remove(token.trim())?;
        if entry.expires_at <= now_unix {
            return None;
        }
        Some(entry.payload)
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock_or_recover().len()
    }
}

fn drop_expired(map: &mut HashMap<String, PendingEntry>, now_unix: i64) {
    map.retain(|_, v| v.expires_at > now_unix);
}
