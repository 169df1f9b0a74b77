//! Usage: Security-sensitive helpers (token masking and payload signing).

use crate::shared::error::AppResult;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

/// HMAC-SHA256 of `data` under `secret`, lowercase hex. Used to sign the
/// base64 auth-entry payload so the receiving form can verify it untouched.
pub(crate) fn sign_payload_hex(secret: &str, data: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| format!("SYSTEM_ERROR: failed to initialize payload signer: {e}"))?;
    mac.update(data.as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}
