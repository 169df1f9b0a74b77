//! Usage: Per-request memoization of configuration reads.
//!
//! One instance is created per inbound request (or per management-command run)
//! and dropped with it, so the staleness window of anything memoized here is
//! the request lifetime, never wall-clock time.

use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct RequestCache {
    values: Mutex<HashMap<&'static str, i64>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for `key`, computing it via `init` on first
    /// use. Failed computations are not cached, so a later call may retry.
    pub fn get_or_try_init(
        &self,
        key: &'static str,
        init: impl FnOnce() -> AppResult<i64>,
    ) -> AppResult<i64> {
        if let Some(value) = self.values.lock_or_recover().get(key) {
            return Ok(*value);
        }

        let value = init()?;
        self.values.lock_or_recover().insert(key, value);
        Ok(value)
    }
}
