//! Usage: Application data directory resolution (dotdir under HOME, env-overridable).

use crate::shared::error::AppResult;
use std::path::PathBuf;

const DEFAULT_DOTDIR_NAME: &str = ".campus-hub";

fn home_dir() -> Option<PathBuf> {
    // USERPROFILE is the Windows fallback; tests set both to an isolated tempdir.
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn dotdir_name() -> String {
    std::env::var("CAMPUS_HUB_DOTDIR_NAME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DOTDIR_NAME.to_string())
}

/// Resolve (and create) the app data directory.
///
/// `CAMPUS_HUB_DATA_DIR` overrides the location outright; otherwise the
/// dotdir (`CAMPUS_HUB_DOTDIR_NAME`, default `.campus-hub`) under HOME is used.
pub fn app_data_dir() -> AppResult<PathBuf> {
    let dir = match std::env::var("CAMPUS_HUB_DATA_DIR")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        Some(explicit) => PathBuf::from(explicit),
        None => home_dir()
            .ok_or_else(|| {
                "SYSTEM_ERROR: failed to resolve home directory (HOME/USERPROFILE unset)"
                    .to_string()
            })?
            .join(dotdir_name()),
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to create app data dir {}: {e}", dir.display()))?;
    Ok(dir)
}

pub fn log_dir() -> AppResult<PathBuf> {
    let dir = app_data_dir()?.join("logs");
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to create log dir {}: {e}", dir.display()))?;
    Ok(dir)
}
