pub mod app;
pub mod commands;
mod domain;
mod gateway;
mod infra;
mod shared;
pub mod test_support;

pub use domain::catalog::WarmSummary;
pub use infra::settings::AppSettings;
pub use shared::error::{AppError, AppResult};

/// Read settings, falling back to defaults when unreadable. Process startup
/// must not fail on a broken config file; commands that need strict settings
/// read them again with errors surfaced.
pub fn settings_fail_open() -> AppSettings {
    match infra::settings::read() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("settings read failed, using defaults: {err}");
            AppSettings::default()
        }
    }
}
