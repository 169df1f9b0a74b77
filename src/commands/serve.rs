//! Usage: Management command running the HTTP gateway until shutdown.

use crate::gateway::manager::{self, GatewayAppState};
use crate::infra::db;
use crate::infra::settings;
use crate::shared::blocking;
use crate::shared::error::AppResult;

pub async fn run(port_override: Option<u16>) -> AppResult<()> {
    let settings = match blocking::run("serve_read_settings", settings::read).await {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::warn!("settings read failed, using defaults: {}", err);
            settings::AppSettings::default()
        }
    };

    let db = blocking::run("serve_db_init", db::init).await?;
    let state = GatewayAppState::new(db);

    let preferred_port = port_override.unwrap_or(settings.preferred_port);
    manager::serve_until_shutdown(state, preferred_port).await
}
