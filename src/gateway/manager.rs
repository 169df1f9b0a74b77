//! Usage: Gateway lifecycle (bind-first-available, serve, graceful shutdown).

use crate::infra::db::Db;
use crate::infra::settings::MAX_GATEWAY_PORT;
use crate::infra::switches::SwitchStore;
use crate::shared::error::AppResult;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::entry_store::EntryStore;
use super::routes::build_router;

#[derive(Clone)]
pub struct GatewayAppState {
    pub db: Db,
    pub entry_store: Arc<EntryStore>,
    pub switches: Arc<SwitchStore>,
}

impl GatewayAppState {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            entry_store: Arc::new(EntryStore::new()),
            switches: Arc::new(SwitchStore::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub running: bool,
    pub port: u16,
    pub base_url: Option<String>,
}

pub struct RunningGateway {
    port: u16,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningGateway {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            running: true,
            port: self.port,
            base_url: Some(self.base_url()),
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Bind the preferred port, falling back to the next free port in the gateway
/// range. Port 0 binds an ephemeral port (used by tests).
async fn bind_first_available(preferred_port: u16) -> AppResult<TcpListener> {
    if preferred_port == 0 {
        return TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| format!("SYSTEM_ERROR: gateway bind failed on 127.0.0.1:0 ({e})").into());
    }

    let mut bind_errors: Vec<String> = Vec::new();
    for port in preferred_port..=MAX_GATEWAY_PORT.max(preferred_port) {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                if port != preferred_port {
                    tracing::warn!(
                        preferred_port,
                        port,
                        "preferred gateway port busy, bound fallback port"
                    );
                }
                return Ok(listener);
            }
            Err(err) => bind_errors.push(format!("127.0.0.1:{port} ({err})")),
        }
    }

    Err(format!(
        "SYSTEM_ERROR: gateway bind failed: {}",
        bind_errors.join("; ")
    )
    .into())
}

/// Bind and serve in a background task; returns a handle for status/shutdown.
pub async fn spawn(state: GatewayAppState, preferred_port: u16) -> AppResult<RunningGateway> {
    let listener = bind_first_available(preferred_port).await?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("SYSTEM_ERROR: gateway local_addr failed: {e}"))?
        .port();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let router = build_router(state);

    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            tracing::error!("gateway server error: {err}");
        }
    });

    tracing::info!(port, "gateway listening");

    Ok(RunningGateway {
        port,
        shutdown_tx,
        handle,
    })
}

/// Serve until ctrl-c. Used by the `serve` management command.
pub async fn serve_until_shutdown(state: GatewayAppState, preferred_port: u16) -> AppResult<()> {
    let running = spawn(state, preferred_port).await?;
    let status = running.status();
    tracing::info!(
        port = status.port,
        base_url = status.base_url.as_deref().unwrap_or_default(),
        "gateway started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: failed to listen for shutdown signal: {e}"))?;

    tracing::info!("shutdown requested, stopping gateway");
    running.shutdown().await;
    Ok(())
}
