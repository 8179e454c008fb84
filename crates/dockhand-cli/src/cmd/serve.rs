use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dockhand_core::orchestrator::TokioDelay;
use dockhand_server::AppState;

use super::load_settings;

pub fn run(path: &Path, port: Option<u16>, gateway_token: Option<String>) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    for w in settings.validate() {
        tracing::warn!("settings: {}", w.message);
    }

    let port = port.unwrap_or(settings.server.port);
    let runtime = dockhand_docker::connect(&settings.runtime)?;
    if gateway_token.is_none() && settings.server.gateway_token.is_none() {
        tracing::warn!("no gateway token configured; the API accepts unauthenticated requests");
    }

    let rt = tokio::runtime::Runtime::new()?;
    let settings_path = path.to_path_buf();

    rt.block_on(async move {
        // AppState spawns its background tasks, so it is built inside the runtime.
        let app = AppState::new(
            settings,
            Some(settings_path),
            runtime,
            Arc::new(TokioDelay),
            gateway_token,
        );
        let shutdown = app.shutdown.clone();

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;

        tokio::select! {
            res = dockhand_server::serve_on(app, listener) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                shutdown.cancel();
                Ok(())
            }
        }
    })
}
