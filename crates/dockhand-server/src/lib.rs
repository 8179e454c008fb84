pub mod auth;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app: AppState) -> Router {
    let gateway = app.gateway.clone();

    Router::new()
        // Conversation steps
        .route(
            "/api/commands/docker",
            post(routes::interactions::docker_command),
        )
        .route(
            "/api/commands/docker/section",
            post(routes::interactions::section_selected),
        )
        .route(
            "/api/commands/docker/unit",
            post(routes::interactions::unit_selected),
        )
        // Runs
        .route("/api/runs/{id}", get(routes::runs::get_run))
        .route("/api/runs/{id}/events", get(routes::runs::run_events))
        .route("/api/runs/{id}/cancel", post(routes::runs::cancel_run))
        // Listing
        .route("/api/units", get(routes::units::list_units))
        .route("/api/health", get(routes::health::health))
        .route("/api/metrics", get(routes::health::host_metrics))
        .layer(middleware::from_fn_with_state(gateway, auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Serve on a pre-bound listener until `app.shutdown` is cancelled.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// first (useful with port 0).
pub async fn serve_on(app: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let shutdown = app.shutdown.clone();
    app.prime().await;
    let router = build_router(app);

    tracing::info!("dockhand listening on http://localhost:{port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
