use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info};

use super::{
    services::{
        get_delivery, get_policy, health, list_policy_deliveries, metrics, status_hook,
    },
    state::AppState,
};

/// All routes with their state and middleware attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/service/notifications/jobs/{kind}/{id}",
            post(status_hook),
        )
        .route("/deliveries/{id}", get(get_delivery))
        .route("/policies/{id}", get(get_policy))
        .route("/policies/{id}/deliveries", get(list_policy_deliveries))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        // Job services may gzip status reports
        .layer(RequestDecompressionLayer::new())
}

/// Serve the API until SIGINT/SIGTERM.
pub async fn run(state: AppState, address: SocketAddr) -> std::io::Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "hookbox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
