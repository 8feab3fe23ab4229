//! Concierge Gateway - HTTP API for the MyRentalHost guest concierge.
//!
//! Serves document management, guest chat and the WhatsApp webhook on one
//! listener.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::{create_state, AppState};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use concierge_common::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Router with CORS open to any origin and the upload size cap applied.
pub fn build_app(state: Arc<AppState>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let max_body = state.max_upload_bytes;

    build_router(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(cors)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.storage.apartments_dir).await?;
    tokio::fs::create_dir_all(&config.storage.history_dir).await?;

    let state = create_state(config)?;
    let app = build_app(state);

    let addr = config.bind_address();
    tracing::info!(
        address = %addr,
        apartments_dir = %config.storage.apartments_dir.display(),
        model = %config.llm.model,
        "Starting concierge gateway"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Concierge gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
