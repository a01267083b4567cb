//! API module providing HTTP endpoints for the auth service.
//!
//! This module is organized into submodules:
//! - `accounts` - Registration, login and token endpoints (/api/auth/*)
//! - `auth` - Bearer extractor and error-to-status mapping
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! OAuth2 endpoints live in [`crate::oauth2::endpoints`] and are mounted under `/oauth2`.

pub mod accounts;
pub mod auth;
pub mod health;
pub mod openapi;

pub use accounts::AUTH_TAG;
pub use health::MISC_TAG;

use crate::AppResources;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the full application router, including the Redoc page at `/api-docs`.
pub fn app(app_resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/auth", accounts::router())
        .nest("/oauth2", crate::oauth2::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = app(app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
