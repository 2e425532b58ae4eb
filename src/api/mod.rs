//! Public HTTP API over the coordinator

pub mod error;
pub mod event;
pub mod health;
pub mod ven;

pub use error::ApiError;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::vtn::VtnService;

/// Build the full API router
pub fn router(service: Arc<VtnService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/ven", ven::router(Arc::clone(&service)))
        .nest("/event", event::router(service))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// HTTP API server
pub struct ApiServer {
    service: Arc<VtnService>,
    title: String,
    host: String,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(
        service: Arc<VtnService>,
        title: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service,
            title: title.into(),
            host: host.into(),
            port,
        }
    }

    /// Run the API server until `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(title = %self.title, addr = %addr, "API server listening");

        axum::serve(listener, router(self.service))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
