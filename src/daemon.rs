//! Daemon - the coordinator process
//!
//! Seeds the identity store, starts the coordinator, serves the protocol and
//! the public API, and tears everything down on Ctrl-C.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::api::ApiServer;
use crate::config::TransportKind;
use crate::engine::{self, HttpConnector, VTN_BASE_PATH};
use crate::store::MemoryStore;
use crate::ven::{DefaultVenHooks, VenAgent, VenRegistry};
use crate::vtn::VtnService;
use crate::{Config, Error, Result};

/// Request timeout of the standalone device's HTTP transport
const VEN_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// The OpenKick daemon
pub struct Daemon {
    config: Config,
    connect_at_start: bool,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            connect_at_start: false,
        }
    }

    /// Start an agent for every seeded device once the coordinator is up
    #[must_use]
    pub const fn connect_at_start(mut self, connect: bool) -> Self {
        self.connect_at_start = connect;
        self
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator or a listener cannot be started
    pub async fn run(self) -> Result<()> {
        let mut store = MemoryStore::new();
        store.seed(self.config.seed_count);

        let service = Arc::new(VtnService::new(&self.config, VenRegistry::new().into_shared()));
        service.run(&store).await?;

        let cancel = CancellationToken::new();

        let protocol_task = if self.config.vtn.transport == TransportKind::Http {
            Some(self.spawn_protocol_listener(&service, cancel.child_token()).await?)
        } else {
            None
        };

        let mut api_task = ApiServer::new(
            Arc::clone(&service),
            self.config.api.title.clone(),
            self.config.api.host.clone(),
            self.config.api.port,
        )
        .spawn(cancel.child_token());

        if self.connect_at_start {
            match service.ven_connect().await {
                Ok(started) => tracing::info!(started = started.len(), "VEN agents started"),
                Err(e) => tracing::warn!(error = %e, "some VEN agents failed to start"),
            }
        }

        tracing::info!(vtn_url = %service.vtn_url(), "openkick running, press Ctrl-C to stop");

        let mut api_done = false;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
                tracing::info!("shutdown requested");
            }
            result = &mut api_task => {
                api_done = true;
                match result {
                    Ok(Ok(())) => tracing::warn!("API server exited"),
                    Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                    Err(e) => tracing::error!(error = %e, "API server task aborted"),
                }
            }
        }

        service.shutdown().await;
        cancel.cancel();

        if !api_done {
            join_server("API", api_task).await;
        }
        if let Some(task) = protocol_task {
            join_server("protocol", task).await;
        }

        tracing::info!("openkick stopped");
        Ok(())
    }

    /// Serve the protocol routes on the VTN port
    async fn spawn_protocol_listener(
        &self,
        service: &VtnService,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<()>>> {
        let handle = service.handle()?;
        let vtn_id = handle.vtn_id().to_string();
        let router = Router::new()
            .nest(VTN_BASE_PATH, engine::http::router(handle))
            .layer(TraceLayer::new_for_http());

        let addr = format!("0.0.0.0:{}", self.config.vtn.location.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind protocol listener: {e}")))?;

        tracing::info!(
            vtn_id = %vtn_id,
            addr = %addr,
            path = VTN_BASE_PATH,
            "protocol listener ready"
        );

        Ok(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .map_err(|e| Error::Config(format!("protocol listener error: {e}")))
        }))
    }
}

async fn join_server(name: &str, task: JoinHandle<Result<()>>) {
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(server = name, error = %e, "server failed"),
        Err(e) => tracing::error!(server = name, error = %e, "server task aborted"),
    }
}

/// Run the configured device alone against a remote VTN until Ctrl-C
///
/// # Errors
///
/// Returns error if the agent cannot be started or its session fails
pub async fn run_standalone_ven(config: &Config) -> Result<()> {
    let vtn_url = config.vtn.location.vtn_url();
    let connector = HttpConnector::new(&vtn_url, VEN_HTTP_TIMEOUT);
    let cancel = CancellationToken::new();

    let props = config.ven.props();
    tracing::info!(
        ven_id = %props.id,
        name = %props.name,
        vtn_url = %vtn_url,
        "starting standalone VEN"
    );

    let agent = VenAgent::spawn(
        props,
        &connector,
        Arc::new(DefaultVenHooks),
        config.ven.client,
        &cancel,
    )?;

    // The session ends on its own if registration fails
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_cancel.cancel();
        }
    });

    agent.join().await
}
