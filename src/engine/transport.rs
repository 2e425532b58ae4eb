//! Seams between a VEN client and the server it talks to

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::http::HttpTransport;
use super::server::VtnHandle;
use super::types::{Event, EventResponse, RegisterRequest, Registration, ReportOffer, ReportUpdate};
use crate::Result;
use crate::ven::VenProps;

/// Client-side view of the VTN
#[async_trait]
pub trait Transport: Send + Sync {
    /// Present identity and fingerprint
    async fn register(&self, request: RegisterRequest) -> Result<Registration>;

    /// Offer a report, returning the sampling interval picked by the VTN
    async fn register_report(&self, offer: ReportOffer) -> Result<Duration>;

    /// Deliver report samples
    async fn update_report(&self, update: ReportUpdate) -> Result<()>;

    /// Fetch events queued for this VEN
    async fn poll(&self, ven_id: &str) -> Result<Vec<Event>>;

    /// Answer one event
    async fn respond(&self, response: EventResponse) -> Result<()>;
}

/// Builds the transport a VEN client uses
pub trait Connector: Send + Sync {
    /// Open a transport for one VEN
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be constructed
    fn connect(&self, props: &VenProps) -> Result<Arc<dyn Transport>>;
}

/// Connects clients straight to an in-process server loop
#[derive(Debug, Clone)]
pub struct LocalConnector {
    handle: VtnHandle,
}

impl LocalConnector {
    #[must_use]
    pub const fn new(handle: VtnHandle) -> Self {
        Self { handle }
    }
}

impl Connector for LocalConnector {
    fn connect(&self, _props: &VenProps) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.handle.clone()))
    }
}

/// Connects clients to a VTN over HTTP
#[derive(Debug, Clone)]
pub struct HttpConnector {
    vtn_url: String,
    timeout: Duration,
}

impl HttpConnector {
    #[must_use]
    pub fn new(vtn_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            vtn_url: vtn_url.into(),
            timeout,
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, _props: &VenProps) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(&self.vtn_url, self.timeout)?))
    }
}
