//! Coordinator service: bridges the protocol server role to the device registry

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, TransportKind};
use crate::engine::{
    ClientSettings, Connector, Event, EventInterval, EventResponse, HttpConnector, LocalConnector,
    OptType, Registration, ReportOffer, ReportSample, ReportSink, ReportSubscription, VenHooks,
    VenLookup, VtnHandle, VtnHandler, VtnServer,
};
use crate::store::{MemoryStore, Query, VEN_COLLECTION};
use crate::supervisor::Supervisor;
use crate::ven::{DefaultVenHooks, SharedVenRegistry, VenProps, VenSummary};
use crate::{Error, Result};

/// Signal name carried by dispatched events
pub const EVENT_SIGNAL_NAME: &str = "simple";

/// Signal type carried by dispatched events
pub const EVENT_SIGNAL_TYPE: &str = "level";

/// Length of the single interval of a dispatched event
pub const EVENT_DURATION: Duration = Duration::from_secs(10 * 60);

/// Request timeout used by HTTP transports
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol progress of one device, as seen by the coordinator
///
/// Phases only move forward; there is no disconnected phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenPhase {
    Unknown,
    Registered,
    ReportingBound,
    EventCapable,
}

type SharedPhases = Arc<RwLock<HashMap<String, VenPhase>>>;

/// Event answers kept for lookup; older ones are evicted first
const RESPONSE_HISTORY: usize = 1024;

/// Most recent event answers, keyed by event id
struct ResponseLog {
    capacity: usize,
    order: VecDeque<String>,
    answers: HashMap<String, OptType>,
}

impl Default for ResponseLog {
    fn default() -> Self {
        Self::with_capacity(RESPONSE_HISTORY)
    }
}

impl ResponseLog {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            answers: HashMap::with_capacity(capacity),
        }
    }

    fn record(&mut self, event_id: &str, opt_type: OptType) {
        if self.answers.contains_key(event_id) {
            return;
        }
        self.answers.insert(event_id.to_string(), opt_type);
        self.order.push_back(event_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.answers.remove(&oldest);
            }
        }
    }

    fn get(&self, event_id: &str) -> Option<OptType> {
        self.answers.get(event_id).copied()
    }
}

type SharedResponses = Arc<RwLock<ResponseLog>>;

/// Attributes report batches to the device, resource and measurement they came from
struct ReportContext {
    ven_id: String,
    resource_id: String,
    measurement: String,
}

#[async_trait]
impl ReportSink for ReportContext {
    async fn on_update_report(&self, samples: &[ReportSample]) {
        for sample in samples {
            tracing::info!(
                ven_id = %self.ven_id,
                resource_id = %self.resource_id,
                measurement = %self.measurement,
                value = sample.value,
                at = %sample.timestamp,
                "report received"
            );
        }
    }
}

/// Protocol callbacks backed by the registry
struct VtnCallbacks {
    registry: SharedVenRegistry,
    phases: SharedPhases,
    responses: SharedResponses,
}

impl VtnCallbacks {
    async fn advance(&self, ven_id: &str, phase: VenPhase) {
        let mut phases = self.phases.write().await;
        let current = phases.entry(ven_id.to_string()).or_insert(VenPhase::Unknown);
        if phase > *current {
            let previous = *current;
            *current = phase;
            tracing::debug!(ven_id = %ven_id, from = ?previous, to = ?phase, "VEN phase advanced");
        }
    }
}

#[async_trait]
impl VtnHandler for VtnCallbacks {
    async fn on_create_party_registration(&self, ven_name: &str) -> Option<Registration> {
        self.registry
            .read()
            .await
            .find_by_name(ven_name)
            .map(|ven| Registration {
                ven_id: ven.id().to_string(),
                registration_id: ven.registration_id().to_string(),
            })
    }

    async fn lookup_fingerprint(&self, ven_id: &str) -> Option<VenLookup> {
        self.registry
            .read()
            .await
            .find_by_id(ven_id)
            .map(|ven| VenLookup {
                ven_id: ven.id().to_string(),
                ven_name: ven.name().to_string(),
                fingerprint: ven.fingerprint().to_string(),
                registration_id: ven.registration_id().to_string(),
            })
    }

    async fn on_registered(&self, registration: &Registration) {
        self.advance(&registration.ven_id, VenPhase::Registered).await;
    }

    async fn on_register_report(&self, offer: &ReportOffer) -> ReportSubscription {
        self.advance(&offer.ven_id, VenPhase::ReportingBound).await;

        // Take the most frequent sampling the device offers
        ReportSubscription {
            sink: Arc::new(ReportContext {
                ven_id: offer.ven_id.clone(),
                resource_id: offer.resource_id.clone(),
                measurement: offer.measurement.clone(),
            }),
            sampling_interval: offer.min_sampling_interval,
        }
    }

    async fn on_poll(&self, ven_id: &str) {
        let bound = self
            .phases
            .read()
            .await
            .get(ven_id)
            .is_some_and(|p| *p >= VenPhase::ReportingBound);
        if bound {
            self.advance(ven_id, VenPhase::EventCapable).await;
        }
    }

    async fn on_event_response(&self, response: &EventResponse) {
        tracing::info!(
            ven_id = %response.ven_id,
            event_id = %response.event_id,
            opt_type = %response.opt_type,
            "VEN responded to event"
        );
        self.responses
            .write()
            .await
            .record(&response.event_id, response.opt_type);
    }
}

/// Parts that exist only once the service is running
struct Running {
    handle: VtnHandle,
    supervisor: Supervisor,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

/// The coordinator: one server loop, one registry, one supervisor
pub struct VtnService {
    vtn_id: String,
    vtn_url: String,
    transport: TransportKind,
    settings: ClientSettings,
    registry: SharedVenRegistry,
    phases: SharedPhases,
    responses: SharedResponses,
    connector: Option<Arc<dyn Connector>>,
    hooks: Arc<dyn VenHooks>,
    cancel: CancellationToken,
    running: OnceCell<Running>,
}

impl VtnService {
    /// Create a stopped service over `registry`
    #[must_use]
    pub fn new(config: &Config, registry: SharedVenRegistry) -> Self {
        Self {
            vtn_id: config.vtn.id.clone(),
            vtn_url: config.vtn.location.vtn_url(),
            transport: config.vtn.transport,
            settings: config.ven.client,
            registry,
            phases: Arc::default(),
            responses: Arc::default(),
            connector: None,
            hooks: Arc::new(DefaultVenHooks),
            cancel: CancellationToken::new(),
            running: OnceCell::new(),
        }
    }

    /// Use `connector` for device agents instead of the configured transport
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Device behavior used by agents started from this service
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn VenHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Load identities from `store` and start the server loop
    ///
    /// Calling this on a running service logs and does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the stored identity records cannot be decoded
    pub async fn run(&self, store: &MemoryStore) -> Result<()> {
        if self.running.initialized() {
            tracing::warn!(vtn_url = %self.vtn_url, "VTN server is already running");
            return Ok(());
        }
        self.running.get_or_try_init(|| self.start(store)).await?;
        Ok(())
    }

    async fn start(&self, store: &MemoryStore) -> Result<Running> {
        tracing::debug!("loading allowed VENs from store");
        let records: Vec<VenProps> = store.find_records(VEN_COLLECTION, &Query::all())?;

        {
            let mut registry = self.registry.write().await;
            for props in records {
                if let Err(e) = registry.append(props) {
                    tracing::warn!(error = %e, "skipping stored VEN identity");
                }
            }
            tracing::info!(
                vens = registry.len(),
                vtn_url = %self.vtn_url,
                "starting VTN server"
            );
        }

        let callbacks = Arc::new(VtnCallbacks {
            registry: Arc::clone(&self.registry),
            phases: Arc::clone(&self.phases),
            responses: Arc::clone(&self.responses),
        });
        let (handle, server_task) =
            VtnServer::spawn(&self.vtn_id, callbacks, self.cancel.child_token());

        let connector: Arc<dyn Connector> = match (&self.connector, self.transport) {
            (Some(connector), _) => Arc::clone(connector),
            (None, TransportKind::Local) => Arc::new(LocalConnector::new(handle.clone())),
            (None, TransportKind::Http) => {
                Arc::new(HttpConnector::new(&self.vtn_url, HTTP_TIMEOUT))
            }
        };

        let supervisor = Supervisor::new(
            Arc::clone(&self.registry),
            connector,
            Arc::clone(&self.hooks),
            self.settings,
            self.cancel.child_token(),
        );

        Ok(Running {
            handle,
            supervisor,
            server_task: Mutex::new(Some(server_task)),
        })
    }

    fn running(&self) -> Result<&Running> {
        match self.running.get() {
            Some(running) if !self.cancel.is_cancelled() && !running.handle.is_closed() => {
                Ok(running)
            }
            _ => Err(Error::NotRunning),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running().is_ok()
    }

    #[must_use]
    pub fn vtn_url(&self) -> &str {
        &self.vtn_url
    }

    /// Handle to the server loop, for serving the protocol over HTTP
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` before `run`
    pub fn handle(&self) -> Result<VtnHandle> {
        Ok(self.running()?.handle.clone())
    }

    #[must_use]
    pub fn registry(&self) -> &SharedVenRegistry {
        &self.registry
    }

    /// Projection of every known device
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` before `run`
    pub async fn ven_props_list(&self) -> Result<Arc<[VenSummary]>> {
        self.running()?;
        Ok(self.registry.read().await.snapshot())
    }

    /// Projection of connected devices
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` before `run`
    pub async fn ven_connected(&self) -> Result<Vec<VenSummary>> {
        self.running()?;
        Ok(self.registry.read().await.connected())
    }

    pub async fn ven_ids(&self) -> Vec<String> {
        self.registry.read().await.ids()
    }

    pub async fn ven_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// Start agents for every device not yet connected
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` before `run`, or `Error::ConnectAll` if any
    /// device failed to start
    pub async fn ven_connect(&self) -> Result<Vec<String>> {
        self.running()?.supervisor.connect_all().await
    }

    /// Queue a level event for one connected device, returning the event id
    ///
    /// Returns once the server loop has accepted the event; delivery happens on
    /// the device's next poll.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning`, `Error::UnknownDevice` if `ven_id` is not
    /// registered, `Error::NotConnected` if it has no running agent, or an
    /// engine error if the server loop has stopped
    pub async fn send_event(&self, ven_id: &str, signal_level: i32) -> Result<String> {
        let running = self.running()?;

        {
            let registry = self.registry.read().await;
            let ven = registry
                .find_by_id(ven_id)
                .ok_or_else(|| Error::UnknownDevice(ven_id.to_string()))?;
            if !ven.is_connected() {
                return Err(Error::NotConnected(ven_id.to_string()));
            }
        }

        let now = Utc::now();
        let event = Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            ven_id: ven_id.to_string(),
            signal_name: EVENT_SIGNAL_NAME.to_string(),
            signal_type: EVENT_SIGNAL_TYPE.to_string(),
            intervals: vec![EventInterval {
                dtstart: now,
                duration: EVENT_DURATION,
                signal_payload: f64::from(signal_level),
            }],
            created_at: now,
        };
        let event_id = event.event_id.clone();

        running.handle.add_event(event).await?;
        tracing::info!(ven_id = %ven_id, event_id = %event_id, signal_level, "event submitted");
        Ok(event_id)
    }

    /// Number of events accepted for `ven_id`
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` before `run`
    pub async fn submitted(&self, ven_id: &str) -> Result<usize> {
        self.running()?.handle.submitted(ven_id).await
    }

    pub async fn ven_phase(&self, ven_id: &str) -> VenPhase {
        self.phases
            .read()
            .await
            .get(ven_id)
            .copied()
            .unwrap_or(VenPhase::Unknown)
    }

    /// Answer a device gave to an event, once it arrives
    ///
    /// Only the most recent answers are kept.
    pub async fn event_response(&self, event_id: &str) -> Option<OptType> {
        self.responses.read().await.get(event_id)
    }

    /// Whether the agent for `ven_id` is still running its session
    pub async fn ven_agent_running(&self, ven_id: &str) -> bool {
        match self.running() {
            Ok(running) => running.supervisor.is_running(ven_id).await,
            Err(_) => false,
        }
    }

    /// Stop every agent, then the server loop
    pub async fn shutdown(&self) {
        let Some(running) = self.running.get() else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        running.supervisor.shutdown().await;
        self.cancel.cancel();

        let task = running.server_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "VTN server task aborted");
            }
        }
        tracing::info!("VTN service stopped");
    }
}
