//! Server role of the protocol engine
//!
//! A single task owns the per-VEN event queues and report bindings. Every
//! other task talks to it through a [`VtnHandle`], which sends a request over
//! an mpsc channel and awaits the oneshot reply.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::transport::Transport;
use super::types::{
    Event, EventResponse, RegisterRequest, Registration, ReportOffer, ReportSample, ReportUpdate,
    VenLookup,
};
use crate::{Error, Result};

/// Bound on queued requests before senders wait
const REQUEST_CHANNEL_SIZE: usize = 256;

/// Receives report batches for one (VEN, resource) binding
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn on_update_report(&self, samples: &[ReportSample]);
}

/// Result of accepting a report offer
pub struct ReportSubscription {
    pub sink: Arc<dyn ReportSink>,
    pub sampling_interval: Duration,
}

/// Coordinator callbacks invoked by the server loop
///
/// None of these may fail: absence is expressed as `None`, so one unknown VEN
/// cannot take the loop down.
#[async_trait]
pub trait VtnHandler: Send + Sync {
    /// Resolve a presented VEN name to its assigned identity
    async fn on_create_party_registration(&self, ven_name: &str) -> Option<Registration>;

    /// Identity record used to verify a VEN's fingerprint
    async fn lookup_fingerprint(&self, ven_id: &str) -> Option<VenLookup>;

    /// Pick a sampling interval and a sink for a report offer
    async fn on_register_report(&self, offer: &ReportOffer) -> ReportSubscription;

    /// A VEN passed every registration check
    async fn on_registered(&self, _registration: &Registration) {}

    /// A registered VEN asked for its queued events
    async fn on_poll(&self, _ven_id: &str) {}

    /// A VEN answered an event
    async fn on_event_response(&self, response: &EventResponse);
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Request {
    Register(RegisterRequest, Reply<Registration>),
    RegisterReport(ReportOffer, Reply<Duration>),
    UpdateReport(ReportUpdate, Reply<()>),
    Poll(String, Reply<Vec<Event>>),
    Respond(EventResponse, Reply<()>),
    AddEvent(Event, Reply<()>),
    Submitted(String, Reply<usize>),
}

/// Cloneable entry point into a running server loop
#[derive(Clone)]
pub struct VtnHandle {
    vtn_id: Arc<str>,
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for VtnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VtnHandle")
            .field("vtn_id", &self.vtn_id)
            .finish_non_exhaustive()
    }
}

impl VtnHandle {
    #[must_use]
    pub fn vtn_id(&self) -> &str {
        &self.vtn_id
    }

    /// Whether the server loop has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::Engine("VTN server loop has stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Engine("VTN server dropped the request".to_string()))?
    }

    /// Queue an event for one VEN; returns once the loop has accepted it
    ///
    /// # Errors
    ///
    /// Returns error if the server loop has stopped
    pub async fn add_event(&self, event: Event) -> Result<()> {
        self.call(|reply| Request::AddEvent(event, reply)).await
    }

    /// Number of events accepted for a VEN since the loop started
    ///
    /// # Errors
    ///
    /// Returns error if the server loop has stopped
    pub async fn submitted(&self, ven_id: &str) -> Result<usize> {
        let ven_id = ven_id.to_string();
        self.call(|reply| Request::Submitted(ven_id, reply)).await
    }
}

#[async_trait]
impl Transport for VtnHandle {
    async fn register(&self, request: RegisterRequest) -> Result<Registration> {
        self.call(|reply| Request::Register(request, reply)).await
    }

    async fn register_report(&self, offer: ReportOffer) -> Result<Duration> {
        self.call(|reply| Request::RegisterReport(offer, reply)).await
    }

    async fn update_report(&self, update: ReportUpdate) -> Result<()> {
        self.call(|reply| Request::UpdateReport(update, reply)).await
    }

    async fn poll(&self, ven_id: &str) -> Result<Vec<Event>> {
        let ven_id = ven_id.to_string();
        self.call(|reply| Request::Poll(ven_id, reply)).await
    }

    async fn respond(&self, response: EventResponse) -> Result<()> {
        self.call(|reply| Request::Respond(response, reply)).await
    }
}

/// A delivered event awaiting its answer
struct Outstanding {
    ven_id: String,
    ends_at: DateTime<Utc>,
}

/// State owned by the server loop
pub struct VtnServer {
    vtn_id: Arc<str>,
    handler: Arc<dyn VtnHandler>,
    rx: mpsc::Receiver<Request>,
    registered: HashSet<String>,
    queues: HashMap<String, VecDeque<Event>>,
    reports: HashMap<(String, String), Arc<dyn ReportSink>>,
    /// Events delivered but not yet answered, keyed by event id
    outstanding: HashMap<String, Outstanding>,
    submitted: HashMap<String, usize>,
}

impl VtnServer {
    /// Start the server loop; it runs until `cancel` fires
    pub fn spawn(
        vtn_id: &str,
        handler: Arc<dyn VtnHandler>,
        cancel: CancellationToken,
    ) -> (VtnHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let vtn_id: Arc<str> = Arc::from(vtn_id);
        let server = Self {
            vtn_id: Arc::clone(&vtn_id),
            handler,
            rx,
            registered: HashSet::new(),
            queues: HashMap::new(),
            reports: HashMap::new(),
            outstanding: HashMap::new(),
            submitted: HashMap::new(),
        };

        let task = tokio::spawn(server.run(cancel));
        (VtnHandle { vtn_id, tx }, task)
    }

    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(vtn_id = %self.vtn_id, "VTN server loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = self.rx.recv() => {
                    let Some(request) = request else { break };
                    self.dispatch(request).await;
                }
            }
        }

        tracing::info!(vtn_id = %self.vtn_id, "VTN server loop stopped");
    }

    async fn dispatch(&mut self, request: Request) {
        // Send failures mean the caller gave up waiting; nothing to do
        match request {
            Request::Register(req, reply) => {
                let _ = reply.send(self.register(req).await);
            }
            Request::RegisterReport(offer, reply) => {
                let _ = reply.send(self.register_report(offer).await);
            }
            Request::UpdateReport(update, reply) => {
                let _ = reply.send(self.update_report(update).await);
            }
            Request::Poll(ven_id, reply) => {
                let _ = reply.send(self.poll(&ven_id).await);
            }
            Request::Respond(response, reply) => {
                let _ = reply.send(self.respond(response).await);
            }
            Request::AddEvent(event, reply) => {
                self.add_event(event);
                let _ = reply.send(Ok(()));
            }
            Request::Submitted(ven_id, reply) => {
                let count = self.submitted.get(&ven_id).copied().unwrap_or(0);
                let _ = reply.send(Ok(count));
            }
        }
    }

    async fn register(&mut self, req: RegisterRequest) -> Result<Registration> {
        let rejected = || Error::RegistrationRejected(req.ven_name.clone());

        let Some(registration) = self
            .handler
            .on_create_party_registration(&req.ven_name)
            .await
        else {
            tracing::warn!(ven_name = %req.ven_name, "registration rejected: unknown VEN");
            return Err(rejected());
        };

        if req
            .ven_id
            .as_deref()
            .is_some_and(|claimed| claimed != registration.ven_id)
        {
            tracing::warn!(
                ven_name = %req.ven_name,
                claimed = ?req.ven_id,
                "registration rejected: VEN id does not match"
            );
            return Err(rejected());
        }

        match self.handler.lookup_fingerprint(&registration.ven_id).await {
            Some(lookup) if lookup.fingerprint == req.fingerprint => {}
            Some(_) => {
                tracing::warn!(
                    ven_id = %registration.ven_id,
                    "registration rejected: fingerprint mismatch"
                );
                return Err(rejected());
            }
            None => {
                tracing::warn!(
                    ven_id = %registration.ven_id,
                    "registration rejected: no fingerprint on record"
                );
                return Err(rejected());
            }
        }

        self.registered.insert(registration.ven_id.clone());
        self.handler.on_registered(&registration).await;
        tracing::info!(
            ven_id = %registration.ven_id,
            registration_id = %registration.registration_id,
            "VEN registered"
        );
        Ok(registration)
    }

    fn ensure_registered(&self, ven_id: &str) -> Result<()> {
        if self.registered.contains(ven_id) {
            Ok(())
        } else {
            Err(Error::UnknownDevice(ven_id.to_string()))
        }
    }

    async fn register_report(&mut self, offer: ReportOffer) -> Result<Duration> {
        self.ensure_registered(&offer.ven_id)?;

        let subscription = self.handler.on_register_report(&offer).await;
        self.reports.insert(
            (offer.ven_id.clone(), offer.resource_id.clone()),
            subscription.sink,
        );
        tracing::debug!(
            ven_id = %offer.ven_id,
            resource_id = %offer.resource_id,
            interval = ?subscription.sampling_interval,
            "report bound"
        );
        Ok(subscription.sampling_interval)
    }

    async fn update_report(&self, update: ReportUpdate) -> Result<()> {
        self.ensure_registered(&update.ven_id)?;

        let key = (update.ven_id.clone(), update.resource_id.clone());
        let Some(sink) = self.reports.get(&key) else {
            tracing::warn!(
                ven_id = %update.ven_id,
                resource_id = %update.resource_id,
                "report update for unbound resource ignored"
            );
            return Ok(());
        };
        sink.on_update_report(&update.samples).await;
        Ok(())
    }

    async fn poll(&mut self, ven_id: &str) -> Result<Vec<Event>> {
        self.ensure_registered(ven_id)?;
        self.handler.on_poll(ven_id).await;

        let events: Vec<Event> = self
            .queues
            .get_mut(ven_id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();

        // Answers to events that have already ended are no longer accepted
        let now = Utc::now();
        self.outstanding.retain(|_, o| o.ends_at > now);
        for event in &events {
            let pending = Outstanding {
                ven_id: ven_id.to_string(),
                ends_at: event.ends_at(),
            };
            self.outstanding.insert(event.event_id.clone(), pending);
        }
        Ok(events)
    }

    async fn respond(&mut self, response: EventResponse) -> Result<()> {
        let now = Utc::now();
        let owned = self
            .outstanding
            .get(&response.event_id)
            .is_some_and(|o| o.ven_id == response.ven_id && o.ends_at > now);
        if owned {
            self.outstanding.remove(&response.event_id);
            self.handler.on_event_response(&response).await;
        } else {
            tracing::warn!(
                ven_id = %response.ven_id,
                event_id = %response.event_id,
                "response for unknown event ignored"
            );
        }
        Ok(())
    }

    fn add_event(&mut self, event: Event) {
        *self.submitted.entry(event.ven_id.clone()).or_default() += 1;
        tracing::debug!(ven_id = %event.ven_id, event_id = %event.event_id, "event queued");
        self.queues
            .entry(event.ven_id.clone())
            .or_default()
            .push_back(event);
    }
}
