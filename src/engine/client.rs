//! Client role of the protocol engine: one VEN's session with the VTN

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::transport::Transport;
use super::types::{
    Event, EventResponse, OptType, RegisterRequest, Registration, ReportOffer, ReportSample,
    ReportUpdate,
};
use crate::Result;
use crate::ven::VenProps;

/// Shortest interval a client loop will tick at
const MIN_TICK: Duration = Duration::from_millis(1);

/// Device-side behavior plugged into a [`VenClient`]
#[async_trait]
pub trait VenHooks: Send + Sync {
    /// Produce the next telemetry reading
    async fn collect_report_value(&self, ven_id: &str) -> f64;

    /// Decide how to answer an event
    async fn handle_event(&self, event: &Event) -> OptType;
}

/// Timing knobs for a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Interval the client offers for report samples
    pub sampling_interval: Duration,
    /// Lifetime advertised with the report offer
    pub report_duration: Duration,
    /// Interval between event polls
    pub poll_interval: Duration,
    /// Upper bound on a single hook call
    pub hook_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(10),
            report_duration: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(10),
            hook_timeout: Duration::from_secs(5),
        }
    }
}

/// One VEN's protocol session
pub struct VenClient {
    props: VenProps,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn VenHooks>,
    settings: ClientSettings,
}

impl VenClient {
    #[must_use]
    pub fn new(
        props: VenProps,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn VenHooks>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            props,
            transport,
            hooks,
            settings,
        }
    }

    /// Register, offer the report, then serve reports and events until cancelled
    ///
    /// # Errors
    ///
    /// Returns error if registration or report registration fails. Errors on
    /// individual polls or report updates are logged and the session continues.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let registration = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            r = self.register() => r?,
        };

        let sampling = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            r = self.offer_report(&registration) => r?,
        };

        let mut report_tick = tokio::time::interval(sampling.max(MIN_TICK));
        report_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll_tick = tokio::time::interval(self.settings.poll_interval.max(MIN_TICK));
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First ticks complete immediately
        report_tick.tick().await;
        poll_tick.tick().await;

        tracing::info!(ven_id = %registration.ven_id, interval = ?sampling, "VEN session active");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = poll_tick.tick() => self.poll_once(&registration.ven_id).await,
                _ = report_tick.tick() => self.report_once(&registration.ven_id).await,
            }
        }

        tracing::info!(ven_id = %registration.ven_id, "VEN session stopped");
        Ok(())
    }

    async fn register(&self) -> Result<Registration> {
        let request = RegisterRequest {
            ven_name: self.props.name.clone(),
            ven_id: Some(self.props.id.clone()),
            fingerprint: self.props.fingerprint.clone(),
        };
        let registration = self.transport.register(request).await?;
        tracing::debug!(
            ven_id = %registration.ven_id,
            registration_id = %registration.registration_id,
            "registered with VTN"
        );
        Ok(registration)
    }

    async fn offer_report(&self, registration: &Registration) -> Result<Duration> {
        let offer = ReportOffer {
            ven_id: registration.ven_id.clone(),
            resource_id: registration.ven_id.clone(),
            measurement: registration.registration_id.clone(),
            unit: String::new(),
            scale: "none".to_string(),
            min_sampling_interval: self.settings.sampling_interval,
            max_sampling_interval: self.settings.sampling_interval,
            report_duration: self.settings.report_duration,
        };
        self.transport.register_report(offer).await
    }

    async fn report_once(&self, ven_id: &str) {
        let Ok(value) = tokio::time::timeout(
            self.settings.hook_timeout,
            self.hooks.collect_report_value(ven_id),
        )
        .await
        else {
            tracing::warn!(ven_id = %ven_id, "report hook timed out, sample skipped");
            return;
        };

        let update = ReportUpdate {
            ven_id: ven_id.to_string(),
            resource_id: ven_id.to_string(),
            samples: vec![ReportSample {
                timestamp: Utc::now(),
                value,
            }],
        };
        if let Err(e) = self.transport.update_report(update).await {
            tracing::warn!(ven_id = %ven_id, error = %e, "report update failed");
        }
    }

    async fn poll_once(&self, ven_id: &str) {
        let events = match self.transport.poll(ven_id).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(ven_id = %ven_id, error = %e, "event poll failed");
                return;
            }
        };

        for event in events {
            let answer = tokio::time::timeout(
                self.settings.hook_timeout,
                self.hooks.handle_event(&event),
            )
            .await;
            let opt_type = answer.unwrap_or_else(|_| {
                tracing::warn!(
                    ven_id = %ven_id,
                    event_id = %event.event_id,
                    "event hook timed out, opting out"
                );
                OptType::OptOut
            });

            let response = EventResponse {
                ven_id: ven_id.to_string(),
                event_id: event.event_id.clone(),
                opt_type,
            };
            if let Err(e) = self.transport.respond(response).await {
                tracing::warn!(
                    ven_id = %ven_id,
                    event_id = %event.event_id,
                    error = %e,
                    "event response failed"
                );
            }
        }
    }
}
