//! Messages exchanged between the VTN and its VENs

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A VEN's answer to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptType {
    /// Accept the event
    OptIn,
    /// Decline the event
    OptOut,
    /// Accept part of the event
    Partial,
}

impl std::fmt::Display for OptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OptIn => write!(f, "optIn"),
            Self::OptOut => write!(f, "optOut"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// Registration presented by a connecting VEN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub ven_name: String,
    /// Id the VEN believes it has; checked against the coordinator's answer
    #[serde(default)]
    pub ven_id: Option<String>,
    pub fingerprint: String,
}

/// Identity assigned to an accepted VEN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub ven_id: String,
    pub registration_id: String,
}

/// Identity record returned by the fingerprint lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenLookup {
    pub ven_id: String,
    pub ven_name: String,
    pub fingerprint: String,
    pub registration_id: String,
}

/// A VEN's report capability offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOffer {
    pub ven_id: String,
    pub resource_id: String,
    pub measurement: String,
    pub unit: String,
    pub scale: String,
    pub min_sampling_interval: Duration,
    pub max_sampling_interval: Duration,
    pub report_duration: Duration,
}

/// Interval the coordinator picked for a report offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGrant {
    pub sampling_interval: Duration,
}

/// One telemetry reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Batch of readings for one report resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub ven_id: String,
    pub resource_id: String,
    pub samples: Vec<ReportSample>,
}

/// One interval of a control event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInterval {
    pub dtstart: DateTime<Utc>,
    pub duration: Duration,
    pub signal_payload: f64,
}

/// Control event pushed to a single VEN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub ven_id: String,
    pub signal_name: String,
    pub signal_type: String,
    pub intervals: Vec<EventInterval>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// End of the last interval, or the creation time for an event without intervals
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.intervals
            .iter()
            .filter_map(|i| {
                let length = TimeDelta::from_std(i.duration).ok()?;
                i.dtstart.checked_add_signed(length)
            })
            .max()
            .unwrap_or(self.created_at)
    }
}

/// A VEN's answer to one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub ven_id: String,
    pub event_id: String,
    pub opt_type: OptType,
}

/// Poll for queued events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub ven_id: String,
}
