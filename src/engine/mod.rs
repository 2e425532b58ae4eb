//! Demand-response protocol engine
//!
//! A small JSON profile of the VTN/VEN exchange: registration, report
//! registration and updates, event polling and event responses. The server
//! role runs as one task per coordinator; the client role runs as one task per
//! device. Both talk through the [`Transport`] trait, either in process or over
//! HTTP.

mod client;
pub mod http;
mod server;
mod transport;
mod types;

pub use client::{ClientSettings, VenClient, VenHooks};
pub use http::HttpTransport;
pub use server::{ReportSink, ReportSubscription, VtnHandle, VtnHandler, VtnServer};
pub use transport::{Connector, HttpConnector, LocalConnector, Transport};
pub use types::{
    Event, EventInterval, EventResponse, OptType, PollRequest, RegisterRequest, Registration,
    ReportGrant, ReportOffer, ReportSample, ReportUpdate, VenLookup,
};

/// Path appended to the VTN origin to reach the protocol routes
pub const VTN_BASE_PATH: &str = "/OpenADR2/Simple/2.0b";
