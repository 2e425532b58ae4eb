//! OpenKick - demand-response coordinator
//!
//! A VTN (coordinator) tracks a fleet of VENs (devices), runs one background
//! connection task per device, and dispatches control events to connected
//! devices by id.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Public HTTP API                     │
//! │   /ven/registered  │  /ven/connect  │  /event/...    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   VtnService                         │
//! │   VenRegistry  │  Supervisor  │  VtnServer loop      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Transport (in process / HTTP)
//! ┌────────────────────▼────────────────────────────────┐
//! │            VenAgent tasks (one per device)           │
//! │   register  │  report  │  poll events  │  respond    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod store;
pub mod supervisor;
pub mod ven;
pub mod vtn;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result, SpawnFailure};
pub use store::MemoryStore;
pub use supervisor::Supervisor;
pub use ven::{VenProps, VenRegistry, VenSummary};
pub use vtn::{VenPhase, VtnService};
