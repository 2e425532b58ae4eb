//! Device identities, the device registry and per-device agents

mod agent;
mod props;
mod registry;

pub use agent::{AgentHandle, DefaultVenHooks, PLACEHOLDER_READING, VenAgent};
pub use props::{ID_PREFIX, REGISTRATION_PREFIX, VenProps, generate_id, random_fingerprint};
pub use registry::{SharedVenRegistry, Ven, VenRegistry, VenSummary};
