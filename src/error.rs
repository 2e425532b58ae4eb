//! Error types for the OpenKick coordinator

use thiserror::Error;

/// Result type alias for OpenKick operations
pub type Result<T> = std::result::Result<T, Error>;

/// A device whose connection task could not be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnFailure {
    /// Identity of the device
    pub ven_id: String,
    /// Why the task could not be started
    pub reason: String,
}

impl std::fmt::Display for SpawnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.ven_id, self.reason)
    }
}

/// Errors that can occur in the coordinator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A device with the same id or registration id is already registered
    #[error("duplicate VEN: {field} '{value}' is already registered")]
    DuplicateVen { field: &'static str, value: String },

    /// Target device is absent from the registry
    #[error("VEN not registered: {0}")]
    UnknownDevice(String),

    /// Target device is registered but has no running connection
    #[error("VEN not connected: {0}")]
    NotConnected(String),

    /// A device connection task could not be started
    #[error("failed to start VEN client: {0}")]
    Spawn(SpawnFailure),

    /// One or more devices failed to start during a connect-all pass
    #[error("{} VEN(s) failed to connect ({} started)", failures.len(), started.len())]
    ConnectAll {
        started: Vec<String>,
        failures: Vec<SpawnFailure>,
    },

    /// Failure raised by the protocol engine
    #[error("protocol engine error: {0}")]
    Engine(String),

    /// The coordinator refused a device registration
    #[error("registration rejected for VEN '{0}'")]
    RegistrationRejected(String),

    /// The coordinator has not been started
    #[error("VTN server is not running")]
    NotRunning,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Stable token describing the error kind, rendered by API callers
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::DuplicateVen { .. } => "duplicate_device",
            Self::UnknownDevice(_) => "unknown_device",
            Self::NotConnected(_) => "not_connected",
            Self::Spawn(_) | Self::ConnectAll { .. } => "spawn_failed",
            Self::Engine(_) | Self::Http(_) => "engine_fault",
            Self::RegistrationRejected(_) => "registration_rejected",
            Self::NotRunning => "not_running",
            Self::Io(_) | Self::Serialization(_) | Self::Toml(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_have_distinct_codes() {
        assert_eq!(Error::UnknownDevice("ID-9".into()).code(), "unknown_device");
        assert_eq!(Error::NotConnected("ID-1".into()).code(), "not_connected");
        assert_eq!(Error::NotRunning.code(), "not_running");
    }

    #[test]
    fn connect_all_message_counts_failures() {
        let err = Error::ConnectAll {
            started: vec!["ID-0".into()],
            failures: vec![SpawnFailure {
                ven_id: "ID-1".into(),
                reason: "bad url".into(),
            }],
        };
        assert_eq!(err.to_string(), "1 VEN(s) failed to connect (1 started)");
        assert_eq!(err.code(), "spawn_failed");
    }
}
