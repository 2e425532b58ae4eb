//! Configuration management for the OpenKick coordinator
//!
//! Values are layered env > TOML file > defaults. Environment keys follow
//! `OPEN_KICK__<SECTION>__<KEY>`.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::engine::{ClientSettings, VTN_BASE_PATH};
use crate::ven::{VenProps, random_fingerprint};
use crate::{Error, Result};

use file::OpenKickConfigFile;

/// Prefix shared by every environment key
pub const ENV_PREFIX: &str = "OPEN_KICK__";

/// OpenKick configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Verbose logging
    pub debug: bool,

    /// Coordinator configuration
    pub vtn: VtnConfig,

    /// Public API server configuration
    pub api: ApiConfig,

    /// Standalone device identity and client timing
    pub ven: VenConfig,

    /// Identities generated into the store at startup
    pub seed_count: usize,
}

/// How device agents reach the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// In-process channel to the server loop
    #[default]
    Local,
    /// JSON over HTTP against `vtn_url()`
    Http,
}

impl std::str::FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "http" => Ok(Self::Http),
            other => Err(Error::Config(format!(
                "unknown transport '{other}' (expected 'local' or 'http')"
            ))),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct VtnConfig {
    /// Identity presented to devices
    pub id: String,
    pub location: VtnLocation,
    pub transport: TransportKind,
}

/// Network location of the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtnLocation {
    pub protocol: String,
    pub hostname: String,
    /// `0` leaves the port out of the origin
    pub port: u16,
}

impl VtnLocation {
    /// `protocol://hostname[:port]`
    #[must_use]
    pub fn origin(&self) -> String {
        if self.port == 0 {
            format!("{}://{}", self.protocol, self.hostname)
        } else {
            format!("{}://{}:{}", self.protocol, self.hostname, self.port)
        }
    }

    /// Base URL of the protocol routes
    #[must_use]
    pub fn vtn_url(&self) -> String {
        format!("{}{VTN_BASE_PATH}", self.origin())
    }
}

/// Public API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub title: String,
    pub host: String,
    pub port: u16,
}

/// Standalone device configuration
#[derive(Debug, Clone)]
pub struct VenConfig {
    pub name: String,
    pub id: String,
    pub registration_id: String,
    /// Credential presented at registration; generated when absent
    pub fingerprint: Option<String>,
    pub client: ClientSettings,
}

impl VenConfig {
    /// Identity used by the standalone device
    #[must_use]
    pub fn props(&self) -> VenProps {
        VenProps {
            name: self.name.clone(),
            id: self.id.clone(),
            registration_id: self.registration_id.clone(),
            fingerprint: self.fingerprint.clone().unwrap_or_else(|| {
                tracing::warn!(ven_id = %self.id, "no fingerprint configured, generating one");
                random_fingerprint()
            }),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// `path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load optional TOML config file (env > toml > default)
        let fc = file::load_config_file(path);
        Self::from_parts(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// `env` resolves full variable names such as `OPEN_KICK__VTN__ID`.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn from_parts(
        fc: OpenKickConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| env(&format!("{ENV_PREFIX}{key}"));

        let debug = match var("CORE__DEBUG") {
            Some(v) => v.eq_ignore_ascii_case("true"),
            None => fc.core.debug.unwrap_or(false),
        };

        // Coordinator location (env > toml > default)
        let location = VtnLocation {
            protocol: var("VTN__LOCATION__PROTOCOL")
                .or(fc.vtn.location.protocol)
                .unwrap_or_else(|| "http".to_string())
                .to_lowercase(),
            hostname: var("VTN__LOCATION__HOSTNAME")
                .or(fc.vtn.location.hostname)
                .unwrap_or_else(|| "vtn-fast-api".to_string())
                .to_lowercase(),
            port: parse_or(var("VTN__LOCATION__PORT"), "VTN__LOCATION__PORT")?
                .or(fc.vtn.location.port)
                .unwrap_or(8080),
        };

        let transport = match var("VTN__TRANSPORT").or(fc.vtn.transport) {
            Some(s) => s.parse()?,
            None => TransportKind::default(),
        };

        let vtn = VtnConfig {
            id: var("VTN__ID")
                .or(fc.vtn.id)
                .unwrap_or_else(|| location.hostname.clone())
                .to_lowercase(),
            location,
            transport,
        };

        let api = ApiConfig {
            title: var("API__TITLE")
                .or(fc.api.title)
                .unwrap_or_else(|| "OpenKick VTN API".to_string()),
            host: var("API__HOST")
                .or(fc.api.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(var("API__PORT"), "API__PORT")?
                .or(fc.api.port)
                .unwrap_or(8000),
        };

        let defaults = ClientSettings::default();
        let secs = |key: &str, file: Option<u64>, default: Duration| -> Result<Duration> {
            Ok(parse_or(var(key), key)?
                .or(file)
                .map_or(default, Duration::from_secs))
        };
        let client = ClientSettings {
            sampling_interval: secs(
                "VEN__SAMPLING_SECS",
                fc.ven.sampling_secs,
                defaults.sampling_interval,
            )?,
            report_duration: secs(
                "VEN__REPORT_DURATION_SECS",
                fc.ven.report_duration_secs,
                defaults.report_duration,
            )?,
            poll_interval: secs("VEN__POLL_SECS", fc.ven.poll_secs, defaults.poll_interval)?,
            hook_timeout: secs(
                "VEN__HOOK_TIMEOUT_SECS",
                fc.ven.hook_timeout_secs,
                defaults.hook_timeout,
            )?,
        };

        let ven = VenConfig {
            name: var("VEN__NAME")
                .or(fc.ven.name)
                .unwrap_or_else(|| "ven123".to_string()),
            id: var("VEN__ID")
                .or(fc.ven.id)
                .unwrap_or_else(|| "ven_id_123".to_string()),
            registration_id: var("VEN__REGISTRATION_ID")
                .or(fc.ven.registration_id)
                .unwrap_or_else(|| "reg_id_123".to_string()),
            fingerprint: var("VEN__FINGERPRINT").or(fc.ven.fingerprint),
            client,
        };

        let seed_count = parse_or(var("SEED__COUNT"), "SEED__COUNT")?
            .or(fc.seed.count)
            .unwrap_or(5);

        Ok(Self {
            debug,
            vtn,
            api,
            ven,
            seed_count,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{ENV_PREFIX}{key}='{v}': {e}")))
        })
        .transpose()
}
