//! TOML configuration file loading
//!
//! Supports `<config_dir>/openkick/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct OpenKickConfigFile {
    #[serde(default)]
    pub core: CoreFileConfig,

    /// Coordinator location and identity
    #[serde(default)]
    pub vtn: VtnFileConfig,

    /// Public API server
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Standalone device settings and client timing
    #[serde(default)]
    pub ven: VenFileConfig,

    /// Identity seeding
    #[serde(default)]
    pub seed: SeedFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoreFileConfig {
    /// Verbose logging
    pub debug: Option<bool>,
}

/// Coordinator configuration
#[derive(Debug, Default, Deserialize)]
pub struct VtnFileConfig {
    /// Coordinator identity presented to devices
    pub id: Option<String>,

    /// Device transport ("local" or "http")
    pub transport: Option<String>,

    #[serde(default)]
    pub location: LocationFileConfig,
}

/// Network location of the coordinator
#[derive(Debug, Default, Deserialize)]
pub struct LocationFileConfig {
    pub protocol: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
}

/// Public API server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    pub title: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Device configuration
#[derive(Debug, Default, Deserialize)]
pub struct VenFileConfig {
    pub name: Option<String>,
    pub id: Option<String>,
    pub registration_id: Option<String>,
    pub fingerprint: Option<String>,

    /// Report sampling interval in seconds
    pub sampling_secs: Option<u64>,

    /// Advertised report lifetime in seconds
    pub report_duration_secs: Option<u64>,

    /// Event poll interval in seconds
    pub poll_secs: Option<u64>,

    /// Upper bound on a single hook call in seconds
    pub hook_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedFileConfig {
    /// Number of identities generated at startup
    pub count: Option<usize>,
}

/// Load the TOML config file from `path`, or from the standard path
///
/// Returns `OpenKickConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> OpenKickConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return OpenKickConfigFile::default();
    };

    if !path.exists() {
        return OpenKickConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                OpenKickConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            OpenKickConfigFile::default()
        }
    }
}

/// Return the config file path: `<config_dir>/openkick/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("openkick").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc: OpenKickConfigFile = toml::from_str(
            r#"
            [vtn.location]
            hostname = "localhost"

            [seed]
            count = 3
            "#,
        )
        .unwrap();

        assert_eq!(fc.vtn.location.hostname.as_deref(), Some("localhost"));
        assert!(fc.vtn.location.port.is_none());
        assert_eq!(fc.seed.count, Some(3));
        assert!(fc.core.debug.is_none());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let fc = load_config_file(Some(&path));
        assert!(fc.vtn.id.is_none());
    }

    #[test]
    fn explicit_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nport = 9001\n").unwrap();

        let fc = load_config_file(Some(&path));
        assert_eq!(fc.api.port, Some(9001));
    }
}
