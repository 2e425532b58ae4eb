//! Shared test utilities

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use openkick::config::file::OpenKickConfigFile;
use openkick::engine::{ClientSettings, Connector, HttpConnector, Transport};
use openkick::{Config, Error, MemoryStore, Result, VenProps, VenRegistry, VtnService};

/// Default configuration with fast client timings
#[must_use]
pub fn test_config() -> Config {
    let mut config =
        Config::from_parts(OpenKickConfigFile::default(), |_| None).expect("default config");
    config.ven.client = ClientSettings {
        sampling_interval: Duration::from_millis(20),
        report_duration: Duration::from_secs(60),
        poll_interval: Duration::from_millis(20),
        hook_timeout: Duration::from_millis(500),
    };
    config
}

/// Store holding `count` generated identities
#[must_use]
pub fn seeded_store(count: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.seed(count);
    store
}

/// A stopped service over an empty registry
#[must_use]
pub fn test_service() -> VtnService {
    VtnService::new(&test_config(), VenRegistry::new().into_shared())
}

/// A running service seeded with `count` devices
pub async fn running_service(count: usize) -> Arc<VtnService> {
    let service = Arc::new(test_service());
    service
        .run(&seeded_store(count))
        .await
        .expect("service failed to start");
    service
}

/// Poll `check` until it returns true or two seconds pass
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Connector that refuses one device id
///
/// Every other device gets an HTTP transport to a closed port, so its agent
/// starts and then ends on the failed registration.
pub struct RefusingConnector {
    refuse: String,
    inner: HttpConnector,
}

impl RefusingConnector {
    #[must_use]
    pub fn new(refuse: &str) -> Self {
        Self {
            refuse: refuse.to_string(),
            inner: HttpConnector::new(
                "http://127.0.0.1:9/OpenADR2/Simple/2.0b",
                Duration::from_millis(200),
            ),
        }
    }
}

impl Connector for RefusingConnector {
    fn connect(&self, props: &VenProps) -> Result<Arc<dyn Transport>> {
        if props.id == self.refuse {
            return Err(Error::Config(format!("no route to VTN for {}", props.id)));
        }
        self.inner.connect(props)
    }
}
