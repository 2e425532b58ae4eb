//! Per-device background connection task

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::props::VenProps;
use crate::engine::{ClientSettings, Connector, Event, OptType, VenClient, VenHooks};
use crate::error::SpawnFailure;
use crate::{Error, Result};

/// Placeholder reading reported by devices without real telemetry
pub const PLACEHOLDER_READING: f64 = 1.23;

/// Hooks used when a device has no custom behavior: fixed reading, always opt in
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVenHooks;

#[async_trait]
impl VenHooks for DefaultVenHooks {
    async fn collect_report_value(&self, _ven_id: &str) -> f64 {
        PLACEHOLDER_READING
    }

    async fn handle_event(&self, event: &Event) -> OptType {
        tracing::info!(
            ven_id = %event.ven_id,
            event_id = %event.event_id,
            signal = %event.signal_name,
            "received event"
        );
        OptType::OptIn
    }
}

/// Handle to a running device task
#[derive(Debug)]
pub struct AgentHandle {
    ven_id: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl AgentHandle {
    #[must_use]
    pub fn ven_id(&self) -> &str {
        &self.ven_id
    }

    /// Ask the task to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit
    ///
    /// # Errors
    ///
    /// Returns the session's error, or an engine error if the task panicked
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Engine(format!("VEN task for {} aborted: {e}", self.ven_id)))?
    }
}

/// Spawns one device's protocol session
pub struct VenAgent;

impl VenAgent {
    /// Build the device's transport and start its session in the background
    ///
    /// The task token is a child of `cancel`, so cancelling the parent stops
    /// every agent spawned from it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Spawn` if the transport cannot be constructed
    pub fn spawn(
        props: VenProps,
        connector: &dyn Connector,
        hooks: Arc<dyn VenHooks>,
        settings: ClientSettings,
        cancel: &CancellationToken,
    ) -> Result<AgentHandle> {
        let transport = connector.connect(&props).map_err(|e| {
            Error::Spawn(SpawnFailure {
                ven_id: props.id.clone(),
                reason: e.to_string(),
            })
        })?;

        let ven_id = props.id.clone();
        let cancel = cancel.child_token();
        let client = VenClient::new(props, transport, hooks, settings);

        let task_cancel = cancel.clone();
        let task_id = ven_id.clone();
        let task = tokio::spawn(async move {
            let result = client.run(task_cancel).await;
            if let Err(e) = &result {
                tracing::error!(ven_id = %task_id, error = %e, "VEN session failed");
            }
            result
        });

        tracing::info!(ven_id = %ven_id, "VEN agent started");
        Ok(AgentHandle {
            ven_id,
            cancel,
            task,
        })
    }
}
