//! Connection supervisor: one agent task per device, started at most once

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::{ClientSettings, Connector, VenHooks};
use crate::error::SpawnFailure;
use crate::ven::{AgentHandle, SharedVenRegistry, VenAgent};
use crate::{Error, Result};

/// How long `shutdown` waits for each agent before abandoning it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Starts and owns the per-device agent tasks
pub struct Supervisor {
    registry: SharedVenRegistry,
    connector: Arc<dyn Connector>,
    hooks: Arc<dyn VenHooks>,
    settings: ClientSettings,
    cancel: CancellationToken,
    agents: Mutex<HashMap<String, AgentHandle>>,
}

impl Supervisor {
    /// Create a supervisor; agents get child tokens of `cancel`
    #[must_use]
    pub fn new(
        registry: SharedVenRegistry,
        connector: Arc<dyn Connector>,
        hooks: Arc<dyn VenHooks>,
        settings: ClientSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            connector,
            hooks,
            settings,
            cancel,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Start an agent for every device not yet connected
    ///
    /// Each successful spawn flips the device to connected. The agent map lock
    /// is held for the whole pass, so concurrent calls serialize and no device
    /// is ever started twice. Returns the ids started by this call.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectAll` if any device failed to start; every other
    /// device is still attempted, and the ids that did start are carried in
    /// the error.
    pub async fn connect_all(&self) -> Result<Vec<String>> {
        let mut agents = self.agents.lock().await;
        let pending = self.registry.read().await.pending();

        let mut started = Vec::new();
        let mut failures = Vec::new();

        for props in pending {
            if agents.contains_key(&props.id) {
                continue;
            }

            let ven_id = props.id.clone();
            match VenAgent::spawn(
                props,
                self.connector.as_ref(),
                Arc::clone(&self.hooks),
                self.settings,
                &self.cancel,
            ) {
                Ok(handle) => {
                    self.registry.write().await.mark_connected(handle.ven_id());
                    agents.insert(handle.ven_id().to_string(), handle);
                    started.push(ven_id);
                }
                Err(Error::Spawn(failure)) => {
                    tracing::warn!(
                        ven_id = %failure.ven_id,
                        reason = %failure.reason,
                        "failed to start VEN agent"
                    );
                    failures.push(failure);
                }
                Err(e) => {
                    tracing::warn!(ven_id = %ven_id, error = %e, "failed to start VEN agent");
                    failures.push(SpawnFailure {
                        ven_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            started = started.len(),
            failed = failures.len(),
            running = agents.len(),
            "connect pass complete"
        );

        if failures.is_empty() {
            Ok(started)
        } else {
            Err(Error::ConnectAll { started, failures })
        }
    }

    /// Number of agents started so far
    pub async fn agent_count(&self) -> usize {
        self.agents.lock().await.len()
    }

    /// Whether an agent exists for `ven_id` and its task has not exited
    pub async fn is_running(&self, ven_id: &str) -> bool {
        self.agents
            .lock()
            .await
            .get(ven_id)
            .is_some_and(|a| !a.is_finished())
    }

    /// Cancel every agent and wait for each to exit
    pub async fn shutdown(&self) {
        let mut agents = self.agents.lock().await;
        for agent in agents.values() {
            agent.cancel();
        }

        for (ven_id, agent) in agents.drain() {
            match tokio::time::timeout(SHUTDOWN_GRACE, agent.join()).await {
                Ok(Ok(())) => {}
                // Session errors were already logged by the agent task
                Ok(Err(e)) => {
                    tracing::debug!(ven_id = %ven_id, error = %e, "VEN agent ended with error");
                }
                Err(_) => tracing::warn!(ven_id = %ven_id, "VEN agent did not stop in time"),
            }
        }
        tracing::debug!("all VEN agents stopped");
    }
}
