//! Registry of known VENs and their connection state

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::props::VenProps;
use crate::{Error, Result};

/// Shared registry state, read by the coordinator loop, the supervisor and the API
pub type SharedVenRegistry = Arc<RwLock<VenRegistry>>;

/// A registry-owned VEN: fixed identity plus connection flag
#[derive(Debug, Clone)]
pub struct Ven {
    props: VenProps,
    connected: bool,
}

impl Ven {
    /// Wrap an identity; new records start disconnected
    #[must_use]
    pub const fn new(props: VenProps) -> Self {
        Self {
            props,
            connected: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.props.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.props.name
    }

    #[must_use]
    pub fn registration_id(&self) -> &str {
        &self.props.registration_id
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.props.fingerprint
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn summary(&self) -> VenSummary {
        VenSummary {
            name: self.props.name.clone(),
            id: self.props.id.clone(),
            registration_id: self.props.registration_id.clone(),
            fingerprint: self.props.fingerprint.clone(),
            is_connected: self.connected,
        }
    }
}

impl std::fmt::Display for Ven {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, is_connected={}", self.props, self.connected)
    }
}

/// Read-only projection of one VEN handed to external callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenSummary {
    pub name: String,
    pub id: String,
    pub registration_id: String,
    pub fingerprint: String,
    pub is_connected: bool,
}

/// Append-only collection of VENs
///
/// The snapshot projection is rebuilt inside every mutation, so a reader never
/// sees a projection that disagrees with the membership list. Each rebuild bumps
/// `generation`.
#[derive(Debug)]
pub struct VenRegistry {
    vens: Vec<Ven>,
    snapshot: Arc<[VenSummary]>,
    generation: u64,
}

impl Default for VenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VenRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            vens: Vec::new(),
            snapshot: Arc::from(Vec::new()),
            generation: 0,
        }
    }

    /// Build a registry from identities, rejecting duplicates
    ///
    /// # Errors
    ///
    /// Returns error if two identities share an id or registration id
    pub fn from_props(props: impl IntoIterator<Item = VenProps>) -> Result<Self> {
        let mut registry = Self::new();
        for p in props {
            registry.append(p)?;
        }
        Ok(registry)
    }

    /// Wrap into the shared form used across tasks
    #[must_use]
    pub fn into_shared(self) -> SharedVenRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Add a VEN at the tail
    ///
    /// # Errors
    ///
    /// Returns error if the id or registration id is already present
    pub fn append(&mut self, props: VenProps) -> Result<()> {
        if self.has_id(&props.id) {
            return Err(Error::DuplicateVen {
                field: "id",
                value: props.id,
            });
        }
        if self.find_by_registration_id(&props.registration_id).is_some() {
            return Err(Error::DuplicateVen {
                field: "registration_id",
                value: props.registration_id,
            });
        }

        tracing::debug!(name = %props.name, index = self.vens.len(), "adding VEN");
        self.vens.push(Ven::new(props));
        self.refresh_snapshot();
        Ok(())
    }

    /// Flip a VEN to connected; returns false if unknown or already connected
    pub fn mark_connected(&mut self, id: &str) -> bool {
        let Some(ven) = self.vens.iter_mut().find(|v| v.props.id == id) else {
            return false;
        };
        if ven.connected {
            return false;
        }
        ven.connected = true;
        self.refresh_snapshot();
        true
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot = self.vens.iter().map(Ven::summary).collect();
        self.generation += 1;
    }

    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Ven> {
        self.vens.iter().find(|v| v.props.id == id)
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Ven> {
        self.vens.iter().find(|v| v.props.name == name)
    }

    #[must_use]
    pub fn find_by_registration_id(&self, registration_id: &str) -> Option<&Ven> {
        self.vens
            .iter()
            .find(|v| v.props.registration_id == registration_id)
    }

    #[must_use]
    pub fn has_id(&self, id: &str) -> bool {
        self.vens.iter().any(|v| v.props.id == id)
    }

    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.vens.iter().any(|v| v.props.name == name)
    }

    /// Projection of every VEN, in append order
    #[must_use]
    pub fn snapshot(&self) -> Arc<[VenSummary]> {
        Arc::clone(&self.snapshot)
    }

    /// Projection of connected VENs only
    #[must_use]
    pub fn connected(&self) -> Vec<VenSummary> {
        self.snapshot
            .iter()
            .filter(|s| s.is_connected)
            .cloned()
            .collect()
    }

    /// Identities of VENs without a running connection
    #[must_use]
    pub fn pending(&self) -> Vec<VenProps> {
        self.vens
            .iter()
            .filter(|v| !v.connected)
            .map(|v| v.props.clone())
            .collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.vens.iter().map(|v| v.props.id.clone()).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.vens.iter().map(|v| v.props.name.clone()).collect()
    }

    /// Number of snapshot rebuilds since creation
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vens.is_empty()
    }
}

impl std::fmt::Display for VenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VenList({} VENs)", self.vens.len())
    }
}
