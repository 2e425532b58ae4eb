//! Device identity records

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix of generated device ids
pub const ID_PREFIX: &str = "ID";

/// Prefix of generated registration ids
pub const REGISTRATION_PREFIX: &str = "REG";

/// Immutable identity of one VEN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenProps {
    /// Human-readable label, not guaranteed unique
    pub name: String,
    /// Primary key
    pub id: String,
    /// Secondary identity assigned at registration
    pub registration_id: String,
    /// Out-of-band credential checked by the coordinator
    pub fingerprint: String,
}

impl VenProps {
    /// Build an identity with a fresh random fingerprint
    #[must_use]
    pub fn generate(index: usize) -> Self {
        Self {
            name: format!("ven-{index}"),
            id: generate_id(ID_PREFIX, index),
            registration_id: generate_id(REGISTRATION_PREFIX, index),
            fingerprint: random_fingerprint(),
        }
    }
}

impl std::fmt::Display for VenProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VEN(name={}, id={}, registration_id={}, fingerprint={})",
            self.name, self.id, self.registration_id, self.fingerprint
        )
    }
}

/// `<prefix>-<index>`
#[must_use]
pub fn generate_id(prefix: &str, index: usize) -> String {
    format!("{prefix}-{index}")
}

/// Hex SHA-256 digest of 32 random bytes
#[must_use]
pub fn random_fingerprint() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}
