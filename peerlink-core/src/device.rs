//! Peer device addressing
//!
//! A [`PeerAddress`] is the transport-specific identifier produced by a
//! scan (a socket `host:port`, a bulk-endpoint serial). A [`PeerDevice`]
//! is the resolved, connectable representation handed to callers and to
//! the connection orchestrator. Two addresses are the same device iff
//! their `(transport_id, raw_address)` pair matches exactly; the display
//! name never participates in identity.

use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Transport-specific address of a reachable peer
///
/// Created by a transport binding during a scan pass; immutable once
/// created. Superseded by the next scan result or discarded when the
/// owning binding stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Identifier of the transport binding this address belongs to
    pub transport_id: String,

    /// Opaque transport-specific address (e.g. `192.168.1.5:17200`)
    pub raw_address: String,

    /// Human-readable label for UI display
    pub display_name: String,
}

impl PeerAddress {
    /// Create a new address
    pub fn new(
        transport_id: impl Into<String>,
        raw_address: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            transport_id: transport_id.into(),
            raw_address: raw_address.into(),
            display_name: display_name.into(),
        }
    }
}

// Identity is (transport_id, raw_address); the display name is cosmetic.
impl PartialEq for PeerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.transport_id == other.transport_id && self.raw_address == other.raw_address
    }
}

impl Eq for PeerAddress {}

impl Hash for PeerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transport_id.hash(state);
        self.raw_address.hash(state);
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport_id, self.raw_address)
    }
}

/// A resolved, connectable peer
///
/// Carries the human-readable name and the transport identifier used to
/// reach the peer. Equality and hashing follow the underlying address
/// rule, so a renamed peer is still the same device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDevice {
    name: String,
    transport_id: String,
    address: String,
}

impl PeerDevice {
    /// Create a device from its parts
    pub fn new(
        name: impl Into<String>,
        transport_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport_id: transport_id.into(),
            address: address.into(),
        }
    }

    /// Resolve a scanned address into a connectable device
    pub fn from_address(address: &PeerAddress) -> Self {
        let name = if address.display_name.is_empty() {
            address.raw_address.clone()
        } else {
            address.display_name.clone()
        };
        Self {
            name,
            transport_id: address.transport_id.clone(),
            address: address.raw_address.clone(),
        }
    }

    /// Human-readable device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the transport used to reach this device
    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Raw transport-specific address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Convert back to the transport-level address form
    pub fn to_peer_address(&self) -> PeerAddress {
        PeerAddress::new(&self.transport_id, &self.address, &self.name)
    }
}

impl PartialEq for PeerDevice {
    fn eq(&self, other: &Self) -> bool {
        self.transport_id == other.transport_id && self.address == other.address
    }
}

impl Eq for PeerDevice {}

impl Hash for PeerDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transport_id.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for PeerDevice {
    /// Render the single-token form `transport://address#name`
    ///
    /// The name suffix is omitted when it matches the raw address, so
    /// manually entered tokens like `tcp://10.0.0.2:17200` round-trip
    /// unchanged.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.address || self.name.is_empty() {
            write!(f, "{}://{}", self.transport_id, self.address)
        } else {
            write!(f, "{}://{}#{}", self.transport_id, self.address, self.name)
        }
    }
}

impl FromStr for PeerDevice {
    type Err = LinkError;

    /// Parse the token form produced by [`fmt::Display`]
    ///
    /// Raw addresses must not contain `#`; the first `#` separates the
    /// optional display name. Malformed tokens fail without constructing
    /// anything.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (transport_id, rest) = s
            .split_once("://")
            .ok_or_else(|| LinkError::InvalidToken(s.to_string()))?;

        let (address, name) = match rest.split_once('#') {
            Some((addr, name)) => (addr, name),
            None => (rest, rest),
        };

        if transport_id.is_empty() || address.is_empty() {
            return Err(LinkError::InvalidToken(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            transport_id: transport_id.to_string(),
            address: address.to_string(),
        })
    }
}
