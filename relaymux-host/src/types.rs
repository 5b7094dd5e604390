use std::fmt;
use std::str::FromStr;

use crate::HostError;

/// Opaque identifier for a peer, as advertised by the underlying host.
///
/// The host library this crate sits on top of is free to back this with a
/// cryptographic public-key hash; relaymux only ever treats it as an
/// opaque, comparable, hashable string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode a peer id from either its raw textual form or a content
    /// identifier (CID) wrapping one, the way `send_to` must accept both
    /// per the original implementation this protocol was distilled from.
    pub fn decode(input: &str) -> Result<Self, HostError> {
        let raw = input
            .strip_prefix("cid:")
            .map(str::to_owned)
            .unwrap_or_else(|| input.to_owned());

        if raw.is_empty() {
            return Err(HostError::InvalidPeerId(input.to_owned()));
        }

        Ok(PeerId(raw))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeerId::decode(s)
    }
}

/// Identifies a relaymux service over the host's stream-multiplexing
/// layer, e.g. `/hello/1.0`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolId({})", self.0)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(value: &str) -> Self {
        ProtocolId::new(value)
    }
}

impl From<String> for ProtocolId {
    fn from(value: String) -> Self {
        ProtocolId::new(value)
    }
}

/// A candidate peer plus whatever addresses are known for it, yielded by
/// the peerstore or by live discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrInfo {
    pub id: PeerId,
    pub addrs: Vec<String>,
}

impl AddrInfo {
    pub fn new(id: PeerId, addrs: Vec<String>) -> Self {
        Self { id, addrs }
    }
}

/// The host's classification of the current connection state to a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectedness {
    Connected,
    CanConnect,
    NotConnected,
    CannotConnect,
}
