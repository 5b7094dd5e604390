use std::fmt;

use crate::Connectedness;

/// Errors surfaced by a [`crate::Host`] implementation.
///
/// These are the only errors a consumer of the host abstraction needs to
/// handle directly; everything above this layer (the client, the router)
/// wraps `HostError` rather than re-deriving its own transport failure
/// kinds.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("decoding peer id `{0}` failed")]
    InvalidPeerId(String),

    #[error("dial to peer {peer} failed: {message}")]
    DialFailed { peer: String, message: String },

    #[error("opening stream to peer {peer} on protocol {protocol} failed: {message}")]
    OpenStreamFailed {
        peer: String,
        protocol: String,
        message: String,
    },

    #[error("peer {0} is not reachable")]
    CannotConnect(String),

    #[error("host is closed")]
    Closed,
}

/// Failure classification the selection pipeline cares about, kept
/// separate from the message so callers can match on it without parsing
/// strings.
impl HostError {
    pub fn peer(&self) -> Option<&str> {
        match self {
            HostError::DialFailed { peer, .. } => Some(peer),
            HostError::OpenStreamFailed { peer, .. } => Some(peer),
            HostError::CannotConnect(peer) => Some(peer),
            _ => None,
        }
    }
}

impl fmt::Display for Connectedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Connectedness::Connected => "connected",
            Connectedness::CanConnect => "can-connect",
            Connectedness::NotConnected => "not-connected",
            Connectedness::CannotConnect => "cannot-connect",
        };
        f.write_str(s)
    }
}
