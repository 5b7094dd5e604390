//! Abstract peer-to-peer host interfaces consumed by relaymux.
//!
//! This crate names, but does not implement, the peer-to-peer host a
//! relaymux deployment runs on top of: key generation, DHT bootstrap,
//! peerstore maintenance, pub/sub, content-addressed storage, and NAT
//! traversal all live below this line and are out of scope here. What
//! relaymux needs from that host is the [`Host`] trait plus its
//! [`Peerstore`] and [`Discovery`] companions.
//!
//! The `mock` feature adds an in-process implementation used by the
//! other relaymux crates' test suites (see [`mock::MockNetwork`]).

mod error;
mod host;
mod types;

#[cfg(feature = "mock")]
pub mod mock;

pub use error::HostError;
pub use host::{Discovery, Host, HostStream, Peerstore};
pub use types::{AddrInfo, Connectedness, PeerId, ProtocolId};
