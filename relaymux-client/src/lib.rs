//! Peer discovery + selection + dial pipeline for relaymux command RPC:
//! `send_to` for a direct single-peer exchange, `send`/`send_for_pid`/
//! `multi_send` for a broadcast exchange across however many peers
//! advertise a protocol id. Layered on `relaymux-host` (transport) and
//! `relaymux-command` (wire model); see `DESIGN.md` for how this maps onto
//! `streams/client/client.go`.

mod client;
mod config;
mod error;

pub use client::{Client, MultiSendOutcome};
pub use config::ClientConfig;
pub use error::ClientError;
