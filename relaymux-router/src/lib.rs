//! Command dispatch ([`Router`]) and inbound-stream binding ([`Service`])
//! for relaymux, sitting between `relaymux-host` (the transport) and
//! `relaymux-command` (the wire model).

mod connection;
mod error;
mod router;
mod service;

pub use connection::Connection;
pub use error::RouterError;
pub use router::{CommandHandler, RawCommandHandler, RouteResolver, Router, SecondaryHandler};
pub use service::{Service, ServiceConfig};
