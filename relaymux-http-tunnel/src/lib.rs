//! Tunnels one HTTP request/response pair over a `relaymux-packer` stream,
//! so that a single raw byte stream opened through `relaymux-router`'s raw
//! command path can carry an HTTP exchange end to end. Grounded in
//! `streams/tunnels/http/handler.go`; see `DESIGN.md`.
//!
//! The stream carries three channels multiplexed by [`relaymux_packer::Packer`]:
//! - `RequestOp` — one CBOR [`payload::RequestPayload`] frame, frontend -> backend
//! - `HeadersOp` — one CBOR [`payload::HeadersPayload`] frame, backend -> frontend
//! - `BodyOp` — streamed body bytes, either direction, terminated by a `Close`

mod backend;
mod body;
mod config;
mod error;
mod frontend;
mod payload;
mod response_writer;

pub use backend::backend;
pub use body::BodyReader;
pub use config::TunnelConfig;
pub use error::TunnelError;
pub use frontend::frontend;
pub use payload::{HeaderMultiMap, HeadersPayload, RequestPayload};
pub use response_writer::ResponseWriter;

use relaymux_packer::{Channel, Packer};

const MAGIC: [u8; 2] = [0x02, 0xfc];
const VERSION: u16 = 0x01;

const HEADERS_OP: Channel = 1;
const REQUEST_OP: Channel = 8;
const BODY_OP: Channel = 16;

const PACKER: Packer = Packer::new(MAGIC, VERSION);
