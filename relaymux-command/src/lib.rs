//! Command/response value model and CBOR envelope framing for relaymux's
//! request/response RPC. See `relaymux-packer` for the separate, simpler
//! wire format used by the HTTP tunnel's multiplexed byte streams.

mod envelope;
mod error;
mod model;

pub use ciborium::Value;
pub use envelope::{decode_envelope, encode_envelope, COMMAND_MAGIC, COMMAND_VERSION, MAX_PAYLOAD_LEN};
pub use error::CommandError;
pub use model::{Body, Command, Response, RESPONSE_ERROR_KEY};
