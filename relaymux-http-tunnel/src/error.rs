use relaymux_packer::Channel;

/// Errors raised while tunneling an HTTP request/response pair over a
/// [`relaymux_packer::Packer`]-framed stream.
#[derive(thiserror::Error, Debug)]
pub enum TunnelError {
    #[error(transparent)]
    Packer(#[from] relaymux_packer::PackerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("CBOR encoding failed: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding failed: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("building HTTP message failed: {0}")]
    Http(#[from] http::Error),

    #[error("malformed tunnel payload: {0}")]
    MalformedPayload(&'static str),

    #[error("payload is not an HTTP body frame")]
    NotBody,

    #[error("unexpected channel {0} on tunnel stream")]
    UnexpectedChannel(Channel),

    #[error("tunnel protocol error: {0}")]
    Protocol(String),

    #[error("tunnel reader task panicked")]
    ReaderTaskPanicked,
}
