/// Errors raised while framing or parsing command/response envelopes.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("wrong command envelope magic")]
    WrongMagic,

    #[error("wrong command envelope version")]
    WrongVersion,

    #[error("header length {0} exceeds one byte")]
    HeaderTooLarge(usize),

    #[error("payload length {0} exceeds the maximum of {1} bytes")]
    PayloadTooLarge(u64, u64),

    #[error("envelope truncated: fewer bytes available than the declared payload length")]
    Truncated,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("duplicate key `{0}` in body mapping")]
    DuplicateKey(String),

    #[error("CBOR encoding failed: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding failed: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A response decoded successfully but carried an `error` key — a
    /// protocol *success* carrying an application-level failure. Kept
    /// distinct from every other variant above so callers can tell
    /// transport/protocol failure apart from a peer-reported error.
    #[error("{0}")]
    CommandFailed(String),
}
