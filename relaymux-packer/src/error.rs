use crate::Channel;

/// Errors raised while framing or parsing packer frames. Magic/version
/// mismatches and short reads/writes are fatal for the stream they occur
/// on; callers tear the stream down rather than try to resynchronize.
#[derive(thiserror::Error, Debug)]
pub enum PackerError {
    #[error("wrong packer magic")]
    WrongMagic,

    #[error("wrong packer version")]
    WrongVersion,

    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    #[error("negative frame length {0}")]
    NegativeLength(i64),

    #[error("short write on channel {channel}: wrote {wrote} of {expected} bytes")]
    ShortWrite {
        channel: Channel,
        expected: u64,
        wrote: u64,
    },

    #[error("channel {channel} closed by peer: {message}")]
    RemoteClosed { channel: Channel, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
