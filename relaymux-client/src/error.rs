use relaymux_host::HostError;

/// Errors raised while selecting, dialing, and exchanging a command with a
/// peer. Wraps rather than stringifies the layers underneath — a
/// `ClientError::Command` still carries the originating
/// [`relaymux_command::CommandError`] via `#[source]`.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("decoding peer id `{0}` failed")]
    InvalidPeerId(String),

    #[error("peer new stream failed: {0}")]
    OpenStreamFailed(#[source] HostError),

    #[error(transparent)]
    Command(#[from] relaymux_command::CommandError),

    #[error("command `{command}` timed out")]
    Timeout { command: String },

    #[error("peer discovery channel closed before a stream was established")]
    NoPeersAvailable,

    #[error("client is closed")]
    Cancelled,
}

impl ClientError {
    /// The peer this failure is attributable to, when the error arose from
    /// a specific candidate rather than the send as a whole.
    pub fn peer(&self) -> Option<&str> {
        match self {
            ClientError::OpenStreamFailed(host_err) => host_err.peer(),
            _ => None,
        }
    }
}
