use std::time::Duration;

use relaymux_host::PeerId;

/// Tunable parameters for a [`crate::Client`], matching the defaults this
/// protocol was distilled from. Plain data constructed by the embedder —
/// this is a library, so nothing here is read from the environment or a
/// config file.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Peers to seed candidate selection with when the peerstore has
    /// nothing to offer for the protocol id, tried before falling back to
    /// live discovery. The upstream implementation this was distilled from
    /// accepts an equivalent list but never threads it through; this crate
    /// puts it to use rather than carrying a dead parameter.
    pub peers: Option<Vec<PeerId>>,
    /// Minimum number of streams a broadcast send should try to establish
    /// before giving up on new candidates (a lower bound hint; `multi_send`'s
    /// `threshold` argument is the authoritative target for a given call).
    pub min_streams: usize,
    /// Upper bound on concurrently in-flight dial attempts during a
    /// broadcast send (the source's `NumStreamers`).
    pub max_streams: usize,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    /// Upper bound on a single `open_stream` call, in `send_to` and in the
    /// dialer's open for an already-connected candidate. Clipped to the
    /// call's overall deadline the same way `send_timeout`/`recv_timeout`
    /// clip to it.
    pub establish_stream_timeout: Duration,
    pub send_to_peer_timeout: Duration,
    /// How many times a single candidate may be pushed back onto the
    /// dialer's queue while its connection comes up asynchronously.
    pub num_connect_tries: u32,
    pub discovery_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peers: None,
            min_streams: 1,
            max_streams: 3,
            send_timeout: Duration::from_secs(3),
            recv_timeout: Duration::from_secs(3),
            establish_stream_timeout: Duration::from_secs(5),
            send_to_peer_timeout: Duration::from_secs(10),
            num_connect_tries: 3,
            discovery_limit: 1024,
        }
    }
}
