use std::future::Future;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::{AddrInfo, Connectedness, HostError, PeerId, ProtocolId};

/// The host's cache of known peers, their addresses, and their advertised
/// protocol ids. Read-only from relaymux's point of view; the host keeps
/// it populated via its own bootstrap/DHT/pubsub machinery, none of which
/// is this crate's concern.
pub trait Peerstore: Send + Sync + 'static {
    /// All peers the host currently knows about, in no particular order.
    fn peers(&self) -> Vec<PeerId>;

    /// Protocol ids the given peer is known to advertise.
    fn protocols(&self, peer: &PeerId) -> Vec<ProtocolId>;

    /// Addresses known for the given peer.
    fn addrs(&self, peer: &PeerId) -> Vec<String>;
}

/// A lookup service returning peers that advertise a given protocol id.
/// Implementations are expected to keep sending on the returned channel
/// until `limit` peers have been offered or the caller drops the
/// receiver.
pub trait Discovery: Send + Sync + 'static {
    fn find_peers(&self, protocol: &ProtocolId, limit: usize) -> mpsc::Receiver<AddrInfo>;
}

/// A bidirectional, ordered byte channel opened by the host between two
/// peers under a protocol id. relaymux only requires ordinary async I/O;
/// deadlines are enforced by wrapping reads/writes in `tokio::time::timeout`
/// at the call site rather than by the stream itself, which keeps this
/// trait a plain alias over the tokio I/O traits instead of a bespoke
/// deadline API every backend would have to reimplement.
pub trait HostStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Abruptly terminate the stream, discarding any buffered data. Called
    /// on every exit path of a command exchange so that a peer which never
    /// responds does not leak a half-open stream.
    fn reset(&mut self);
}

/// The abstract peer-to-peer host relaymux is built on top of: peer
/// identity, authenticated transports, peer discovery, and on-demand
/// bidirectional byte streams keyed by a protocol identifier. Everything
/// about *how* peers are found, dialed, and secured is the host's concern;
/// relaymux only consumes this surface.
pub trait Host: Send + Sync + 'static {
    type Stream: HostStream;
    type Peerstore: Peerstore;
    type Discovery: Discovery;

    fn local_peer_id(&self) -> PeerId;

    fn peerstore(&self) -> &Self::Peerstore;

    fn discovery(&self) -> &Self::Discovery;

    /// The host's classification of the current connection state to a peer.
    fn connectedness(&self, peer: &PeerId) -> Connectedness;

    /// Best-effort, typically fire-and-forget, connection attempt. Callers
    /// in this crate never block the selection loop on a full dial; they
    /// spawn it and revisit the candidate on the next pass.
    fn dial(
        &self,
        peer: &PeerId,
        addrs: &[String],
        deadline: Instant,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Open a new stream to `peer` under `protocol`. When `no_dial` is set
    /// the host must not attempt to establish a new connection — the
    /// caller has already verified (or is relying on a concurrent dial) that
    /// one exists or is underway.
    fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &ProtocolId,
        no_dial: bool,
    ) -> impl Future<Output = Result<Self::Stream, HostError>> + Send;

    /// Register a handler invoked with one end of a fresh inbound stream
    /// for every connection opened to `protocol`. The handler is expected
    /// to spawn its own task per stream; the host does not serialize calls.
    fn register_stream_handler<F>(&self, protocol: ProtocolId, handler: F)
    where
        F: Fn(Self::Stream, PeerId) + Send + Sync + 'static;

    /// Stop accepting new inbound streams for `protocol`. In-flight
    /// handlers already spawned are unaffected.
    fn deregister_stream_handler(&self, protocol: &ProtocolId);
}
