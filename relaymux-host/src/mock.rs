//! In-process [`Host`] double backed by `tokio::io::duplex`, used by every
//! relaymux crate's test suite instead of a real libp2p-style stack.
//!
//! A [`MockNetwork`] is a shared registry that a handful of [`MockHost`]s
//! attach to. Dialing is instantaneous and always succeeds for a peer that
//! exists on the network; opening a stream hands one end of a duplex pipe
//! to the target's registered stream handler and returns the other end to
//! the caller — the same splice-two-peers-together shape a real host's
//! stream multiplexer provides, minus the network.

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

use crate::{AddrInfo, Connectedness, Discovery, Host, HostError, HostStream, Peerstore, PeerId, ProtocolId};

const DUPLEX_BUFFER: usize = 64 * 1024;
const DISCOVERY_CHANNEL_CAPACITY: usize = 64;

type StreamHandlerFn = dyn Fn(MockStream, PeerId) + Send + Sync;

#[derive(Default)]
struct PeerRecord {
    addrs: Vec<String>,
    protocols: HashSet<ProtocolId>,
    handlers: HashMap<ProtocolId, Arc<StreamHandlerFn>>,
}

/// Shared in-process network. Create one per test, then [`MockNetwork::host`]
/// as many peers on it as the scenario needs.
#[derive(Default)]
pub struct MockNetwork {
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new host on this network, advertising `addrs` (purely
    /// informational here — dialing never actually uses them).
    pub fn host(self: &Arc<Self>, id: impl Into<String>, addrs: Vec<String>) -> MockHost {
        let id = PeerId::new(id);
        self.peers.lock().entry(id.clone()).or_default().addrs = addrs;
        MockHost {
            id,
            network: Arc::clone(self),
            known: Mutex::new(HashSet::new()),
            connected: Mutex::new(HashMap::new()),
        }
    }
}

/// One peer on a [`MockNetwork`].
pub struct MockHost {
    id: PeerId,
    network: Arc<MockNetwork>,
    /// Peers this host has learned about, i.e. what a real peerstore would
    /// report — populated by [`MockHost::connect`] and by `dial`.
    known: Mutex<HashSet<PeerId>>,
    connected: Mutex<HashMap<PeerId, Connectedness>>,
}

impl MockHost {
    /// Simulate an out-of-band connection (what a real host's `Connect`
    /// would do), making `peer` visible in this host's peerstore.
    pub fn connect(&self, peer: &PeerId) {
        self.known.lock().insert(peer.clone());
        self.connected
            .lock()
            .insert(peer.clone(), Connectedness::Connected);
    }

    /// Mark a peer as reachable but not yet connected, so the client's
    /// dialer takes the `CanConnect` branch instead of `Connected`.
    pub fn learn(&self, peer: &PeerId) {
        self.known.lock().insert(peer.clone());
        self.connected
            .lock()
            .entry(peer.clone())
            .or_insert(Connectedness::CanConnect);
    }
}

impl Peerstore for MockHost {
    fn peers(&self) -> Vec<PeerId> {
        self.known.lock().iter().cloned().collect()
    }

    fn protocols(&self, peer: &PeerId) -> Vec<ProtocolId> {
        self.network
            .peers
            .lock()
            .get(peer)
            .map(|record| record.protocols.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn addrs(&self, peer: &PeerId) -> Vec<String> {
        self.network
            .peers
            .lock()
            .get(peer)
            .map(|record| record.addrs.clone())
            .unwrap_or_default()
    }
}

impl Discovery for MockHost {
    fn find_peers(&self, protocol: &ProtocolId, limit: usize) -> mpsc::Receiver<AddrInfo> {
        let (tx, rx) = mpsc::channel(DISCOVERY_CHANNEL_CAPACITY);

        let candidates: Vec<AddrInfo> = self
            .network
            .peers
            .lock()
            .iter()
            .filter(|(id, record)| **id != self.id && record.protocols.contains(protocol))
            .take(limit)
            .map(|(id, record)| AddrInfo::new(id.clone(), record.addrs.clone()))
            .collect();

        tokio::spawn(async move {
            for info in candidates {
                if tx.send(info).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

impl Host for MockHost {
    type Stream = MockStream;
    type Peerstore = Self;
    type Discovery = Self;

    fn local_peer_id(&self) -> PeerId {
        self.id.clone()
    }

    fn peerstore(&self) -> &Self::Peerstore {
        self
    }

    fn discovery(&self) -> &Self::Discovery {
        self
    }

    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        self.connected
            .lock()
            .get(peer)
            .copied()
            .unwrap_or(Connectedness::NotConnected)
    }

    async fn dial(
        &self,
        peer: &PeerId,
        _addrs: &[String],
        _deadline: Instant,
    ) -> Result<(), HostError> {
        if !self.network.peers.lock().contains_key(peer) {
            tracing::debug!(peer = %peer, "mock dial failed: unknown peer");
            return Err(HostError::DialFailed {
                peer: peer.to_string(),
                message: "no such peer on this mock network".into(),
            });
        }

        self.known.lock().insert(peer.clone());
        self.connected
            .lock()
            .insert(peer.clone(), Connectedness::Connected);
        Ok(())
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &ProtocolId,
        no_dial: bool,
    ) -> Result<Self::Stream, HostError> {
        if !no_dial && self.connectedness(peer) != Connectedness::Connected {
            self.dial(peer, &[], Instant::now()).await?;
        }

        let handler = self
            .network
            .peers
            .lock()
            .get(peer)
            .and_then(|record| record.handlers.get(protocol).cloned());

        let Some(handler) = handler else {
            return Err(HostError::OpenStreamFailed {
                peer: peer.to_string(),
                protocol: protocol.to_string(),
                message: "peer does not serve this protocol".into(),
            });
        };

        let (ours, theirs) = tokio::io::duplex(DUPLEX_BUFFER);
        let caller = self.id.clone();
        handler(MockStream::new(theirs), caller);

        Ok(MockStream::new(ours))
    }

    fn register_stream_handler<F>(&self, protocol: ProtocolId, handler: F)
    where
        F: Fn(Self::Stream, PeerId) + Send + Sync + 'static,
    {
        let mut peers = self.network.peers.lock();
        let record = peers.entry(self.id.clone()).or_default();
        record.protocols.insert(protocol.clone());
        record.handlers.insert(protocol, Arc::new(handler));
    }

    fn deregister_stream_handler(&self, protocol: &ProtocolId) {
        let mut peers = self.network.peers.lock();
        if let Some(record) = peers.get_mut(&self.id) {
            record.protocols.remove(protocol);
            record.handlers.remove(protocol);
        }
    }
}

/// The stream type handed out by [`MockHost`]: one end of an in-process
/// duplex pipe.
pub struct MockStream(DuplexStream);

impl MockStream {
    fn new(inner: DuplexStream) -> Self {
        Self(inner)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl HostStream for MockStream {
    fn reset(&mut self) {
        // Duplex-backed test streams release their peer's buffers on Drop;
        // there is no separate out-of-band reset signal for this transport.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn open_stream_splices_caller_and_handler() {
        let net = MockNetwork::new();
        let server = net.host("server", vec!["/ip4/127.0.0.1/tcp/1".into()]);
        let client = net.host("client", vec![]);

        let proto = ProtocolId::new("/echo/1.0");
        server.register_stream_handler(proto.clone(), |mut stream, _from| {
            tokio::spawn(async move {
                let mut buf = [0u8; 5];
                stream.read_exact(&mut buf).await.unwrap();
                stream.write_all(&buf).await.unwrap();
            });
        });

        client.connect(&PeerId::new("server"));
        let mut stream = client
            .open_stream(&PeerId::new("server"), &proto, true)
            .await
            .unwrap();

        stream.write_all(b"hello").await.unwrap();
        let mut reply = [0u8; 5];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"hello");
    }

    #[tokio::test]
    async fn peerstore_only_reports_known_peers() {
        let net = MockNetwork::new();
        let a = net.host("a", vec![]);
        net.host("b", vec![]);

        assert!(a.peers().is_empty());
        a.connect(&PeerId::new("b"));
        assert_eq!(a.peers(), vec![PeerId::new("b")]);
    }

    #[tokio::test]
    async fn discovery_finds_peers_advertising_protocol() {
        let net = MockNetwork::new();
        let a = net.host("a", vec![]);
        let b = net.host("b", vec![]);
        let proto = ProtocolId::new("/svc/1.0");
        b.register_stream_handler(proto.clone(), |_s, _p| {});

        let mut rx = a.discovery().find_peers(&proto, 10);
        let found = rx.recv().await.unwrap();
        assert_eq!(found.id, PeerId::new("b"));
    }
}
