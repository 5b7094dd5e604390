//! Peer discovery, selection, dial and command exchange. Grounded on
//! `streams/client/client.go`'s `Client.Send`/`SendTo`/`send`: a direct
//! single-peer exchange (`send_to`) and a broadcast pipeline (`send`,
//! `send_for_pid`, `multi_send`) that runs discovery, dialing and sending
//! as three cooperating, cancelable tasks under one deadline.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use relaymux_command::{Body, Command, Response};
use relaymux_host::{AddrInfo, Connectedness, Host, HostStream, PeerId, ProtocolId};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant as TokioInstant};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ClientError;

type PeerResult = Result<Body, ClientError>;
type PerPeerResult = (PeerId, PeerResult);

/// The two result maps a broadcast send settles into: `successes` keyed by
/// the responding peer, `failures` keyed by whichever candidate the
/// exchange broke down for. The union of their keys is always a subset of
/// the candidates discovery produced.
#[derive(Debug, Default)]
pub struct MultiSendOutcome {
    pub successes: HashMap<PeerId, Body>,
    pub failures: HashMap<PeerId, ClientError>,
}

/// Discovers, dials, and exchanges commands with peers advertising a
/// protocol id. Holds a cancellation scope that is a child of the host's;
/// [`Client::close`] cancels it, aborting every in-flight send.
pub struct Client<H: Host> {
    host: Arc<H>,
    protocol_id: ProtocolId,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl<H: Host> Client<H> {
    pub fn new(host: Arc<H>, protocol_id: ProtocolId, config: ClientConfig) -> Self {
        Self {
            host,
            protocol_id,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Send `name(body)` directly to `peer`, which may be a raw peer id or
    /// a CID wrapping one. Opens exactly one stream and resets it on every
    /// exit path.
    pub async fn send_to(
        &self,
        peer: &str,
        name: impl Into<String>,
        body: Body,
    ) -> Result<Body, ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let name = name.into();
        let peer_id = PeerId::decode(peer).map_err(|_| ClientError::InvalidPeerId(peer.to_string()))?;
        let command = Command::new(name.clone(), body);

        let scope = self.cancel.child_token();
        let deadline = TokioInstant::now() + self.config.send_to_peer_timeout;
        let open_deadline = clip(TokioInstant::now() + self.config.establish_stream_timeout, deadline);

        let mut stream = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled),
            opened = timeout_at(open_deadline, self.host.open_stream(&peer_id, &self.protocol_id, false)) => {
                match opened {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(err)) => return Err(ClientError::OpenStreamFailed(err)),
                    Err(_) => return Err(ClientError::Timeout { command: name }),
                }
            }
        };

        let result = exchange(
            &mut stream,
            &command,
            self.config.send_timeout,
            self.config.recv_timeout,
            deadline,
            &scope,
        )
        .await;
        stream.reset();
        result
    }

    /// Broadcasts `name(body)` to peers advertising this client's protocol
    /// id, returning the first successful response.
    pub async fn send(&self, name: impl Into<String>, body: Body) -> Result<Body, ClientError> {
        let name = name.into();
        let outcome = self.broadcast(name.clone(), body, 1).await?;
        if let Some((_, response)) = outcome.successes.into_iter().next() {
            return Ok(response);
        }
        if let Some((_, err)) = outcome.failures.into_iter().next() {
            return Err(err);
        }
        Err(ClientError::Timeout { command: name })
    }

    /// Like [`Client::send`], but also returns which peer answered.
    pub async fn send_for_pid(
        &self,
        name: impl Into<String>,
        body: Body,
    ) -> Result<(PeerId, Body), ClientError> {
        let name = name.into();
        let outcome = self.broadcast(name.clone(), body, 1).await?;
        if let Some((peer, response)) = outcome.successes.into_iter().next() {
            return Ok((peer, response));
        }
        if let Some((_, err)) = outcome.failures.into_iter().next() {
            return Err(err);
        }
        Err(ClientError::Timeout { command: name })
    }

    /// Broadcasts `name(body)` to at least `threshold` distinct peers (as
    /// many as discovery and the deadline allow), returning every response
    /// received and every per-peer failure observed. Never fails for
    /// per-peer reasons — only when no candidate is ever produced.
    pub async fn multi_send(
        &self,
        name: impl Into<String>,
        body: Body,
        threshold: usize,
    ) -> Result<MultiSendOutcome, ClientError> {
        self.broadcast(name.into(), body, threshold).await
    }

    /// Cancels this client's scope: discovery, dialing, and any pending
    /// encode/decode on open streams are aborted. Every in-flight and
    /// subsequent send observes [`ClientError::Cancelled`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn broadcast(
        &self,
        name: String,
        body: Body,
        threshold: usize,
    ) -> Result<MultiSendOutcome, ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let threshold = threshold.max(1);
        let scope = self.cancel.child_token();
        let deadline = TokioInstant::now() + self.config.send_to_peer_timeout;

        let candidate_capacity = self.config.max_streams.max(threshold).max(8);
        let (candidates_tx, candidates_rx) = mpsc::channel::<AddrInfo>(candidate_capacity);
        tokio::spawn(discovery_task(
            self.host.clone(),
            self.protocol_id.clone(),
            self.config.peers.clone(),
            self.config.discovery_limit,
            scope.clone(),
            candidates_tx,
        ));

        let (streams_tx, streams_rx) = mpsc::channel::<(H::Stream, PeerId)>(threshold);
        tokio::spawn(dialer_task(
            self.host.clone(),
            self.protocol_id.clone(),
            candidates_rx,
            streams_tx,
            scope.clone(),
            deadline,
            threshold,
            self.config.num_connect_tries,
            self.config.establish_stream_timeout,
        ));

        let (results_tx, mut results_rx) = mpsc::channel::<PerPeerResult>(threshold.max(1));
        let command = Command::new(name.clone(), body);
        tokio::spawn(sender_task(
            streams_rx,
            results_tx,
            command,
            self.config.send_timeout,
            self.config.recv_timeout,
            deadline,
            scope.clone(),
        ));

        let mut outcome = MultiSendOutcome::default();
        while outcome.successes.len() < threshold {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => break,
                received = results_rx.recv() => {
                    match received {
                        Some((peer, Ok(response))) => {
                            outcome.successes.insert(peer, response);
                        }
                        Some((peer, Err(err))) => {
                            outcome.failures.insert(peer, err);
                        }
                        None => break,
                    }
                }
            }
        }
        scope.cancel();

        if outcome.successes.is_empty() && outcome.failures.is_empty() {
            return Err(ClientError::NoPeersAvailable);
        }
        Ok(outcome)
    }
}

/// (A) Enumerate peerstore candidates first; fall back to the configured
/// static peer hints, then to live discovery, only once the peerstore has
/// nothing. Ends when `scope` is cancelled or the source is exhausted.
async fn discovery_task<H: Host>(
    host: Arc<H>,
    protocol_id: ProtocolId,
    peer_hints: Option<Vec<PeerId>>,
    discovery_limit: usize,
    scope: CancellationToken,
    tx: mpsc::Sender<AddrInfo>,
) {
    let local = host.local_peer_id();
    let mut found_any = false;

    for peer in host.peerstore().peers() {
        if scope.is_cancelled() {
            return;
        }
        if peer == local {
            continue;
        }
        if host.peerstore().protocols(&peer).contains(&protocol_id) {
            found_any = true;
            let addrs = host.peerstore().addrs(&peer);
            if tx.send(AddrInfo::new(peer, addrs)).await.is_err() {
                return;
            }
        }
    }

    if found_any {
        return;
    }

    if let Some(hints) = peer_hints {
        for peer in hints {
            if scope.is_cancelled() {
                return;
            }
            if peer == local {
                continue;
            }
            let addrs = host.peerstore().addrs(&peer);
            if tx.send(AddrInfo::new(peer, addrs)).await.is_err() {
                return;
            }
        }
    }

    let mut live = host.discovery().find_peers(&protocol_id, discovery_limit);
    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            info = live.recv() => {
                match info {
                    Some(mut info) => {
                        if info.id.as_str().is_empty() || info.id == local {
                            continue;
                        }
                        if info.addrs.is_empty() {
                            info.addrs = host.peerstore().addrs(&info.id);
                        }
                        if info.addrs.is_empty() {
                            continue;
                        }
                        if tx.send(info).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// (B) Converts discovered candidates into live streams, pushing back
/// not-yet-connected candidates for a later pass (bounded by
/// `num_connect_tries`) instead of blocking on a full dial.
async fn dialer_task<H: Host>(
    host: Arc<H>,
    protocol_id: ProtocolId,
    mut candidates: mpsc::Receiver<AddrInfo>,
    streams_tx: mpsc::Sender<(H::Stream, PeerId)>,
    scope: CancellationToken,
    deadline: TokioInstant,
    threshold: usize,
    num_connect_tries: u32,
    establish_stream_timeout: Duration,
) {
    let mut established = 0usize;
    let mut retries: HashMap<PeerId, u32> = HashMap::new();
    let mut pending: VecDeque<AddrInfo> = VecDeque::new();

    while established < threshold {
        if scope.is_cancelled() {
            return;
        }

        let candidate = if let Some(candidate) = pending.pop_front() {
            candidate
        } else {
            tokio::select! {
                biased;
                _ = scope.cancelled() => return,
                next = candidates.recv() => match next {
                    Some(candidate) => candidate,
                    None if pending.is_empty() => return,
                    None => continue,
                },
            }
        };

        match host.connectedness(&candidate.id) {
            Connectedness::Connected => {
                let open_deadline = clip(TokioInstant::now() + establish_stream_timeout, deadline);
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => return,
                    opened = timeout_at(open_deadline, host.open_stream(&candidate.id, &protocol_id, true)) => {
                        match opened {
                            Ok(Ok(stream)) => {
                                established += 1;
                                if streams_tx.send((stream, candidate.id)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Err(err)) => {
                                tracing::warn!(peer = %candidate.id, error = %err, "open_stream failed for connected candidate");
                            }
                            Err(_) => {
                                tracing::debug!(peer = %candidate.id, "open_stream timed out for connected candidate");
                            }
                        }
                    }
                }
            }
            Connectedness::CanConnect | Connectedness::NotConnected => {
                let tries = retries.entry(candidate.id.clone()).or_insert(0);
                if *tries >= num_connect_tries {
                    tracing::debug!(peer = %candidate.id, "dropping candidate after exhausting connect tries");
                    continue;
                }
                *tries += 1;

                let dial_host = host.clone();
                let dial_peer = candidate.id.clone();
                let dial_addrs = candidate.addrs.clone();
                let dial_deadline = deadline.into_std();
                tokio::spawn(async move {
                    if let Err(err) = dial_host.dial(&dial_peer, &dial_addrs, dial_deadline).await {
                        tracing::debug!(peer = %dial_peer, error = %err, "fire-and-forget dial failed");
                    }
                });
                pending.push_back(candidate);
            }
            Connectedness::CannotConnect => {
                tracing::debug!(peer = %candidate.id, "dropping unreachable candidate");
            }
        }
    }
}

/// (C) Consumes established streams and performs the per-stream command
/// exchange concurrently, emitting one result per peer.
async fn sender_task<H: Host>(
    mut streams: mpsc::Receiver<(H::Stream, PeerId)>,
    results_tx: mpsc::Sender<PerPeerResult>,
    command: Command,
    send_timeout: Duration,
    recv_timeout: Duration,
    deadline: TokioInstant,
    scope: CancellationToken,
) {
    let mut tasks = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            next = streams.recv() => {
                match next {
                    Some((mut stream, peer)) => {
                        let command = command.clone();
                        let results_tx = results_tx.clone();
                        let stream_scope = scope.clone();
                        tasks.spawn(async move {
                            let result = exchange(&mut stream, &command, send_timeout, recv_timeout, deadline, &stream_scope).await;
                            stream.reset();
                            let _ = results_tx.send((peer, result)).await;
                        });
                    }
                    None => break,
                }
            }
        }
    }
    while tasks.join_next().await.is_some() {}
}

fn clip(candidate: TokioInstant, cap: TokioInstant) -> TokioInstant {
    candidate.min(cap)
}

/// Writes one command and reads back one response on an already-open
/// stream, clipping both deadlines to `scope_deadline` and racing the
/// whole exchange against `scope`: a cancellation dropped the in-flight
/// encode/decode future immediately rather than waiting for either
/// deadline to elapse, so the caller can reset the stream without delay.
async fn exchange<S: HostStream>(
    stream: &mut S,
    command: &Command,
    send_timeout: Duration,
    recv_timeout: Duration,
    scope_deadline: TokioInstant,
    scope: &CancellationToken,
) -> Result<Body, ClientError> {
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(ClientError::Cancelled),
        result = exchange_inner(stream, command, send_timeout, recv_timeout, scope_deadline) => result,
    }
}

async fn exchange_inner<S: HostStream>(
    stream: &mut S,
    command: &Command,
    send_timeout: Duration,
    recv_timeout: Duration,
    scope_deadline: TokioInstant,
) -> Result<Body, ClientError> {
    let write_deadline = clip(TokioInstant::now() + send_timeout, scope_deadline);
    timeout_at(write_deadline, command.encode(stream))
        .await
        .map_err(|_| ClientError::Timeout {
            command: command.name.clone(),
        })??;

    let read_deadline = clip(TokioInstant::now() + recv_timeout, scope_deadline);
    let response = timeout_at(read_deadline, Response::decode(stream))
        .await
        .map_err(|_| ClientError::Timeout {
            command: command.name.clone(),
        })??;

    response.into_result().map_err(ClientError::from)
}
