use relaymux_host::PeerId;

/// The context a router hands to a command handler: who the inbound
/// stream came from. Grounded on `streams.Connection` in
/// `streams/command/router/router.go`, which is fetched from the
/// decoded command and passed alongside `body`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    remote: PeerId,
}

impl Connection {
    pub fn new(remote: PeerId) -> Self {
        Self { remote }
    }

    pub fn remote_peer_id(&self) -> &PeerId {
        &self.remote
    }
}
