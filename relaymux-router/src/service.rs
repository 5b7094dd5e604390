//! Binds a router to a host under a protocol id and pumps inbound streams
//! through it. Grounded on `streams/service/service.go`.

use std::sync::{Arc, Mutex};

use relaymux_host::{Host, ProtocolId};
use tokio::task::JoinSet;

use crate::connection::Connection;
use crate::router::Router;

/// Human-readable name plus the protocol id a [`Service`] registers on
/// the host. Plain data, constructed by the embedder — matches
/// `ServiceConfig` in the ambient configuration surface.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub name: String,
    pub protocol_id: ProtocolId,
}

/// Funnels every inbound stream for `protocol_id` into `router`'s raw
/// dispatch, each in its own task. Grounded on `CommandService` in
/// `service.go`, which does the equivalent with `stream.Start` and
/// `router.HandleRaw`.
pub struct Service<H: Host> {
    host: Arc<H>,
    protocol_id: ProtocolId,
    router: Arc<Router>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl<H: Host> Service<H> {
    pub fn new(host: Arc<H>, config: ServiceConfig, router: Router) -> Self {
        let router = Arc::new(router);
        let tasks: Arc<Mutex<JoinSet<()>>> = Arc::new(Mutex::new(JoinSet::new()));

        let router_for_handler = router.clone();
        let tasks_for_handler = tasks.clone();
        host.register_stream_handler(config.protocol_id.clone(), move |stream, peer| {
            let router = router_for_handler.clone();
            let connection = Connection::new(peer);
            let mut guard = tasks_for_handler
                .lock()
                .expect("service task set mutex poisoned");
            guard.spawn(async move {
                router.dispatch_stream(stream, connection).await;
            });
        });

        Self {
            host,
            protocol_id: config.protocol_id,
            router,
            tasks,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Deregisters from the host and waits for every already-spawned
    /// dispatch task to finish. No new streams are accepted once this is
    /// called.
    pub async fn stop(&self) {
        self.host.deregister_stream_handler(&self.protocol_id);
        let mut pending = {
            let mut guard = self.tasks.lock().expect("service task set mutex poisoned");
            std::mem::replace(&mut *guard, JoinSet::new())
        };
        while pending.join_next().await.is_some() {}
        tracing::debug!(protocol = %self.protocol_id, "service stopped");
    }
}
