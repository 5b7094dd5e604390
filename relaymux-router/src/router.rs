//! Dispatch of decoded commands to handlers. Grounded on
//! `streams/command/router/router.go`'s `Router.AddStatic`/`Handle`/
//! `HandleRaw`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use relaymux_command::{Body, Command, Response};
use relaymux_host::HostStream;

use crate::connection::Connection;
use crate::error::RouterError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, RouterError>> + Send>>;

/// A static or dynamically-resolved command handler.
pub type CommandHandler = Arc<dyn Fn(Connection, Body) -> HandlerFuture + Send + Sync>;

/// Resolves a command name to a handler at dispatch time, for routes not
/// known when the router was built. Mirrors `RouteHandler` in the
/// original.
pub type RouteResolver = Arc<dyn Fn(&str) -> Option<CommandHandler> + Send + Sync>;

type RawHandlerFuture =
    Pin<Box<dyn Future<Output = Result<(Response, SecondaryHandler), RouterError>> + Send>>;

/// A route that answers with a response but keeps the stream open
/// afterwards, handing it to a secondary handler. Used by the HTTP tunnel
/// service to splice the packer's multiplexed framing onto the same
/// stream a command was negotiated on.
pub type RawCommandHandler = Arc<dyn Fn(Connection, Body) -> RawHandlerFuture + Send + Sync>;

/// Runs once the raw route's response has been written; owns the stream
/// until it returns, at which point the stream is dropped.
pub type SecondaryHandler =
    Box<dyn FnOnce(Box<dyn HostStream>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Clone)]
enum Route {
    Simple(CommandHandler),
    Raw(RawCommandHandler),
}

/// Maintains static and dynamically-resolved routes and dispatches
/// decoded commands (or fresh inbound streams) to them.
pub struct Router {
    static_routes: RwLock<HashMap<String, Route>>,
    dynamic_route_resolver: Option<RouteResolver>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            static_routes: RwLock::new(HashMap::new()),
            dynamic_route_resolver: None,
        }
    }

    pub fn with_dynamic_resolver(resolver: RouteResolver) -> Self {
        Self {
            static_routes: RwLock::new(HashMap::new()),
            dynamic_route_resolver: Some(resolver),
        }
    }

    /// Registers `handler` under `name`. Re-registering an existing name
    /// is an error, matching the original's refusal to silently shadow a
    /// route.
    pub fn add_static(&self, name: impl Into<String>, handler: CommandHandler) -> Result<(), RouterError> {
        self.insert(name.into(), Route::Simple(handler))
    }

    /// Registers a raw-stream route: see [`RawCommandHandler`].
    pub fn add_raw(&self, name: impl Into<String>, handler: RawCommandHandler) -> Result<(), RouterError> {
        self.insert(name.into(), Route::Raw(handler))
    }

    fn insert(&self, name: String, route: Route) -> Result<(), RouterError> {
        let mut routes = self.static_routes.write();
        if routes.contains_key(&name) {
            return Err(RouterError::DuplicateRoute(name));
        }
        routes.insert(name, route);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Route> {
        self.static_routes.read().get(name).cloned()
    }

    /// Dispatches an already-decoded command to its handler. A route
    /// registered via [`Router::add_raw`] cannot be reached this way — it
    /// only answers through [`Router::dispatch_stream`], which knows how
    /// to keep the stream open afterwards.
    pub async fn handle(&self, connection: Connection, command: Command) -> Result<Response, RouterError> {
        match self.lookup(&command.name) {
            Some(Route::Simple(handler)) => handler(connection, command.body).await,
            Some(Route::Raw(_)) | None => {
                if let Some(resolver) = &self.dynamic_route_resolver {
                    if let Some(handler) = resolver(&command.name) {
                        return handler(connection, command.body).await;
                    }
                }
                Err(RouterError::CommandNotFound(command.name))
            }
        }
    }

    /// Decodes one command from a fresh inbound stream, dispatches it, and
    /// writes back a response (or an `{"error": ...}` response on
    /// failure), closing the stream afterwards — unless the matched route
    /// is raw, in which case the stream is handed to its secondary
    /// handler instead of being closed. Grounded on `Router.HandleRaw`.
    pub async fn dispatch_stream<S: HostStream>(&self, mut stream: S, connection: Connection) {
        let command = match Command::decode(&mut stream).await {
            Ok(command) => command,
            Err(err) => {
                tracing::error!(error = %err, "failed to decode inbound command");
                let _ = Response::error(err.to_string()).encode(&mut stream).await;
                return;
            }
        };

        let name = command.name.clone();
        match self.lookup(&name) {
            Some(Route::Raw(handler)) => match handler(connection, command.body).await {
                Ok((response, secondary)) => {
                    if let Err(err) = response.encode(&mut stream).await {
                        tracing::error!(error = %err, command = %name, "failed to encode raw route response");
                        stream.reset();
                        return;
                    }
                    secondary(Box::new(stream)).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, command = %name, "raw command handler failed");
                    let _ = Response::error(err.to_string()).encode(&mut stream).await;
                }
            },
            matched => {
                let response = match matched {
                    Some(Route::Simple(handler)) => handler(connection, command.body).await,
                    _ => {
                        if let Some(resolver) = &self.dynamic_route_resolver {
                            match resolver(&name) {
                                Some(handler) => handler(connection, command.body).await,
                                None => Err(RouterError::CommandNotFound(name.clone())),
                            }
                        } else {
                            Err(RouterError::CommandNotFound(name.clone()))
                        }
                    }
                };

                let response = response.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, command = %name, "command handler failed");
                    Response::error(err.to_string())
                });

                if let Err(err) = response.encode(&mut stream).await {
                    tracing::error!(error = %err, command = %name, "failed to encode response");
                    stream.reset();
                }
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymux_command::Value;
    use relaymux_host::PeerId;

    fn handler_returning(message: &'static str) -> CommandHandler {
        Arc::new(move |_conn, _body| {
            Box::pin(async move {
                let mut body = Body::new();
                body.insert("message".to_string(), Value::Text(message.to_string()));
                Ok(Response::ok(body))
            })
        })
    }

    #[tokio::test]
    async fn duplicate_static_route_is_rejected() {
        let router = Router::new();
        router.add_static("ping", handler_returning("pong")).unwrap();
        let err = router.add_static("ping", handler_returning("pong")).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateRoute(name) if name == "ping"));
    }

    #[tokio::test]
    async fn handle_dispatches_to_static_route() {
        let router = Router::new();
        router.add_static("ping", handler_returning("pong")).unwrap();

        let connection = Connection::new(PeerId::new("peer-a"));
        let response = router
            .handle(connection, Command::new("ping", Body::new()))
            .await
            .unwrap();
        assert_eq!(response.body.get("message"), Some(&Value::Text("pong".into())));
    }

    #[tokio::test]
    async fn handle_falls_back_to_dynamic_resolver() {
        let resolver: RouteResolver = Arc::new(|name| {
            if name == "dynamic" {
                Some(handler_returning("resolved"))
            } else {
                None
            }
        });
        let router = Router::with_dynamic_resolver(resolver);

        let connection = Connection::new(PeerId::new("peer-a"));
        let response = router
            .handle(connection, Command::new("dynamic", Body::new()))
            .await
            .unwrap();
        assert_eq!(response.body.get("message"), Some(&Value::Text("resolved".into())));
    }

    #[tokio::test]
    async fn handle_reports_unknown_command() {
        let router = Router::new();
        let connection = Connection::new(PeerId::new("peer-a"));
        let err = router
            .handle(connection, Command::new("missing", Body::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::CommandNotFound(name) if name == "missing"));
    }
}
