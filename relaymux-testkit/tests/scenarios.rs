//! The six concrete end-to-end scenarios: one provider/consumer pair (or
//! two, for the multi-send case) wired together over `relaymux-host`'s
//! in-process double, exercising `relaymux-client`/`relaymux-router`/
//! `relaymux-http-tunnel` the way an embedder actually would.

use std::sync::Arc;
use std::time::Duration;

use relaymux_client::{Client, ClientConfig};
use relaymux_command::{Body, Command, Response, Value};
use relaymux_host::mock::MockNetwork;
use relaymux_host::{Host, HostStream, PeerId, ProtocolId};
use relaymux_http_tunnel::{frontend, TunnelConfig};
use relaymux_router::{Connection, RawCommandHandler, Router, Service, ServiceConfig};

fn hi_handler() -> relaymux_router::CommandHandler {
    Arc::new(|_connection: Connection, _body: Body| {
        Box::pin(async move {
            let mut body = Body::new();
            body.insert("message".to_string(), Value::Text("HI".into()));
            Ok(Response::ok(body))
        })
    })
}

fn echo_handler() -> relaymux_router::CommandHandler {
    Arc::new(|_connection: Connection, body: Body| {
        Box::pin(async move {
            let message = body.get("message").cloned();
            let mut out = Body::new();
            if let Some(message) = message {
                out.insert("message".to_string(), message);
            }
            Ok(Response::ok(out))
        })
    })
}

fn test_config() -> ClientConfig {
    ClientConfig {
        send_to_peer_timeout: Duration::from_secs(10),
        recv_timeout: Duration::from_secs(10),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn scenario_1_hello() {
    let net = MockNetwork::new();
    let server = Arc::new(net.host("server", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let router = Router::new();
    router.add_static("hi", hi_handler()).unwrap();
    let protocol_id = ProtocolId::new("/relaymux-test/hello/1.0");
    let service = Service::new(
        server,
        ServiceConfig {
            name: "hello".into(),
            protocol_id: protocol_id.clone(),
        },
        router,
    );

    client_host.connect(&PeerId::new("server"));
    let client = Client::new(client_host, protocol_id, test_config());

    let response = client.send_to("server", "hi", Body::new()).await.unwrap();
    assert_eq!(response.get("message"), Some(&Value::Text("HI".into())));

    service.stop().await;
}

#[tokio::test]
async fn scenario_2_echo_small() {
    let net = MockNetwork::new();
    let server = Arc::new(net.host("server", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let router = Router::new();
    router.add_static("echo", echo_handler()).unwrap();
    let protocol_id = ProtocolId::new("/relaymux-test/echo-small/1.0");
    let service = Service::new(
        server,
        ServiceConfig {
            name: "echo".into(),
            protocol_id: protocol_id.clone(),
        },
        router,
    );

    client_host.connect(&PeerId::new("server"));
    let client = Client::new(client_host, protocol_id, test_config());

    let mut body = Body::new();
    body.insert("message".to_string(), Value::Text("back".into()));
    let response = client.send_to("server", "echo", body).await.unwrap();
    assert_eq!(response.get("message"), Some(&Value::Text("back".into())));

    service.stop().await;
}

#[tokio::test]
async fn scenario_3_echo_1_mib() {
    let net = MockNetwork::new();
    let server = Arc::new(net.host("server", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let router = Router::new();
    router.add_static("echo", echo_handler()).unwrap();
    let protocol_id = ProtocolId::new("/relaymux-test/echo-big/1.0");
    let service = Service::new(
        server,
        ServiceConfig {
            name: "echo".into(),
            protocol_id: protocol_id.clone(),
        },
        router,
    );

    client_host.connect(&PeerId::new("server"));
    let client = Client::new(client_host, protocol_id, test_config());

    let payload: String = "x".repeat(1_048_576);
    let mut body = Body::new();
    body.insert("message".to_string(), Value::Text(payload.clone()));
    let response = client.send_to("server", "echo", body).await.unwrap();
    assert_eq!(response.get("message"), Some(&Value::Text(payload)));

    service.stop().await;
}

#[tokio::test]
async fn scenario_4_unknown_command() {
    let net = MockNetwork::new();
    let server = Arc::new(net.host("server", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let router = Router::new();
    let protocol_id = ProtocolId::new("/relaymux-test/unknown/1.0");
    let service = Service::new(
        server,
        ServiceConfig {
            name: "empty".into(),
            protocol_id: protocol_id.clone(),
        },
        router,
    );

    client_host.connect(&PeerId::new("server"));
    let client = Client::new(client_host, protocol_id, test_config());

    let err = client.send_to("server", "notExist", Body::new()).await.unwrap_err();
    assert!(err.to_string().contains("notExist"));

    service.stop().await;
}

#[tokio::test]
async fn scenario_5_multi_send_to_two_providers() {
    let net = MockNetwork::new();
    let server_a = Arc::new(net.host("server-a", vec![]));
    let server_b = Arc::new(net.host("server-b", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let protocol_id = ProtocolId::new("/relaymux-test/multi/1.0");

    let router_a = Router::new();
    router_a.add_static("hi", hi_handler()).unwrap();
    let service_a = Service::new(
        server_a,
        ServiceConfig {
            name: "hi-a".into(),
            protocol_id: protocol_id.clone(),
        },
        router_a,
    );

    let router_b = Router::new();
    router_b.add_static("hi", hi_handler()).unwrap();
    let service_b = Service::new(
        server_b,
        ServiceConfig {
            name: "hi-b".into(),
            protocol_id: protocol_id.clone(),
        },
        router_b,
    );

    client_host.connect(&PeerId::new("server-a"));
    client_host.connect(&PeerId::new("server-b"));
    let client = Client::new(client_host, protocol_id, test_config());

    let outcome = client.multi_send("hi", Body::new(), 2).await.unwrap();
    assert_eq!(outcome.successes.len(), 2);
    assert!(outcome.failures.is_empty());
    assert!(outcome.successes.contains_key(&PeerId::new("server-a")));
    assert!(outcome.successes.contains_key(&PeerId::new("server-b")));
    for response in outcome.successes.values() {
        assert_eq!(response.get("message"), Some(&Value::Text("HI".into())));
    }

    service_a.stop().await;
    service_b.stop().await;
}

fn tun_handler() -> RawCommandHandler {
    Arc::new(|_connection: Connection, _body: Body| {
        Box::pin(async move {
            let response = Response::ok(Body::new());
            let secondary = Box::new(|stream: Box<dyn HostStream>| {
                Box::pin(async move {
                    let (_parts, mut req_body, mut response_writer) =
                        match relaymux_http_tunnel::backend(stream).await {
                            Ok(v) => v,
                            Err(err) => {
                                tracing::error!(error = %err, "tunnel backend setup failed");
                                return;
                            }
                        };

                    response_writer
                        .headers_mut()
                        .insert("x-xss-protection", "0".parse().unwrap());
                    if let Err(err) = response_writer.write_header(http::StatusCode::OK).await {
                        tracing::error!(error = %err, "failed to write tunnel response header");
                        return;
                    }

                    let mut buf = [0u8; 1024];
                    loop {
                        match req_body.read(&mut buf).await {
                            Ok(0) => break,
                            Ok(n) => {
                                let upper: Vec<u8> = buf[..n].iter().map(u8::to_ascii_uppercase).collect();
                                if response_writer.write(&upper).await.is_err() {
                                    return;
                                }
                            }
                            Err(_) => return,
                        }
                    }
                    let _ = response_writer.close().await;
                }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            });
            Ok((response, secondary as relaymux_router::SecondaryHandler))
        })
    })
}

#[tokio::test]
async fn scenario_6_http_tunnel_uppercase() {
    let net = MockNetwork::new();
    let server = Arc::new(net.host("server", vec![]));
    let client_host = Arc::new(net.host("client", vec![]));

    let router = Router::new();
    router.add_raw("tun", tun_handler()).unwrap();
    let protocol_id = ProtocolId::new("/relaymux-test/tun/1.0");
    let service = Service::new(
        server,
        ServiceConfig {
            name: "tun-service".into(),
            protocol_id: protocol_id.clone(),
        },
        router,
    );

    client_host.connect(&PeerId::new("server"));
    let mut stream = client_host
        .open_stream(&PeerId::new("server"), &protocol_id, true)
        .await
        .unwrap();

    Command::new("tun", Body::new()).encode(&mut stream).await.unwrap();
    let response = Response::decode(&mut stream).await.unwrap();
    assert!(response.error_message().is_none());

    let lowercase: Vec<u8> = (0..15 * 1024 * 1024).map(|i| b'a' + (i % 26) as u8).collect();
    let expected_upper: Vec<u8> = lowercase.iter().map(u8::to_ascii_uppercase).collect();

    let request = http::Request::builder()
        .method("POST")
        .uri("http://server/upper")
        .body(())
        .unwrap();
    let (parts, _) = request.into_parts();

    let (response_parts, response_body) = frontend(
        stream,
        parts,
        "mock://client",
        std::io::Cursor::new(lowercase),
        Vec::new(),
        &TunnelConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(response_parts.status, http::StatusCode::OK);
    assert_eq!(response_parts.headers.get("x-xss-protection").unwrap(), "0");
    assert_eq!(response_body, expected_upper);

    service.stop().await;
}
