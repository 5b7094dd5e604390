//! End-to-end reproduction of the HTTP tunnel scenario: a provider defines
//! a raw-stream command `tun` whose secondary handler uppercases the
//! request body in 1 KiB chunks; a consumer POSTs a multi-megabyte
//! lowercase body through the frontend and checks the uppercased echo.

use std::sync::Arc;

use relaymux_command::{Body, Command, Response};
use relaymux_host::mock::MockNetwork;
use relaymux_host::{Host, HostStream, PeerId, ProtocolId};
use relaymux_http_tunnel::{frontend, TunnelConfig};
use relaymux_router::{Connection, RawCommandHandler, Router, Service, ServiceConfig};

fn tun_handler() -> RawCommandHandler {
    Arc::new(|_connection: Connection, _body: Body| {
        Box::pin(async move {
            let response = Response::ok(Body::new());
            let secondary = Box::new(|stream: Box<dyn HostStream>| {
                Box::pin(async move {
                    let (parts, mut req_body, mut response_writer) =
                        match relaymux_http_tunnel::backend(stream).await {
                            Ok(v) => v,
                            Err(err) => {
                                tracing::error!(error = %err, "tunnel backend setup failed");
                                return;
                            }
                        };
                    assert_eq!(parts.method, http::Method::POST);

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
                            Err(err) => {
                                tracing::error!(error = %err, "error reading tunnel request body");
                                return;
                            }
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
async fn http_tunnel_uppercases_a_large_body_round_trip() {
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

    Command::new("tun", Body::new())
        .encode(&mut stream)
        .await
        .unwrap();
    let response = Response::decode(&mut stream).await.unwrap();
    assert!(response.error_message().is_none());

    let lowercase: Vec<u8> = (0..15 * 1024 * 1024)
        .map(|i| b'a' + (i % 26) as u8)
        .collect();
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
    assert_eq!(
        response_parts.headers.get("x-xss-protection").unwrap(),
        "0"
    );
    assert_eq!(response_body, expected_upper);

    service.stop().await;
}
