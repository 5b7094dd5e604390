use relaymux_packer::{NextFrame, PackerError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::payload::{HeadersPayload, RequestPayload};
use crate::{BODY_OP, HEADERS_OP, PACKER, REQUEST_OP};

/// The HTTP-caller side of a tunnel: sends the request (metadata frame then
/// streamed body) and concurrently reads the backend's response (one
/// `HeadersOp` frame, then zero or more `BodyOp` frames, then its `Close`).
/// Per the resolved handling of a failed write: this still waits for the
/// backend's side to finish before returning, rather than aborting early.
/// On success, hands back `response_sink` filled with the response body
/// alongside the response's status and headers.
pub async fn frontend<S, ReqBody, RespSink>(
    stream: S,
    parts: http::request::Parts,
    remote_addr: impl Into<String>,
    mut body: ReqBody,
    response_sink: RespSink,
    config: &TunnelConfig,
) -> Result<(http::response::Parts, RespSink), TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    ReqBody: AsyncRead + Unpin + Send,
    RespSink: AsyncWrite + Unpin + Send,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let buffer_size = config.body_stream_buffer_size;

    let payload = RequestPayload::from_request(&parts, remote_addr.into());
    let write_fut = send_request(&mut write_half, &payload, &mut body, buffer_size);
    let read_fut = read_response(&mut read_half, response_sink);

    let (request_result, reader_result) = tokio::join!(write_fut, read_fut);

    match (reader_result, request_result) {
        (Ok((parts, sink)), Ok(())) => Ok((parts, sink)),
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
    }
}

async fn send_request<W, R>(
    writer: &mut W,
    payload: &RequestPayload,
    body: &mut R,
    buffer_size: usize,
) -> Result<(), TunnelError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let bytes = payload.encode()?;
    let len = bytes.len() as u64;
    PACKER
        .send(REQUEST_OP, writer, &mut std::io::Cursor::new(bytes), len)
        .await
        .map_err(TunnelError::Packer)?;
    PACKER
        .stream(BODY_OP, writer, body, buffer_size)
        .await
        .map_err(TunnelError::Packer)?;
    Ok(())
}

async fn read_response<R, W>(
    reader: &mut R,
    mut sink: W,
) -> Result<(http::response::Parts, W), TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut response_parts: Option<http::response::Parts> = None;

    loop {
        match PACKER.next(reader).await {
            Ok(NextFrame::Data { channel, length }) if channel == HEADERS_OP => {
                if response_parts.is_some() {
                    let mut discard = vec![0u8; length as usize];
                    reader.read_exact(&mut discard).await?;
                    return Err(TunnelError::Protocol(
                        "backend sent headers more than once".into(),
                    ));
                }
                let mut buf = vec![0u8; length as usize];
                reader.read_exact(&mut buf).await?;
                let headers = HeadersPayload::decode(&buf)?;
                response_parts = Some(headers.into_parts()?);
            }
            Ok(NextFrame::Data { channel, length }) if channel == BODY_OP => {
                copy_exact(reader, &mut sink, length).await?;
            }
            Ok(NextFrame::Eof { channel }) if channel == BODY_OP => {
                sink.flush().await?;
                return response_parts
                    .ok_or_else(|| TunnelError::Protocol("stream closed before headers arrived".into()))
                    .map(|parts| (parts, sink));
            }
            Ok(NextFrame::Data { channel, .. }) | Ok(NextFrame::Eof { channel }) => {
                return Err(TunnelError::UnexpectedChannel(channel));
            }
            Err(PackerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                sink.flush().await?;
                return response_parts
                    .ok_or_else(|| TunnelError::Protocol("stream closed before headers arrived".into()))
                    .map(|parts| (parts, sink));
            }
            Err(err) => return Err(TunnelError::Packer(err)),
        }
    }
}

async fn copy_exact<R, W>(reader: &mut R, sink: &mut W, length: u64) -> Result<(), TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = length;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..want]).await?;
        sink.write_all(&buf[..want]).await?;
        remaining -= want as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::HeadersPayload;

    #[tokio::test]
    async fn exchanges_request_and_response_over_a_duplex_stream() {
        let (frontend_stream, backend_stream) = tokio::io::duplex(256 * 1024);

        let backend_task = tokio::spawn(async move {
            let mut backend_stream = backend_stream;
            match PACKER.next(&mut backend_stream).await.unwrap() {
                NextFrame::Data { channel, length } if channel == REQUEST_OP => {
                    let mut buf = vec![0u8; length as usize];
                    backend_stream.read_exact(&mut buf).await.unwrap();
                    let payload = RequestPayload::decode(&buf).unwrap();
                    assert_eq!(payload.method, "GET");
                }
                other => panic!("expected request frame, got {other:?}"),
            }
            let mut body = Vec::new();
            loop {
                match PACKER.next(&mut backend_stream).await.unwrap() {
                    NextFrame::Eof { channel } if channel == BODY_OP => break,
                    NextFrame::Data { length, .. } => {
                        let mut chunk = vec![0u8; length as usize];
                        backend_stream.read_exact(&mut chunk).await.unwrap();
                        body.extend_from_slice(&chunk);
                    }
                    other => panic!("unexpected frame {other:?}"),
                }
            }
            assert_eq!(body, b"ping");

            let headers = HeadersPayload {
                code: 200,
                headers: Default::default(),
            };
            let bytes = headers.encode().unwrap();
            PACKER
                .send(HEADERS_OP, &mut backend_stream, &mut std::io::Cursor::new(bytes.clone()), bytes.len() as u64)
                .await
                .unwrap();
            PACKER
                .stream(BODY_OP, &mut backend_stream, &mut std::io::Cursor::new(b"pong".to_vec()), 16)
                .await
                .unwrap();
        });

        let request = http::Request::builder()
            .method("GET")
            .uri("http://peer/ping")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let (response_parts, body) = frontend(
            frontend_stream,
            parts,
            "mock://caller",
            std::io::Cursor::new(b"ping".to_vec()),
            Vec::new(),
            &TunnelConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(response_parts.status, http::StatusCode::OK);
        assert_eq!(body, b"pong");

        backend_task.await.unwrap();
    }
}
