use relaymux_packer::{Channel, Packer};
use tokio::io::AsyncWrite;

use crate::error::TunnelError;
use crate::payload::HeadersPayload;

/// The backend side of a tunneled response: a `net/http`-style writer where
/// the first `write` (or an explicit `write_header`) sends the status line
/// and headers as a single `HeadersOp` frame, and every subsequent `write`
/// is one `BodyOp` data frame. `close` emits the terminating `BodyOp` Close
/// frame; dropping without closing leaves the remote blocked waiting for it.
pub struct ResponseWriter<W> {
    packer: Packer,
    writer: W,
    body_channel: Channel,
    headers_channel: Channel,
    headers: http::HeaderMap,
    status: Option<http::StatusCode>,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    pub(crate) fn new(packer: Packer, writer: W, headers_channel: Channel, body_channel: Channel) -> Self {
        Self {
            packer,
            writer,
            body_channel,
            headers_channel,
            headers: http::HeaderMap::new(),
            status: None,
            closed: false,
        }
    }

    pub fn headers_mut(&mut self) -> &mut http::HeaderMap {
        &mut self.headers
    }

    pub fn status_written(&self) -> bool {
        self.status.is_some()
    }

    /// Sends the status line and headers. Errors if already called.
    pub async fn write_header(&mut self, status: http::StatusCode) -> Result<(), TunnelError> {
        if self.status.is_some() {
            return Err(TunnelError::Protocol("response status already written".into()));
        }
        self.status = Some(status);
        let payload = HeadersPayload::from_response(status, &self.headers);
        let bytes = payload.encode()?;
        let len = bytes.len() as u64;
        self.packer
            .send(self.headers_channel, &mut self.writer, &mut std::io::Cursor::new(bytes), len)
            .await
            .map_err(TunnelError::Packer)
    }

    /// Writes one chunk of response body, implicitly writing a `200 OK`
    /// header first if none was written yet.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, TunnelError> {
        if self.status.is_none() {
            self.write_header(http::StatusCode::OK).await?;
        }
        let len = data.len() as u64;
        self.packer
            .send(
                self.body_channel,
                &mut self.writer,
                &mut std::io::Cursor::new(data.to_vec()),
                len,
            )
            .await
            .map_err(TunnelError::Packer)?;
        Ok(data.len())
    }

    /// Terminates the response. Writes a default `200 OK` header first if
    /// nothing was ever written.
    pub async fn close(mut self) -> Result<(), TunnelError> {
        if self.status.is_none() {
            self.write_header(http::StatusCode::OK).await?;
        }
        if !self.closed {
            self.closed = true;
            self.packer
                .stream(self.body_channel, &mut self.writer, &mut tokio::io::empty(), 1)
                .await
                .map_err(TunnelError::Packer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymux_packer::NextFrame;

    const MAGIC: [u8; 2] = [0x02, 0xfc];
    const VERSION: u16 = 0x01;
    const HEADERS_OP: Channel = 1;
    const BODY_OP: Channel = 16;

    #[tokio::test]
    async fn first_write_implies_default_ok_status() {
        let packer = Packer::new(MAGIC, VERSION);
        let mut wire = Vec::new();
        {
            let mut w = ResponseWriter::new(packer, &mut wire, HEADERS_OP, BODY_OP);
            w.write(b"hi").await.unwrap();
            w.close().await.unwrap();
        }

        let mut reader = std::io::Cursor::new(wire);
        match packer.next(&mut reader).await.unwrap() {
            NextFrame::Data { channel, length } => {
                assert_eq!(channel, HEADERS_OP);
                let mut buf = vec![0u8; length as usize];
                tokio::io::AsyncReadExt::read_exact(&mut reader, &mut buf).await.unwrap();
                let payload = HeadersPayload::decode(&buf).unwrap();
                assert_eq!(payload.code, 200);
            }
            other => panic!("expected headers frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writing_header_twice_is_rejected() {
        let packer = Packer::new(MAGIC, VERSION);
        let mut wire = Vec::new();
        let mut w = ResponseWriter::new(packer, &mut wire, HEADERS_OP, BODY_OP);
        w.write_header(http::StatusCode::OK).await.unwrap();
        let err = w.write_header(http::StatusCode::NOT_FOUND).await.unwrap_err();
        assert!(matches!(err, TunnelError::Protocol(_)));
    }
}
