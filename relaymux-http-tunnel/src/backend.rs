use relaymux_packer::NextFrame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::body::BodyReader;
use crate::error::TunnelError;
use crate::payload::RequestPayload;
use crate::response_writer::ResponseWriter;
use crate::{BODY_OP, HEADERS_OP, PACKER, REQUEST_OP};

/// The handler side of a tunnel: reads the single `RequestOp` metadata
/// frame, then hands the caller the decoded request plus a body reader
/// (pulling `BodyOp` frames) and a response writer (emitting `HeadersOp`
/// then `BodyOp` frames) split off the same stream.
pub async fn backend<S>(
    stream: S,
) -> Result<
    (
        http::request::Parts,
        BodyReader<tokio::io::ReadHalf<S>>,
        ResponseWriter<tokio::io::WriteHalf<S>>,
    ),
    TunnelError,
>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);

    match PACKER.next(&mut read_half).await.map_err(TunnelError::Packer)? {
        NextFrame::Data { channel, length } if channel == REQUEST_OP => {
            let mut buf = vec![0u8; length as usize];
            read_half.read_exact(&mut buf).await?;
            let payload = RequestPayload::decode(&buf)?;
            let parts = payload.into_parts()?;
            let body_reader = BodyReader::new(PACKER, read_half, BODY_OP);
            let response_writer = ResponseWriter::new(PACKER, write_half, HEADERS_OP, BODY_OP);
            Ok((parts, body_reader, response_writer))
        }
        NextFrame::Data { channel, .. } | NextFrame::Eof { channel } => {
            Err(TunnelError::UnexpectedChannel(channel))
        }
    }
}
