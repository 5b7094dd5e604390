use relaymux_packer::{Channel, NextFrame, Packer, PackerError};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TunnelError;

/// Pulls an HTTP body out of a packer-framed channel, one `Data` frame at a
/// time. A frame on a different channel means the body is done and
/// something else wants the stream; that frame's payload is drained (to keep
/// the stream in sync) and [`TunnelError::NotBody`] is returned, mirroring
/// Go's `bodyReader` / `ErrNotBody`.
pub struct BodyReader<R> {
    packer: Packer,
    reader: R,
    channel: Channel,
    remaining: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> BodyReader<R> {
    pub(crate) fn new(packer: Packer, reader: R, channel: Channel) -> Self {
        Self {
            packer,
            reader,
            channel,
            remaining: 0,
            eof: false,
        }
    }

    /// Reads up to `buf.len()` bytes of body. Returns `Ok(0)` once the body
    /// channel has seen its `Close` frame.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TunnelError> {
        if self.eof || buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.remaining > 0 {
                let want = buf.len().min(self.remaining as usize);
                let n = self.reader.read(&mut buf[..want]).await?;
                if n == 0 {
                    return Err(TunnelError::Protocol(
                        "stream ended in the middle of a body frame".into(),
                    ));
                }
                self.remaining -= n as u64;
                return Ok(n);
            }

            match self.packer.next(&mut self.reader).await {
                Ok(NextFrame::Data { channel, length }) if channel == self.channel => {
                    self.remaining = length;
                }
                Ok(NextFrame::Data { length, .. }) => {
                    let mut discard = vec![0u8; length as usize];
                    self.reader.read_exact(&mut discard).await?;
                    return Err(TunnelError::NotBody);
                }
                Ok(NextFrame::Eof { channel }) if channel == self.channel => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(NextFrame::Eof { .. }) => return Err(TunnelError::NotBody),
                Err(PackerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.eof = true;
                    return Ok(0);
                }
                Err(err) => return Err(TunnelError::Packer(err)),
            }
        }
    }

    /// Drains the body to completion, discarding bytes. Used by a handler
    /// that doesn't care about the request body but must still keep the
    /// stream in sync for whatever comes after it.
    pub async fn discard(&mut self) -> Result<u64, TunnelError> {
        let mut total = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}
