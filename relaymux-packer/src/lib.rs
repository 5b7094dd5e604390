//! Binary framing of typed, channelized payloads over one byte stream.
//!
//! A [`Packer`] wraps a fixed magic/version pair and frames arbitrary byte
//! runs into `Data` and `Close` frames tagged with a [`Channel`], so that a
//! single ordered byte stream can carry several logical sub-streams (the
//! HTTP tunnel in `relaymux-http-tunnel` is built entirely on top of this).
//!
//! This is deliberately a different, simpler wire format from
//! `relaymux-command`'s self-describing CBOR envelope: command RPC is a
//! single request/response exchange, while the packer supports repeated,
//! interleaved-by-channel streaming. Do not unify the two; see
//! `DESIGN.md`.

mod error;

pub use error::PackerError;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Tags a logical sub-stream multiplexed over one byte stream.
pub type Channel = u8;

const HEADER_LEN: usize = 2 /* magic */ + 2 /* version */ + 1 /* type */ + 8 /* length */ + 1 /* channel */;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameType {
    Data = 0,
    Close = 1,
}

impl FrameType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FrameType::Data),
            1 => Some(FrameType::Close),
            _ => None,
        }
    }
}

/// The result of parsing one frame header via [`Packer::next`].
#[derive(Debug)]
pub enum NextFrame {
    /// A `Data` frame: `length` payload bytes follow immediately on the
    /// reader and have not yet been consumed.
    Data { channel: Channel, length: u64 },
    /// An empty `Close` frame: end-of-stream for `channel`.
    Eof { channel: Channel },
}

/// Frames heterogeneous, channelized payloads on a single bidirectional
/// byte stream. See the module docs for how this differs from the command
/// framer.
#[derive(Clone, Copy, Debug)]
pub struct Packer {
    magic: [u8; 2],
    version: u16,
}

impl Packer {
    pub const fn new(magic: [u8; 2], version: u16) -> Self {
        Self { magic, version }
    }

    async fn write_header<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        frame_type: FrameType,
        length: i64,
        channel: Channel,
    ) -> Result<(), PackerError> {
        let mut header = [0u8; HEADER_LEN];
        header[0] = self.magic[0];
        header[1] = self.magic[1];
        header[2..4].copy_from_slice(&self.version.to_le_bytes());
        header[4] = frame_type as u8;
        header[5..13].copy_from_slice(&length.to_le_bytes());
        header[13] = channel;
        writer.write_all(&header).await?;
        Ok(())
    }

    /// Write one `Data` frame: the header, then exactly `length` bytes
    /// copied from `reader`. Returns [`PackerError::ShortWrite`] if fewer
    /// bytes were available from `reader` than promised.
    pub async fn send<W, R>(
        &self,
        channel: Channel,
        writer: &mut W,
        reader: &mut R,
        length: u64,
    ) -> Result<(), PackerError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        self.write_header(writer, FrameType::Data, length as i64, channel)
            .await?;

        let mut remaining = length;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(PackerError::ShortWrite {
                    channel,
                    expected: length,
                    wrote: length - remaining,
                });
            }
            writer.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }

        Ok(())
    }

    /// Read `reader` in `buffer_size` chunks, emitting one `Data` frame per
    /// non-empty chunk, then exactly one zero-payload `Close` frame on
    /// end-of-stream. On a read error, emit a `Close` frame carrying the
    /// error message and propagate the error.
    pub async fn stream<W, R>(
        &self,
        channel: Channel,
        writer: &mut W,
        reader: &mut R,
        buffer_size: usize,
    ) -> Result<u64, PackerError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        let mut total = 0u64;
        let mut buf = vec![0u8; buffer_size.max(1)];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    self.write_header(writer, FrameType::Close, 0, channel)
                        .await?;
                    return Ok(total);
                }
                Ok(n) => {
                    self.write_header(writer, FrameType::Data, n as i64, channel)
                        .await?;
                    writer.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                Err(e) => {
                    let message = e.to_string();
                    let payload = message.as_bytes();
                    let _ = self
                        .write_header(writer, FrameType::Close, payload.len() as i64, channel)
                        .await;
                    let _ = writer.write_all(payload).await;
                    return Err(PackerError::Io(e));
                }
            }
        }
    }

    /// Parse one frame header, validating magic and version. For a `Data`
    /// frame the payload bytes remain on `reader` for the caller to
    /// consume; for a `Close` frame with a non-empty payload, the payload
    /// is read here and surfaced as [`PackerError::RemoteClosed`].
    pub async fn next<R>(&self, reader: &mut R) -> Result<NextFrame, PackerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).await?;

        if header[0] != self.magic[0] || header[1] != self.magic[1] {
            return Err(PackerError::WrongMagic);
        }

        let version = u16::from_le_bytes([header[2], header[3]]);
        if version != self.version {
            return Err(PackerError::WrongVersion);
        }

        let frame_type =
            FrameType::from_u8(header[4]).ok_or(PackerError::UnknownFrameType(header[4]))?;

        let length = i64::from_le_bytes(header[5..13].try_into().unwrap());
        if length < 0 {
            return Err(PackerError::NegativeLength(length));
        }
        let channel = header[13];

        match frame_type {
            FrameType::Data => Ok(NextFrame::Data {
                channel,
                length: length as u64,
            }),
            FrameType::Close => {
                if length == 0 {
                    Ok(NextFrame::Eof { channel })
                } else {
                    let mut message = vec![0u8; length as usize];
                    reader.read_exact(&mut message).await?;
                    Err(PackerError::RemoteClosed {
                        channel,
                        message: String::from_utf8_lossy(&message).into_owned(),
                    })
                }
            }
        }
    }

    /// Like [`Packer::next`], but for a `Data` frame also copies exactly
    /// `length` payload bytes into `writer`.
    pub async fn recv<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<NextFrame, PackerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let frame = self.next(reader).await?;
        if let NextFrame::Data { channel, length } = frame {
            let mut remaining = length;
            let mut buf = [0u8; 8192];
            while remaining > 0 {
                let want = remaining.min(buf.len() as u64) as usize;
                reader.read_exact(&mut buf[..want]).await?;
                writer.write_all(&buf[..want]).await?;
                remaining -= want as u64;
            }
            return Ok(NextFrame::Data { channel, length });
        }
        Ok(frame)
    }
}
