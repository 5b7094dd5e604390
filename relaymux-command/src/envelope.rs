//! The self-describing CBOR envelope every command and response travels
//! in: a one-byte header length, a small CBOR header map keyed by integer
//! (`{1: magic, 2: version, 16: payload_length}`), then the CBOR payload
//! itself. Grounded on `streams/command/framer/framer.go`'s
//! `MessageHeader{Magic, Version, Length}`.

use ciborium::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CommandError;

pub const COMMAND_MAGIC: [u8; 2] = [0x01, 0xec];
pub const COMMAND_VERSION: u8 = 0x01;

/// Payloads larger than this are rejected before the length-prefixed read,
/// so a corrupt or hostile length field can't force an unbounded
/// allocation.
pub const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

const HEADER_KEY_MAGIC: i64 = 1;
const HEADER_KEY_VERSION: i64 = 2;
const HEADER_KEY_LENGTH: i64 = 16;

fn header_value(magic: [u8; 2], version: u8, payload_length: u64) -> Value {
    Value::Map(vec![
        (
            Value::from(HEADER_KEY_MAGIC),
            Value::Array(vec![Value::from(magic[0] as i64), Value::from(magic[1] as i64)]),
        ),
        (Value::from(HEADER_KEY_VERSION), Value::from(version as i64)),
        (Value::from(HEADER_KEY_LENGTH), Value::from(payload_length)),
    ])
}

fn map_entries(value: &Value) -> Result<&[(Value, Value)], CommandError> {
    value
        .as_map()
        .map(Vec::as_slice)
        .ok_or(CommandError::MalformedEnvelope("expected a CBOR map"))
}

fn map_get<'a>(entries: &'a [(Value, Value)], key: i64) -> Option<&'a Value> {
    entries.iter().find_map(|(k, v)| {
        if k.as_integer().and_then(|i| i128::try_from(i).ok()) == Some(key as i128) {
            Some(v)
        } else {
            None
        }
    })
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_integer()
        .and_then(|i| i128::try_from(i).ok())
        .and_then(|i| u64::try_from(i).ok())
}

fn decode_header(bytes: &[u8]) -> Result<([u8; 2], u8, u64), CommandError> {
    let value: Value = ciborium::from_reader(bytes)?;
    let entries = map_entries(&value)?;

    let magic_entry = map_get(entries, HEADER_KEY_MAGIC)
        .and_then(Value::as_array)
        .ok_or(CommandError::MalformedEnvelope("header missing magic"))?;
    let [a, b] = magic_entry.as_slice() else {
        return Err(CommandError::MalformedEnvelope("magic is not a 2-element array"));
    };
    let magic = [
        as_u64(a).ok_or(CommandError::MalformedEnvelope("magic byte is not an integer"))? as u8,
        as_u64(b).ok_or(CommandError::MalformedEnvelope("magic byte is not an integer"))? as u8,
    ];

    let version = map_get(entries, HEADER_KEY_VERSION)
        .and_then(as_u64)
        .ok_or(CommandError::MalformedEnvelope("header missing version"))? as u8;

    let payload_length = map_get(entries, HEADER_KEY_LENGTH)
        .and_then(as_u64)
        .ok_or(CommandError::MalformedEnvelope("header missing payload length"))?;

    Ok((magic, version, payload_length))
}

/// Writes one envelope: header-length byte, CBOR header, CBOR payload.
pub async fn encode_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &Value,
) -> Result<(), CommandError> {
    let mut payload_bytes = Vec::new();
    ciborium::into_writer(payload, &mut payload_bytes)?;

    let mut header_bytes = Vec::new();
    ciborium::into_writer(
        &header_value(COMMAND_MAGIC, COMMAND_VERSION, payload_bytes.len() as u64),
        &mut header_bytes,
    )?;
    if header_bytes.len() > u8::MAX as usize {
        return Err(CommandError::HeaderTooLarge(header_bytes.len()));
    }

    writer.write_all(&[header_bytes.len() as u8]).await?;
    writer.write_all(&header_bytes).await?;
    writer.write_all(&payload_bytes).await?;
    Ok(())
}

/// Reads one envelope and returns its decoded CBOR payload.
pub async fn decode_envelope<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Value, CommandError> {
    let mut header_len = [0u8; 1];
    reader.read_exact(&mut header_len).await?;

    let mut header_bytes = vec![0u8; header_len[0] as usize];
    reader.read_exact(&mut header_bytes).await?;
    let (magic, version, payload_length) = decode_header(&header_bytes)?;

    if magic != COMMAND_MAGIC {
        return Err(CommandError::WrongMagic);
    }
    if version != COMMAND_VERSION {
        return Err(CommandError::WrongVersion);
    }
    if payload_length > MAX_PAYLOAD_LEN {
        return Err(CommandError::PayloadTooLarge(payload_length, MAX_PAYLOAD_LEN));
    }

    let mut payload_bytes = vec![0u8; payload_length as usize];
    reader
        .read_exact(&mut payload_bytes)
        .await
        .map_err(|_| CommandError::Truncated)?;

    Ok(ciborium::from_reader(&payload_bytes[..])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn header_round_trips() {
        let mut wire = Vec::new();
        let payload = Value::Text("hi".into());
        encode_envelope(&mut wire, &payload).await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let decoded = decode_envelope(&mut reader).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn wrong_magic_is_rejected() {
        let mut wire = Vec::new();
        let mut header_bytes = Vec::new();
        ciborium::into_writer(&header_value([0xde, 0xad], COMMAND_VERSION, 0), &mut header_bytes).unwrap();
        wire.push(header_bytes.len() as u8);
        wire.extend_from_slice(&header_bytes);

        let mut reader = std::io::Cursor::new(wire);
        let err = decode_envelope(&mut reader).await.unwrap_err();
        assert!(matches!(err, CommandError::WrongMagic));
    }

    #[tokio::test]
    async fn oversized_payload_length_is_rejected_before_reading() {
        let mut wire = Vec::new();
        let mut header_bytes = Vec::new();
        ciborium::into_writer(
            &header_value(COMMAND_MAGIC, COMMAND_VERSION, MAX_PAYLOAD_LEN + 1),
            &mut header_bytes,
        )
        .unwrap();
        wire.push(header_bytes.len() as u8);
        wire.extend_from_slice(&header_bytes);

        let mut reader = std::io::Cursor::new(wire);
        let err = decode_envelope(&mut reader).await.unwrap_err();
        assert!(matches!(err, CommandError::PayloadTooLarge(_, _)));
    }
}
