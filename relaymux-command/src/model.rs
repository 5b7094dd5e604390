//! `Command` and `Response`, the two CBOR payloads carried inside an
//! envelope. Grounded on `streams/command/protocol.go`.

use ciborium::Value;
use indexmap::IndexMap;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::envelope::{decode_envelope, encode_envelope};
use crate::error::CommandError;

/// An ordered, duplicate-free `string -> value` mapping. Both a command's
/// arguments and a response's return values use this shape.
pub type Body = IndexMap<String, Value>;

const COMMAND_KEY_NAME: i64 = 16;
const COMMAND_KEY_BODY: i64 = 64;

/// The key a [`Response`] uses to carry an application-level failure. Its
/// presence does not change how the envelope is framed: decoding a
/// response always succeeds as long as the wire format is well-formed.
/// Callers ask [`Response::into_result`] to turn this into an `Err`.
pub const RESPONSE_ERROR_KEY: &str = "error";

fn value_to_body(value: Value) -> Result<Body, CommandError> {
    let entries = value
        .into_map()
        .map_err(|_| CommandError::MalformedEnvelope("expected a string-keyed map"))?;

    let mut body = Body::with_capacity(entries.len());
    for (key, value) in entries {
        let key = key
            .into_text()
            .map_err(|_| CommandError::MalformedEnvelope("body key is not a string"))?;
        if body.insert(key.clone(), value).is_some() {
            return Err(CommandError::DuplicateKey(key));
        }
    }
    Ok(body)
}

fn body_to_value(body: &Body) -> Value {
    Value::Map(
        body.iter()
            .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
            .collect(),
    )
}

/// A named, argument-carrying request sent to a peer's router.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub name: String,
    pub body: Body,
}

impl Command {
    pub fn new(name: impl Into<String>, body: Body) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub async fn encode<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), CommandError> {
        let payload = Value::Map(vec![
            (Value::from(COMMAND_KEY_NAME), Value::Text(self.name.clone())),
            (Value::from(COMMAND_KEY_BODY), body_to_value(&self.body)),
        ]);
        encode_envelope(writer, &payload).await
    }

    pub async fn decode<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, CommandError> {
        let value = decode_envelope(reader).await?;
        let entries = value
            .as_map()
            .ok_or(CommandError::MalformedEnvelope("expected a command map"))?;

        let name = entries
            .iter()
            .find_map(|(k, v)| {
                (k.as_integer().and_then(|i| i128::try_from(i).ok()) == Some(COMMAND_KEY_NAME as i128))
                    .then(|| v.as_text())
                    .flatten()
            })
            .ok_or(CommandError::MalformedEnvelope("command missing name"))?
            .to_owned();

        let body_value = entries
            .iter()
            .find_map(|(k, v)| {
                (k.as_integer().and_then(|i| i128::try_from(i).ok()) == Some(COMMAND_KEY_BODY as i128))
                    .then(|| v.clone())
            })
            .unwrap_or_else(|| Value::Map(Vec::new()));

        Ok(Self {
            name,
            body: value_to_body(body_value)?,
        })
    }
}

/// A router's reply to a [`Command`]. A response carrying [`RESPONSE_ERROR_KEY`]
/// decodes successfully; it is the caller's choice whether to treat that as
/// failure via [`Response::into_result`].
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub body: Body,
}

impl Response {
    pub fn ok(body: Body) -> Self {
        Self { body }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut body = Body::new();
        body.insert(RESPONSE_ERROR_KEY.to_string(), Value::Text(message.into()));
        Self { body }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.body.get(RESPONSE_ERROR_KEY).and_then(Value::as_text)
    }

    /// Turns an `error`-carrying response into `Err(CommandError::CommandFailed)`.
    pub fn into_result(self) -> Result<Body, CommandError> {
        match self.error_message() {
            Some(message) => Err(CommandError::CommandFailed(message.to_string())),
            None => Ok(self.body),
        }
    }

    pub async fn encode<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), CommandError> {
        encode_envelope(writer, &body_to_value(&self.body)).await
    }

    pub async fn decode<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, CommandError> {
        let value = decode_envelope(reader).await?;
        Ok(Self {
            body: value_to_body(value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_round_trips_name_and_body() {
        let mut body = Body::new();
        body.insert("greeting".to_string(), Value::Text("hello".into()));
        let command = Command::new("greet", body);

        let mut wire = Vec::new();
        command.encode(&mut wire).await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let decoded = Command::decode(&mut reader).await.unwrap();
        assert_eq!(decoded, command);
    }

    #[tokio::test]
    async fn command_with_no_body_key_decodes_to_empty_body() {
        let mut wire = Vec::new();
        crate::envelope::encode_envelope(
            &mut wire,
            &Value::Map(vec![(Value::from(COMMAND_KEY_NAME), Value::Text("ping".into()))]),
        )
        .await
        .unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let decoded = Command::decode(&mut reader).await.unwrap();
        assert_eq!(decoded.name, "ping");
        assert!(decoded.body.is_empty());
    }

    #[tokio::test]
    async fn response_round_trips_and_preserves_order() {
        let mut body = Body::new();
        body.insert("b".to_string(), Value::Integer(2.into()));
        body.insert("a".to_string(), Value::Integer(1.into()));
        let response = Response::ok(body);

        let mut wire = Vec::new();
        response.encode(&mut wire).await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let decoded = Response::decode(&mut reader).await.unwrap();
        assert_eq!(decoded.body.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(decoded.error_message().is_none());
    }

    #[tokio::test]
    async fn response_with_error_key_surfaces_as_command_failed() {
        let response = Response::error("unknown command");
        let mut wire = Vec::new();
        response.encode(&mut wire).await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let decoded = Response::decode(&mut reader).await.unwrap();
        let err = decoded.into_result().unwrap_err();
        assert!(matches!(err, CommandError::CommandFailed(m) if m == "unknown command"));
    }

    #[tokio::test]
    async fn duplicate_body_key_is_rejected_on_decode() {
        let mut wire = Vec::new();
        crate::envelope::encode_envelope(
            &mut wire,
            &Value::Map(vec![
                (Value::Text("x".into()), Value::Integer(1.into())),
                (Value::Text("x".into()), Value::Integer(2.into())),
            ]),
        )
        .await
        .unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let err = Response::decode(&mut reader).await.unwrap_err();
        assert!(matches!(err, CommandError::DuplicateKey(k) if k == "x"));
    }
}
