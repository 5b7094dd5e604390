use ciborium::Value;
use indexmap::IndexMap;

use crate::error::TunnelError;

/// Multi-valued HTTP header set, keyed by header name in first-seen order.
pub type HeaderMultiMap = IndexMap<String, Vec<String>>;

fn headers_to_value(headers: &HeaderMultiMap) -> Value {
    Value::Map(
        headers
            .iter()
            .map(|(name, values)| {
                let values = values.iter().cloned().map(Value::Text).collect();
                (Value::Text(name.clone()), Value::Array(values))
            })
            .collect(),
    )
}

fn value_to_headers(value: &Value) -> Result<HeaderMultiMap, TunnelError> {
    let entries = value
        .as_map()
        .ok_or(TunnelError::MalformedPayload("expected a headers map"))?;
    let mut out = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        let name = key
            .as_text()
            .ok_or(TunnelError::MalformedPayload("header name is not a string"))?
            .to_string();
        let values = value
            .as_array()
            .ok_or(TunnelError::MalformedPayload("header value is not an array"))?
            .iter()
            .map(|item| {
                item.as_text()
                    .map(str::to_string)
                    .ok_or(TunnelError::MalformedPayload("header value is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(name, values);
    }
    Ok(out)
}

fn header_map_to_multi(headers: &http::HeaderMap) -> HeaderMultiMap {
    let mut out: HeaderMultiMap = IndexMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    out
}

fn apply_headers(
    mut builder: http::request::Builder,
    headers: &HeaderMultiMap,
) -> http::request::Builder {
    for (name, values) in headers {
        for value in values {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
}

fn find<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn text_field(entries: &[(Value, Value)], key: &str) -> String {
    find(entries, key)
        .and_then(Value::as_text)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Mirrors Go's `requestPayload`: everything the backend needs to reconstruct
/// an `http.Request` from the frontend's side of the tunnel.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    pub method: String,
    pub url: String,
    pub proto: String,
    pub headers: HeaderMultiMap,
    pub trailer: HeaderMultiMap,
    pub host: String,
    pub remote_addr: String,
    pub request_uri: String,
    pub content_length: i64,
}

impl RequestPayload {
    pub fn from_request(parts: &http::request::Parts, remote_addr: impl Into<String>) -> Self {
        let content_length = parts
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(-1);
        Self {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            proto: format!("{:?}", parts.version),
            headers: header_map_to_multi(&parts.headers),
            trailer: IndexMap::new(),
            host: parts.uri.host().map(str::to_string).unwrap_or_default(),
            remote_addr: remote_addr.into(),
            request_uri: parts
                .uri
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_else(|| parts.uri.to_string()),
            content_length,
        }
    }

    pub fn into_parts(&self) -> Result<http::request::Parts, TunnelError> {
        let builder = http::Request::builder()
            .method(self.method.as_str())
            .uri(self.request_uri.as_str());
        let builder = apply_headers(builder, &self.headers);
        let request = builder.body(())?;
        Ok(request.into_parts().0)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TunnelError> {
        let value = Value::Map(vec![
            (Value::Text("method".into()), Value::Text(self.method.clone())),
            (Value::Text("url".into()), Value::Text(self.url.clone())),
            (Value::Text("proto".into()), Value::Text(self.proto.clone())),
            (Value::Text("headers".into()), headers_to_value(&self.headers)),
            (Value::Text("trailer".into()), headers_to_value(&self.trailer)),
            (Value::Text("host".into()), Value::Text(self.host.clone())),
            (
                Value::Text("remote_addr".into()),
                Value::Text(self.remote_addr.clone()),
            ),
            (
                Value::Text("request_uri".into()),
                Value::Text(self.request_uri.clone()),
            ),
            (
                Value::Text("content_length".into()),
                Value::from(self.content_length),
            ),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes)?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TunnelError> {
        let value: Value = ciborium::from_reader(bytes)?;
        let entries = value
            .as_map()
            .ok_or(TunnelError::MalformedPayload("expected a request payload map"))?;
        let headers = find(entries, "headers")
            .map(value_to_headers)
            .transpose()?
            .unwrap_or_default();
        let trailer = find(entries, "trailer")
            .map(value_to_headers)
            .transpose()?
            .unwrap_or_default();
        let content_length = find(entries, "content_length")
            .and_then(Value::as_integer)
            .and_then(|i| i128::try_from(i).ok())
            .map(|i| i as i64)
            .unwrap_or(-1);
        Ok(Self {
            method: text_field(entries, "method"),
            url: text_field(entries, "url"),
            proto: text_field(entries, "proto"),
            headers,
            trailer,
            host: text_field(entries, "host"),
            remote_addr: text_field(entries, "remote_addr"),
            request_uri: text_field(entries, "request_uri"),
            content_length,
        })
    }
}

/// Mirrors Go's `headersOpPayload`: the response status line plus headers,
/// sent once as the first frame on the `HeadersOp` channel.
#[derive(Debug, Clone)]
pub struct HeadersPayload {
    pub code: u16,
    pub headers: HeaderMultiMap,
}

impl HeadersPayload {
    pub fn from_response(status: http::StatusCode, headers: &http::HeaderMap) -> Self {
        Self {
            code: status.as_u16(),
            headers: header_map_to_multi(headers),
        }
    }

    pub fn into_parts(&self) -> Result<http::response::Parts, TunnelError> {
        let mut builder = http::Response::builder().status(self.code);
        for (name, values) in &self.headers {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        let response = builder.body(())?;
        Ok(response.into_parts().0)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TunnelError> {
        let value = Value::Map(vec![
            (Value::Text("code".into()), Value::from(self.code as i64)),
            (Value::Text("headers".into()), headers_to_value(&self.headers)),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes)?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TunnelError> {
        let value: Value = ciborium::from_reader(bytes)?;
        let entries = value
            .as_map()
            .ok_or(TunnelError::MalformedPayload("expected a headers payload map"))?;
        let code = find(entries, "code")
            .and_then(Value::as_integer)
            .and_then(|i| i128::try_from(i).ok())
            .map(|i| i as u16)
            .unwrap_or(200);
        let headers = find(entries, "headers")
            .map(value_to_headers)
            .transpose()?
            .unwrap_or_default();
        Ok(Self { code, headers })
    }
}
