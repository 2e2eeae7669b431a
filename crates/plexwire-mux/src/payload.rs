use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::error::MuxError;

/// A value written to a channel sink: raw bytes or UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Text, sent as its UTF-8 encoding.
    Text(String),
}

impl Payload {
    /// The bytes this payload puts on the wire.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Bytes(bytes) => bytes,
            Payload::Text(text) => Bytes::from(text),
        }
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Text(text) => text.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<BytesMut> for Payload {
    fn from(value: BytesMut) -> Self {
        Payload::Bytes(value.freeze())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(value: &'static [u8]) -> Self {
        Payload::Bytes(Bytes::from_static(value))
    }
}

impl<const N: usize> From<&'static [u8; N]> for Payload {
    fn from(value: &'static [u8; N]) -> Self {
        Payload::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

/// Dynamic values accept strings and arrays of byte values only.
impl TryFrom<Value> for Payload {
    type Error = MuxError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Payload::Text(text)),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| unsupported(item))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Payload::from),
            other => Err(unsupported(&other)),
        }
    }
}

fn unsupported(value: &Value) -> MuxError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    MuxError::UnsupportedPayloadType(format!("{kind}: {value}"))
}
