//! Object Codec Module
//!
//! Pluggable serialization for composite (`object`) payloads. The engine
//! stores such payloads as an encoded string inside the record and picks the
//! decode path from the `value_type` tag, so the string format itself is up
//! to the injected codec.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Failure raised by an [`ObjectCodec`].
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CodecError(pub String);

// == Object Codec ==
/// Encodes composite payloads to a string and back.
pub trait ObjectCodec: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<String, CodecError>;

    fn decode(&self, encoded: &str) -> Result<Value, CodecError>;
}

// == JSON Codec ==
/// Default codec: the composite is stored as a compact JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonObjectCodec;

impl ObjectCodec for JsonObjectCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, encoded: &str) -> Result<Value, CodecError> {
        serde_json::from_str(encoded).map_err(|e| CodecError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonObjectCodec;
        let value = json!({"id": "STANDARD", "rate": "5.24", "nested": [1, 2, {"a": null}]});

        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        assert!(JsonObjectCodec.decode("O:8:\"stdClass\":0:{}").is_err());
    }
}
