//! Cache Entry Module
//!
//! The versioned record persisted to one file per key, and the encode/decode
//! rules between [`CacheValue`] and that record.
//!
//! On disk a record is a JSON object with exactly five fields:
//!
//! ```json
//! {"value": ..., "value_type": "int", "expires_at": 1700000060, "created_at": 1700000000, "version": 0}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::codec::ObjectCodec;
use crate::cache::value::{CacheValue, ValueKind};
use crate::error::{CacheError, Result};

// == Record Format ==
/// Record format version written by this build. Records carrying any other
/// version are treated as invalid.
pub const SCHEMA_VERSION: i64 = 0;

pub const FIELD_VALUE: &str = "value";
pub const FIELD_VALUE_TYPE: &str = "value_type";
pub const FIELD_EXPIRES_AT: &str = "expires_at";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_VERSION: &str = "version";

/// Fields every record must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    FIELD_VALUE,
    FIELD_VALUE_TYPE,
    FIELD_EXPIRES_AT,
    FIELD_CREATED_AT,
    FIELD_VERSION,
];

// == Time To Live ==
/// How long an entry stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Ttl {
    /// Never expires
    #[default]
    Never,
    /// Seconds from now; zero or negative values are allowed
    Seconds(i64),
    /// A signed calendar duration
    Duration(chrono::Duration),
    /// A std duration
    Std(std::time::Duration),
}

impl Ttl {
    /// Absolute expiration timestamp for an entry created at `now`.
    ///
    /// Fails with [`CacheError::InvalidTtl`] if the result overflows.
    pub fn expires_at(&self, now: i64) -> Result<Option<i64>> {
        let offset = match self {
            Ttl::Never => return Ok(None),
            Ttl::Seconds(secs) => *secs,
            Ttl::Duration(duration) => duration.num_seconds(),
            Ttl::Std(duration) => i64::try_from(duration.as_secs())
                .map_err(|_| CacheError::InvalidTtl(format!("{duration:?} is too large")))?,
        };

        now.checked_add(offset)
            .map(Some)
            .ok_or_else(|| CacheError::InvalidTtl(format!("{self:?} overflows the timestamp range")))
    }
}

impl From<i64> for Ttl {
    fn from(secs: i64) -> Self {
        Ttl::Seconds(secs)
    }
}

impl From<i32> for Ttl {
    fn from(secs: i32) -> Self {
        Ttl::Seconds(secs.into())
    }
}

impl From<chrono::Duration> for Ttl {
    fn from(duration: chrono::Duration) -> Self {
        Ttl::Duration(duration)
    }
}

impl From<std::time::Duration> for Ttl {
    fn from(duration: std::time::Duration) -> Self {
        Ttl::Std(duration)
    }
}

impl<T: Into<Ttl>> From<Option<T>> for Ttl {
    fn from(ttl: Option<T>) -> Self {
        ttl.map(Into::into).unwrap_or(Ttl::Never)
    }
}

// == Structural Validation ==
/// Checks the validity invariant of a raw record: exactly the five required
/// fields, the current schema version, and an integer or null `expires_at`.
pub fn is_valid(fields: &Map<String, Value>) -> bool {
    validate_fields(fields).is_ok()
}

fn validate_fields(fields: &Map<String, Value>) -> Result<()> {
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !fields.contains_key(**f)) {
        return Err(CacheError::InvalidRecord(format!("missing field `{missing}`")));
    }
    if fields.len() != REQUIRED_FIELDS.len() {
        return Err(CacheError::InvalidRecord("unexpected extra fields".into()));
    }
    if fields[FIELD_VERSION].as_i64() != Some(SCHEMA_VERSION) {
        return Err(CacheError::InvalidRecord(format!(
            "version {} does not match {SCHEMA_VERSION}",
            fields[FIELD_VERSION]
        )));
    }
    let expires_at = &fields[FIELD_EXPIRES_AT];
    if !expires_at.is_null() && expires_at.as_i64().is_none() {
        return Err(CacheError::InvalidRecord(format!(
            "expires_at must be an integer or null, got {expires_at}"
        )));
    }
    Ok(())
}

fn payload_matches(kind: ValueKind, payload: &Value) -> bool {
    match kind {
        ValueKind::String | ValueKind::Object => payload.is_string(),
        ValueKind::Int => payload.as_i64().is_some(),
        ValueKind::Float => payload.is_number(),
        ValueKind::Bool => payload.is_boolean(),
        ValueKind::Null => payload.is_null(),
        ValueKind::Array => payload.is_array() || payload.is_object(),
    }
}

// == Entry Record ==
/// One persisted (value, expiration, metadata) tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRecord {
    /// Stored payload; `object` payloads are an encoded string
    pub value: Value,
    /// Shape of the original value
    pub value_type: ValueKind,
    /// Unix seconds, None = never expires
    pub expires_at: Option<i64>,
    /// Unix seconds at creation; informational only
    pub created_at: i64,
    /// Record format version
    pub version: i64,
}

/// Result of decoding a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: CacheValue,
    pub is_expired: bool,
}

impl EntryRecord {
    // == Encode ==
    /// Builds a record for `value` created at `now`.
    ///
    /// # Errors
    /// - [`CacheError::UnsupportedValue`] for values with no stored form
    /// - [`CacheError::InvalidTtl`] if the expiration overflows
    pub fn encode(value: &CacheValue, ttl: Ttl, now: i64, codec: &dyn ObjectCodec) -> Result<Self> {
        value.ensure_representable()?;

        let payload = match value {
            CacheValue::Object(inner) => Value::String(
                codec
                    .encode(inner)
                    .map_err(|e| CacheError::UnsupportedValue(e.to_string()))?,
            ),
            other => other.to_json(),
        };

        Ok(Self {
            value: payload,
            value_type: value.kind(),
            expires_at: ttl.expires_at(now)?,
            created_at: now,
            version: SCHEMA_VERSION,
        })
    }

    // == Parse ==
    /// Builds a record from raw fields, failing with
    /// [`CacheError::InvalidRecord`] on any structural problem.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        validate_fields(fields)?;

        let tag = &fields[FIELD_VALUE_TYPE];
        let value_type = tag
            .as_str()
            .and_then(ValueKind::parse)
            .ok_or_else(|| CacheError::InvalidRecord(format!("unknown value_type {tag}")))?;

        let created_at = fields[FIELD_CREATED_AT]
            .as_i64()
            .ok_or_else(|| CacheError::InvalidRecord("created_at must be an integer".into()))?;

        let value = fields[FIELD_VALUE].clone();
        if !payload_matches(value_type, &value) {
            return Err(CacheError::InvalidRecord(format!(
                "payload does not match value_type `{value_type}`"
            )));
        }

        Ok(Self {
            value,
            value_type,
            expires_at: fields[FIELD_EXPIRES_AT].as_i64(),
            created_at,
            version: SCHEMA_VERSION,
        })
    }

    /// Parses the bytes of an entry file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::InvalidRecord(format!("not a JSON document: {e}")))?;

        match raw {
            Value::Object(fields) => Self::from_fields(&fields),
            other => Err(CacheError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Serializes the record for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Internal(e.to_string()))
    }

    // == Is Expired ==
    /// True iff the record has an expiration strictly before `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    /// Seconds of freshness left at `now`, or None if the record never expires.
    ///
    /// Returns `Some(0)` once expired.
    pub fn ttl_remaining(&self, now: i64) -> Option<i64> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_sub(now).max(0))
    }

    // == Value ==
    /// Rebuilds the stored value, running `object` payloads through `codec`.
    ///
    /// Fails with [`CacheError::CorruptValue`] if the codec cannot decode the
    /// payload.
    pub fn value(&self, codec: &dyn ObjectCodec) -> Result<CacheValue> {
        match self.value_type {
            ValueKind::Object => {
                let encoded = self.value.as_str().ok_or_else(|| {
                    CacheError::InvalidRecord("object payload must be a string".into())
                })?;
                codec
                    .decode(encoded)
                    .map(CacheValue::Object)
                    .map_err(|e| CacheError::CorruptValue(format!("{} codec: {e}", codec.name())))
            }
            ValueKind::Float => self
                .value
                .as_f64()
                .map(CacheValue::Float)
                .ok_or_else(|| CacheError::InvalidRecord("float payload must be a number".into())),
            _ => Ok(CacheValue::from_json(self.value.clone())),
        }
    }
}

// == Decode ==
/// Parses an entry file and re-evaluates its expiration against `now`.
pub fn decode(bytes: &[u8], now: i64, codec: &dyn ObjectCodec) -> Result<Decoded> {
    let record = EntryRecord::from_bytes(bytes)?;
    Ok(Decoded {
        value: record.value(codec)?,
        is_expired: record.is_expired_at(now),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec::JsonObjectCodec;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_encode_no_ttl() {
        let record =
            EntryRecord::encode(&"test_value".into(), Ttl::Never, NOW, &JsonObjectCodec).unwrap();

        assert_eq!(record.value, json!("test_value"));
        assert_eq!(record.value_type, ValueKind::String);
        assert!(record.expires_at.is_none());
        assert_eq!(record.created_at, NOW);
        assert_eq!(record.version, SCHEMA_VERSION);
        assert!(!record.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_encode_with_ttl_variants() {
        let value = CacheValue::Int(1);
        let codec = JsonObjectCodec;

        let secs = EntryRecord::encode(&value, 60.into(), NOW, &codec).unwrap();
        assert_eq!(secs.expires_at, Some(NOW + 60));

        let chrono_ttl = EntryRecord::encode(&value, chrono::Duration::minutes(2).into(), NOW, &codec).unwrap();
        assert_eq!(chrono_ttl.expires_at, Some(NOW + 120));

        let std_ttl =
            EntryRecord::encode(&value, std::time::Duration::from_secs(30).into(), NOW, &codec).unwrap();
        assert_eq!(std_ttl.expires_at, Some(NOW + 30));

        let none: Option<i64> = None;
        let never = EntryRecord::encode(&value, none.into(), NOW, &codec).unwrap();
        assert_eq!(never.expires_at, None);
    }

    #[test]
    fn test_encode_overflowing_ttl_is_invalid() {
        let result = EntryRecord::encode(&CacheValue::Null, Ttl::Seconds(i64::MAX), NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));

        let huge = std::time::Duration::from_secs(u64::MAX);
        let result = EntryRecord::encode(&CacheValue::Null, huge.into(), NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let result = EntryRecord::encode(&CacheValue::Float(f64::NAN), Ttl::Never, NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::UnsupportedValue(_))));
    }

    #[test]
    fn test_object_payload_is_stored_as_string() {
        let value = CacheValue::Object(json!({"id": "STANDARD", "rate": "5.24"}));
        let record = EntryRecord::encode(&value, Ttl::Never, NOW, &JsonObjectCodec).unwrap();

        assert_eq!(record.value_type, ValueKind::Object);
        assert!(record.value.is_string());
        assert_eq!(record.value(&JsonObjectCodec).unwrap(), value);
    }

    #[test]
    fn test_record_serializes_five_fields() {
        let record = EntryRecord::encode(&CacheValue::Bool(true), 10.into(), NOW, &JsonObjectCodec).unwrap();
        let raw: Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();

        assert_eq!(
            raw,
            json!({
                "value": true,
                "value_type": "bool",
                "expires_at": NOW + 10,
                "created_at": NOW,
                "version": SCHEMA_VERSION
            })
        );
        assert!(is_valid(raw.as_object().unwrap()));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let record = EntryRecord {
            value: json!("test"),
            value_type: ValueKind::String,
            expires_at: Some(NOW),
            created_at: NOW,
            version: SCHEMA_VERSION,
        };

        // Expired only once the current time is strictly past expires_at
        assert!(!record.is_expired_at(NOW));
        assert!(record.is_expired_at(NOW + 1));
    }

    #[test]
    fn test_ttl_remaining() {
        let record = EntryRecord::encode(&CacheValue::Null, 10.into(), NOW, &JsonObjectCodec).unwrap();
        assert_eq!(record.ttl_remaining(NOW), Some(10));
        assert_eq!(record.ttl_remaining(NOW + 25), Some(0));

        let forever = EntryRecord::encode(&CacheValue::Null, Ttl::Never, NOW, &JsonObjectCodec).unwrap();
        assert_eq!(forever.ttl_remaining(NOW), None);
    }

    #[test]
    fn test_is_valid_missing_field() {
        let raw = fields(json!({"value": 1, "value_type": "int", "expires_at": null, "version": 0}));
        assert!(!is_valid(&raw));
        assert!(matches!(
            EntryRecord::from_fields(&raw),
            Err(CacheError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_is_valid_version_mismatch() {
        let raw = fields(json!({
            "value": 1, "value_type": "int", "expires_at": null, "created_at": NOW, "version": -1
        }));
        assert!(!is_valid(&raw));
    }

    #[test]
    fn test_is_valid_non_integer_expiry() {
        let raw = fields(json!({
            "value": 1, "value_type": "int", "expires_at": "tomorrow", "created_at": NOW, "version": 0
        }));
        assert!(!is_valid(&raw));

        let raw = fields(json!({
            "value": 1, "value_type": "int", "expires_at": 12.5, "created_at": NOW, "version": 0
        }));
        assert!(!is_valid(&raw));
    }

    #[test]
    fn test_extra_fields_rejected() {
        let raw = fields(json!({
            "value": 1, "value_type": "int", "expires_at": null, "created_at": NOW, "version": 0,
            "owner": "someone"
        }));
        assert!(!is_valid(&raw));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let raw = fields(json!({
            "value": "resource", "value_type": "resource", "expires_at": null, "created_at": NOW, "version": 0
        }));
        assert!(is_valid(&raw));
        assert!(matches!(
            EntryRecord::from_fields(&raw),
            Err(CacheError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_payload_kind_mismatch_rejected() {
        let raw = fields(json!({
            "value": "seven", "value_type": "int", "expires_at": null, "created_at": NOW, "version": 0
        }));
        assert!(EntryRecord::from_fields(&raw).is_err());
    }

    #[test]
    fn test_decode_not_json() {
        let result = decode(b"definitely not json", NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::InvalidRecord(_))));

        let result = decode(b"[1,2,3]", NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::InvalidRecord(_))));
    }

    #[test]
    fn test_decode_corrupt_object() {
        let bytes = serde_json::to_vec(&json!({
            "value": "O:8:\"stdClass\":0:{}", "value_type": "object",
            "expires_at": null, "created_at": NOW, "version": 0
        }))
        .unwrap();

        let result = decode(&bytes, NOW, &JsonObjectCodec);
        assert!(matches!(result, Err(CacheError::CorruptValue(_))));
    }

    #[test]
    fn test_decode_reevaluates_expiry() {
        let record = EntryRecord::encode(&"v".into(), 60.into(), NOW, &JsonObjectCodec).unwrap();
        let bytes = record.to_bytes().unwrap();

        assert!(!decode(&bytes, NOW + 60, &JsonObjectCodec).unwrap().is_expired);
        assert!(decode(&bytes, NOW + 61, &JsonObjectCodec).unwrap().is_expired);
    }

    #[test]
    fn test_float_payload_keeps_kind() {
        let record = EntryRecord::encode(&CacheValue::Float(2.0), Ttl::Never, NOW, &JsonObjectCodec).unwrap();
        let bytes = record.to_bytes().unwrap();

        let decoded = decode(&bytes, NOW, &JsonObjectCodec).unwrap();
        assert_eq!(decoded.value, CacheValue::Float(2.0));
    }

    #[test]
    fn test_map_payload_stored_structurally() {
        let value = CacheValue::from_json(json!({"id": "STANDARD", "rate": "5.24"}));
        let record = EntryRecord::encode(&value, Ttl::Never, NOW, &JsonObjectCodec).unwrap();

        assert_eq!(record.value_type, ValueKind::Array);
        assert_eq!(record.value, json!({"id": "STANDARD", "rate": "5.24"}));
        assert_eq!(record.value(&JsonObjectCodec).unwrap(), value);
    }
}
