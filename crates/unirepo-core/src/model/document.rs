//! Raw document values and backend-native identifiers

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use serde_json::{json, Value};

use crate::model::field::FieldType;

/// A schema-less record: key → JSON value
///
/// Keys are logical field names in hydrated records and storage names in raw
/// backend records. An absent key means "not loaded"; `Value::Null` means
/// "loaded as empty".
pub type Document = serde_json::Map<String, Value>;

/// Key under which the document backend keeps identifiers
pub const OBJECT_ID_KEY: &str = "$oid";

/// 12-byte opaque identifier assigned by the document backend
///
/// Layout: 4-byte big-endian seconds since the epoch, 5 bytes of per-process
/// randomness, 3-byte counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| {
            let random = uuid::Uuid::new_v4();
            let mut bytes = [0u8; 5];
            bytes.copy_from_slice(&random.as_bytes()[..5]);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| {
                let seed = uuid::Uuid::new_v4().as_bytes()[0..4]
                    .iter()
                    .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                AtomicU32::new(seed)
            })
            .fetch_add(1, Ordering::Relaxed)
            & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// Parse the 24-character hex form
    pub fn parse_str(s: &str) -> Option<Self> {
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; 12] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    /// 24-character lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time encoded in the identifier (seconds since the epoch)
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// Identifier in the backend's own representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeId {
    ObjectId(ObjectId),
    Integer(i64),
    Text(String),
}

impl NativeId {
    /// Representation stored in a document (`{"$oid": ...}` for object ids)
    pub fn to_storage_value(&self) -> Value {
        match self {
            NativeId::ObjectId(oid) => json!({ OBJECT_ID_KEY: oid.to_hex() }),
            NativeId::Integer(i) => json!(i),
            NativeId::Text(s) => json!(s),
        }
    }

    /// Read an identifier back from its stored representation
    pub fn from_storage_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) if map.len() == 1 => map
                .get(OBJECT_ID_KEY)
                .and_then(Value::as_str)
                .and_then(ObjectId::parse_str)
                .map(NativeId::ObjectId),
            Value::Number(n) => n.as_i64().map(NativeId::Integer),
            Value::String(s) => Some(NativeId::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert to the domain identifier type, if representable
    pub fn to_domain(&self, field_type: FieldType) -> Option<Value> {
        match (field_type, self) {
            (FieldType::String, NativeId::ObjectId(oid)) => Some(json!(oid.to_hex())),
            (FieldType::String, NativeId::Integer(i)) => Some(json!(i.to_string())),
            (FieldType::String, NativeId::Text(s)) => Some(json!(s)),
            (FieldType::Integer, NativeId::Integer(i)) => Some(json!(i)),
            (FieldType::Integer, NativeId::Text(s)) => s.parse::<i64>().ok().map(|i| json!(i)),
            _ => None,
        }
    }
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeId::ObjectId(oid) => write!(f, "{}", oid),
            NativeId::Integer(i) => write!(f, "{}", i),
            NativeId::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_round_trip() {
        let oid = ObjectId::new();
        let hex = oid.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::parse_str(&hex), Some(oid));
        assert!(ObjectId::parse_str("not-hex").is_none());
        assert!(ObjectId::parse_str("abcd").is_none());
    }

    #[test]
    fn test_object_ids_are_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(a.timestamp() > 0);
    }

    #[test]
    fn test_storage_value_round_trip() {
        let oid = NativeId::ObjectId(ObjectId::new());
        let stored = oid.to_storage_value();
        assert!(stored.get(OBJECT_ID_KEY).is_some());
        assert_eq!(NativeId::from_storage_value(&stored), Some(oid));
        assert_eq!(
            NativeId::from_storage_value(&json!(7)),
            Some(NativeId::Integer(7))
        );
    }

    #[test]
    fn test_to_domain_conversions() {
        let oid = ObjectId::new();
        assert_eq!(
            NativeId::ObjectId(oid).to_domain(FieldType::String),
            Some(json!(oid.to_hex()))
        );
        assert_eq!(
            NativeId::Integer(5).to_domain(FieldType::String),
            Some(json!("5"))
        );
        assert_eq!(
            NativeId::Text("12".into()).to_domain(FieldType::Integer),
            Some(json!(12))
        );
        assert_eq!(NativeId::ObjectId(oid).to_domain(FieldType::Integer), None);
        assert_eq!(NativeId::Integer(1).to_domain(FieldType::Boolean), None);
    }
}
