//! Correlation types for request tracking
//!
//! Every repository operation gets its own `RequestId` so that the log
//! records of one `find` (translate, execute, hydrate) can be grouped and
//! matched with the error it may end with.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single repository operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new RequestId using UUIDv7 (time ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context carried through one repository operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub request_id: RequestId,
    pub op: &'static str,
    pub entity: String,
}

impl OperationContext {
    /// Create a context for `op` on `entity` with a fresh RequestId
    pub fn new(op: &'static str, entity: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            op,
            entity: entity.into(),
        }
    }

    /// Create a context reusing an existing RequestId
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_operation_context_creation() {
        let ctx = OperationContext::new("find", "post");
        assert_eq!(ctx.op, "find");
        assert_eq!(ctx.entity, "post");
        assert!(!ctx.request_id.as_str().is_empty());
    }

    #[test]
    fn test_operation_context_reuses_request_id() {
        let id = RequestId::from_string("req-1".to_string());
        let ctx = OperationContext::new("save", "post").with_request_id(id.clone());
        assert_eq!(ctx.request_id, id);
    }

    #[test]
    fn test_serialization() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
