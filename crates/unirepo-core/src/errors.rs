use unirepo_core_types::RequestId;
use thiserror::Error;

/// Result type alias using RepoError
pub type Result<T> = std::result::Result<T, RepoError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable for programmatic handling,
/// test assertions and the CLI's exit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation (raised before any backend round trip)
    UnknownEntity,
    UnknownField,
    ProjectionConflict,
    InvalidMetadata,
    DuplicateEntity,
    InvalidInput,

    // Backend
    Connection,
    QueryExecution,

    // Results
    CursorClosed,
    Hydration,

    // Integration/IO
    Serialization,
    Config,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::UnknownEntity => "ERR_UNKNOWN_ENTITY",
            ExErrorKind::UnknownField => "ERR_UNKNOWN_FIELD",
            ExErrorKind::ProjectionConflict => "ERR_PROJECTION_CONFLICT",
            ExErrorKind::InvalidMetadata => "ERR_INVALID_METADATA",
            ExErrorKind::DuplicateEntity => "ERR_DUPLICATE_ENTITY",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Connection => "ERR_CONNECTION",
            ExErrorKind::QueryExecution => "ERR_QUERY_EXECUTION",
            ExErrorKind::CursorClosed => "ERR_CURSOR_CLOSED",
            ExErrorKind::Hydration => "ERR_HYDRATION",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Config => "ERR_CONFIG",
        }
    }

    /// Whether errors of this kind are raised before touching a backend
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::UnknownEntity
                | ExErrorKind::UnknownField
                | ExErrorKind::ProjectionConflict
                | ExErrorKind::InvalidMetadata
                | ExErrorKind::DuplicateEntity
                | ExErrorKind::InvalidInput
        )
    }
}

/// Canonical structured error type
///
/// Classification fields for programmatic handling plus context for
/// debugging (operation, entity, field, correlation id).
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    field: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            field: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add field context
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the field context, if any
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(field) = &self.field {
            write!(f, " (field: {})", field)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request_id: {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for repository operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepoError {
    // ===== Validation Errors =====
    /// Entity type was never registered
    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: String },

    /// Predicate, projection or order references an undeclared field
    #[error("Unknown field '{field}' on entity {entity}")]
    UnknownField { entity: String, field: String },

    /// Both `select` and `exclude` were supplied for one request
    #[error("Conflicting projection on entity {entity}: select and exclude both given ({fields:?})")]
    ProjectionConflict { entity: String, fields: Vec<String> },

    /// Entity declaration violates a metadata invariant
    #[error("Invalid metadata for entity {entity}: {reason}")]
    InvalidMetadata { entity: String, reason: String },

    /// Entity name registered twice
    #[error("Entity already registered: {entity}")]
    DuplicateEntity { entity: String },

    /// Request value rejected before execution
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== Backend Errors =====
    /// No live backend connection
    #[error("Connection error ({backend}): {message}")]
    Connection { backend: String, message: String },

    /// Backend rejected or failed a query
    #[error("Query execution failed ({backend}): {message}")]
    QueryExecution { backend: String, message: String },

    // ===== Result Errors =====
    /// Pull on a cursor that is exhausted or closed
    #[error("Cursor is {state} for entity {entity}")]
    CursorClosed { entity: String, state: String },

    /// Raw value does not fit the declared field type
    #[error("Cannot hydrate {entity}.{field}: expected {expected}, found {found}")]
    Hydration {
        entity: String,
        field: String,
        expected: String,
        found: String,
    },

    // ===== Integration Errors =====
    /// Entity (de)serialization failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RepoError {
    /// Canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            RepoError::UnknownEntity { .. } => ExErrorKind::UnknownEntity,
            RepoError::UnknownField { .. } => ExErrorKind::UnknownField,
            RepoError::ProjectionConflict { .. } => ExErrorKind::ProjectionConflict,
            RepoError::InvalidMetadata { .. } => ExErrorKind::InvalidMetadata,
            RepoError::DuplicateEntity { .. } => ExErrorKind::DuplicateEntity,
            RepoError::InvalidInput { .. } => ExErrorKind::InvalidInput,
            RepoError::Connection { .. } => ExErrorKind::Connection,
            RepoError::QueryExecution { .. } => ExErrorKind::QueryExecution,
            RepoError::CursorClosed { .. } => ExErrorKind::CursorClosed,
            RepoError::Hydration { .. } => ExErrorKind::Hydration,
            RepoError::Serialization { .. } => ExErrorKind::Serialization,
            RepoError::Config { .. } => ExErrorKind::Config,
        }
    }

    /// Shorthand for a backend failure
    pub fn query(backend: impl Into<String>, message: impl Into<String>) -> Self {
        RepoError::QueryExecution {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a dead or unusable connection
    pub fn connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        RepoError::Connection {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Conversion from RepoError to the canonical ExError
impl From<RepoError> for ExError {
    fn from(err: RepoError) -> Self {
        let kind = err.kind();
        match err {
            RepoError::UnknownEntity { entity } => ExError::new(kind)
                .with_entity(entity)
                .with_message("Entity type was never registered"),

            RepoError::UnknownField { entity, field } => ExError::new(kind)
                .with_entity(entity)
                .with_field(field)
                .with_message("Field is not declared on entity"),

            RepoError::ProjectionConflict { entity, fields } => ExError::new(kind)
                .with_entity(entity)
                .with_message(format!("select and exclude both given: {:?}", fields)),

            RepoError::InvalidMetadata { entity, reason } => {
                ExError::new(kind).with_entity(entity).with_message(reason)
            }

            RepoError::DuplicateEntity { entity } => ExError::new(kind)
                .with_entity(entity)
                .with_message("Entity already registered"),

            RepoError::InvalidInput { reason } => ExError::new(kind).with_message(reason),

            RepoError::Connection { backend, message } => {
                ExError::new(kind).with_message(format!("{}: {}", backend, message))
            }

            RepoError::QueryExecution { backend, message } => {
                ExError::new(kind).with_message(format!("{}: {}", backend, message))
            }

            RepoError::CursorClosed { entity, state } => ExError::new(kind)
                .with_entity(entity)
                .with_message(format!("Cursor is {}", state)),

            RepoError::Hydration {
                entity,
                field,
                expected,
                found,
            } => ExError::new(kind)
                .with_entity(entity)
                .with_field(field)
                .with_message(format!("expected {}, found {}", expected, found)),

            RepoError::Serialization { message } => ExError::new(kind).with_message(message),

            RepoError::Config { message } => ExError::new(kind).with_message(message),
        }
    }
}

/// Conversion from serde_json::Error to RepoError
impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_kinds() {
        assert!(ExErrorKind::UnknownField.is_validation());
        assert!(ExErrorKind::ProjectionConflict.is_validation());
        assert!(!ExErrorKind::QueryExecution.is_validation());
        assert!(!ExErrorKind::CursorClosed.is_validation());
    }

    #[test]
    fn test_display_includes_code_and_context() {
        let err = ExError::new(ExErrorKind::UnknownField)
            .with_op("find")
            .with_entity("post")
            .with_field("author");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[ERR_UNKNOWN_FIELD]"));
        assert!(rendered.contains("'find'"));
        assert!(rendered.contains("(field: author)"));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Connection).with_message("disk full");
        let outer = ExError::new(ExErrorKind::QueryExecution).with_source(inner);
        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Connection)
        );
        assert!(std::error::Error::source(&outer).is_some());
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let err: RepoError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ExErrorKind::Serialization);
    }
}
