//! Canonical schema constants for structured logging and events
//!
//! These constants keep log records and error reports consistent across
//! the repository facade, the translator and the backends. `tracing` field
//! names are identifiers at the call site, so emitters spell each key
//! literally and readers of captured records look fields up through these
//! constants.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// Query subjects
pub const FIELD_ENTITY: &str = "entity";
pub const FIELD_BACKEND: &str = "backend";
pub const FIELD_FAMILY: &str = "family";
pub const FIELD_CURSOR_ID: &str = "cursor_id";

// Result sizes
pub const FIELD_ROWS: &str = "rows";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
