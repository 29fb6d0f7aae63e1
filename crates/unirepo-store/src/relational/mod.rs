pub mod backend;
pub mod cursor;
pub mod row;
pub mod schema;
pub mod sql;

pub use backend::SqliteBackend;
pub use cursor::SqliteCursor;
pub use schema::SyncOutcome;
pub use sql::{SqlFilter, SqlProjection, SqlQuery};
