pub mod backend;
pub mod cursor;
pub mod matcher;
pub mod query;
pub mod server;

pub use backend::DocumentBackend;
pub use cursor::DocumentCursor;
pub use query::DocumentQuery;
pub use server::{DocumentServer, ServerError};
