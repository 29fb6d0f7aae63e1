pub mod checksums;
pub mod sync;

pub use sync::{synchronize, SyncOutcome, ENTITIES_TABLE};
