pub mod descriptor;
pub mod predicate;
pub mod projection;

pub use descriptor::{FindDescriptor, SortDirection, SortKey};
pub use predicate::{ComparisonOp, LogicalOp, PredicateNode};
pub use projection::{ProjectionMode, ResolvedProjection};
