//! Building blocks of the image migration pipeline.

pub mod audit;
pub mod checkpoint;
pub mod destination;
pub mod path_resolver;
pub mod remote;
pub mod traits;
pub mod transfer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use path_resolver::PathResolver;
pub use types::{
    AuditRow, BatchCursor, PassKind, RecordOutcome, ResolvedReference, SkipReason, SourceRecord,
    TransferError,
};
