pub mod ownership_walker;
pub mod recorder;
pub mod temporal_resolver;

use thiserror::Error;

use crate::identity::PatternError;
use crate::repos::StorageError;

pub use ownership_walker::{OwnerGraph, OwnerNode, OwnerResolution, OwnerSlot, OwnershipWalker};
pub use recorder::{IngestError, Recorder};
pub use temporal_resolver::TemporalResolver;

/// Default page size for listing and fan-in queries
pub const DEFAULT_LIMIT: i64 = 10;

/// Upper bound on `limit`; fan-in queries are table scans
pub const MAX_LIMIT: i64 = 1000;

/// Errors surfaced by read-side operations
///
/// "Nothing found" is never an error: single lookups return `None` and owner
/// traversal reports holes.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    #[error("invalid limit {0}: must be between 1 and {max}", max = MAX_LIMIT)]
    InvalidLimit(i64),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub fn validate_limit(limit: i64) -> Result<i64, QueryError> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(QueryError::InvalidLimit(limit))
    }
}
