//! Construction/configuration-time errors.
//!
//! These are distinct from [`crate::ops::OpStatus`], which is the in-band
//! result vocabulary for a call that *did* reach the map. `CacheError` covers
//! everything that keeps a call from getting that far.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("initial_capacity_hint must be nonzero")]
    InvalidCapacity,

    #[error("resize_check_interval must be nonzero")]
    InvalidResizeInterval,

    #[error("no storage space found for element after exhausting hash growth, eviction, and resize")]
    TableExhausted,

    #[error("handle has been shut down")]
    ShutDown,
}
