//! A concurrent cuckoo hash map with a Memcache-compatible operation layer.
//!
//! [`handle::Handle`] is the entry point: construct one from a
//! [`config::CacheConfig`], then call its `get`/`set`/`add`/`replace`/`cas`/
//! `append`/`prepend`/`incr`/`decr`/`touch`/`delete`/`flush` methods. Every
//! call is safe to invoke from any number of threads concurrently; `Handle`
//! itself is cheaply `Clone`.

pub mod bin;
pub mod config;
pub mod error;
pub mod evictor;
pub mod handle;
pub mod hash;
pub mod ops;
pub mod resize;
pub mod search;
pub mod table;
pub mod value;

pub use config::CacheConfig;
pub use error::CacheError;
pub use handle::Handle;
pub use ops::{MemOp, OpCode, OpRequest, OpResult, OpStatus};
pub use value::{Expiry, ValueRecord};
