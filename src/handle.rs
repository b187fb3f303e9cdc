//! Top-level cache handle: the op layer external callers talk to.
//!
//! Grounded on `external.go`'s `Cuckoo` and its `op` method — a thin
//! wrapper around the map core that retries an operation across hash-count
//! growth, and, if that's exhausted, triggers a table resize before trying
//! again. `Handle` additionally owns the optional background evictor and
//! the resize supervisor, neither of which the map core knows about.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::evictor::Evictor;
use crate::ops::{MemOp, OpResult, OpStatus};
use crate::resize::{self, ResizeSupervisor};
use crate::table::{Table, MAX_HASHES};
use crate::value::{Expiry, ValueRecord};

/// Maximum number of escalation attempts (hash growth + resizes combined)
/// a single call will absorb before giving up with
/// [`CacheError::TableExhausted`]. Generous enough that no real workload
/// should ever hit it; it exists so a pathological caller can't wedge a
/// thread into an unbounded loop.
const MAX_ESCALATIONS: u32 = 64;

struct Inner {
    table: Arc<RwLock<Arc<Table>>>,
    config: CacheConfig,
    shutdown: AtomicBool,
    evictor: Mutex<Option<Evictor>>,
    resize: Mutex<Option<ResizeSupervisor>>,
}

/// Cheaply cloneable handle onto a running cache instance. Clones share the
/// same table, background workers, and shutdown state.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Handle {
    pub fn new(config: CacheConfig) -> Result<Handle, CacheError> {
        config.validate()?;

        let table = Arc::new(Table::new(config.bin_count()));
        let slot = Arc::new(RwLock::new(Arc::clone(&table)));

        let evictor = if config.eviction_enabled {
            Some(Evictor::spawn(Arc::clone(&slot)))
        } else {
            None
        };
        let resize_supervisor = ResizeSupervisor::spawn(Arc::clone(&slot), config.clone());

        tracing::info!(
            bin_count = table.bin_count(),
            eviction_enabled = config.eviction_enabled,
            "cache handle started"
        );

        Ok(Handle {
            inner: Arc::new(Inner {
                table: slot,
                config,
                shutdown: AtomicBool::new(false),
                evictor: Mutex::new(evictor),
                resize: Mutex::new(Some(resize_supervisor)),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Stop the background evictor and resize supervisor. Further calls on
    /// this (or any clone of this) handle return [`CacheError::ShutDown`].
    /// Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(e) = self.inner.evictor.lock().take() {
            e.shutdown();
        }
        if let Some(r) = self.inner.resize.lock().take() {
            r.shutdown();
        }
    }

    fn check_alive(&self) -> Result<(), CacheError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            Err(CacheError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn current_table(&self) -> Arc<Table> {
        Arc::clone(&self.inner.table.read())
    }

    pub fn get(&self, key: &[u8]) -> Result<OpResult, CacheError> {
        self.check_alive()?;
        let now = Instant::now();
        Ok(match self.current_table().get(key, now) {
            Some(v) => OpResult::with_value(OpStatus::Exists, v),
            None => OpResult::status(OpStatus::NotFound),
        })
    }

    pub fn set(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        flags: u32,
        expires: Expiry,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Set {
                bytes: bytes.into(),
                flags,
                expires,
            },
        )
    }

    pub fn add(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        flags: u32,
        expires: Expiry,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Add {
                bytes: bytes.into(),
                flags,
                expires,
            },
        )
    }

    pub fn replace(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        flags: u32,
        expires: Expiry,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Replace {
                bytes: bytes.into(),
                flags,
                expires,
            },
        )
    }

    pub fn cas(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        flags: u32,
        expires: Expiry,
        cas_id: u64,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Cas {
                bytes: bytes.into(),
                flags,
                expires,
                cas_id,
            },
        )
    }

    pub fn append(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        cas_id: u64,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Join {
                bytes: bytes.into(),
                prepend: false,
                cas_id,
            },
        )
    }

    pub fn prepend(
        &self,
        key: &[u8],
        bytes: impl Into<Box<[u8]>>,
        cas_id: u64,
    ) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Join {
                bytes: bytes.into(),
                prepend: true,
                cas_id,
            },
        )
    }

    pub fn incr(&self, key: &[u8], by: u64, default: u64, expires: Expiry) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Delta {
                by,
                default,
                expires,
                increment: true,
            },
        )
    }

    pub fn decr(&self, key: &[u8], by: u64, default: u64, expires: Expiry) -> Result<OpResult, CacheError> {
        self.run(
            key,
            MemOp::Delta {
                by,
                default,
                expires,
                increment: false,
            },
        )
    }

    pub fn touch(&self, key: &[u8], expires: Expiry) -> Result<OpResult, CacheError> {
        self.run(key, MemOp::Touch { expires })
    }

    pub fn delete(&self, key: &[u8], cas_id: u64) -> Result<OpResult, CacheError> {
        self.check_alive()?;
        let now = Instant::now();
        let (status, rec) = self.current_table().delete(key, cas_id, now);
        Ok(match rec {
            Some(v) => OpResult::with_value(status, v),
            None => OpResult::status(status),
        })
    }

    /// Expire every live entry immediately (spec.md's flush: "every entry
    /// currently present becomes absent").
    pub fn flush(&self) -> Result<OpResult, CacheError> {
        self.check_alive()?;
        self.current_table().touch_all(Instant::now());
        Ok(OpResult::status(OpStatus::Stored))
    }

    pub fn iterate(&self) -> Result<Vec<Arc<ValueRecord>>, CacheError> {
        self.check_alive()?;
        Ok(self.current_table().iterate(Instant::now()))
    }

    /// Apply `op` against `key`, escalating (grow hashes, then resize) when
    /// the map core reports it found nowhere to put the result.
    fn run(&self, key: &[u8], op: MemOp) -> Result<OpResult, CacheError> {
        self.check_alive()?;
        let now = Instant::now();
        let mut table = self.current_table();

        for attempt in 0..MAX_ESCALATIONS {
            let (status, rec) = table.insert(key, &op, now);
            if status != OpStatus::ServerError {
                return Ok(match rec {
                    Some(v) => OpResult::with_value(status, v),
                    None => OpResult::status(status),
                });
            }
            tracing::debug!(attempt, "insert found no room, escalating");
            table = self.escalate(&table, now);
        }
        Err(CacheError::TableExhausted)
    }

    /// Grow `table`'s hash-function count if there's room; otherwise double
    /// it. Returns the table callers should retry against (possibly one
    /// some other thread already produced concurrently).
    fn escalate(&self, table: &Arc<Table>, now: Instant) -> Arc<Table> {
        let n = table.n_hashes();
        if n < MAX_HASHES {
            table.try_grow_hashes(n);
            return self.current_table();
        }

        let mut w = self.inner.table.write();
        if Arc::ptr_eq(&w, table) {
            let bigger = resize::rehash_into_bigger(table, now);
            bigger.set_evict_request(table.evict_request_sender());
            tracing::info!(bin_count = bigger.bin_count(), "op layer triggered synchronous resize");
            *w = Arc::new(bigger);
        }
        Arc::clone(&w)
    }
}
