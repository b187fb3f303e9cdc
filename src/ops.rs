//! Operation closures (here: a tagged `MemOp` dispatched by `apply`, per
//! spec.md §9's explicitly-equivalent alternative to per-op closures) and
//! the external request/result records of spec.md §6.
//!
//! Grounded on `memcache.go` (`Memop`, `fset`/`fadd`/`freplace`/`fjoin`/
//! `fcas`/`fpm`/`ftouch`, `MemopRes`/`MemopResType`) and `cucache/execute.go`
//! (opcode → op mapping, expiry decoding).

use std::time::Instant;

use crate::value::{Expiry, ValueRecord};

/// Per-operation result status (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Stored,
    NotStored,
    Exists,
    NotFound,
    ClientError,
    ServerError,
}

/// The externally visible opcode vocabulary (spec.md §6), including quiet
/// variants that suppress success replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Get { quiet: bool },
    Set { quiet: bool },
    Add { quiet: bool },
    Replace { quiet: bool },
    Cas { quiet: bool },
    Delete { quiet: bool },
    Incr { quiet: bool },
    Decr { quiet: bool },
    Append { quiet: bool },
    Prepend { quiet: bool },
    Touch { quiet: bool },
    Flush { quiet: bool },
    Noop,
    Version,
    Quit,
}

impl OpCode {
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            OpCode::Get { quiet: true }
                | OpCode::Set { quiet: true }
                | OpCode::Add { quiet: true }
                | OpCode::Replace { quiet: true }
                | OpCode::Cas { quiet: true }
                | OpCode::Delete { quiet: true }
                | OpCode::Incr { quiet: true }
                | OpCode::Decr { quiet: true }
                | OpCode::Append { quiet: true }
                | OpCode::Prepend { quiet: true }
                | OpCode::Touch { quiet: true }
                | OpCode::Flush { quiet: true }
        )
    }
}

/// A decoded request fed from the (unspecified) framing layer into the op
/// layer.
#[derive(Debug, Clone)]
pub struct OpRequest {
    pub opcode: OpCode,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub flags: u32,
    pub expiry_seconds: u32,
    pub cas_id: u64,
    pub delta_by: u64,
    pub delta_default: u64,
}

/// The result returned by the op layer to the framing layer.
#[derive(Debug, Clone)]
pub struct OpResult {
    pub status: OpStatus,
    pub value: Option<std::sync::Arc<ValueRecord>>,
    pub error: Option<String>,
}

impl OpResult {
    pub fn status(status: OpStatus) -> Self {
        OpResult {
            status,
            value: None,
            error: None,
        }
    }

    pub fn with_value(status: OpStatus, value: std::sync::Arc<ValueRecord>) -> Self {
        OpResult {
            status,
            value: Some(value),
            error: None,
        }
    }

    pub fn error(status: OpStatus, message: impl Into<String>) -> Self {
        OpResult {
            status,
            value: None,
            error: Some(message.into()),
        }
    }

    /// Whether a reply should be suppressed given the opcode's quiet flag.
    /// Quiet ops suppress success replies but not failures, except quiet
    /// GETs additionally suppress NOT_FOUND (spec.md §7).
    pub fn should_suppress(&self, opcode: OpCode) -> bool {
        if !opcode.is_quiet() {
            return false;
        }
        match self.status {
            OpStatus::Stored => true,
            OpStatus::NotFound => matches!(opcode, OpCode::Get { .. }),
            _ => false,
        }
    }
}

/// Expiry decoding rule (spec.md §6 / `tm()` in `cucache/execute.go`):
/// - 0 → never
/// - 1..=2_592_000 (30 days) → relative to `now`
/// - > 2_592_000 → absolute Unix seconds
/// - 0xFFFFFFFF on incr/decr → "do not create if absent"
///
/// This crate has no wall-clock wire format of its own (only `Instant`), so
/// the "absolute Unix seconds" case is expressed as an absolute `Instant`
/// computed from the caller-supplied `unix_now` reference point — the
/// framing layer (or, in tests, the caller) is expected to supply it.
pub fn decode_expiry(seconds: u32, now: Instant, unix_now: u64) -> Expiry {
    const THIRTY_DAYS: u32 = 60 * 60 * 24 * 30;
    match seconds {
        0 => Expiry::Never,
        0xFFFFFFFF => Expiry::NeverCreate,
        s if s <= THIRTY_DAYS => Expiry::At(now + std::time::Duration::from_secs(s as u64)),
        s => {
            let delta = (s as u64).saturating_sub(unix_now);
            Expiry::At(now + std::time::Duration::from_secs(delta))
        }
    }
}

/// One high-level operation, modeled as a tagged variant rather than a
/// closure (spec.md §9: "equivalent designs ... dispatched by a single
/// `apply`"). Invoked while the bin lock is held.
#[derive(Debug, Clone)]
pub enum MemOp {
    Set {
        bytes: Box<[u8]>,
        flags: u32,
        expires: Expiry,
    },
    Add {
        bytes: Box<[u8]>,
        flags: u32,
        expires: Expiry,
    },
    Replace {
        bytes: Box<[u8]>,
        flags: u32,
        expires: Expiry,
    },
    Cas {
        bytes: Box<[u8]>,
        flags: u32,
        expires: Expiry,
        cas_id: u64,
    },
    Join {
        bytes: Box<[u8]>,
        prepend: bool,
        cas_id: u64,
    },
    Delta {
        by: u64,
        default: u64,
        expires: Expiry,
        increment: bool,
    },
    Touch {
        expires: Expiry,
    },
}

impl MemOp {
    /// `(old, existed) -> (new, result)`. `old` is `None` iff `existed` is
    /// `false`; this mirrors the original's `(Memval{}, false)` convention
    /// but is a little more type-honest about it.
    pub fn apply(
        &self,
        old: Option<&ValueRecord>,
        existed: bool,
        key: &[u8],
        hash_ordinal: usize,
    ) -> (Option<ValueRecord>, OpStatus) {
        match self {
            MemOp::Set {
                bytes,
                flags,
                expires,
            } => {
                let cas_id = old.map(|o| o.cas_id).unwrap_or(0) + 1;
                (
                    Some(ValueRecord {
                        key: key.into(),
                        bytes: bytes.clone(),
                        flags: *flags,
                        cas_id,
                        expires: *expires,
                        hash_ordinal,
                    }),
                    OpStatus::Stored,
                )
            }
            MemOp::Add {
                bytes,
                flags,
                expires,
            } => {
                if existed {
                    (None, OpStatus::Exists)
                } else {
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: bytes.clone(),
                            flags: *flags,
                            cas_id: 1,
                            expires: *expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                }
            }
            MemOp::Replace {
                bytes,
                flags,
                expires,
            } => {
                if !existed {
                    (None, OpStatus::NotFound)
                } else {
                    let cas_id = old.unwrap().cas_id + 1;
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: bytes.clone(),
                            flags: *flags,
                            cas_id,
                            expires: *expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                }
            }
            MemOp::Cas {
                bytes,
                flags,
                expires,
                cas_id,
            } => {
                if !existed {
                    (None, OpStatus::NotFound)
                } else if old.unwrap().cas_id != *cas_id {
                    (None, OpStatus::Exists)
                } else {
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: bytes.clone(),
                            flags: *flags,
                            cas_id: cas_id + 1,
                            expires: *expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                }
            }
            MemOp::Join {
                bytes,
                prepend,
                cas_id,
            } => {
                if !existed {
                    (None, OpStatus::NotFound)
                } else {
                    let old = old.unwrap();
                    if *cas_id != 0 && old.cas_id != *cas_id {
                        (None, OpStatus::Exists)
                    } else {
                        let mut nb = Vec::with_capacity(old.bytes.len() + bytes.len());
                        if *prepend {
                            nb.extend_from_slice(bytes);
                            nb.extend_from_slice(&old.bytes);
                        } else {
                            nb.extend_from_slice(&old.bytes);
                            nb.extend_from_slice(bytes);
                        }
                        (
                            Some(ValueRecord {
                                key: key.into(),
                                bytes: nb.into_boxed_slice(),
                                flags: old.flags,
                                cas_id: old.cas_id + 1,
                                expires: old.expires,
                                hash_ordinal,
                            }),
                            OpStatus::Stored,
                        )
                    }
                }
            }
            MemOp::Delta {
                by,
                default,
                expires,
                increment,
            } => {
                if existed {
                    let old = old.unwrap();
                    let text = match std::str::from_utf8(&old.bytes) {
                        Ok(s) => s,
                        Err(_) => return (None, OpStatus::ClientError),
                    };
                    let v: u64 = match text.trim().parse() {
                        Ok(v) => v,
                        Err(_) => return (None, OpStatus::ClientError),
                    };
                    let new_v = if *increment {
                        v.wrapping_add(*by)
                    } else {
                        v.saturating_sub(*by)
                    };
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: new_v.to_string().into_bytes().into_boxed_slice(),
                            flags: old.flags,
                            cas_id: old.cas_id + 1,
                            expires: old.expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                } else if matches!(expires, Expiry::NeverCreate) {
                    (None, OpStatus::NotFound)
                } else {
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: default.to_string().into_bytes().into_boxed_slice(),
                            flags: 0,
                            cas_id: 1,
                            expires: *expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                }
            }
            MemOp::Touch { expires } => {
                if !existed {
                    (None, OpStatus::NotFound)
                } else {
                    let old = old.unwrap();
                    (
                        Some(ValueRecord {
                            key: key.into(),
                            bytes: old.bytes.clone(),
                            flags: old.flags,
                            cas_id: old.cas_id,
                            expires: *expires,
                            hash_ordinal,
                        }),
                        OpStatus::Stored,
                    )
                }
            }
        }
    }
}
