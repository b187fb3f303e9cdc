//! `cuckoo-cached`: exercises construction, configuration, logging, and
//! graceful shutdown of a [`cuckoo_cache::Handle`]. Does not open a socket
//! or speak any wire protocol — the listener and framing layers are
//! external collaborators this crate does not implement.

use std::time::Duration;

use clap::Parser;
use cuckoo_cache::{CacheConfig, Handle};

#[derive(Parser, Debug)]
#[command(name = "cuckoo-cached", about = "Concurrent cuckoo cache process")]
struct Args {
    /// Desired initial element capacity, rounded up to a power-of-two bin count.
    #[arg(long, default_value_t = 1 << 16)]
    capacity: usize,

    /// Enable the background clock-hand evictor.
    #[arg(long)]
    eviction: bool,

    /// Resize supervisor tick period, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    resize_check_interval_ms: u64,

    /// Evictions per tick above which the resize supervisor escalates.
    #[arg(long, default_value_t = 1)]
    eviction_threshold: u64,
}

impl From<Args> for CacheConfig {
    fn from(a: Args) -> CacheConfig {
        CacheConfig {
            initial_capacity_hint: a.capacity,
            eviction_enabled: a.eviction,
            resize_check_interval: Duration::from_millis(a.resize_check_interval_ms),
            eviction_threshold: a.eviction_threshold,
        }
    }
}

fn main() -> Result<(), cuckoo_cache::CacheError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config: CacheConfig = args.into();

    let handle = Handle::new(config)?;
    tracing::info!(bin_count = handle.config().bin_count(), "handle ready");

    // No listener or framing layer lives in this crate (see module docs);
    // block the process until stdin closes, then shut the background
    // workers down cleanly.
    let mut discard = String::new();
    while std::io::stdin().read_line(&mut discard).unwrap_or(0) > 0 {
        discard.clear();
    }

    tracing::info!("stdin closed, shutting down");
    handle.shutdown();
    Ok(())
}
