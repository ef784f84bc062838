//! Background expiration sweep
//!
//! Reads already hide expired rows; the sweeper reclaims their space by
//! calling the store's eager sweep on a fixed interval. Rows with a pending
//! operation are never removed by it.
//!
//! # Design Notes
//!
//! - Sweeps through the same table write path as any other removal
//! - Sleeps in short slices so shutdown is prompt
//! - Errors are logged and the next interval retries

use doccache_core::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Something the sweeper can sweep.
pub trait Sweep: Send + Sync + 'static {
    /// Remove expired, non-pending rows; returns how many were removed.
    fn sweep_expired(&self) -> Result<usize>;
}

/// Longest uninterrupted sleep between shutdown checks
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Background TTL sweep task
pub struct TtlSweeper {
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TtlSweeper {
    /// Spawn the sweep thread.
    ///
    /// The first sweep runs one `interval` after start.
    pub fn start(target: Arc<dyn Sweep>, interval: Duration) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("doccache-ttl-sweep".to_string())
            .spawn(move || {
                let slice = SLEEP_SLICE.min(interval);
                while !flag.load(Ordering::Relaxed) {
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if flag.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(slice);
                        elapsed += slice;
                    }

                    match target.sweep_expired() {
                        Ok(0) => {}
                        Ok(removed) => {
                            debug!(target: "doccache::sweeper", removed, "Background sweep removed expired rows")
                        }
                        Err(e) => {
                            warn!(target: "doccache::sweeper", error = %e, "Background sweep failed")
                        }
                    }
                }
            })
            .map_err(|e| doccache_core::Error::io("spawning TTL sweep thread", e))?;

        Ok(Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Signal shutdown without waiting
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn stop(&self) {
        self.shutdown();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TtlSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
