//! Injected timestamp sources.
//!
//! The coordinator never reads wall-clock time directly; all write paths go
//! through a [`Clock`] so tests can substitute a deterministic source.
//! Per-key ordering is enforced by the coordinator's locking and timestamp
//! floors, not by clock precision.

use crate::types::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of transaction timestamps.
///
/// Implementations must return non-decreasing values across sequential calls
/// from a single engine instance.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall-clock source that never goes backwards, even if the system clock does.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = wall.max(prev);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Timestamp::from_micros(candidate),
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Hand-driven clock for deterministic tests and demos.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start.as_micros()),
        }
    }

    /// Move the clock to an absolute instant. Moving backwards is allowed;
    /// the coordinator's floors keep version chains ordered regardless.
    pub fn set(&self, at: Timestamp) {
        self.now.store(at.as_micros(), Ordering::Release);
    }

    pub fn advance(&self, d: std::time::Duration) {
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.now.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.now.load(Ordering::Acquire))
    }
}
