//! Clock & ID generation (C1).
//!
//! Grounded on the teacher's `TimeProvider` abstraction
//! (`time_provider.rs`): production code depends on a trait object rather
//! than calling `SystemTime::now()`/`Uuid::new_v4()` directly, so tests can
//! substitute a deterministic clock without real sleeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use uuid::Uuid;

/// Monotonic-enough wall time plus unique id generation for one shard.
///
/// `now_ms` need not be strictly monotonic across calls on a real clock
/// (NTP can step it backwards); every caller in this crate treats it as
/// "current time for TTL/backoff purposes", never as a monotonic sequence
/// number.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// A new id, prefixed for readability, unique with overwhelming
    /// probability within the shard. Collisions are a programming error
    /// and must surface as [`crate::error::CoreError::Internal`] to the
    /// caller that detects them.
    fn new_id(&self, prefix: &str) -> String;

    /// Suspend the current task until approximately `duration` has
    /// elapsed. Used only by the maintenance loop's self-reschedule.
    async fn sleep(&self, duration: std::time::Duration);
}

/// Shared handle to a [`Clock`], cloned freely across shard components.
pub type SharedClock = Arc<dyn Clock>;

/// Real wall-clock time via `SystemTime`, real ids via `Uuid::new_v4`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        ms
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4())
    }

    async fn sleep(&self, duration: std::time::Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests: an explicit, externally-advanced time
/// value and a monotonic counter standing in for randomness.
///
/// Grounded on the teacher's `MockTimeProvider`, which also short-circuits
/// real sleeps so property tests covering backoff/TTL do not take wall
/// seconds to run.
#[derive(Debug)]
pub struct MockClock {
    now_ms: AtomicI64,
    id_counter: AtomicI64,
    skip_delays: bool,
}

impl MockClock {
    /// A mock clock starting at `start_ms`, skipping real sleeps.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
            id_counter: AtomicI64::new(0),
            skip_delays: true,
        }
    }

    /// Advance the mock clock by `delta_ms` (may be negative, though no
    /// caller in this crate relies on that).
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the mock clock to an absolute value.
    pub fn set(&self, at_ms: i64) {
        self.now_ms.store(at_ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn new_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-test-{n}")
    }

    async fn sleep(&self, duration: std::time::Duration) {
        if !self.skip_delays {
            tokio::time::sleep(duration).await;
        }
    }
}
