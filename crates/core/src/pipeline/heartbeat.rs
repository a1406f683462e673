use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-worker liveness beacon.
///
/// Workers store a monotonic millisecond stamp with a relaxed atomic write
/// once per loop iteration; the health monitor reads without any lock. A
/// heartbeat is born "fresh" so a worker is not reported stale while it is
/// still starting up.
pub struct Heartbeat {
    name: String,
    anchor: Instant,
    last_beat_ms: AtomicU64,
}

impl Heartbeat {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            anchor: Instant::now(),
            last_beat_ms: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn beat(&self) {
        let now = self.anchor.elapsed().as_millis() as u64;
        self.last_beat_ms.store(now, Ordering::Relaxed);
    }

    /// Time since the last beat.
    pub fn age(&self) -> Duration {
        let now = self.anchor.elapsed().as_millis() as u64;
        let last = self.last_beat_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}
