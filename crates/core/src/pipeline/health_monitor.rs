use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::heartbeat::Heartbeat;

/// A worker whose heartbeat is older than this is reported stuck.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

const TICK: Duration = Duration::from_secs(1);

/// Once-per-second liveness sweep over all worker heartbeats.
///
/// Policy is log-only: a stuck worker is reported, repeatedly, and outer
/// supervision decides whether to restart the process. Nothing is killed
/// from here.
pub struct HealthMonitor {
    pub heartbeats: Vec<Arc<Heartbeat>>,
    pub stale_after: Duration,
    pub stop: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn run(self) {
        while !self.stop.load(Ordering::Relaxed) {
            std::thread::sleep(TICK);
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            for stale in self.stale_workers() {
                log::warn!("health: worker '{stale}' heartbeat is stale");
            }
        }
        log::debug!("health: stopped");
    }

    fn stale_workers(&self) -> Vec<String> {
        self.heartbeats
            .iter()
            .filter(|hb| hb.age() > self.stale_after)
            .map(|hb| hb.name().to_string())
            .collect()
    }
}
