//! Per-host fetch pacing.
//!
//! Every fetch leases its host's slot; the lease is held for the duration of
//! the fetch, serializing access to one origin, and enforces a minimum delay
//! since the previous fetch against that host completed.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type HostSlot = Arc<AsyncMutex<Option<Instant>>>;

/// Process-wide pacing map. Constructed once at startup and passed through
/// the orchestrator to every fetcher.
pub struct HostPacer {
    min_delay: Duration,
    hosts: StdMutex<HashMap<String, HostSlot>>,
}

impl HostPacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            hosts: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the slot for `host`, waiting out the remainder of the
    /// minimum inter-call delay. Hold the returned lease for the duration
    /// of the fetch; dropping it records the completion time.
    pub async fn lease(&self, host: &str) -> HostLease {
        let slot = {
            let mut hosts = self.hosts.lock().expect("pacer map poisoned");
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone()
        };

        let guard = slot.lock_owned().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                trace!(host, wait_ms = wait.as_millis() as u64, "pacing fetch");
                tokio::time::sleep(wait).await;
            }
        }
        HostLease { guard }
    }
}

/// Exclusive hold on one host's fetch slot.
pub struct HostLease {
    guard: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for HostLease {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}
