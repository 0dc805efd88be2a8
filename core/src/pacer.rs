//! Probe dispatch pacing: a token bucket refilled by a background task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct ProbePacer {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl ProbePacer {
    /// Must be called from within a tokio runtime. `burst` caps how many
    /// unused tokens may pile up while nobody is waiting.
    pub fn new(probes_per_sec: u32, burst: usize) -> Self {
        let sem = Arc::new(Semaphore::new(0));
        let sem_bg = sem.clone();
        let burst = burst.max(1);
        let interval_ms = (1000u32 / probes_per_sec.max(1)).max(1) as u64;
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(Duration::from_millis(interval_ms));
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                if sem_bg.available_permits() < burst {
                    sem_bg.add_permits(1);
                }
            }
        });
        tracing::debug!(probes_per_sec, burst, interval_ms, "probe pacer started");
        ProbePacer { sem, refill }
    }

    /// Wait for the next dispatch slot.
    pub async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

impl Drop for ProbePacer {
    fn drop(&mut self) {
        self.refill.abort();
        tracing::trace!("probe pacer stopped");
    }
}
