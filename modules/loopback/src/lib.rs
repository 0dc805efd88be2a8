//! Active loopback self-test with per-endpoint timeouts and a bounded
//! worker pool.

pub mod probe;

use mididiag_core::pacer::ProbePacer;
use mididiag_core::{
    EndpointHandle, EndpointRecord, FailureReason, LoopbackVerdict, ProbeTransport,
};
use probe::{Echo, ProbeTag};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_CONCURRENCY: usize = 8;
/// How long a handle gets to close before it is dropped regardless.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct TesterOptions {
    /// Window for open + send + echo, per endpoint.
    pub timeout: Duration,
    /// Upper bound on probes in flight.
    pub concurrency: usize,
    /// Probe dispatches per second; `None` disables pacing.
    pub qps: Option<u32>,
    /// When false every endpoint is reported Skipped and nothing is sent.
    pub enabled: bool,
}

impl Default for TesterOptions {
    fn default() -> Self {
        TesterOptions {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: DEFAULT_CONCURRENCY,
            qps: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("loopback test cancelled")]
pub struct Cancelled;

pub struct LoopbackTester {
    transport: Arc<dyn ProbeTransport>,
    opts: TesterOptions,
    nonce: u32,
}

impl LoopbackTester {
    pub fn new(transport: Arc<dyn ProbeTransport>, opts: TesterOptions) -> Self {
        LoopbackTester { transport, opts, nonce: rand::thread_rng().gen() }
    }

    /// One verdict per endpoint, in input order. Endpoints without the
    /// loopback capability are Skipped without being opened. Returns
    /// `Cancelled` once every in-flight handle has been closed.
    pub async fn test(
        &self,
        endpoints: &[EndpointRecord],
        cancel: &CancellationToken,
    ) -> Result<Vec<LoopbackVerdict>, Cancelled> {
        let mut slots: Vec<Option<LoopbackVerdict>> = vec![None; endpoints.len()];
        let mut eligible = Vec::new();
        for (i, ep) in endpoints.iter().enumerate() {
            if self.opts.enabled && ep.supports_loopback() {
                eligible.push(i);
            } else {
                slots[i] = Some(LoopbackVerdict::skipped(&ep.identity));
            }
        }

        if !eligible.is_empty() {
            let pool = self.opts.concurrency.max(1).min(eligible.len());
            tracing::info!(eligible = eligible.len(), pool, timeout_ms = self.opts.timeout.as_millis() as u64, "starting loopback probes");
            let sem = Arc::new(Semaphore::new(pool));
            let pacer = self.opts.qps.filter(|q| *q > 0).map(|q| ProbePacer::new(q, pool));
            let (tx, mut rx) = mpsc::channel::<(usize, LoopbackVerdict)>(eligible.len());

            let mut handles = Vec::with_capacity(eligible.len());
            for &i in &eligible {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    p = sem.clone().acquire_owned() => match p {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };
                if let Some(pacer) = &pacer {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = pacer.acquire() => {}
                    }
                }
                let tx = tx.clone();
                let transport = self.transport.clone();
                let endpoint = endpoints[i].clone();
                let tag = ProbeTag::next(self.nonce, i);
                let window = self.opts.timeout;
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    let verdict = probe_endpoint(transport.as_ref(), &endpoint, tag, window, &cancel).await;
                    drop(permit);
                    if let Some(v) = verdict {
                        let _ = tx.send((i, v)).await;
                    }
                }));
            }
            drop(tx);

            // Verdicts are placed by input index; completion order is irrelevant.
            while let Some((i, v)) = rx.recv().await {
                slots[i] = Some(v);
            }
            for h in handles {
                if let Err(e) = h.await {
                    tracing::warn!(error = %e, "probe task aborted");
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("loopback test cancelled");
            return Err(Cancelled);
        }

        Ok(slots
            .into_iter()
            .zip(endpoints)
            .map(|(slot, ep)| {
                slot.unwrap_or_else(|| LoopbackVerdict::fail(&ep.identity, FailureReason::Unavailable, None))
            })
            .collect())
    }
}

/// Returns `None` only when cancelled. The handle is closed in every case,
/// or abandoned once `CLOSE_GRACE` runs out.
async fn probe_endpoint(
    transport: &dyn ProbeTransport,
    endpoint: &EndpointRecord,
    tag: ProbeTag,
    window: Duration,
    cancel: &CancellationToken,
) -> Option<LoopbackVerdict> {
    let deadline = Instant::now() + window;
    let id = endpoint.identity.as_str();

    let opened = tokio::select! {
        _ = cancel.cancelled() => return None,
        r = timeout_at(deadline, transport.open(endpoint)) => r,
    };
    let mut handle = match opened {
        Err(_) => return Some(LoopbackVerdict::fail(id, FailureReason::Timeout, None)),
        Ok(Err(e)) => {
            tracing::debug!(identity = id, error = %e, "open failed");
            return Some(LoopbackVerdict::fail(id, FailureReason::Unavailable, None));
        }
        Ok(Ok(h)) => h,
    };

    let verdict = tokio::select! {
        _ = cancel.cancelled() => None,
        v = exchange(handle.as_mut(), id, tag, deadline) => Some(v),
    };
    if timeout(CLOSE_GRACE, handle.close()).await.is_err() {
        tracing::warn!(identity = id, grace_ms = CLOSE_GRACE.as_millis() as u64, "endpoint close did not finish; abandoning handle");
    }
    if let Some(v) = &verdict {
        tracing::debug!(identity = id, outcome = %v.outcome(), reason = ?v.failure_reason(), latency_us = ?v.latency_micros(), "probe finished");
    }
    verdict
}

async fn exchange(
    handle: &mut dyn EndpointHandle,
    id: &str,
    tag: ProbeTag,
    deadline: Instant,
) -> LoopbackVerdict {
    let packet = tag.packet();
    let sent_at = Instant::now();
    match timeout_at(deadline, handle.send(&packet)).await {
        Err(_) => return LoopbackVerdict::fail(id, FailureReason::Timeout, None),
        Ok(Err(_)) => return LoopbackVerdict::fail(id, FailureReason::Unavailable, None),
        Ok(Ok(())) => {}
    }
    loop {
        match timeout_at(deadline, handle.recv()).await {
            Err(_) => return LoopbackVerdict::fail(id, FailureReason::Timeout, None),
            Ok(Err(_)) => return LoopbackVerdict::fail(id, FailureReason::Unavailable, None),
            Ok(Ok(reply)) => {
                let latency = sent_at.elapsed().as_micros() as u64;
                match tag.classify(&reply) {
                    Echo::Exact => return LoopbackVerdict::pass(id, latency),
                    Echo::Altered => {
                        return LoopbackVerdict::fail(id, FailureReason::Mismatch, Some(latency))
                    }
                    Echo::Foreign => tracing::trace!(identity = id, ?reply, "ignoring unrelated packet"),
                }
            }
        }
    }
}
