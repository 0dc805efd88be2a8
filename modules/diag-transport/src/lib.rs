//! In-process diagnostics loopback transport.
//!
//! Exposes a fixed set of modern-transport endpoints that echo every packet
//! sent to them. Individual endpoints can be made faulty or slow so the
//! loopback tester's failure classification can be exercised without
//! hardware.

use async_trait::async_trait;
use mididiag_core::{
    Capability, DiscoverySource, EndpointDescriptor, EndpointHandle, EndpointRecord, ProbeError,
    ProbeTransport, SourceError, TransportKind, UmpPacket,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_ENDPOINT_COUNT: usize = 2;
const SOURCE_NAME: &str = "diagnostics";
const ID_PREFIX: &str = "diag-loopback-";

/// How a faulty endpoint misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultMode {
    /// Swallows every packet.
    Silent,
    /// Echoes with the last word altered.
    Corrupt,
    /// Accepts one packet, then drops the connection.
    Closed,
}

#[derive(Debug, Clone)]
struct EndpointSpec {
    identity: String,
    name: String,
    fault: Option<FaultMode>,
    delay: Duration,
}

pub struct DiagnosticsTransport {
    endpoints: Vec<EndpointSpec>,
    open_handles: Arc<AtomicUsize>,
}

impl DiagnosticsTransport {
    pub fn new(count: usize) -> Self {
        let endpoints = (0..count)
            .map(|i| EndpointSpec {
                identity: format!("{}{}", ID_PREFIX, i),
                name: format!("Diagnostics Loopback {}", letter(i)),
                fault: None,
                delay: Duration::ZERO,
            })
            .collect();
        DiagnosticsTransport { endpoints, open_handles: Arc::new(AtomicUsize::new(0)) }
    }

    /// Make endpoint `index` misbehave. Out-of-range indices are ignored.
    pub fn with_fault(mut self, index: usize, mode: FaultMode) -> Self {
        if let Some(ep) = self.endpoints.get_mut(index) {
            ep.fault = Some(mode);
        }
        self
    }

    /// Delay endpoint `index`'s echoes.
    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        if let Some(ep) = self.endpoints.get_mut(index) {
            ep.delay = delay;
        }
        self
    }

    /// Handles opened and not yet released.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn identity(index: usize) -> String {
        format!("{}{}", ID_PREFIX, index)
    }
}

impl Default for DiagnosticsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT_COUNT)
    }
}

fn letter(i: usize) -> String {
    if i < 26 {
        ((b'A' + i as u8) as char).to_string()
    } else {
        (i + 1).to_string()
    }
}

impl DiscoverySource for DiagnosticsTransport {
    fn transport(&self) -> TransportKind {
        TransportKind::Modern
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn discover(&self) -> Result<Vec<EndpointDescriptor>, SourceError> {
        Ok(self
            .endpoints
            .iter()
            .map(|ep| EndpointDescriptor {
                id: ep.identity.clone(),
                name: ep.name.clone(),
                capabilities: [Capability::Input, Capability::Output, Capability::Loopback, Capability::Ump]
                    .into_iter()
                    .collect(),
                driver: format!("mididiag-diagnostics {}", mididiag_core::version()),
            })
            .collect())
    }
}

#[async_trait]
impl ProbeTransport for DiagnosticsTransport {
    async fn open(&self, endpoint: &EndpointRecord) -> Result<Box<dyn EndpointHandle>, ProbeError> {
        let spec = self
            .endpoints
            .iter()
            .find(|ep| ep.identity == endpoint.identity)
            .ok_or_else(|| ProbeError::Unavailable(format!("no such endpoint {}", endpoint.identity)))?
            .clone();

        let (to_dev, mut dev_in) = mpsc::channel::<UmpPacket>(16);
        let (dev_out, from_dev) = mpsc::channel::<UmpPacket>(16);
        let echo = tokio::spawn(async move {
            while let Some(mut packet) = dev_in.recv().await {
                if !spec.delay.is_zero() {
                    tokio::time::sleep(spec.delay).await;
                }
                match spec.fault {
                    Some(FaultMode::Silent) => continue,
                    Some(FaultMode::Closed) => break,
                    Some(FaultMode::Corrupt) => packet.0[3] ^= 0x0000_FFFF,
                    None => {}
                }
                if dev_out.send(packet).await.is_err() {
                    break;
                }
            }
        });

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(identity = %endpoint.identity, "diagnostics handle opened");
        Ok(Box::new(LoopbackHandle {
            to_dev: Some(to_dev),
            from_dev,
            echo,
            released: false,
            open_handles: self.open_handles.clone(),
        }))
    }
}

struct LoopbackHandle {
    to_dev: Option<mpsc::Sender<UmpPacket>>,
    from_dev: mpsc::Receiver<UmpPacket>,
    echo: JoinHandle<()>,
    released: bool,
    open_handles: Arc<AtomicUsize>,
}

impl LoopbackHandle {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.echo.abort();
            self.to_dev = None;
            self.from_dev.close();
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl EndpointHandle for LoopbackHandle {
    async fn send(&mut self, packet: &UmpPacket) -> Result<(), ProbeError> {
        let tx = self.to_dev.as_ref().ok_or(ProbeError::Closed)?;
        tx.send(*packet).await.map_err(|_| ProbeError::Closed)
    }

    async fn recv(&mut self) -> Result<UmpPacket, ProbeError> {
        self.from_dev.recv().await.ok_or(ProbeError::Closed)
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        self.release();
    }
}
