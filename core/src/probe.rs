use crate::error::ProbeError;
use crate::model::EndpointRecord;
use async_trait::async_trait;
use std::fmt;

/// A 128-bit Universal MIDI Packet.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UmpPacket(pub [u32; 4]);

impl UmpPacket {
    pub fn message_type(&self) -> u8 {
        ((self.0[0] & 0xF000_0000) >> 28) as u8
    }
}

impl fmt::Debug for UmpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UmpPacket({:08X} {:08X} {:08X} {:08X})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Opens per-endpoint handles for sending probe traffic.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn open(&self, endpoint: &EndpointRecord) -> Result<Box<dyn EndpointHandle>, ProbeError>;
}

/// An open connection to one endpoint. `close` must be called before the
/// handle is dropped; implementations release their device resources there.
#[async_trait]
pub trait EndpointHandle: Send {
    async fn send(&mut self, packet: &UmpPacket) -> Result<(), ProbeError>;

    /// Wait for the next incoming packet. Unbounded; callers apply timeouts.
    async fn recv(&mut self) -> Result<UmpPacket, ProbeError>;

    async fn close(&mut self);
}
