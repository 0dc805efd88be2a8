//! Core types shared by every stage of the diagnostics engine.

pub mod error;
pub mod model;
pub mod pacer;
pub mod probe;
pub mod source;

pub use error::{DiscoverySourceUnavailable, ProbeError, SourceError};
pub use model::{
    Capability, EndpointRecord, Fact, FactCategory, FailureReason, LoopbackVerdict, Outcome,
    Sensitivity, TransportKind,
};
pub use probe::{EndpointHandle, ProbeTransport, UmpPacket};
pub use source::{DiscoverySource, EndpointDescriptor};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
