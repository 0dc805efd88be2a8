use crate::error::SourceError;
use crate::model::{Capability, TransportKind};
use std::collections::BTreeSet;

/// One endpoint as reported by a discovery source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    pub driver: String,
}

/// A device-discovery API. Implementations only query; they never change
/// device or driver state.
pub trait DiscoverySource: Send + Sync {
    fn transport(&self) -> TransportKind;

    /// Short human name for logs and degradation facts.
    fn name(&self) -> &str;

    /// Descriptors in discovery order.
    fn discover(&self) -> Result<Vec<EndpointDescriptor>, SourceError>;
}
