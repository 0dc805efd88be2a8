use thiserror::Error;

/// A single discovery source could not be queried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{source_name} source unreachable: {reason}")]
    Unreachable { source_name: String, reason: String },
    #[error("{source_name} source returned malformed data: {reason}")]
    Malformed { source_name: String, reason: String },
}

/// Both discovery sources failed in the same pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no discovery source available (modern: {modern}; legacy: {legacy})")]
pub struct DiscoverySourceUnavailable {
    pub modern: SourceError,
    pub legacy: SourceError,
}

/// Failures on an endpoint handle. These end up as verdict data and are
/// never surfaced as a run failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("endpoint handle closed")]
    Closed,
}
