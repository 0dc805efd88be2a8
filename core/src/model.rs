//! Records handed between stages. Everything here is owned data; stages pass
//! it on by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which device API an endpoint was discovered through. Declaration order is
/// merge priority: Modern endpoints precede Legacy ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Modern,
    Legacy,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Modern => f.write_str("modern"),
            TransportKind::Legacy => f.write_str("legacy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Endpoint produces messages (host can read from it).
    Input,
    /// Endpoint accepts messages (host can write to it).
    Output,
    /// Endpoint echoes whatever it receives back to the sender.
    Loopback,
    /// Native Universal MIDI Packet endpoint.
    Ump,
    /// MIDI 1.0 byte-stream endpoint.
    ByteStream,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Input => "input",
            Capability::Output => "output",
            Capability::Loopback => "loopback",
            Capability::Ump => "ump",
            Capability::ByteStream => "bytestream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Opaque stable identity, unique within one enumeration pass.
    pub identity: String,
    pub display_name: String,
    pub transport: TransportKind,
    pub capabilities: BTreeSet<Capability>,
    pub driver_info: String,
}

impl EndpointRecord {
    pub fn supports_loopback(&self) -> bool {
        self.capabilities.contains(&Capability::Loopback)
    }

    /// Capabilities as a stable, comma separated list.
    pub fn capability_list(&self) -> String {
        self.capabilities
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => f.write_str("pass"),
            Outcome::Fail => f.write_str("fail"),
            Outcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Timeout,
    Mismatch,
    Unavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Mismatch => f.write_str("mismatch"),
            FailureReason::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Result of one endpoint's loopback test. Fields are private so a verdict
/// cannot be edited once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopbackVerdict {
    endpoint_identity: String,
    outcome: Outcome,
    latency_micros: Option<u64>,
    failure_reason: Option<FailureReason>,
}

impl LoopbackVerdict {
    pub fn pass(endpoint_identity: impl Into<String>, latency_micros: u64) -> Self {
        LoopbackVerdict {
            endpoint_identity: endpoint_identity.into(),
            outcome: Outcome::Pass,
            latency_micros: Some(latency_micros),
            failure_reason: None,
        }
    }

    pub fn fail(
        endpoint_identity: impl Into<String>,
        reason: FailureReason,
        latency_micros: Option<u64>,
    ) -> Self {
        LoopbackVerdict {
            endpoint_identity: endpoint_identity.into(),
            outcome: Outcome::Fail,
            latency_micros,
            failure_reason: Some(reason),
        }
    }

    pub fn skipped(endpoint_identity: impl Into<String>) -> Self {
        LoopbackVerdict {
            endpoint_identity: endpoint_identity.into(),
            outcome: Outcome::Skipped,
            latency_micros: None,
            failure_reason: None,
        }
    }

    pub fn endpoint_identity(&self) -> &str {
        &self.endpoint_identity
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn latency_micros(&self) -> Option<u64> {
        self.latency_micros
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure_reason
    }
}

/// Report sections, in the order they appear in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    OsInfo,
    ServiceVersion,
    Endpoint,
    Loopback,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::OsInfo => "os_info",
            FactCategory::ServiceVersion => "service_version",
            FactCategory::Endpoint => "endpoint",
            FactCategory::Loopback => "loopback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Public,
    Sensitive,
}

/// An unsanitized observation. Sensitivity is fixed by whoever creates the
/// fact and is never re-derived downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub category: FactCategory,
    pub key: String,
    pub raw_value: String,
    pub sensitivity: Sensitivity,
}

impl Fact {
    pub fn public(category: FactCategory, key: impl Into<String>, value: impl Into<String>) -> Self {
        Fact {
            category,
            key: key.into(),
            raw_value: value.into(),
            sensitivity: Sensitivity::Public,
        }
    }

    pub fn sensitive(
        category: FactCategory,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Fact {
            category,
            key: key.into(),
            raw_value: value.into(),
            sensitivity: Sensitivity::Sensitive,
        }
    }
}
