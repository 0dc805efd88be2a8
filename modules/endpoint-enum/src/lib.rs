//! Endpoint enumeration across the modern and legacy discovery sources.

pub mod alsa;

use mididiag_core::{
    DiscoverySource, DiscoverySourceUnavailable, EndpointDescriptor, EndpointRecord, Fact,
    FactCategory, SourceError, TransportKind,
};
use std::collections::HashSet;

/// Output of one enumeration pass: merged endpoints plus facts describing
/// how each source fared.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub endpoints: Vec<EndpointRecord>,
    pub facts: Vec<Fact>,
}

/// Query both sources once and merge. Modern endpoints come first; a Legacy
/// endpoint whose identity was already seen is dropped. Fails only when
/// neither source answers.
pub fn enumerate(
    modern: &dyn DiscoverySource,
    legacy: &dyn DiscoverySource,
) -> Result<Enumeration, DiscoverySourceUnavailable> {
    for s in [modern, legacy] {
        tracing::debug!(source = s.name(), transport = %s.transport(), "querying discovery source");
    }
    let modern_res = modern.discover();
    let legacy_res = legacy.discover();

    let (modern_list, legacy_list) = match (modern_res, legacy_res) {
        (Err(m), Err(l)) => return Err(DiscoverySourceUnavailable { modern: m, legacy: l }),
        (m, l) => (m, l),
    };

    let mut out = Enumeration::default();
    let mut seen = HashSet::new();
    for (transport, res) in [(TransportKind::Modern, modern_list), (TransportKind::Legacy, legacy_list)] {
        match res {
            Ok(descriptors) => {
                let found = descriptors.len();
                let mut kept = 0usize;
                for d in descriptors {
                    let Some(rec) = normalize(transport, d) else { continue };
                    if !seen.insert(rec.identity.clone()) {
                        tracing::debug!(identity = %rec.identity, %transport, "dropping duplicate endpoint");
                        continue;
                    }
                    out.endpoints.push(rec);
                    kept += 1;
                }
                out.facts.push(status_fact(transport, "available"));
                out.facts.push(Fact::public(
                    FactCategory::Endpoint,
                    format!("discovery.{}.count", transport),
                    kept.to_string(),
                ));
                if kept < found {
                    out.facts.push(Fact::public(
                        FactCategory::Endpoint,
                        format!("discovery.{}.dropped", transport),
                        (found - kept).to_string(),
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(%transport, error = %e, "discovery source degraded");
                out.facts.extend(degraded_facts(transport, &e));
            }
        }
    }
    Ok(out)
}

/// Facts recording that both sources failed, for runs that continue with
/// an empty endpoint list.
pub fn unavailable_facts(err: &DiscoverySourceUnavailable) -> Vec<Fact> {
    let mut facts = degraded_facts(TransportKind::Modern, &err.modern);
    facts.extend(degraded_facts(TransportKind::Legacy, &err.legacy));
    facts
}

fn degraded_facts(transport: TransportKind, err: &SourceError) -> Vec<Fact> {
    vec![
        status_fact(transport, "unavailable"),
        Fact::public(
            FactCategory::Endpoint,
            format!("discovery.{}.error", transport),
            err.to_string(),
        ),
    ]
}

fn status_fact(transport: TransportKind, status: &str) -> Fact {
    Fact::public(FactCategory::Endpoint, format!("discovery.{}.status", transport), status)
}

fn normalize(transport: TransportKind, d: EndpointDescriptor) -> Option<EndpointRecord> {
    let identity = d.id.trim().to_string();
    if identity.is_empty() {
        tracing::debug!(%transport, name = %d.name, "skipping descriptor without identity");
        return None;
    }
    let name = d.name.trim();
    let display_name = if name.is_empty() { identity.clone() } else { name.to_string() };
    let driver = d.driver.trim();
    Some(EndpointRecord {
        identity,
        display_name,
        transport,
        capabilities: d.capabilities,
        driver_info: if driver.is_empty() { "unknown".to_string() } else { driver.to_string() },
    })
}
