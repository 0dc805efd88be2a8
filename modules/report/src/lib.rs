//! Report assembly and rendering. Nothing in this crate touches the
//! filesystem; the writer crate owns that.

mod render;

pub use render::ReportFormat;

use mididiag_core::{EndpointRecord, Fact, FactCategory, LoopbackVerdict, Outcome};
use redaction::{Redacted, RedactionFilter, SanitizedFact};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_endpoints: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub skip_count: usize,
}

impl Summary {
    pub fn from_verdicts(verdicts: &[LoopbackVerdict]) -> Self {
        let mut s = Summary { total_endpoints: verdicts.len(), ..Default::default() };
        for v in verdicts {
            match v.outcome() {
                Outcome::Pass => s.pass_count += 1,
                Outcome::Fail => s.fail_count += 1,
                Outcome::Skipped => s.skip_count += 1,
            }
        }
        s
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedactionCounts {
    pub omitted: usize,
    pub tokenized: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportHeader {
    pub tool: String,
    pub version: String,
    pub generated_at: String,
}

/// An assembled report. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    header: ReportHeader,
    facts: Vec<SanitizedFact>,
    summary: Summary,
    redactions: RedactionCounts,
}

impl Report {
    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    pub fn facts(&self) -> &[SanitizedFact] {
        &self.facts
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn redactions(&self) -> RedactionCounts {
        self.redactions
    }

    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.facts.iter().find(|f| f.key() == key).map(|f| f.value())
    }
}

pub struct ReportAssembler<'a> {
    filter: &'a RedactionFilter,
    header: ReportHeader,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(filter: &'a RedactionFilter, header: ReportHeader) -> Self {
        ReportAssembler { filter, header }
    }

    pub fn assemble(
        &self,
        os_facts: Vec<Fact>,
        version_facts: Vec<Fact>,
        endpoints: Vec<EndpointRecord>,
        verdicts: Vec<LoopbackVerdict>,
    ) -> Report {
        self.assemble_with_notes(os_facts, version_facts, Vec::new(), endpoints, verdicts)
    }

    /// Like `assemble`, with stage notes (discovery status, cancelled
    /// probes) placed at the head of their category's section.
    pub fn assemble_with_notes(
        &self,
        os_facts: Vec<Fact>,
        version_facts: Vec<Fact>,
        notes: Vec<Fact>,
        endpoints: Vec<EndpointRecord>,
        verdicts: Vec<LoopbackVerdict>,
    ) -> Report {
        let mut raw = Vec::with_capacity(
            os_facts.len() + version_facts.len() + notes.len() + endpoints.len() * 5 + verdicts.len() * 4,
        );
        raw.extend(os_facts);
        raw.extend(version_facts);
        raw.extend(notes);
        for (i, ep) in endpoints.into_iter().enumerate() {
            raw.extend(endpoint_facts(i, ep));
        }
        let summary = Summary::from_verdicts(&verdicts);
        for (i, v) in verdicts.iter().enumerate() {
            raw.extend(verdict_facts(i, v));
        }
        // Stable: keeps producer order within each section.
        raw.sort_by_key(|f| f.category);

        let mut redactions = RedactionCounts::default();
        let mut facts = Vec::with_capacity(raw.len());
        for fact in raw {
            match self.filter.filter(fact) {
                Redacted::Clean(f) => facts.push(f),
                Redacted::Tokenized { fact, reason } => {
                    tracing::debug!(key = fact.key(), ?reason, "value tokenized");
                    redactions.tokenized += 1;
                    facts.push(fact);
                }
                Redacted::Omitted { reason } => {
                    tracing::debug!(?reason, "fact omitted");
                    redactions.omitted += 1;
                }
            }
        }

        Report { header: self.header.clone(), facts, summary, redactions }
    }
}

fn endpoint_facts(i: usize, ep: EndpointRecord) -> [Fact; 5] {
    let key = |field: &str| format!("endpoint[{}].{}", i, field);
    let cat = FactCategory::Endpoint;
    let capabilities = ep.capability_list();
    [
        Fact::public(cat, key("identity"), ep.identity),
        Fact::public(cat, key("name"), ep.display_name),
        Fact::public(cat, key("transport"), ep.transport.to_string()),
        Fact::public(cat, key("capabilities"), capabilities),
        Fact::public(cat, key("driver"), ep.driver_info),
    ]
}

fn verdict_facts(i: usize, v: &LoopbackVerdict) -> Vec<Fact> {
    let key = |field: &str| format!("loopback[{}].{}", i, field);
    let cat = FactCategory::Loopback;
    let mut out = vec![
        Fact::public(cat, key("endpoint"), v.endpoint_identity()),
        Fact::public(cat, key("outcome"), v.outcome().to_string()),
    ];
    if let Some(us) = v.latency_micros() {
        out.push(Fact::public(cat, key("latency_us"), us.to_string()));
    }
    if let Some(reason) = v.failure_reason() {
        out.push(Fact::public(cat, key("reason"), reason.to_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mididiag_core::{Capability, FailureReason, TransportKind};

    fn header() -> ReportHeader {
        ReportHeader { tool: "mididiag".into(), version: "0.1.0".into(), generated_at: "2026-01-01T00:00:00Z".into() }
    }

    fn filter() -> RedactionFilter {
        RedactionFilter::new([3u8; 16]).with_machine_name("studio-pc")
    }

    fn ep(id: &str, transport: TransportKind, caps: &[Capability]) -> EndpointRecord {
        EndpointRecord {
            identity: id.into(),
            display_name: format!("{} port", id),
            transport,
            capabilities: caps.iter().copied().collect(),
            driver_info: "1.0".into(),
        }
    }

    #[test]
    fn summary_counts_outcomes() {
        let v = vec![
            LoopbackVerdict::pass("a", 10),
            LoopbackVerdict::fail("b", FailureReason::Timeout, None),
            LoopbackVerdict::skipped("c"),
            LoopbackVerdict::skipped("d"),
        ];
        assert_eq!(
            Summary::from_verdicts(&v),
            Summary { total_endpoints: 4, pass_count: 1, fail_count: 1, skip_count: 2 }
        );
    }

    #[test]
    fn sections_come_out_in_fixed_order() {
        let f = filter();
        let a = ReportAssembler::new(&f, header());
        // deliberately handed over out of category order
        let os = vec![Fact::public(FactCategory::OsInfo, "os.name", "linux")];
        let ver = vec![
            Fact::public(FactCategory::ServiceVersion, "service.version", "0.1.0"),
            Fact::public(FactCategory::OsInfo, "os.arch", "x86_64"),
        ];
        let notes = vec![Fact::public(FactCategory::Endpoint, "discovery.modern.status", "available")];
        let eps = vec![
            ep("m", TransportKind::Modern, &[Capability::Loopback]),
            ep("l", TransportKind::Legacy, &[Capability::Output]),
        ];
        let verdicts = vec![LoopbackVerdict::pass("m", 120), LoopbackVerdict::skipped("l")];
        let r = a.assemble_with_notes(os, ver, notes, eps, verdicts);

        let cats: Vec<_> = r.facts().iter().map(|f| f.category()).collect();
        let mut sorted = cats.clone();
        sorted.sort();
        assert_eq!(cats, sorted);

        let keys: Vec<_> = r.facts().iter().map(|f| f.key()).collect();
        assert_eq!(keys[0], "os.name");
        assert_eq!(keys[1], "os.arch");
        assert_eq!(keys[2], "service.version");
        assert_eq!(keys[3], "discovery.modern.status");
        assert_eq!(keys[4], "endpoint[0].identity");
        assert_eq!(r.value_of("endpoint[1].transport"), Some("legacy"));
        assert_eq!(r.value_of("loopback[0].latency_us"), Some("120"));
        assert_eq!(r.value_of("loopback[1].outcome"), Some("skipped"));
        assert_eq!(
            r.summary(),
            Summary { total_endpoints: 2, pass_count: 1, fail_count: 0, skip_count: 1 }
        );
    }

    #[test]
    fn every_fact_is_filtered() {
        let f = filter();
        let a = ReportAssembler::new(&f, header());
        let os = vec![
            Fact::public(FactCategory::OsInfo, "os.hostname", "studio-pc"),
            Fact::public(FactCategory::OsInfo, "os.pretty_name", "studio-pc build"),
        ];
        let mut m = ep("m", TransportKind::Modern, &[]);
        m.display_name = "Keys on 192.168.1.20".into();
        let r = a.assemble(os, vec![], vec![m], vec![LoopbackVerdict::skipped("m")]);
        assert_eq!(r.value_of("os.hostname"), None);
        assert!(r.value_of("os.pretty_name").unwrap().starts_with(redaction::TOKEN_PREFIX));
        assert!(r.value_of("endpoint[0].name").unwrap().starts_with(redaction::TOKEN_PREFIX));
        assert_eq!(r.redactions(), RedactionCounts { omitted: 1, tokenized: 2 });
        assert!(r.facts().iter().all(|f| f.value() != "studio-pc"));
    }
}
