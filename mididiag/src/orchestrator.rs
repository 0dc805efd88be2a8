//! Drives one diagnostics run: enumerate, test, assemble, write.

use endpoint_enum::{enumerate, unavailable_facts};
use loopback::LoopbackTester;
use mididiag_core::{DiscoverySource, Fact};
use redaction::RedactionFilter;
use report::{ReportAssembler, ReportFormat, ReportHeader, Summary};
use report_writer::WriteError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Enumerating,
    Testing,
    Assembling,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Enumerating => "enumerating",
            Stage::Testing => "testing",
            Stage::Assembling => "assembling",
            Stage::Writing => "writing",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Done(Summary),
    /// Only the writing stage fails a run; everything earlier degrades.
    Failed(WriteError),
    Cancelled { stage: Stage },
}

/// Facts gathered before the run starts.
#[derive(Debug, Clone, Default)]
pub struct HostFacts {
    pub os: Vec<Fact>,
    pub versions: Vec<Fact>,
}

pub struct Orchestrator {
    modern: Arc<dyn DiscoverySource>,
    legacy: Arc<dyn DiscoverySource>,
    tester: LoopbackTester,
    filter: RedactionFilter,
    format: ReportFormat,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

impl Orchestrator {
    pub fn new(
        modern: Arc<dyn DiscoverySource>,
        legacy: Arc<dyn DiscoverySource>,
        tester: LoopbackTester,
        filter: RedactionFilter,
        format: ReportFormat,
    ) -> Self {
        Orchestrator { modern, legacy, tester, filter, format }
    }

    pub async fn run(&self, host: HostFacts, target: &Path, cancel: &CancellationToken) -> RunOutcome {
        let mut stage = Stage::Init;
        let header = ReportHeader {
            tool: "mididiag".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: now_rfc3339(),
        };

        if let Some(out) = advance(&mut stage, Stage::Enumerating, cancel) {
            return out;
        }
        let (endpoints, notes) = match enumerate(self.modern.as_ref(), self.legacy.as_ref()) {
            Ok(e) => (e.endpoints, e.facts),
            Err(err) => {
                tracing::warn!(error = %err, "no discovery source answered; continuing without endpoints");
                (Vec::new(), unavailable_facts(&err))
            }
        };
        tracing::info!(endpoints = endpoints.len(), "enumeration finished");

        if let Some(out) = advance(&mut stage, Stage::Testing, cancel) {
            return out;
        }
        let verdicts = match self.tester.test(&endpoints, cancel).await {
            Ok(v) => v,
            Err(_) => return RunOutcome::Cancelled { stage },
        };

        if let Some(out) = advance(&mut stage, Stage::Assembling, cancel) {
            return out;
        }
        let report = ReportAssembler::new(&self.filter, header).assemble_with_notes(
            host.os,
            host.versions,
            notes,
            endpoints,
            verdicts,
        );
        let redactions = report.redactions();
        tracing::info!(facts = report.facts().len(), omitted = redactions.omitted, tokenized = redactions.tokenized, "report assembled");

        if let Some(out) = advance(&mut stage, Stage::Writing, cancel) {
            return out;
        }
        // A cancel arriving from here on no longer stops the write.
        match report_writer::write_report(&report, self.format, target) {
            Ok(()) => {
                let s = report.summary();
                tracing::info!(total = s.total_endpoints, pass = s.pass_count, fail = s.fail_count, skipped = s.skip_count, "run done");
                RunOutcome::Done(s)
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                RunOutcome::Failed(e)
            }
        }
    }
}

fn advance(stage: &mut Stage, next: Stage, cancel: &CancellationToken) -> Option<RunOutcome> {
    if cancel.is_cancelled() {
        tracing::info!(%stage, "run cancelled");
        return Some(RunOutcome::Cancelled { stage: *stage });
    }
    tracing::debug!(from = %stage, to = %next, "stage transition");
    *stage = next;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use diag_transport::{DiagnosticsTransport, FaultMode};
    use loopback::TesterOptions;
    use mididiag_core::{Capability, EndpointDescriptor, SourceError, TransportKind};
    use std::fs;
    use std::time::Duration;

    struct FakeLegacy(Result<Vec<EndpointDescriptor>, SourceError>);

    impl DiscoverySource for FakeLegacy {
        fn transport(&self) -> TransportKind {
            TransportKind::Legacy
        }
        fn name(&self) -> &str {
            "fake-legacy"
        }
        fn discover(&self) -> Result<Vec<EndpointDescriptor>, SourceError> {
            self.0.clone()
        }
    }

    fn one_output_port() -> FakeLegacy {
        FakeLegacy(Ok(vec![EndpointDescriptor {
            id: "alsa-seq:20:0".into(),
            name: "Synth Out".into(),
            capabilities: [Capability::Output, Capability::ByteStream].into_iter().collect(),
            driver: "alsa-seq kernel".into(),
        }]))
    }

    fn orchestrator(diag: DiagnosticsTransport, legacy: FakeLegacy, timeout_ms: u64) -> Orchestrator {
        let diag = Arc::new(diag);
        let opts = TesterOptions { timeout: Duration::from_millis(timeout_ms), ..Default::default() };
        Orchestrator::new(
            diag.clone(),
            Arc::new(legacy),
            LoopbackTester::new(diag, opts),
            RedactionFilter::new([9u8; 16]).with_machine_name("studio-pc"),
            ReportFormat::Text,
        )
    }

    fn host() -> HostFacts {
        HostFacts {
            os: vec![Fact::public(mididiag_core::FactCategory::OsInfo, "os.name", "linux")],
            versions: vec![Fact::public(mididiag_core::FactCategory::ServiceVersion, "service.version", "0.1.0")],
        }
    }

    #[tokio::test]
    async fn echoing_modern_and_plain_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        let o = orchestrator(DiagnosticsTransport::new(1), one_output_port(), 1000);
        let out = o.run(host(), &target, &CancellationToken::new()).await;
        match out {
            RunOutcome::Done(s) => assert_eq!(
                s,
                Summary { total_endpoints: 2, pass_count: 1, fail_count: 0, skip_count: 1 }
            ),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let body = fs::read_to_string(&target).unwrap();
        assert!(body.contains("loopback[0].outcome = pass"));
        assert!(body.contains("loopback[1].outcome = skipped"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_endpoint_does_not_stall_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        let diag = DiagnosticsTransport::new(3).with_fault(1, FaultMode::Silent);
        let o = orchestrator(diag, FakeLegacy(Ok(vec![])), 300);
        let out = o.run(host(), &target, &CancellationToken::new()).await;
        match out {
            RunOutcome::Done(s) => assert_eq!(
                s,
                Summary { total_endpoints: 3, pass_count: 2, fail_count: 1, skip_count: 0 }
            ),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let body = fs::read_to_string(&target).unwrap();
        assert!(body.contains("loopback[1].reason = timeout"));
    }

    #[tokio::test]
    async fn both_sources_down_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        let down = |name: &str| SourceError::Unreachable { source_name: name.into(), reason: "gone".into() };
        let diag = Arc::new(DiagnosticsTransport::new(0));
        let o = Orchestrator::new(
            Arc::new(FakeLegacy(Err(down("m")))),
            Arc::new(FakeLegacy(Err(down("l")))),
            LoopbackTester::new(diag, TesterOptions::default()),
            RedactionFilter::new([0u8; 16]),
            ReportFormat::Text,
        );
        let out = o.run(host(), &target, &CancellationToken::new()).await;
        assert!(matches!(out, RunOutcome::Done(s) if s.total_endpoints == 0));
        let body = fs::read_to_string(&target).unwrap();
        assert!(body.contains("discovery.modern.status = unavailable"));
        assert!(body.contains("discovery.legacy.status = unavailable"));
    }

    #[tokio::test]
    async fn existing_target_fails_at_write() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        fs::write(&target, "previous").unwrap();
        let o = orchestrator(DiagnosticsTransport::new(1), one_output_port(), 1000);
        let out = o.run(host(), &target, &CancellationToken::new()).await;
        assert!(matches!(out, RunOutcome::Failed(WriteError::TargetAlreadyExists(_))));
        assert_eq!(fs::read_to_string(&target).unwrap(), "previous");
    }

    #[tokio::test]
    async fn cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let o = orchestrator(DiagnosticsTransport::new(1), one_output_port(), 1000);
        let out = o.run(host(), &target, &cancel).await;
        assert!(matches!(out, RunOutcome::Cancelled { stage: Stage::Init }));
        assert!(!target.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_testing_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.txt");
        let diag = DiagnosticsTransport::new(2).with_fault(0, FaultMode::Silent);
        let o = orchestrator(diag, FakeLegacy(Ok(vec![])), 10_000);
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            c.cancel();
        });
        let out = o.run(host(), &target, &cancel).await;
        assert!(matches!(out, RunOutcome::Cancelled { stage: Stage::Testing }));
        assert!(!target.exists());
    }
}
