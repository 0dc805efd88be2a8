use anyhow::{Context, Result};
use clap::Parser;
use diag_transport::DiagnosticsTransport;
use endpoint_enum::alsa::AlsaSeqSource;
use loopback::LoopbackTester;
use mididiag_core::DiscoverySource;
use redaction::RedactionFilter;
use report::ReportFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod host;
mod orchestrator;

use config::{Overrides, Settings};
use orchestrator::{HostFacts, Orchestrator, RunOutcome};

const LOG_ENV: &str = "MIDIDIAG_LOG";
const LOG_TARGETS: &[&str] = &[
    "mididiag",
    "mididiag_core",
    "redaction",
    "endpoint_enum",
    "diag_transport",
    "loopback",
    "report",
    "report_writer",
];

#[derive(Debug, Parser)]
#[command(name = "mididiag", version, about = "Local MIDI health diagnostics report")]
struct Cli {
    /// Report file to create. Must not exist yet.
    output: PathBuf,
    /// Optional config file (YAML). If omitted, loads ./mididiag.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Report format: text or json
    #[arg(long)]
    format: Option<ReportFormat>,
    /// Per-endpoint loopback window in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Max loopback probes in flight
    #[arg(long)]
    concurrency: Option<usize>,
    /// Probe dispatches per second; 0 disables pacing
    #[arg(long)]
    qps: Option<u32>,
    /// Skip the active loopback test; every endpoint is reported skipped
    #[arg(long, default_value_t = false)]
    no_loopback: bool,
    /// Debug-level logging (overridden by MIDIDIAG_LOG)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default = LOG_TARGETS.iter().map(|t| format!("{}={}", t, level)).collect::<Vec<_>>().join(",");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loaded_cfg = config::load_config(cli.config.as_deref())?;
    let overrides = Overrides {
        format: cli.format,
        timeout_ms: cli.timeout_ms,
        concurrency: cli.concurrency,
        qps: cli.qps,
        no_loopback: cli.no_loopback,
    };
    let settings = Settings::resolve(overrides, loaded_cfg);

    // Refuse before any device is touched.
    report_writer::preflight(&cli.output).context("pre-flight check failed")?;

    let mut diag = DiagnosticsTransport::new(settings.loopback_endpoints);
    if let Some(f) = settings.faulty_endpoint {
        tracing::info!(index = f.index, mode = ?f.mode, "diagnostics endpoint set faulty");
        diag = diag.with_fault(f.index, f.mode);
    }
    let diag = Arc::new(diag);
    let legacy = Arc::new(AlsaSeqSource::new(&settings.seq_clients_path));

    let identity = host::HostIdentity::detect();
    let filter = identity.seed(RedactionFilter::with_random_salt());
    let host_facts = HostFacts {
        os: host::os_facts(),
        versions: host::version_facts(
            &settings.version_path,
            &[diag.as_ref() as &dyn DiscoverySource, legacy.as_ref() as &dyn DiscoverySource],
        ),
    };

    let tester = LoopbackTester::new(diag.clone(), settings.tester.clone());
    let orch = Orchestrator::new(diag, legacy, tester, filter, settings.format);

    let rt = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    let outcome = rt.block_on(async {
        let c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling run");
                c.cancel();
            }
        });
        orch.run(host_facts, &cli.output, &cancel).await
    });

    match outcome {
        RunOutcome::Done(s) => {
            println!(
                "wrote {}: {} endpoints, {} pass, {} fail, {} skipped",
                cli.output.display(),
                s.total_endpoints,
                s.pass_count,
                s.fail_count,
                s.skip_count
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Failed(e) => Err(e).context("report not written"),
        RunOutcome::Cancelled { stage } => {
            eprintln!("cancelled during {}; no report written", stage);
            Ok(ExitCode::from(130))
        }
    }
}
