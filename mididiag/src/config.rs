use diag_transport::{FaultMode, DEFAULT_ENDPOINT_COUNT};
use endpoint_enum::alsa::{DEFAULT_CLIENTS_PATH, DEFAULT_VERSION_PATH};
use loopback::{TesterOptions, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS};
use report::ReportFormat;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const IMPLICIT_CONFIG: &str = "mididiag.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct LoopbackConfig {
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub qps: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FaultyEndpoint {
    pub index: usize,
    pub mode: FaultMode,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    pub loopback_endpoints: Option<usize>,
    pub faulty_endpoint: Option<FaultyEndpoint>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct LegacyConfig {
    pub seq_clients_path: Option<PathBuf>,
    pub version_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ReportConfig {
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub loopback: Option<LoopbackConfig>,
    pub diagnostics: Option<DiagnosticsConfig>,
    pub legacy: Option<LegacyConfig>,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load `path`, or `./mididiag.yaml` if present. An explicit file must load;
/// a broken implicit one is logged and ignored.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>, ConfigError> {
    match path {
        Some(p) => read(p).map(Some),
        None => {
            let p = Path::new(IMPLICIT_CONFIG);
            if !p.exists() {
                return Ok(None);
            }
            match read(p) {
                Ok(cfg) => Ok(Some(cfg)),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring implicit config");
                    Ok(None)
                }
            }
        }
    }
}

fn read(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&s).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Values given on the command line; `None` falls through to the config.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub format: Option<ReportFormat>,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub qps: Option<u32>,
    pub no_loopback: bool,
}

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tester: TesterOptions,
    pub format: ReportFormat,
    pub loopback_endpoints: usize,
    pub faulty_endpoint: Option<FaultyEndpoint>,
    pub seq_clients_path: PathBuf,
    pub version_path: PathBuf,
}

impl Settings {
    pub fn resolve(cli: Overrides, cfg: Option<Config>) -> Self {
        let cfg = cfg.unwrap_or_default();
        let lb = cfg.loopback.unwrap_or_default();
        let diag = cfg.diagnostics.unwrap_or_default();
        let legacy = cfg.legacy.unwrap_or_default();
        let rep = cfg.report.unwrap_or_default();

        let timeout_ms = cli.timeout_ms.or(lb.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS);
        let concurrency = cli.concurrency.or(lb.concurrency).unwrap_or(DEFAULT_CONCURRENCY);
        let qps = cli.qps.or(lb.qps).filter(|q| *q > 0);

        Settings {
            tester: TesterOptions {
                timeout: Duration::from_millis(timeout_ms),
                concurrency: concurrency.max(1),
                qps,
                enabled: !cli.no_loopback,
            },
            format: cli.format.or(rep.format).unwrap_or_default(),
            loopback_endpoints: diag.loopback_endpoints.unwrap_or(DEFAULT_ENDPOINT_COUNT),
            faulty_endpoint: diag.faulty_endpoint,
            seq_clients_path: legacy.seq_clients_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENTS_PATH)),
            version_path: legacy.version_path.unwrap_or_else(|| PathBuf::from(DEFAULT_VERSION_PATH)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
loopback:
  timeout_ms: 250
  concurrency: 3
  qps: 0
diagnostics:
  loopback_endpoints: 4
  faulty_endpoint:
    index: 1
    mode: corrupt
legacy:
  seq_clients_path: /tmp/clients
report:
  format: json
"#;

    #[test]
    fn defaults_without_config() {
        let s = Settings::resolve(Overrides::default(), None);
        assert_eq!(s.tester.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(s.tester.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(s.tester.qps, None);
        assert!(s.tester.enabled);
        assert_eq!(s.format, ReportFormat::Text);
        assert_eq!(s.loopback_endpoints, DEFAULT_ENDPOINT_COUNT);
        assert_eq!(s.seq_clients_path, PathBuf::from(DEFAULT_CLIENTS_PATH));
    }

    #[test]
    fn config_fills_gaps_and_cli_wins() {
        let cfg: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let cli = Overrides { timeout_ms: Some(900), ..Default::default() };
        let s = Settings::resolve(cli, Some(cfg));
        assert_eq!(s.tester.timeout, Duration::from_millis(900));
        assert_eq!(s.tester.concurrency, 3);
        assert_eq!(s.tester.qps, None);
        assert_eq!(s.format, ReportFormat::Json);
        assert_eq!(s.loopback_endpoints, 4);
        assert_eq!(s.faulty_endpoint, Some(FaultyEndpoint { index: 1, mode: FaultMode::Corrupt }));
        assert_eq!(s.seq_clients_path, PathBuf::from("/tmp/clients"));
        assert_eq!(s.version_path, PathBuf::from(DEFAULT_VERSION_PATH));
    }

    #[test]
    fn no_loopback_disables_tester() {
        let cli = Overrides { no_loopback: true, concurrency: Some(0), ..Default::default() };
        let s = Settings::resolve(cli, None);
        assert!(!s.tester.enabled);
        assert_eq!(s.tester.concurrency, 1);
    }

    #[test]
    fn explicit_config_must_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(matches!(load_config(Some(&missing)), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "loopback: [not, a, map]").unwrap();
        assert!(matches!(load_config(Some(&bad)), Err(ConfigError::Parse { .. })));

        let good = dir.path().join("good.yaml");
        fs::write(&good, SAMPLE).unwrap();
        let cfg = load_config(Some(&good)).unwrap().unwrap();
        assert_eq!(cfg.loopback.unwrap().timeout_ms, Some(250));
    }
}
