//! Facts about the machine the report is produced on.

use mididiag_core::{DiscoverySource, Fact, FactCategory};
use redaction::RedactionFilter;
use std::fs;
use std::path::Path;

const KERNEL_RELEASE: &str = "/proc/sys/kernel/osrelease";
const OS_RELEASE: &str = "/etc/os-release";

/// Local names that must never appear in a report. Only used to seed the
/// redaction filter.
#[derive(Debug, Clone, Default)]
pub struct HostIdentity {
    pub machine_name: Option<String>,
    pub user_name: Option<String>,
}

impl HostIdentity {
    pub fn detect() -> Self {
        let machine_name = hostname::get().ok().and_then(|h| h.into_string().ok());
        let user_name = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok();
        HostIdentity { machine_name, user_name }
    }

    pub fn seed(&self, mut filter: RedactionFilter) -> RedactionFilter {
        if let Some(n) = &self.machine_name {
            filter = filter.with_machine_name(n);
        }
        if let Some(n) = &self.user_name {
            filter = filter.with_user_name(n);
        }
        filter
    }
}

pub fn os_facts() -> Vec<Fact> {
    os_facts_from(Path::new(KERNEL_RELEASE), Path::new(OS_RELEASE))
}

fn os_facts_from(kernel_release: &Path, os_release: &Path) -> Vec<Fact> {
    let os = |k: &str, v: String| Fact::public(FactCategory::OsInfo, k, v);
    let mut facts = vec![
        os("os.name", std::env::consts::OS.to_string()),
        os("os.family", std::env::consts::FAMILY.to_string()),
        os("os.arch", std::env::consts::ARCH.to_string()),
    ];
    if let Some(k) = fs::read_to_string(kernel_release).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        facts.push(os("os.kernel_release", k));
    }
    if let Some(d) = fs::read_to_string(os_release).ok().as_deref().and_then(pretty_name) {
        facts.push(os("os.distribution", d));
    }
    facts
}

fn pretty_name(os_release: &str) -> Option<String> {
    os_release.lines().find_map(|l| {
        let v = l.trim().strip_prefix("PRETTY_NAME=")?;
        let v = v.trim().trim_matches(|c| c == '"' || c == '\'');
        (!v.is_empty()).then(|| v.to_string())
    })
}

/// Tool, engine and legacy subsystem versions plus the transports this run
/// queries.
pub fn version_facts(legacy_version_path: &Path, sources: &[&dyn DiscoverySource]) -> Vec<Fact> {
    let svc = |k: &str, v: String| Fact::public(FactCategory::ServiceVersion, k, v);
    let legacy = endpoint_enum::alsa::driver_version(legacy_version_path).unwrap_or_else(|| "unavailable".to_string());
    let transports = sources
        .iter()
        .map(|s| format!("{} ({})", s.transport(), s.name()))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        svc("service.version", env!("CARGO_PKG_VERSION").to_string()),
        svc("service.core_version", mididiag_core::version().to_string()),
        svc("service.legacy_driver", legacy),
        svc("service.transports", transports),
    ]
}
