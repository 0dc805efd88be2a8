//! Legacy transport: the ALSA sequencer client list exposed under procfs.

use mididiag_core::{Capability, DiscoverySource, EndpointDescriptor, SourceError, TransportKind};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CLIENTS_PATH: &str = "/proc/asound/seq/clients";
pub const DEFAULT_VERSION_PATH: &str = "/proc/asound/version";

const SOURCE_NAME: &str = "alsa-seq";

#[derive(Debug, Clone)]
pub struct AlsaSeqSource {
    clients_path: PathBuf,
}

impl Default for AlsaSeqSource {
    fn default() -> Self {
        AlsaSeqSource { clients_path: PathBuf::from(DEFAULT_CLIENTS_PATH) }
    }
}

impl AlsaSeqSource {
    pub fn new(clients_path: impl Into<PathBuf>) -> Self {
        AlsaSeqSource { clients_path: clients_path.into() }
    }
}

impl DiscoverySource for AlsaSeqSource {
    fn transport(&self) -> TransportKind {
        TransportKind::Legacy
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn discover(&self) -> Result<Vec<EndpointDescriptor>, SourceError> {
        let text = fs::read_to_string(&self.clients_path).map_err(|e| SourceError::Unreachable {
            source_name: SOURCE_NAME.to_string(),
            reason: match e.kind() {
                io::ErrorKind::NotFound => "sequencer client list not present".to_string(),
                kind => format!("cannot read sequencer client list ({:?})", kind),
            },
        })?;
        parse_clients(&text)
    }
}

struct ClientHeader {
    number: u32,
    kind: String,
    ump: bool,
}

/// Parse the procfs client listing. Every port of every client except the
/// kernel's system client becomes one descriptor, in listing order.
pub fn parse_clients(text: &str) -> Result<Vec<EndpointDescriptor>, SourceError> {
    let mut out = Vec::new();
    let mut current: Option<ClientHeader> = None;
    let mut saw_client = false;
    for line in text.lines() {
        let t = line.trim();
        if let Some(rest) = t.strip_prefix("Client ") {
            let Some((num, tail)) = rest.split_once(':') else { continue };
            let Ok(number) = num.trim().parse::<u32>() else { continue };
            saw_client = true;
            let kind = tail
                .rsplit_once('[')
                .map(|(_, k)| k.trim_end_matches(']').trim().to_ascii_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            let ump = kind.contains("ump");
            current = Some(ClientHeader { number, kind, ump });
        } else if let Some(rest) = t.strip_prefix("Port ") {
            let Some(client) = current.as_ref() else { continue };
            if client.number == 0 {
                continue;
            }
            let Some((num, tail)) = rest.split_once(':') else { continue };
            let Ok(port) = num.trim().parse::<u32>() else { continue };
            let Some((name, after)) = quoted(tail) else { continue };
            let flags = after
                .trim()
                .strip_prefix('(')
                .and_then(|f| f.strip_suffix(')'))
                .unwrap_or("");
            out.push(EndpointDescriptor {
                id: format!("{}:{}:{}", SOURCE_NAME, client.number, port),
                name: name.to_string(),
                capabilities: port_capabilities(flags, client.ump),
                driver: format!("{} {}", SOURCE_NAME, client.kind),
            });
        }
    }
    if !saw_client && !text.trim().is_empty() && !text.contains("Client info") {
        return Err(SourceError::Malformed {
            source_name: SOURCE_NAME.to_string(),
            reason: "no client entries in listing".to_string(),
        });
    }
    Ok(out)
}

fn quoted(s: &str) -> Option<(&str, &str)> {
    let start = s.find('"')?;
    let rest = &s[start + 1..];
    let end = rest.find('"')?;
    Some((&rest[..end], &rest[end + 1..]))
}

fn port_capabilities(flags: &str, ump: bool) -> BTreeSet<Capability> {
    let mut caps = BTreeSet::new();
    let mut chars = flags.chars();
    if matches!(chars.next(), Some('R') | Some('r')) {
        caps.insert(Capability::Input);
    }
    if matches!(chars.next(), Some('W') | Some('w')) {
        caps.insert(Capability::Output);
    }
    caps.insert(if ump { Capability::Ump } else { Capability::ByteStream });
    caps
}

/// Driver version from the procfs version banner, e.g. `k6.8.0`.
pub fn driver_version(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let (_, v) = text.split_once("Version ")?;
    let v = v.trim().trim_end_matches('.');
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}
