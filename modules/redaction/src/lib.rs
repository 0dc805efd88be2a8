//! Redaction filter: turns raw facts into sanitized facts that carry no
//! machine-identifying or personal data.
//!
//! A fact is dropped when its key names a sensitive field. Otherwise its
//! value is replaced whole by a fixed-length salted token when the fact was
//! declared sensitive or when the value contains an IP address, an absolute
//! path, a serial number, or the local machine or user name.

use mididiag_core::{Fact, FactCategory, Sensitivity};
use rand::RngCore;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const TOKEN_PREFIX: &str = "redacted-";
const TOKEN_HEX_LEN: usize = 16;

/// Key segments that are never emitted, whatever the value.
const SENSITIVE_KEY_SEGMENTS: &[&str] = &[
    "hostname",
    "host_name",
    "machine_name",
    "computer_name",
    "computername",
    "user",
    "username",
    "user_name",
    "ip",
    "ip_address",
    "address",
    "serial",
    "serial_number",
    "path",
    "file_path",
    "home",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveKind {
    MachineName,
    UserName,
    IpAddress,
    AbsolutePath,
    SerialNumber,
    /// The producer marked the fact sensitive.
    Declared,
    /// The key itself names a sensitive field.
    SensitiveKey,
}

/// A fact that has been through the filter. Only this crate can build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedFact {
    category: FactCategory,
    key: String,
    value: String,
}

impl SanitizedFact {
    pub fn category(&self) -> FactCategory {
        self.category
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redacted {
    Clean(SanitizedFact),
    Tokenized { fact: SanitizedFact, reason: SensitiveKind },
    Omitted { reason: SensitiveKind },
}

impl Redacted {
    pub fn into_fact(self) -> Option<SanitizedFact> {
        match self {
            Redacted::Clean(f) | Redacted::Tokenized { fact: f, .. } => Some(f),
            Redacted::Omitted { .. } => None,
        }
    }
}

fn patterns() -> &'static [(SensitiveKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(SensitiveKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let octet = r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9]?[0-9])";
        let table = [
            (SensitiveKind::IpAddress, format!(r"(?:^|[^0-9]){o}(?:\.{o}){{3}}(?:$|[^0-9])", o = octet)),
            (SensitiveKind::IpAddress, r"(?i)[0-9a-f]{1,4}(?::[0-9a-f]{1,4}){7}".to_string()),
            (SensitiveKind::IpAddress, r"(?i)[0-9a-f]{1,4}(?::[0-9a-f]{1,4})*::[0-9a-f]{0,4}|::[0-9a-f]{1,4}".to_string()),
            (SensitiveKind::AbsolutePath, r#"(?:^|[\s"'=(\[,;:<>|])~?/[^\s/]"#.to_string()),
            (SensitiveKind::AbsolutePath, r#"(?:^|[\s"'=(\[,;:<>|])//+[^\s/]"#.to_string()),
            (SensitiveKind::AbsolutePath, r"(?i)\bfile:/+".to_string()),
            (SensitiveKind::AbsolutePath, r"(?i)(?:^|[^a-z0-9])[a-z]:[\\/]".to_string()),
            (SensitiveKind::AbsolutePath, r"\\\\[^\s\\]+".to_string()),
            (SensitiveKind::SerialNumber, r"(?i)(?:\bs/n|\bsn|\bserial(?:[\s_-]*(?:no|num|number))?)\s*[:#=]?\s*[a-z-]*[0-9][a-z0-9-]{2,}".to_string()),
        ];
        table
            .into_iter()
            .map(|(kind, re)| (kind, Regex::new(&re).expect("built-in redaction pattern")))
            .collect()
    })
}

fn identity_pattern(names: &[String]) -> Option<Regex> {
    if names.is_empty() {
        return None;
    }
    let alts = names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)(?:^|[^a-z0-9])(?:{})(?:$|[^a-z0-9])", alts)).ok()
}

/// Names shorter than this are not matched; they would redact ordinary words.
const MIN_IDENTITY_LEN: usize = 2;

pub struct RedactionFilter {
    salt: [u8; 16],
    machine_names: Vec<String>,
    user_names: Vec<String>,
    machine_re: Option<Regex>,
    user_re: Option<Regex>,
}

impl RedactionFilter {
    pub fn new(salt: [u8; 16]) -> Self {
        RedactionFilter {
            salt,
            machine_names: Vec::new(),
            user_names: Vec::new(),
            machine_re: None,
            user_re: None,
        }
    }

    /// Filter with a fresh random salt, so tokens differ between runs.
    pub fn with_random_salt() -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::new(salt)
    }

    pub fn with_machine_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if name.len() >= MIN_IDENTITY_LEN {
            self.machine_names.push(name.to_string());
            self.machine_re = identity_pattern(&self.machine_names);
        }
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if name.len() >= MIN_IDENTITY_LEN {
            self.user_names.push(name.to_string());
            self.user_re = identity_pattern(&self.user_names);
        }
        self
    }

    /// First sensitive pattern found in `text`, if any.
    pub fn detect(&self, text: &str) -> Option<SensitiveKind> {
        if self.machine_re.as_ref().is_some_and(|re| re.is_match(text)) {
            return Some(SensitiveKind::MachineName);
        }
        if self.user_re.as_ref().is_some_and(|re| re.is_match(text)) {
            return Some(SensitiveKind::UserName);
        }
        patterns()
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(kind, _)| *kind)
    }

    pub fn filter(&self, fact: Fact) -> Redacted {
        if is_sensitive_key(&fact.key) || self.detect(&fact.key).is_some() {
            return Redacted::Omitted { reason: SensitiveKind::SensitiveKey };
        }
        let reason = match fact.sensitivity {
            Sensitivity::Sensitive => Some(SensitiveKind::Declared),
            Sensitivity::Public => self.detect(&fact.raw_value),
        };
        match reason {
            Some(reason) => {
                let value = self.token(&fact.raw_value);
                Redacted::Tokenized {
                    fact: SanitizedFact { category: fact.category, key: fact.key, value },
                    reason,
                }
            }
            None => Redacted::Clean(SanitizedFact {
                category: fact.category,
                key: fact.key,
                value: fact.raw_value,
            }),
        }
    }

    pub fn apply(&self, fact: Fact) -> Option<SanitizedFact> {
        self.filter(fact).into_fact()
    }

    /// Equal values map to equal tokens within one run, so redacted fields
    /// can still be correlated across report sections.
    fn token(&self, value: &str) -> String {
        let mut h = Sha256::new();
        h.update(self.salt);
        h.update(value.as_bytes());
        let digest = hex::encode(h.finalize());
        format!("{}{}", TOKEN_PREFIX, &digest[..TOKEN_HEX_LEN])
    }
}

fn is_sensitive_key(key: &str) -> bool {
    key.split('.')
        .map(|seg| seg.split('[').next().unwrap_or(seg).trim().to_ascii_lowercase())
        .any(|seg| SENSITIVE_KEY_SEGMENTS.contains(&seg.as_str()))
}
