//! Alerts as the dispatcher sees them, after ingress parsing and validation.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest accepted target or action identifier (a DNS name).
pub const MAX_IDENTIFIER_LEN: usize = 253;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

/// Returns true if `value` is safe to hand to an executor as a target or action.
///
/// Labels arrive from the network and end up as command arguments, so anything
/// that could be read as a flag or a shell metacharacter is refused.
pub fn is_valid_identifier(value: &str) -> bool {
    value.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Dedup key for a remediation unit, derived from alert name and target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(alert_name: &str, target: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(alert_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(target.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub name: String,
    pub status: AlertStatus,
    pub target: String,
    pub labels: HashMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub fingerprint: Fingerprint,
}

impl Alert {
    pub fn new(name: impl Into<String>, target: impl Into<String>, status: AlertStatus) -> Self {
        let name = name.into();
        let target = target.into();
        let fingerprint = Fingerprint::new(&name, &target);

        Self {
            name,
            status,
            target,
            labels: HashMap::new(),
            starts_at: None,
            ends_at: None,
            fingerprint,
        }
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_times(mut self, starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::new("NginxDown", "web1");
        let b = Fingerprint::new("NginxDown", "web1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_separates_name_and_target() {
        assert_ne!(Fingerprint::new("NginxDown", "web1"), Fingerprint::new("NginxDown", "web2"));
        assert_ne!(Fingerprint::new("ab", "c"), Fingerprint::new("a", "bc"));
    }

    #[test]
    fn status_does_not_change_fingerprint() {
        let firing = Alert::new("NginxDown", "web1", AlertStatus::Firing);
        let resolved = Alert::new("NginxDown", "web1", AlertStatus::Resolved);
        assert_eq!(firing.fingerprint, resolved.fingerprint);
        assert!(firing.is_firing());
        assert!(!resolved.is_firing());
    }

    #[test]
    fn identifiers_reject_flags_and_metacharacters() {
        assert!(is_valid_identifier("web1"));
        assert!(is_valid_identifier("web-1.prod.example.com"));
        assert!(is_valid_identifier("restart_nginx"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("-e"));
        assert!(!is_valid_identifier("web1;reboot"));
        assert!(!is_valid_identifier("web1 web2"));
        assert!(!is_valid_identifier("$(id)"));
        assert!(!is_valid_identifier(&"a".repeat(MAX_IDENTIFIER_LEN + 1)));
    }
}
