//! Alertmanager webhook payload (version 4).
//!
//! Only `status` and a non-empty `alerts` list are required; everything else
//! Alertmanager sends is optional and unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::{
    alert::{is_valid_identifier, Alert, AlertStatus},
    Error, Result,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub truncated_alerts: Option<u64>,
    pub status: AlertStatus,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub group_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL", default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub alerts: Vec<AlertmanagerAlert>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", default)]
    pub generator_url: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl AlertmanagerPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let payload: Self = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("Invalid Alertmanager payload: {}", e)))?;

        if payload.alerts.is_empty() {
            return Err(Error::Validation("Payload contains no alerts".to_string()));
        }

        Ok(payload)
    }

    /// Convert to dispatcher alerts, dropping any that lack a safe name or target.
    pub fn into_alerts(self, target_labels: &[String]) -> Result<Vec<Alert>> {
        let group_status = self.status;
        let total = self.alerts.len();

        let alerts: Vec<Alert> = self
            .alerts
            .into_iter()
            .filter_map(|alert| alert.into_alert(group_status, target_labels))
            .collect();

        if alerts.is_empty() {
            return Err(Error::Validation(format!(
                "None of the {} alerts carries a valid name and target",
                total
            )));
        }

        Ok(alerts)
    }
}

impl AlertmanagerAlert {
    fn into_alert(self, group_status: AlertStatus, target_labels: &[String]) -> Option<Alert> {
        let status = match self.status.as_deref() {
            Some("firing") => AlertStatus::Firing,
            Some("resolved") => AlertStatus::Resolved,
            _ => group_status,
        };

        let Some(name) = self.labels.get("alertname").or_else(|| self.labels.get("job")) else {
            warn!(labels = ?self.labels, "Dropping alert without alertname or job label");
            return None;
        };
        if !is_valid_identifier(name) {
            warn!(alert = %name, "Dropping alert with invalid name");
            return None;
        }

        let Some(target) = resolve_target(&self.labels, target_labels) else {
            warn!(alert = %name, labels = ?self.labels, "Dropping alert without a target label");
            return None;
        };
        if !is_valid_identifier(&target) {
            warn!(alert = %name, %target, "Dropping alert with invalid target");
            return None;
        }

        let name = name.clone();
        Some(
            Alert::new(name, target, status)
                .with_times(self.starts_at, self.ends_at)
                .with_labels(self.labels),
        )
    }
}

/// First present label from `target_labels`. Exporter `instance` labels are
/// `host:port`; the port is stripped.
pub fn resolve_target(labels: &HashMap<String, String>, target_labels: &[String]) -> Option<String> {
    target_labels.iter().find_map(|key| {
        let value = labels.get(key)?.trim();
        if value.is_empty() {
            return None;
        }
        if key == "instance" {
            return Some(strip_port(value).to_string());
        }
        Some(value.to_string())
    })
}

fn strip_port(instance: &str) -> &str {
    match instance.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            host.trim_start_matches('[').trim_end_matches(']')
        }
        _ => instance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default_labels() -> Vec<String> {
        vec!["target".to_string(), "instance".to_string()]
    }

    fn payload(alerts: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "version": "4",
            "groupKey": "{}:{alertname=\"NginxDown\"}",
            "status": "firing",
            "receiver": "remediator",
            "groupLabels": {"alertname": "NginxDown"},
            "commonLabels": {},
            "commonAnnotations": {},
            "externalURL": "http://alertmanager:9093",
            "alerts": alerts,
        }))
        .unwrap()
    }

    #[test]
    fn parses_a_typical_alertmanager_payload() {
        let body = payload(json!([{
            "status": "firing",
            "labels": {"alertname": "NginxDown", "instance": "web1:9113", "severity": "critical"},
            "annotations": {"summary": "nginx is down"},
            "startsAt": "2024-06-01T12:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z",
            "generatorURL": "http://prometheus:9090/graph",
            "fingerprint": "c8a1b2d3e4f5a6b7"
        }]));

        let alerts = AlertmanagerPayload::from_slice(&body)
            .unwrap()
            .into_alerts(&default_labels())
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "NginxDown");
        assert_eq!(alerts[0].target, "web1");
        assert!(alerts[0].is_firing());
        assert!(alerts[0].starts_at.is_some());
    }

    #[test]
    fn minimal_payload_is_enough() {
        let body = br#"{"status":"firing","alerts":[{"labels":{"alertname":"NginxDown","target":"web1"}}]}"#;
        let alerts = AlertmanagerPayload::from_slice(body)
            .unwrap()
            .into_alerts(&default_labels())
            .unwrap();
        assert_eq!(alerts[0].target, "web1");
        assert_eq!(alerts[0].status, AlertStatus::Firing);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(AlertmanagerPayload::from_slice(b"not json").is_err());
        assert!(AlertmanagerPayload::from_slice(br#"{"alerts":[{"labels":{}}]}"#).is_err());
        assert!(AlertmanagerPayload::from_slice(br#"{"status":"exploding","alerts":[{}]}"#).is_err());
        assert!(AlertmanagerPayload::from_slice(br#"{"status":"firing","alerts":[]}"#).is_err());
        assert!(AlertmanagerPayload::from_slice(br#"{"status":"firing"}"#).is_err());
    }

    #[test]
    fn per_alert_status_overrides_group_status() {
        let body = br#"{"status":"firing","alerts":[
            {"status":"resolved","labels":{"alertname":"NginxDown","target":"web1"}},
            {"labels":{"alertname":"NginxDown","target":"web2"}}
        ]}"#;
        let alerts = AlertmanagerPayload::from_slice(body)
            .unwrap()
            .into_alerts(&default_labels())
            .unwrap();
        assert_eq!(alerts[0].status, AlertStatus::Resolved);
        assert_eq!(alerts[1].status, AlertStatus::Firing);
    }

    #[test]
    fn unsafe_alerts_are_dropped() {
        let body = br#"{"status":"firing","alerts":[
            {"labels":{"alertname":"NginxDown","target":"--become-user=root"}},
            {"labels":{"alertname":"NginxDown","target":"web1; reboot"}},
            {"labels":{"alertname":"NginxDown"}},
            {"labels":{"job":"nginx","target":"web3"}}
        ]}"#;
        let alerts = AlertmanagerPayload::from_slice(body)
            .unwrap()
            .into_alerts(&default_labels())
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "nginx");
        assert_eq!(alerts[0].target, "web3");
    }

    #[test]
    fn no_valid_alert_is_an_error() {
        let body = br#"{"status":"firing","alerts":[{"labels":{"alertname":"NginxDown","target":"-x"}}]}"#;
        let payload = AlertmanagerPayload::from_slice(body).unwrap();
        assert!(matches!(payload.into_alerts(&default_labels()), Err(Error::Validation(_))));
    }

    #[test]
    fn target_label_order_is_respected() {
        let labels: HashMap<String, String> = [
            ("instance".to_string(), "10.0.0.5:9100".to_string()),
            ("target".to_string(), "web1".to_string()),
            ("host".to_string(), "web-host".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(resolve_target(&labels, &default_labels()).as_deref(), Some("web1"));
        assert_eq!(
            resolve_target(&labels, &["instance".to_string()]).as_deref(),
            Some("10.0.0.5")
        );
        assert_eq!(resolve_target(&labels, &["host".to_string()]).as_deref(), Some("web-host"));
        assert_eq!(resolve_target(&labels, &["node".to_string()]), None);
    }

    #[test]
    fn strips_only_numeric_ports() {
        assert_eq!(strip_port("web1:9113"), "web1");
        assert_eq!(strip_port("web1"), "web1");
        assert_eq!(strip_port("web1:metrics"), "web1:metrics");
        assert_eq!(strip_port("[fe80::1]:9100"), "fe80::1");
    }
}
