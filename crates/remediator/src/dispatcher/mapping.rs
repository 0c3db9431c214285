use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{alert::is_valid_identifier, Error, Result};

/// Static alert-name → remediation-action mapping.
///
/// Injected into the dispatcher at construction; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionMap(HashMap<String, String>);

impl ActionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, alert_name: impl Into<String>, action: impl Into<String>) -> Self {
        self.0.insert(alert_name.into(), action.into());
        self
    }

    pub fn action_for(&self, alert_name: &str) -> Option<&str> {
        self.0.get(alert_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Actions end up on executor command lines, so they obey the same
    /// identifier rule as targets.
    pub fn validate(&self) -> Result<()> {
        for (alert_name, action) in &self.0 {
            if !is_valid_identifier(action) {
                return Err(Error::Config(format!(
                    "Invalid action '{}' for alert '{}'",
                    action, alert_name
                )));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ActionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_actions_by_alert_name() {
        let actions = ActionMap::new().with_action("NginxDown", "restart-nginx");
        assert_eq!(actions.action_for("NginxDown"), Some("restart-nginx"));
        assert_eq!(actions.action_for("nginxdown"), None);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn rejects_actions_that_are_not_identifiers() {
        let actions: ActionMap = [("NginxDown", "restart nginx; reboot")].into_iter().collect();
        assert!(actions.validate().is_err());

        let actions: ActionMap = [("NginxDown", "restart-nginx")].into_iter().collect();
        assert!(actions.validate().is_ok());
    }

    #[test]
    fn deserializes_from_a_plain_map() {
        let actions: ActionMap = serde_yaml::from_str("NginxDown: restart-nginx\nRedisDown: restart-redis\n").unwrap();
        assert_eq!(actions.action_for("RedisDown"), Some("restart-redis"));
    }
}
