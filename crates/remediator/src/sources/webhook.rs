use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    alert::AlertStatus,
    dispatcher::{Decision, Dispatcher, Resolution},
    metrics, Result,
};

use super::AlertmanagerPayload;

/// Per-request tally, logged once the payload has been handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookSummary {
    pub received: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub resolved: usize,
    pub confirmed: usize,
}

pub struct WebhookHandler {
    dispatcher: Arc<Dispatcher>,
    target_labels: Vec<String>,
    resolution_feedback: bool,
}

impl WebhookHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, target_labels: Vec<String>) -> Self {
        let resolution_feedback = dispatcher.config().resolution_feedback;
        Self {
            dispatcher,
            target_labels,
            resolution_feedback,
        }
    }

    /// Parse a raw request body and hand every alert it carries to the dispatcher.
    ///
    /// Returns `Error::Validation` for malformed payloads; nothing reaches the
    /// dispatcher in that case.
    pub async fn handle_body(&self, body: &[u8]) -> Result<WebhookSummary> {
        let parsed = AlertmanagerPayload::from_slice(body)
            .and_then(|payload| payload.into_alerts(&self.target_labels));

        let alerts = match parsed {
            Ok(alerts) => alerts,
            Err(e) => {
                metrics::MALFORMED_PAYLOADS_TOTAL.inc();
                warn!("Rejected webhook payload: {}", e);
                return Err(e);
            }
        };

        let mut summary = WebhookSummary::default();
        for alert in alerts {
            summary.received += 1;
            info!(
                alert = %alert.name,
                target = %alert.target,
                status = %alert.status,
                fingerprint = %alert.fingerprint,
                "Received alert"
            );
            metrics::ALERTS_RECEIVED_TOTAL
                .with_label_values(&[&alert.status.to_string()])
                .inc();

            match alert.status {
                AlertStatus::Firing => match self.dispatcher.submit(&alert).await {
                    Decision::Accepted { .. } => summary.accepted += 1,
                    Decision::Skipped(_) => summary.skipped += 1,
                },
                AlertStatus::Resolved if self.resolution_feedback => {
                    summary.resolved += 1;
                    if let Resolution::Confirmed { .. } = self.dispatcher.resolve(&alert).await {
                        summary.confirmed += 1;
                    }
                }
                AlertStatus::Resolved => {
                    summary.resolved += 1;
                    debug!(alert = %alert.name, target = %alert.target, "Ignoring resolved alert");
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{ActionMap, DispatcherConfig};
    use crate::executor::{ExecutionResult, MockExecutor};
    use crate::store::{MemoryStore, SkipReason, Store, TaskState};
    use crate::Error;

    fn handler(executor: MockExecutor, resolution_feedback: bool) -> (WebhookHandler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let config = DispatcherConfig {
            resolution_feedback,
            ..DispatcherConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            ActionMap::new().with_action("NginxDown", "restart-nginx"),
            Arc::new(executor),
            store.clone(),
            config,
        ));
        let handler = WebhookHandler::new(dispatcher, vec!["target".to_string(), "instance".to_string()]);
        (handler, store)
    }

    #[tokio::test]
    async fn firing_alerts_are_submitted() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .withf(|target, action| target == "web1" && action == "restart-nginx")
            .times(1)
            .returning(|_, _| ExecutionResult::success("ok"));
        let (handler, _store) = handler(executor, false);

        let body = br#"{"status":"firing","alerts":[
            {"labels":{"alertname":"NginxDown","instance":"web1:9113"}},
            {"labels":{"alertname":"DiskFull","instance":"web1:9100"}}
        ]}"#;
        let summary = handler.handle_body(body).await.unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.skipped, 1);

        // let the worker run before the mock is checked on drop
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn malformed_body_never_reaches_the_dispatcher() {
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(0);
        let (handler, store) = handler(executor, false);

        let result = handler.handle_body(b"{\"status\":\"firing\",\"alerts\":[]}").await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolved_alerts_are_ignored_without_feedback() {
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(0);
        let (handler, store) = handler(executor, false);

        let body = br#"{"status":"resolved","alerts":[{"labels":{"alertname":"NginxDown","target":"web1"}}]}"#;
        let summary = handler.handle_body(body).await.unwrap();

        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.confirmed, 0);
        assert!(store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolved_alert_confirms_earlier_success() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_, _| ExecutionResult::success("ok"));
        let (handler, store) = handler(executor, true);

        let firing = br#"{"status":"firing","alerts":[{"labels":{"alertname":"NginxDown","target":"web1"}}]}"#;
        handler.handle_body(firing).await.unwrap();

        loop {
            let tasks = store.list_tasks(1).await.unwrap();
            if tasks.first().is_some_and(|t| t.is_terminal()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let resolved = br#"{"status":"resolved","alerts":[{"labels":{"alertname":"NginxDown","target":"web1"}}]}"#;
        let summary = handler.handle_body(resolved).await.unwrap();
        assert_eq!(summary.confirmed, 1);

        let again = handler.handle_body(firing).await.unwrap();
        assert_eq!(again.skipped, 1);
        let tasks = store.list_tasks(10).await.unwrap();
        assert_eq!(tasks[0].skip_reason, Some(SkipReason::Cooldown));
        assert!(tasks
            .iter()
            .any(|t| t.state == TaskState::Succeeded && t.resolved_at.is_some()));
    }
}
