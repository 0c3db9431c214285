//! Remediation dispatcher
//!
//! Maps alerts to remediation actions and runs at most one action per
//! fingerprint at a time. Per-fingerprint state moves
//! `Idle → Pending → Running → {Succeeded|Failed} → Idle` (once the cooldown
//! has elapsed). Every check that feeds a decision happens under the same lock
//! as the transition it guards, so two deliveries of one alert can never both
//! start a remediation.

mod mapping;
mod state;

pub use mapping::ActionMap;
pub use state::{CooldownStatus, Decision, Resolution};

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    alert::{Alert, Fingerprint},
    executor::Executor,
    metrics,
    store::{CooldownRecord, FailureReason, RemediationTask, SkipReason, Store, TaskState},
    Result,
};

/// Retention and cooldown are capped at ten years so deadlines stay
/// representable as an `Instant`.
const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Minimum time between a completed attempt and the next one for a fingerprint.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Upper bound on a single executor invocation.
    #[serde(default = "default_executor_timeout_secs")]
    pub executor_timeout_secs: u64,
    /// How long finished tasks and cooldown records are kept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Log and record resolved notifications for successfully remediated alerts.
    #[serde(default)]
    pub resolution_feedback: bool,
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_executor_timeout_secs() -> u64 {
    120
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_prune_interval_secs() -> u64 {
    60
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            executor_timeout_secs: default_executor_timeout_secs(),
            retention_secs: default_retention_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            resolution_feedback: false,
        }
    }
}

impl DispatcherConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs.min(MAX_WINDOW_SECS))
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_secs(self.executor_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs.min(MAX_WINDOW_SECS) as i64)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.executor_timeout_secs == 0 {
            return Err("executor_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Slot {
    in_flight: Option<Uuid>,
    cooldown: Option<Cooldown>,
}

#[derive(Debug)]
struct Cooldown {
    record: CooldownRecord,
    until: Instant,
    confirmed: bool,
}

pub struct Dispatcher {
    actions: ActionMap,
    executor: Arc<dyn Executor>,
    store: Arc<dyn Store>,
    config: DispatcherConfig,
    slots: Mutex<HashMap<Fingerprint, Slot>>,
}

impl Dispatcher {
    pub fn new(
        actions: ActionMap,
        executor: Arc<dyn Executor>,
        store: Arc<dyn Store>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            actions,
            executor,
            store,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Decide what to do with a firing alert and, if accepted, start the
    /// remediation on a worker task. Returns as soon as the decision is made.
    pub async fn submit(self: &Arc<Self>, alert: &Alert) -> Decision {
        let Some(action) = self.actions.action_for(&alert.name) else {
            return self.skip(alert, None, SkipReason::Unmapped).await;
        };

        let mut task = RemediationTask::pending(alert, action);

        let verdict = {
            let now = Instant::now();
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(alert.fingerprint.clone()).or_default();

            if slot.cooldown.as_ref().is_some_and(|c| now < c.until) {
                Err(SkipReason::Cooldown)
            } else if slot.in_flight.is_some() {
                Err(SkipReason::InFlight)
            } else {
                slot.in_flight = Some(task.id);
                Ok(())
            }
        };

        if let Err(reason) = verdict {
            return self.skip(alert, Some(action), reason).await;
        }

        debug!(task_id = %task.id, fingerprint = %alert.fingerprint, "Task pending");
        task.state = TaskState::Running;
        task.started_at = Some(Utc::now());

        let decision = Decision::Accepted { task_id: task.id };
        info!(
            alert = %alert.name,
            target = %alert.target,
            action = %action,
            task_id = %task.id,
            "Remediation accepted"
        );
        metrics::DISPATCH_DECISIONS_TOTAL.with_label_values(&[decision.label()]).inc();
        metrics::REMEDIATIONS_IN_FLIGHT.inc();

        self.record(&task).await;
        tokio::spawn(Arc::clone(self).run_task(task, alert.fingerprint.clone()));

        decision
    }

    async fn skip(&self, alert: &Alert, action: Option<&str>, reason: SkipReason) -> Decision {
        let decision = Decision::Skipped(reason);
        info!(
            alert = %alert.name,
            target = %alert.target,
            fingerprint = %alert.fingerprint,
            %reason,
            "Remediation skipped"
        );
        metrics::DISPATCH_DECISIONS_TOTAL.with_label_values(&[decision.label()]).inc();

        self.record(&RemediationTask::skipped(alert, action, reason)).await;
        decision
    }

    async fn run_task(self: Arc<Self>, mut task: RemediationTask, fingerprint: Fingerprint) {
        let target = task.target.clone();
        let action = task.action.clone().unwrap_or_default();
        let started = Instant::now();

        let invocation = AssertUnwindSafe(self.executor.execute(&target, &action)).catch_unwind();
        let outcome = timeout(self.config.executor_timeout(), invocation).await;

        match outcome {
            Ok(Ok(result)) if result.success => {
                task.state = TaskState::Succeeded;
                task.output = Some(result.output);
                task.error = result.error;
            }
            Ok(Ok(result)) => {
                task.state = TaskState::Failed;
                task.failure_reason = Some(FailureReason::Executor);
                task.output = Some(result.output);
                task.error = Some(result.error.unwrap_or_else(|| "executor reported failure".to_string()));
            }
            Ok(Err(_)) => {
                task.state = TaskState::Failed;
                task.failure_reason = Some(FailureReason::Executor);
                task.error = Some("executor panicked".to_string());
            }
            Err(_) => {
                task.state = TaskState::Failed;
                task.failure_reason = Some(FailureReason::Timeout);
                task.error = Some(format!(
                    "no result within {}s; the remote action may still be running",
                    self.config.executor_timeout_secs
                ));
            }
        }

        task.completed_at = Some(Utc::now());
        metrics::REMEDIATION_DURATION_SECONDS
            .with_label_values(&[action.as_str()])
            .observe(started.elapsed().as_secs_f64());

        self.complete(task, fingerprint).await;
    }

    async fn complete(&self, task: RemediationTask, fingerprint: Fingerprint) {
        let record = CooldownRecord {
            fingerprint: fingerprint.to_string(),
            task_id: task.id,
            outcome: task.state,
            completed_at: task.completed_at.unwrap_or_else(Utc::now),
        };

        {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(fingerprint).or_default();
            if slot.in_flight == Some(task.id) {
                slot.in_flight = None;
            }
            slot.cooldown = Some(Cooldown {
                record: record.clone(),
                until: Instant::now() + self.config.cooldown(),
                confirmed: false,
            });
        }

        metrics::REMEDIATIONS_IN_FLIGHT.dec();
        let outcome_label = match (task.state, task.failure_reason) {
            (TaskState::Succeeded, _) => "succeeded",
            (_, Some(FailureReason::Timeout)) => "timeout",
            _ => "executor",
        };
        metrics::REMEDIATIONS_COMPLETED_TOTAL.with_label_values(&[outcome_label]).inc();

        match task.state {
            TaskState::Succeeded => info!(
                task_id = %task.id,
                target = %task.target,
                action = task.action.as_deref().unwrap_or_default(),
                "Remediation succeeded"
            ),
            _ => warn!(
                task_id = %task.id,
                target = %task.target,
                action = task.action.as_deref().unwrap_or_default(),
                reason = %outcome_label,
                error = task.error.as_deref().unwrap_or_default(),
                "Remediation failed"
            ),
        }

        self.record(&task).await;
        if let Err(e) = self.store.save_cooldown(&record).await {
            error!("Failed to persist cooldown for {}: {}", record.fingerprint, e);
        }
    }

    async fn record(&self, task: &RemediationTask) {
        if let Err(e) = self.store.save_task(task).await {
            error!("Failed to record task {} in outcome log: {}", task.id, e);
        }
    }

    /// Audit a resolved notification. Never changes dispatcher state.
    pub async fn resolve(&self, alert: &Alert) -> Resolution {
        let confirmed = {
            let mut slots = self.slots.lock().await;
            slots
                .get_mut(&alert.fingerprint)
                .and_then(|slot| slot.cooldown.as_mut())
                .filter(|c| c.record.outcome == TaskState::Succeeded)
                .map(|c| {
                    let first = !c.confirmed;
                    c.confirmed = true;
                    (c.record.task_id, first)
                })
        };

        match confirmed {
            Some((task_id, first)) => {
                info!(
                    alert = %alert.name,
                    target = %alert.target,
                    %task_id,
                    "Alert resolved after successful remediation"
                );
                if first {
                    metrics::RESOLUTIONS_CONFIRMED_TOTAL.inc();
                    if let Err(e) = self.store.mark_resolved(task_id, Utc::now()).await {
                        error!("Failed to mark task {} resolved: {}", task_id, e);
                    }
                }
                Resolution::Confirmed { task_id }
            }
            None => {
                debug!(alert = %alert.name, target = %alert.target, "Resolved alert has no successful remediation");
                Resolution::Unconfirmed
            }
        }
    }

    /// Reload cooldown records persisted by a previous process.
    pub async fn restore(&self) -> Result<usize> {
        let records = self.store.list_cooldowns().await?;
        let now_utc = Utc::now();
        let now = Instant::now();
        let cooldown = self.config.cooldown();

        let mut slots = self.slots.lock().await;
        let mut restored = 0;
        for record in records {
            let elapsed = (now_utc - record.completed_at).to_std().unwrap_or_default();
            let until = now + cooldown.saturating_sub(elapsed);
            let slot = slots.entry(Fingerprint::from(record.fingerprint.clone())).or_default();
            slot.cooldown = Some(Cooldown {
                record,
                until,
                confirmed: false,
            });
            restored += 1;
        }

        info!("Restored {} cooldown records", restored);
        Ok(restored)
    }

    /// Evict cooldown state and outcome log entries older than the retention window.
    pub async fn prune(&self) -> Result<(usize, u64)> {
        self.prune_before(Utc::now() - self.config.retention()).await
    }

    pub(crate) async fn prune_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<(usize, u64)> {
        let now = Instant::now();
        let mut expired = Vec::new();

        {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, slot| {
                let keep = slot.in_flight.is_some()
                    || slot
                        .cooldown
                        .as_ref()
                        .is_some_and(|c| c.until > now || c.record.completed_at >= cutoff);
                if !keep {
                    if let Some(cooldown) = slot.cooldown.take() {
                        expired.push(cooldown.record);
                    }
                }
                keep
            });
        }

        // A newer attempt may have persisted its own record since the lock
        // was released; only the record that expired is removed.
        for record in &expired {
            self.store
                .delete_cooldown(&record.fingerprint, record.task_id)
                .await?;
        }
        let pruned_tasks = self.store.prune_tasks(cutoff).await?;

        if !expired.is_empty() || pruned_tasks > 0 {
            debug!("Pruned {} cooldown records and {} tasks", expired.len(), pruned_tasks);
        }

        Ok((expired.len(), pruned_tasks))
    }

    /// Periodically prune expired state until the runtime shuts down.
    pub fn spawn_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dispatcher.config.prune_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = dispatcher.prune().await {
                    error!("Failed to prune dispatcher state: {}", e);
                }
            }
        })
    }

    pub async fn active_cooldowns(&self) -> Vec<CooldownStatus> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        let mut active: Vec<_> = slots
            .values()
            .filter_map(|slot| slot.cooldown.as_ref())
            .filter(|c| c.until > now)
            .map(|c| CooldownStatus {
                fingerprint: c.record.fingerprint.clone(),
                task_id: c.record.task_id,
                outcome: c.record.outcome,
                completed_at: c.record.completed_at,
                remaining_secs: c.until.saturating_duration_since(now).as_secs_f64().ceil() as u64,
                confirmed: c.confirmed,
            })
            .collect();
        active.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        active
    }

    pub async fn in_flight(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.in_flight.is_some()).count()
    }
}
