use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{alert::Alert, Error, Result};

// Remediation attempt tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationTask {
    pub id: Uuid,
    pub fingerprint: String,
    pub alert_name: String,
    pub target: String,
    pub action: Option<String>,
    pub state: TaskState,
    pub skip_reason: Option<SkipReason>,
    pub failure_reason: Option<FailureReason>,

    // Executor results
    pub output: Option<String>,
    pub error: Option<String>,

    // Timing
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Cooldown,
    InFlight,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Executor,
    Timeout,
}

// Last completion per fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub fingerprint: String,
    pub task_id: Uuid,
    pub outcome: TaskState,
    pub completed_at: DateTime<Utc>,
}

impl RemediationTask {
    pub fn pending(alert: &Alert, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: alert.fingerprint.to_string(),
            alert_name: alert.name.clone(),
            target: alert.target.clone(),
            action: Some(action.to_string()),
            state: TaskState::Pending,
            skip_reason: None,
            failure_reason: None,
            output: None,
            error: None,
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            resolved_at: None,
        }
    }

    pub fn skipped(alert: &Alert, action: Option<&str>, reason: SkipReason) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint: alert.fingerprint.to_string(),
            alert_name: alert.name.clone(),
            target: alert.target.clone(),
            action: action.map(str::to_string),
            state: TaskState::Skipped,
            skip_reason: Some(reason),
            failure_reason: None,
            output: None,
            error: None,
            requested_at: now,
            started_at: None,
            completed_at: Some(now),
            resolved_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The instant used for retention: completion if finished, request otherwise.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.requested_at)
    }
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed | TaskState::Skipped)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "succeeded" => Ok(TaskState::Succeeded),
            "failed" => Ok(TaskState::Failed),
            "skipped" => Ok(TaskState::Skipped),
            _ => Err(Error::Validation(format!("Invalid task state: {}", s))),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Cooldown => write!(f, "cooldown"),
            SkipReason::InFlight => write!(f, "in-flight"),
            SkipReason::Unmapped => write!(f, "unmapped"),
        }
    }
}

impl FromStr for SkipReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cooldown" => Ok(SkipReason::Cooldown),
            "in-flight" => Ok(SkipReason::InFlight),
            "unmapped" => Ok(SkipReason::Unmapped),
            _ => Err(Error::Validation(format!("Invalid skip reason: {}", s))),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Executor => write!(f, "executor"),
            FailureReason::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for FailureReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "executor" => Ok(FailureReason::Executor),
            "timeout" => Ok(FailureReason::Timeout),
            _ => Err(Error::Validation(format!("Invalid failure reason: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertStatus;

    #[test]
    fn skipped_tasks_are_terminal_immediately() {
        let alert = Alert::new("NginxDown", "web1", AlertStatus::Firing);
        let task = RemediationTask::skipped(&alert, None, SkipReason::Unmapped);
        assert!(task.is_terminal());
        assert_eq!(task.skip_reason, Some(SkipReason::Unmapped));
        assert_eq!(task.recorded_at(), task.completed_at.unwrap());
    }

    #[test]
    fn pending_tasks_are_in_flight() {
        let alert = Alert::new("NginxDown", "web1", AlertStatus::Firing);
        let task = RemediationTask::pending(&alert, "restart-nginx");
        assert!(task.state.is_in_flight());
        assert_eq!(task.fingerprint, alert.fingerprint.to_string());
        assert_eq!(task.action.as_deref(), Some("restart-nginx"));
    }

    #[test]
    fn reasons_use_their_wire_names() {
        assert_eq!(SkipReason::InFlight.to_string(), "in-flight");
        assert_eq!("in-flight".parse::<SkipReason>().unwrap(), SkipReason::InFlight);
        assert_eq!(serde_json::to_value(SkipReason::InFlight).unwrap(), "in-flight");
        assert_eq!("timeout".parse::<FailureReason>().unwrap(), FailureReason::Timeout);
        assert!("bogus".parse::<TaskState>().is_err());
    }
}
