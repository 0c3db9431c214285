use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::store::{SkipReason, TaskState};

/// What the dispatcher did with a submitted alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted { task_id: Uuid },
    Skipped(SkipReason),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Decision::Skipped(reason) => Some(*reason),
            Decision::Accepted { .. } => None,
        }
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Decision::Accepted { task_id } => Some(*task_id),
            Decision::Skipped(_) => None,
        }
    }

    /// Label used for the decisions metric.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Accepted { .. } => "accepted",
            Decision::Skipped(SkipReason::Cooldown) => "cooldown",
            Decision::Skipped(SkipReason::InFlight) => "in-flight",
            Decision::Skipped(SkipReason::Unmapped) => "unmapped",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accepted { task_id } => write!(f, "accepted({})", task_id),
            Decision::Skipped(reason) => write!(f, "skipped({})", reason),
        }
    }
}

/// Outcome of feeding a resolved notification back to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The fingerprint's last remediation succeeded and is now confirmed.
    Confirmed { task_id: Uuid },
    /// Nothing to confirm: no recent success for this fingerprint.
    Unconfirmed,
}

/// Read-only view of a cooldown entry for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CooldownStatus {
    pub fingerprint: String,
    pub task_id: Uuid,
    pub outcome: TaskState,
    pub completed_at: DateTime<Utc>,
    pub remaining_secs: u64,
    pub confirmed: bool,
}
