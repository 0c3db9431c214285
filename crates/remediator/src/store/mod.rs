mod config;
mod factory;
mod memory;
mod models;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The outcome log and cooldown persistence behind the dispatcher.
///
/// Only the dispatcher writes; the status endpoints read.
#[async_trait]
pub trait Store: Send + Sync {
    // Initialize storage
    async fn init(&self) -> crate::Result<()>;

    // Outcome log
    async fn save_task(&self, task: &RemediationTask) -> crate::Result<()>;
    async fn get_task(&self, id: Uuid) -> crate::Result<Option<RemediationTask>>;
    async fn list_tasks(&self, limit: usize) -> crate::Result<Vec<RemediationTask>>;
    async fn mark_resolved(&self, id: Uuid, resolved_at: DateTime<Utc>) -> crate::Result<()>;
    async fn prune_tasks(&self, older_than: DateTime<Utc>) -> crate::Result<u64>;

    // Cooldown records
    async fn save_cooldown(&self, record: &CooldownRecord) -> crate::Result<()>;
    async fn list_cooldowns(&self) -> crate::Result<Vec<CooldownRecord>>;
    /// Remove the record for `fingerprint` if it still belongs to `task_id`.
    async fn delete_cooldown(&self, fingerprint: &str, task_id: Uuid) -> crate::Result<()>;
}
