use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    store::{CooldownRecord, RemediationTask, Store},
    Result,
};

/// Process-local outcome log, bounded to `max_entries` tasks.
///
/// Tasks are kept in insertion order. When the bound is hit the oldest
/// terminal task is evicted; in-flight tasks are never dropped.
pub struct MemoryStore {
    max_entries: usize,
    tasks: RwLock<VecDeque<RemediationTask>>,
    cooldowns: RwLock<HashMap<String, CooldownRecord>>,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            tasks: RwLock::new(VecDeque::new()),
            cooldowns: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init(&self) -> Result<()> {
        debug!("Using in-memory outcome log (max {} entries)", self.max_entries);
        Ok(())
    }

    async fn save_task(&self, task: &RemediationTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;

        if let Some(existing) = tasks.iter_mut().rev().find(|t| t.id == task.id) {
            *existing = task.clone();
            return Ok(());
        }

        tasks.push_back(task.clone());

        while tasks.len() > self.max_entries {
            match tasks.iter().position(|t| t.is_terminal()) {
                Some(idx) => {
                    tasks.remove(idx);
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<RemediationTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().rev().find(|t| t.id == id).cloned())
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<RemediationTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().rev().take(limit).cloned().collect())
    }

    async fn mark_resolved(&self, id: Uuid, resolved_at: DateTime<Utc>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.iter_mut().rev().find(|t| t.id == id) {
            task.resolved_at = Some(resolved_at);
        }
        Ok(())
    }

    async fn prune_tasks(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| !t.is_terminal() || t.recorded_at() >= older_than);
        Ok((before - tasks.len()) as u64)
    }

    async fn save_cooldown(&self, record: &CooldownRecord) -> Result<()> {
        let mut cooldowns = self.cooldowns.write().await;
        cooldowns.insert(record.fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn list_cooldowns(&self) -> Result<Vec<CooldownRecord>> {
        let cooldowns = self.cooldowns.read().await;
        Ok(cooldowns.values().cloned().collect())
    }

    async fn delete_cooldown(&self, fingerprint: &str, task_id: Uuid) -> Result<()> {
        let mut cooldowns = self.cooldowns.write().await;
        if cooldowns.get(fingerprint).is_some_and(|r| r.task_id == task_id) {
            cooldowns.remove(fingerprint);
        }
        Ok(())
    }
}
