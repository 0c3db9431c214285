use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    store::{CooldownRecord, RemediationTask, Store},
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Connecting to SQLite database: {}", path.display());

        let pool = if path == Path::new(":memory:") {
            // A pooled in-memory database only exists per connection, so pin one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(
                    SqliteConnectOptions::new()
                        .filename(path)
                        .create_if_missing(true),
                )
                .await
        }
        .map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }

    fn task_from_row(r: &SqliteRow) -> Result<RemediationTask> {
        Ok(RemediationTask {
            id: r.get::<String, _>("id").parse()?,
            fingerprint: r.get("fingerprint"),
            alert_name: r.get("alert_name"),
            target: r.get("target"),
            action: r.get("action"),
            state: r.get::<String, _>("state").parse()?,
            skip_reason: r.get::<Option<String>, _>("skip_reason").map(|s| s.parse()).transpose()?,
            failure_reason: r.get::<Option<String>, _>("failure_reason").map(|s| s.parse()).transpose()?,
            output: r.get("output"),
            error: r.get("error"),
            requested_at: r.get("requested_at"),
            started_at: r.get("started_at"),
            completed_at: r.get("completed_at"),
            resolved_at: r.get("resolved_at"),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn save_task(&self, task: &RemediationTask) -> Result<()> {
        debug!("Saving remediation task: {} ({})", task.id, task.state);

        sqlx::query(
            r#"
            INSERT INTO remediation_tasks (
                id, fingerprint, alert_name, target, action, state,
                skip_reason, failure_reason, output, error,
                requested_at, started_at, completed_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                skip_reason = excluded.skip_reason,
                failure_reason = excluded.failure_reason,
                output = excluded.output,
                error = excluded.error,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.fingerprint)
        .bind(&task.alert_name)
        .bind(&task.target)
        .bind(&task.action)
        .bind(task.state.to_string())
        .bind(task.skip_reason.map(|r| r.to_string()))
        .bind(task.failure_reason.map(|r| r.to_string()))
        .bind(&task.output)
        .bind(&task.error)
        .bind(task.requested_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<RemediationTask>> {
        debug!("Getting remediation task: {}", id);

        let row = sqlx::query("SELECT * FROM remediation_tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::task_from_row).transpose()
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<RemediationTask>> {
        let rows = sqlx::query(
            "SELECT * FROM remediation_tasks ORDER BY requested_at DESC, rowid DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::task_from_row).collect()
    }

    async fn mark_resolved(&self, id: Uuid, resolved_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE remediation_tasks SET resolved_at = ?1 WHERE id = ?2")
            .bind(resolved_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn prune_tasks(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM remediation_tasks
            WHERE state IN ('succeeded', 'failed', 'skipped')
              AND COALESCE(completed_at, requested_at) < ?1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn save_cooldown(&self, record: &CooldownRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cooldowns (fingerprint, task_id, outcome, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(fingerprint) DO UPDATE SET
                task_id = excluded.task_id,
                outcome = excluded.outcome,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&record.fingerprint)
        .bind(record.task_id.to_string())
        .bind(record.outcome.to_string())
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_cooldowns(&self) -> Result<Vec<CooldownRecord>> {
        let rows = sqlx::query("SELECT fingerprint, task_id, outcome, completed_at FROM cooldowns")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                Ok(CooldownRecord {
                    fingerprint: r.get("fingerprint"),
                    task_id: r.get::<String, _>("task_id").parse()?,
                    outcome: r.get::<String, _>("outcome").parse()?,
                    completed_at: r.get("completed_at"),
                })
            })
            .collect()
    }

    async fn delete_cooldown(&self, fingerprint: &str, task_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cooldowns WHERE fingerprint = ?1 AND task_id = ?2")
            .bind(fingerprint)
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
