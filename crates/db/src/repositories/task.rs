use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use taskpilot_core::audit::{AuditAction, AuditEntry, AuditEntryId};
use taskpilot_core::domain::session::UserId;
use taskpilot_core::domain::task::{
    text_matches, Task, TaskFilter, TaskId, TaskPriority, TaskStatus,
};

use super::{AuditLog, RepositoryError, TaskRepository, TaskWrite};
use crate::DbPool;

const TASK_COLUMNS: &str = "id, owner_id, title, description, status, priority, due_at, tags_json,
    created_at, updated_at, completed_at, deleted_at";

const AUDIT_COLUMNS: &str = "id, task_id, user_id, action, before_json, after_json, occurred_at";

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn find_by_id(
        &self,
        owner: &UserId,
        id: &TaskId,
    ) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS}
             FROM task
             WHERE id = ? AND owner_id = ? AND deleted_at IS NULL"
        ))
        .bind(&id.0)
        .bind(&owner.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_from_row).transpose()
    }

    async fn match_identifier(
        &self,
        owner: &UserId,
        identifier: &str,
    ) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS}
             FROM task
             WHERE owner_id = ? AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        // SQLite LIKE folds ASCII only, so the substring check runs on decoded rows.
        let tasks = rows.into_iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(tasks.into_iter().filter(|task| text_matches(task, identifier)).collect())
    }

    async fn list_by_filter(
        &self,
        owner: &UserId,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE deleted_at IS NULL AND owner_id = "
        ));
        query.push_bind(owner.0.clone());

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(after) = filter.due_after {
            query.push(" AND due_at >= ").push_bind(format_timestamp(after));
        }
        if let Some(before) = filter.due_before {
            query.push(" AND due_at < ").push_bind(format_timestamp(before));
        }
        query.push(" ORDER BY due_at IS NULL, due_at ASC, created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let tasks = rows.into_iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?;

        // Text and tag containment are checked on the decoded rows.
        Ok(tasks.into_iter().filter(|task| filter.matches(task)).collect())
    }

    async fn recent(&self, owner: &UserId, limit: usize) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS}
             FROM task
             WHERE owner_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(&owner.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }

    async fn commit(&self, writes: Vec<TaskWrite>) -> Result<(), RepositoryError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for write in &writes {
            let task = &write.task;
            let tags_json = serde_json::to_string(&task.tags)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            let written = sqlx::query(
                "INSERT INTO task (
                    id,
                    owner_id,
                    title,
                    description,
                    status,
                    priority,
                    due_at,
                    tags_json,
                    created_at,
                    updated_at,
                    completed_at,
                    deleted_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    status = excluded.status,
                    priority = excluded.priority,
                    due_at = excluded.due_at,
                    tags_json = excluded.tags_json,
                    updated_at = excluded.updated_at,
                    completed_at = excluded.completed_at,
                    deleted_at = excluded.deleted_at
                 WHERE task.deleted_at IS NULL AND task.owner_id = excluded.owner_id",
            )
            .bind(&task.id.0)
            .bind(&task.owner.0)
            .bind(&task.title)
            .bind(task.description.as_deref())
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(task.due_at.map(format_timestamp))
            .bind(tags_json)
            .bind(format_timestamp(task.created_at))
            .bind(format_timestamp(task.updated_at))
            .bind(task.completed_at.map(format_timestamp))
            .bind(task.deleted_at.map(format_timestamp))
            .execute(&mut *tx)
            .await?;
            if written.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "task `{}` is deleted or owned by another user",
                    task.id.0
                )));
            }

            let audit = &write.audit;
            sqlx::query(
                "INSERT INTO task_audit (
                    id,
                    task_id,
                    user_id,
                    action,
                    before_json,
                    after_json,
                    occurred_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&audit.id.0)
            .bind(&audit.task_id.0)
            .bind(&audit.user_id.0)
            .bind(audit.action.as_str())
            .bind(snapshot_json(audit.before.as_ref())?)
            .bind(snapshot_json(audit.after.as_ref())?)
            .bind(format_timestamp(audit.occurred_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl AuditLog for SqlTaskRepository {
    async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS}
             FROM task_audit
             WHERE task_id = ?
             ORDER BY occurred_at ASC, rowid ASC"
        ))
        .bind(&task_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(audit_from_row).collect()
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS}
             FROM task_audit
             WHERE user_id = ?
             ORDER BY occurred_at DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(&user_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(audit_from_row).collect()
    }
}

fn task_from_row(row: SqliteRow) -> Result<Task, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_raw}`")))?;
    let priority_raw: String = row.try_get("priority")?;
    let priority = TaskPriority::parse(&priority_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown task priority `{priority_raw}`"))
    })?;
    let tags_raw: String = row.try_get("tags_json")?;
    let tags = serde_json::from_str::<Vec<String>>(&tags_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid tags_json: {error}")))?;

    Ok(Task {
        id: TaskId(row.try_get("id")?),
        owner: UserId(row.try_get("owner_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status,
        priority,
        due_at: parse_optional_timestamp("due_at", row.try_get("due_at")?)?,
        tags,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        deleted_at: parse_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}

fn audit_from_row(row: SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let action_raw: String = row.try_get("action")?;
    let action = AuditAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action_raw}`")))?;

    Ok(AuditEntry {
        id: AuditEntryId(row.try_get("id")?),
        task_id: TaskId(row.try_get("task_id")?),
        user_id: UserId(row.try_get("user_id")?),
        action,
        before: parse_snapshot("before_json", row.try_get("before_json")?)?,
        after: parse_snapshot("after_json", row.try_get("after_json")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn snapshot_json(task: Option<&Task>) -> Result<Option<String>, RepositoryError> {
    task.map(|task| {
        serde_json::to_string(task).map_err(|error| RepositoryError::Decode(error.to_string()))
    })
    .transpose()
}

fn parse_snapshot(column: &str, value: Option<String>) -> Result<Option<Task>, RepositoryError> {
    value
        .map(|raw| {
            serde_json::from_str::<Task>(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid snapshot in `{column}`: {error}"))
            })
        })
        .transpose()
}

/// Fixed-width UTC form so stored timestamps order lexicographically.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
