use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use taskpilot_core::audit::{AuditAction, AuditEntry};
use taskpilot_core::domain::command::{BulkAction, CommandOutcome, TaskCommand};
use taskpilot_core::domain::intent::CompletionDirection;
use taskpilot_core::domain::session::UserId;
use taskpilot_core::domain::task::{
    Task, TaskFilter, TaskId, TaskPatch, TaskStatistics, TaskStatus,
};
use taskpilot_core::errors::{ApplicationError, DomainError};
use taskpilot_db::repositories::{RepositoryError, TaskRepository, TaskWrite};

pub(crate) fn persistence_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Applies resolved commands. Every mutation is written together with its
/// audit entry in a single repository commit.
pub struct TaskExecutor {
    tasks: Arc<dyn TaskRepository>,
}

impl TaskExecutor {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    pub async fn execute(
        &self,
        owner: &UserId,
        command: TaskCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, ApplicationError> {
        match command {
            TaskCommand::Create(new_task) => {
                let task = new_task.into_task(owner.clone(), now);
                let audit = AuditEntry::created(&task, now);
                self.commit("create", vec![TaskWrite { task: task.clone(), audit }]).await?;
                Ok(CommandOutcome::Created(task))
            }
            TaskCommand::Update { task_id, patch } => {
                let task = self.fetch(owner, &task_id).await?;
                if patch.is_empty() {
                    return Ok(CommandOutcome::Updated(task));
                }
                let after = task.patched(&patch, now);
                self.commit("update", vec![write(AuditAction::Updated, &task, after.clone(), now)])
                    .await?;
                Ok(CommandOutcome::Updated(after))
            }
            TaskCommand::Complete { task_id, direction } => {
                let task = self.fetch(owner, &task_id).await?;
                let (status, action) = match direction {
                    CompletionDirection::Complete => (TaskStatus::Completed, AuditAction::Completed),
                    CompletionDirection::Reopen => (TaskStatus::Pending, AuditAction::Updated),
                };
                if task.status == status {
                    return Ok(CommandOutcome::Completed { task, direction });
                }
                let after = task.patched(&status_patch(status), now);
                self.commit("complete", vec![write(action, &task, after.clone(), now)]).await?;
                Ok(CommandOutcome::Completed { task: after, direction })
            }
            TaskCommand::Delete { task_id } => {
                let task = self.fetch(owner, &task_id).await?;
                let after = task.soft_deleted(now);
                self.commit("delete", vec![write(AuditAction::Deleted, &task, after.clone(), now)])
                    .await?;
                Ok(CommandOutcome::Deleted(after))
            }
            TaskCommand::List(filter) => {
                Ok(CommandOutcome::Listed { tasks: self.select(owner, &filter).await? })
            }
            TaskCommand::Search { query } => {
                let filter = TaskFilter { text: Some(query.clone()), ..TaskFilter::default() };
                let tasks = self.select(owner, &filter).await?;
                Ok(CommandOutcome::Searched { query, tasks })
            }
            TaskCommand::Statistics => {
                let tasks = self.select(owner, &TaskFilter::default()).await?;
                Ok(CommandOutcome::Statistics(TaskStatistics::from_tasks(&tasks, now)))
            }
            TaskCommand::BulkUpdate { criteria, patch } => {
                let writes = self
                    .select(owner, &criteria)
                    .await?
                    .into_iter()
                    .map(|task| {
                        let after = task.patched(&patch, now);
                        write(AuditAction::Updated, &task, after, now)
                    })
                    .collect();
                self.bulk(BulkAction::Update, writes).await
            }
            TaskCommand::BulkDelete { criteria } => {
                let writes = self
                    .select(owner, &criteria)
                    .await?
                    .into_iter()
                    .map(|task| {
                        let after = task.soft_deleted(now);
                        write(AuditAction::Deleted, &task, after, now)
                    })
                    .collect();
                self.bulk(BulkAction::Delete, writes).await
            }
            TaskCommand::BulkComplete { criteria } => {
                let completed = status_patch(TaskStatus::Completed);
                let writes = self
                    .select(owner, &criteria)
                    .await?
                    .into_iter()
                    .filter(|task| task.status != TaskStatus::Completed)
                    .map(|task| {
                        let after = task.patched(&completed, now);
                        write(AuditAction::Completed, &task, after, now)
                    })
                    .collect();
                self.bulk(BulkAction::Complete, writes).await
            }
        }
    }

    async fn fetch(&self, owner: &UserId, task_id: &TaskId) -> Result<Task, ApplicationError> {
        self.tasks
            .find_by_id(owner, task_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| DomainError::TaskNotFound { identifier: task_id.0.clone() }.into())
    }

    async fn select(
        &self,
        owner: &UserId,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, ApplicationError> {
        self.tasks.list_by_filter(owner, filter).await.map_err(persistence_error)
    }

    async fn bulk(
        &self,
        action: BulkAction,
        writes: Vec<TaskWrite>,
    ) -> Result<CommandOutcome, ApplicationError> {
        let affected = writes.len();
        if affected > 0 {
            self.commit("bulk", writes).await?;
        }
        Ok(CommandOutcome::Bulk { action, affected })
    }

    async fn commit(
        &self,
        operation: &'static str,
        writes: Vec<TaskWrite>,
    ) -> Result<(), ApplicationError> {
        let affected = writes.len();
        self.tasks.commit(writes).await.map_err(persistence_error)?;
        info!(event_name = "agent.executor.committed", operation, affected, "task changes committed");
        Ok(())
    }
}

fn write(action: AuditAction, before: &Task, after: Task, now: DateTime<Utc>) -> TaskWrite {
    let audit = AuditEntry::changed(action, before, &after, now);
    TaskWrite { task: after, audit }
}

fn status_patch(status: TaskStatus) -> TaskPatch {
    TaskPatch { status: Some(status), ..TaskPatch::default() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use taskpilot_core::audit::AuditAction;
    use taskpilot_core::domain::command::{BulkAction, CommandOutcome, TaskCommand};
    use taskpilot_core::domain::intent::CompletionDirection;
    use taskpilot_core::domain::session::UserId;
    use taskpilot_core::domain::task::{
        NewTask, Task, TaskFilter, TaskPatch, TaskPriority, TaskStatus,
    };
    use taskpilot_core::errors::ApplicationError;
    use taskpilot_db::repositories::InMemoryTaskRepository;

    use super::TaskExecutor;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 45, 12).single().expect("timestamp")
    }

    fn owner() -> UserId {
        UserId("u-1".to_owned())
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_owned(),
            description: None,
            priority: TaskPriority::Medium,
            due_at: None,
            tags: Vec::new(),
        }
    }

    async fn create(executor: &TaskExecutor, title: &str, at: DateTime<Utc>) -> Task {
        match executor.execute(&owner(), TaskCommand::Create(new_task(title)), at).await {
            Ok(CommandOutcome::Created(task)) => task,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_mutation_writes_one_matching_audit_entry() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let task = create(&executor, "pay rent", now()).await;

        let later = now() + Duration::minutes(5);
        let outcome = executor
            .execute(
                &owner(),
                TaskCommand::Update {
                    task_id: task.id.clone(),
                    patch: TaskPatch { priority: Some(TaskPriority::High), ..TaskPatch::default() },
                },
                later,
            )
            .await
            .expect("update");
        let CommandOutcome::Updated(updated) = outcome else {
            panic!("expected update");
        };

        let audit = repo.audit_entries().await;
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::Created);
        assert_eq!(audit[0].before, None);
        assert_eq!(audit[0].after.as_ref(), Some(&task));
        assert_eq!(audit[1].action, AuditAction::Updated);
        assert_eq!(audit[1].before.as_ref(), Some(&task));
        assert_eq!(audit[1].after.as_ref(), Some(&updated));
        assert_eq!(updated.updated_at, later);
    }

    #[tokio::test]
    async fn empty_patch_is_a_no_op() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let task = create(&executor, "pay rent", now()).await;

        let outcome = executor
            .execute(
                &owner(),
                TaskCommand::Update { task_id: task.id.clone(), patch: TaskPatch::default() },
                now(),
            )
            .await
            .expect("update");

        assert_eq!(outcome, CommandOutcome::Updated(task));
        assert_eq!(repo.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn complete_then_reopen_tracks_completion_time() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let task = create(&executor, "file taxes", now()).await;

        let completed = executor
            .execute(
                &owner(),
                TaskCommand::Complete {
                    task_id: task.id.clone(),
                    direction: CompletionDirection::Complete,
                },
                now(),
            )
            .await
            .expect("complete");
        let CommandOutcome::Completed { task: completed, .. } = completed else {
            panic!("expected completion");
        };
        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.completed_at, Some(now()));

        let reopened = executor
            .execute(
                &owner(),
                TaskCommand::Complete {
                    task_id: task.id.clone(),
                    direction: CompletionDirection::Reopen,
                },
                now(),
            )
            .await
            .expect("reopen");
        let CommandOutcome::Completed { task: reopened, .. } = reopened else {
            panic!("expected completion outcome");
        };
        assert_eq!(reopened.status, TaskStatus::Pending);
        assert_eq!(reopened.completed_at, None);

        let actions =
            repo.audit_entries().await.into_iter().map(|entry| entry.action).collect::<Vec<_>>();
        assert_eq!(
            actions,
            vec![AuditAction::Created, AuditAction::Completed, AuditAction::Updated]
        );
    }

    #[tokio::test]
    async fn delete_is_soft_and_hidden_from_reads() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let task = create(&executor, "old chore", now()).await;

        executor
            .execute(&owner(), TaskCommand::Delete { task_id: task.id.clone() }, now())
            .await
            .expect("delete");

        let listed = executor
            .execute(&owner(), TaskCommand::List(TaskFilter::default()), now())
            .await
            .expect("list");
        assert_eq!(listed, CommandOutcome::Listed { tasks: Vec::new() });
        let stored = repo.snapshot().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].deleted_at, Some(now()));
    }

    #[tokio::test]
    async fn bulk_complete_skips_completed_and_counts_rows() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let done = create(&executor, "done already", now()).await;
        create(&executor, "still open", now() + Duration::seconds(1)).await;
        executor
            .execute(
                &owner(),
                TaskCommand::Complete { task_id: done.id, direction: CompletionDirection::Complete },
                now(),
            )
            .await
            .expect("complete");

        let outcome = executor
            .execute(&owner(), TaskCommand::BulkComplete { criteria: TaskFilter::default() }, now())
            .await
            .expect("bulk");

        assert_eq!(outcome, CommandOutcome::Bulk { action: BulkAction::Complete, affected: 1 });
        assert_eq!(repo.audit_entries().await.len(), 4);
    }

    #[tokio::test]
    async fn bulk_with_no_matches_succeeds_with_zero() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        let criteria = TaskFilter { status: Some(TaskStatus::Cancelled), ..TaskFilter::default() };

        let outcome = executor
            .execute(&owner(), TaskCommand::BulkDelete { criteria }, now())
            .await
            .expect("bulk");

        assert_eq!(outcome, CommandOutcome::Bulk { action: BulkAction::Delete, affected: 0 });
        assert!(repo.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_a_persistence_error_and_writes_nothing() {
        let repo = Arc::new(InMemoryTaskRepository::default());
        let executor = TaskExecutor::new(repo.clone());
        repo.fail_commits(true);

        let error = executor
            .execute(&owner(), TaskCommand::Create(new_task("doomed")), now())
            .await
            .expect_err("commit fails");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert!(repo.snapshot().await.is_empty());
        assert!(repo.audit_entries().await.is_empty());
    }
}
