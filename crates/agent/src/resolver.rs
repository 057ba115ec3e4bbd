use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use taskpilot_core::dates::{resolve_due, DateFilter};
use taskpilot_core::domain::command::TaskCommand;
use taskpilot_core::domain::intent::{BulkCriteria, ExtractedIntent, ListEntities, TaskFields};
use taskpilot_core::domain::session::UserId;
use taskpilot_core::domain::task::{
    normalize_tags, validate_title, NewTask, Task, TaskFilter,
};
use taskpilot_core::errors::{ApplicationError, DomainError, ValidationError};
use taskpilot_core::merge::{merge_update, FieldUpdate};
use taskpilot_db::repositories::TaskRepository;

use crate::context::ConversationContext;
use crate::executor::persistence_error;

/// Turns a typed intent into a command against concrete task ids and
/// absolute time windows. Reads the repository but never writes.
pub struct CommandResolver {
    tasks: Arc<dyn TaskRepository>,
}

impl CommandResolver {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    pub async fn resolve(
        &self,
        owner: &UserId,
        intent: ExtractedIntent,
        context: &ConversationContext,
        now: DateTime<Utc>,
    ) -> Result<TaskCommand, ApplicationError> {
        let command = match intent {
            ExtractedIntent::CreateTask(fields) => TaskCommand::Create(new_task(fields, now)?),
            ExtractedIntent::UpdateTask { target, fields } => {
                let task = self.target(owner, target.as_deref(), context, "update").await?;
                let update = field_update(fields, now)?;
                TaskCommand::Update { task_id: task.id.clone(), patch: merge_update(&task, &update) }
            }
            ExtractedIntent::CompleteTask { target, direction } => {
                let task = self.target(owner, target.as_deref(), context, "complete").await?;
                TaskCommand::Complete { task_id: task.id, direction }
            }
            ExtractedIntent::DeleteTask { target } => {
                let task = self.target(owner, target.as_deref(), context, "delete").await?;
                TaskCommand::Delete { task_id: task.id }
            }
            ExtractedIntent::ListTasks(entities) => TaskCommand::List(list_filter(entities, now)),
            ExtractedIntent::SearchTasks { query } => {
                let query = query
                    .map(|query| query.trim().to_owned())
                    .filter(|query| !query.is_empty())
                    .ok_or(ValidationError::EmptySearchQuery)?;
                TaskCommand::Search { query }
            }
            ExtractedIntent::GetStatistics => TaskCommand::Statistics,
            ExtractedIntent::BulkDelete { criteria } => {
                TaskCommand::BulkDelete { criteria: criteria_filter(criteria, now) }
            }
            ExtractedIntent::BulkComplete { criteria } => {
                TaskCommand::BulkComplete { criteria: criteria_filter(criteria, now) }
            }
            ExtractedIntent::BulkUpdate { criteria, fields } => {
                let update = field_update(fields, now)?;
                if update.is_empty() {
                    return Err(ValidationError::EmptyBulkUpdate.into());
                }
                TaskCommand::BulkUpdate {
                    criteria: criteria_filter(criteria, now),
                    patch: update.into_overwrite_patch(),
                }
            }
            ExtractedIntent::Unclear => {
                return Err(ApplicationError::Integration(
                    "an UNCLEAR intent cannot be resolved to a command".to_owned(),
                ))
            }
        };

        info!(event_name = "agent.resolver.resolved", command = command.name(), "command resolved");
        Ok(command)
    }

    /// Fuzzy identifier match when one is given, otherwise the most recent
    /// task from the context. The first of several matches wins.
    async fn target(
        &self,
        owner: &UserId,
        identifier: Option<&str>,
        context: &ConversationContext,
        action: &str,
    ) -> Result<Task, ApplicationError> {
        let Some(identifier) = identifier else {
            let recent = context
                .most_recent_task()
                .ok_or_else(|| DomainError::MissingTarget { action: action.to_owned() })?;
            return self
                .tasks
                .find_by_id(owner, &recent.id)
                .await
                .map_err(persistence_error)?
                .ok_or_else(|| {
                    DomainError::TaskNotFound { identifier: recent.title.clone() }.into()
                });
        };

        let matches =
            self.tasks.match_identifier(owner, identifier).await.map_err(persistence_error)?;
        if matches.len() > 1 {
            warn!(
                event_name = "agent.resolver.ambiguous_target",
                identifier,
                match_count = matches.len(),
                chosen_task_id = %matches[0].id.0,
                "identifier matched several tasks; using the oldest"
            );
        }
        matches.into_iter().next().ok_or_else(|| {
            DomainError::TaskNotFound { identifier: identifier.to_owned() }.into()
        })
    }
}

fn new_task(fields: TaskFields, now: DateTime<Utc>) -> Result<NewTask, ValidationError> {
    let title = validate_title(fields.title.as_deref().unwrap_or_default())?;
    Ok(NewTask {
        title,
        description: non_blank(fields.description),
        priority: fields.priority.unwrap_or_default(),
        due_at: resolve_due(fields.due_date.as_deref(), fields.due_time.as_deref(), now),
        tags: normalize_tags(&fields.tags)?,
    })
}

fn field_update(fields: TaskFields, now: DateTime<Utc>) -> Result<FieldUpdate, ValidationError> {
    let title = match non_blank(fields.title) {
        Some(title) => Some(validate_title(&title)?),
        None => None,
    };
    Ok(FieldUpdate {
        title,
        description: non_blank(fields.description),
        status: fields.status,
        priority: fields.priority,
        due_at: resolve_due(fields.due_date.as_deref(), fields.due_time.as_deref(), now),
        tags: normalize_tags(&fields.tags)?,
    })
}

fn list_filter(entities: ListEntities, now: DateTime<Utc>) -> TaskFilter {
    let (due_after, due_before) = window(entities.date_filter, now);
    TaskFilter {
        status: entities.status,
        priority: entities.priority,
        due_after,
        due_before,
        ..TaskFilter::default()
    }
}

fn criteria_filter(criteria: BulkCriteria, now: DateTime<Utc>) -> TaskFilter {
    let (due_after, due_before) = window(criteria.due_date_filter, now);
    TaskFilter {
        status: criteria.status,
        priority: criteria.priority,
        due_after,
        due_before,
        ..TaskFilter::default()
    }
}

fn window(
    filter: Option<DateFilter>,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    filter.map(|filter| filter.range(now)).unwrap_or((None, None))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty())
}
