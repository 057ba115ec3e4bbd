use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::UserId;
use crate::errors::ValidationError;

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Lenient parse used for both stored values and model output.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(&['-', ' '][..], "_");
        match normalized.as_str() {
            "pending" | "todo" | "open" => Some(Self::Pending),
            "in_progress" | "started" => Some(Self::InProgress),
            "completed" | "complete" | "done" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: UserId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_at.is_some_and(|due| due < now)
    }

    /// Returns a copy with `patch` applied. Completion time follows the status.
    pub fn patched(&self, patch: &TaskPatch, now: DateTime<Utc>) -> Task {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(due_at) = patch.due_at {
            next.due_at = due_at;
        }
        if let Some(tags) = &patch.tags {
            next.tags = tags.clone();
        }
        if let Some(status) = patch.status {
            if status != self.status {
                next.completed_at =
                    if status == TaskStatus::Completed { Some(now) } else { None };
            }
            next.status = status;
        }
        next.updated_at = now;
        next
    }

    pub fn soft_deleted(&self, now: DateTime<Utc>) -> Task {
        let mut next = self.clone();
        next.deleted_at = Some(now);
        next.updated_at = now;
        next
    }
}

/// Validated fields for a task that does not exist yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn into_task(self, owner: UserId, now: DateTime<Utc>) -> Task {
        Task {
            id: TaskId::generate(),
            owner,
            title: self.title,
            description: self.description,
            status: TaskStatus::Pending,
            priority: self.priority,
            due_at: self.due_at,
            tags: self.tags,
            created_at: now,
            updated_at: now,
            completed_at: None,
            deleted_at: None,
        }
    }
}

/// Field diff for an existing task. `None` leaves a field untouched; the
/// nested `Option` on nullable fields distinguishes "clear" from "keep".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_at.is_none()
            && self.tags.is_none()
    }
}

/// Owner-scoped selection of live tasks. Also serves as bulk criteria.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub tags: Vec<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if task.is_deleted() {
            return false;
        }
        if self.status.is_some_and(|status| status != task.status) {
            return false;
        }
        if self.priority.is_some_and(|priority| priority != task.priority) {
            return false;
        }
        if let Some(after) = self.due_after {
            if !task.due_at.is_some_and(|due| due >= after) {
                return false;
            }
        }
        if let Some(before) = self.due_before {
            if !task.due_at.is_some_and(|due| due < before) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !text_matches(task, text) {
                return false;
            }
        }
        self.tags.iter().all(|tag| task.tags.iter().any(|existing| existing == tag))
    }
}

/// Case-insensitive substring match on title or description.
pub fn text_matches(task: &Task, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    task.title.to_lowercase().contains(&needle)
        || task.description.as_deref().is_some_and(|value| value.to_lowercase().contains(&needle))
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub cancelled_tasks: usize,
    pub open_high_priority_tasks: usize,
    pub overdue_tasks: usize,
    pub low_priority: usize,
    pub medium_priority: usize,
    pub high_priority: usize,
    pub urgent_priority: usize,
    pub completion_rate: f64,
}

impl TaskStatistics {
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let count_status = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let count_priority =
            |priority: TaskPriority| tasks.iter().filter(|t| t.priority == priority).count();

        let total_tasks = tasks.len();
        let completed_tasks = count_status(TaskStatus::Completed);
        let completion_rate = if total_tasks == 0 {
            0.0
        } else {
            let raw = completed_tasks as f64 / total_tasks as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        Self {
            total_tasks,
            pending_tasks: count_status(TaskStatus::Pending),
            in_progress_tasks: count_status(TaskStatus::InProgress),
            completed_tasks,
            cancelled_tasks: count_status(TaskStatus::Cancelled),
            open_high_priority_tasks: tasks
                .iter()
                .filter(|t| {
                    matches!(t.priority, TaskPriority::High | TaskPriority::Urgent)
                        && t.status != TaskStatus::Completed
                })
                .count(),
            overdue_tasks: tasks.iter().filter(|t| t.is_overdue(now)).count(),
            low_priority: count_priority(TaskPriority::Low),
            medium_priority: count_priority(TaskPriority::Medium),
            high_priority: count_priority(TaskPriority::High),
            urgent_priority: count_priority(TaskPriority::Urgent),
            completion_rate,
        }
    }
}

pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let length = title.chars().count();
    if length > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong { max: MAX_TITLE_CHARS, actual: length });
    }
    Ok(title.to_string())
}

/// Trims, lowercases and dedupes tags; drops empty or oversized ones.
pub fn normalize_tags<I, S>(raw: I) -> Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim().trim_start_matches('#').to_lowercase();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_CHARS || tags.contains(&tag) {
            continue;
        }
        tags.push(tag);
    }
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::TooManyTags { max: MAX_TAGS, actual: tags.len() });
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        normalize_tags, validate_title, NewTask, TaskFilter, TaskPatch, TaskPriority,
        TaskStatistics, TaskStatus,
    };
    use crate::domain::session::UserId;
    use crate::errors::ValidationError;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).single().expect("valid timestamp")
    }

    fn task(title: &str) -> super::Task {
        NewTask {
            title: title.to_string(),
            description: None,
            priority: TaskPriority::Medium,
            due_at: None,
            tags: Vec::new(),
        }
        .into_task(UserId("u-1".to_string()), now())
    }

    #[test]
    fn blank_title_is_rejected() {
        assert_eq!(validate_title("   "), Err(ValidationError::EmptyTitle));
        assert_eq!(validate_title("  buy milk ").as_deref(), Ok("buy milk"));
    }

    #[test]
    fn overlong_title_is_rejected() {
        let title = "x".repeat(256);
        assert!(matches!(
            validate_title(&title),
            Err(ValidationError::TitleTooLong { max: 255, actual: 256 })
        ));
    }

    #[test]
    fn tags_are_normalized_and_deduplicated() {
        let tags = normalize_tags(["Work", " work ", "#Home", ""]).expect("valid tags");
        assert_eq!(tags, vec!["work".to_string(), "home".to_string()]);

        let too_many = (0..21).map(|index| format!("tag-{index}")).collect::<Vec<_>>();
        assert!(matches!(normalize_tags(too_many), Err(ValidationError::TooManyTags { .. })));
    }

    #[test]
    fn status_parse_accepts_common_spellings() {
        assert_eq!(TaskStatus::parse("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("whenever"), None);
        assert_eq!(TaskPriority::parse("URGENT"), Some(TaskPriority::Urgent));
    }

    #[test]
    fn completing_through_patch_stamps_completion_time() {
        let original = task("write report");
        let later = now() + chrono::Duration::hours(1);
        let patch = TaskPatch { status: Some(TaskStatus::Completed), ..TaskPatch::default() };

        let completed = original.patched(&patch, later);
        assert_eq!(completed.completed_at, Some(later));
        assert_eq!(completed.updated_at, later);

        let reopened = completed
            .patched(&TaskPatch { status: Some(TaskStatus::Pending), ..TaskPatch::default() }, later);
        assert_eq!(reopened.completed_at, None);
    }

    #[test]
    fn filter_excludes_deleted_and_applies_due_window() {
        let mut due_soon = task("pay rent");
        due_soon.due_at = Some(now() + chrono::Duration::hours(2));
        let deleted = task("old").soft_deleted(now());

        let filter = TaskFilter {
            due_after: Some(now()),
            due_before: Some(now() + chrono::Duration::days(1)),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&due_soon));
        assert!(!filter.matches(&task("no due date")));
        assert!(!TaskFilter::default().matches(&deleted));
    }

    #[test]
    fn statistics_report_completion_rate_and_overdue() {
        let mut done = task("done");
        done.status = TaskStatus::Completed;
        let mut late = task("late");
        late.due_at = Some(now() - chrono::Duration::days(1));
        late.priority = TaskPriority::Urgent;
        let open = task("open");

        let stats = TaskStatistics::from_tasks(&[done, late, open], now());
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.overdue_tasks, 1);
        assert_eq!(stats.open_high_priority_tasks, 1);
        assert_eq!(stats.completion_rate, 33.33);
    }
}
