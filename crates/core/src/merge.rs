use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::{Task, TaskPatch, TaskPriority, TaskStatus};

/// Validated field values extracted from one message, before they are
/// reconciled with a task's current state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.as_deref().map_or(true, |text| text.trim().is_empty())
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_at.is_none()
            && self.tags.is_empty()
    }

    /// Plain overwrite used for bulk updates: every present field replaces
    /// the current value, tags included.
    pub fn into_overwrite_patch(self) -> TaskPatch {
        TaskPatch {
            title: self.title,
            description: self
                .description
                .filter(|text| !text.trim().is_empty())
                .map(|text| Some(text.trim().to_owned())),
            status: self.status,
            priority: self.priority,
            due_at: self.due_at.map(Some),
            tags: if self.tags.is_empty() { None } else { Some(self.tags) },
        }
    }
}

/// Reconciles incoming free text with what a field already holds.
///
/// Returns the merged value; `existing` comes back unchanged when the new
/// text adds nothing.
pub fn merge_text(existing: Option<&str>, incoming: &str) -> Option<String> {
    let incoming = incoming.trim();
    let existing = existing.map(str::trim).filter(|text| !text.is_empty());
    if incoming.is_empty() {
        return existing.map(str::to_owned);
    }
    let Some(existing) = existing else {
        return Some(incoming.to_owned());
    };

    let existing_lower = existing.to_lowercase();
    let incoming_lower = incoming.to_lowercase();
    if existing_lower.contains(&incoming_lower) {
        Some(existing.to_owned())
    } else if incoming_lower.contains(&existing_lower) {
        Some(incoming.to_owned())
    } else {
        Some(format!("{existing}\n\n{incoming}"))
    }
}

/// Union keeping the existing order, then new tags not already present.
pub fn merge_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for tag in incoming {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// Builds the diff for a conversational update. Fields whose merged value
/// equals the current one are left out of the patch.
pub fn merge_update(task: &Task, update: &FieldUpdate) -> TaskPatch {
    let mut patch = TaskPatch::default();

    if let Some(title) = update.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if title != task.title {
            patch.title = Some(title.to_owned());
        }
    }

    if let Some(incoming) = update.description.as_deref() {
        let merged = merge_text(task.description.as_deref(), incoming);
        if merged != task.description {
            patch.description = Some(merged);
        }
    }

    if let Some(status) = update.status.filter(|status| *status != task.status) {
        patch.status = Some(status);
    }
    if let Some(priority) = update.priority.filter(|priority| *priority != task.priority) {
        patch.priority = Some(priority);
    }
    if let Some(due_at) = update.due_at.filter(|due_at| Some(*due_at) != task.due_at) {
        patch.due_at = Some(Some(due_at));
    }

    if !update.tags.is_empty() {
        let merged = merge_tags(&task.tags, &update.tags);
        if merged != task.tags {
            patch.tags = Some(merged);
        }
    }

    patch
}
