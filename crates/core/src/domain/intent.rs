use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dates::DateFilter;
use crate::domain::task::{TaskPriority, TaskStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    CreateTask,
    ListTasks,
    UpdateTask,
    SearchTasks,
    DeleteTask,
    CompleteTask,
    BulkDelete,
    BulkUpdate,
    BulkComplete,
    GetStatistics,
    Unclear,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTask => "CREATE_TASK",
            Self::ListTasks => "LIST_TASKS",
            Self::UpdateTask => "UPDATE_TASK",
            Self::SearchTasks => "SEARCH_TASKS",
            Self::DeleteTask => "DELETE_TASK",
            Self::CompleteTask => "COMPLETE_TASK",
            Self::BulkDelete => "BULK_DELETE",
            Self::BulkUpdate => "BULK_UPDATE",
            Self::BulkComplete => "BULK_COMPLETE",
            Self::GetStatistics => "GET_STATISTICS",
            Self::Unclear => "UNCLEAR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATE_TASK" => Some(Self::CreateTask),
            "LIST_TASKS" => Some(Self::ListTasks),
            "UPDATE_TASK" => Some(Self::UpdateTask),
            "SEARCH_TASKS" => Some(Self::SearchTasks),
            "DELETE_TASK" => Some(Self::DeleteTask),
            "COMPLETE_TASK" => Some(Self::CompleteTask),
            "BULK_DELETE" => Some(Self::BulkDelete),
            "BULK_UPDATE" => Some(Self::BulkUpdate),
            "BULK_COMPLETE" => Some(Self::BulkComplete),
            "GET_STATISTICS" => Some(Self::GetStatistics),
            "UNCLEAR" => Some(Self::Unclear),
            _ => None,
        }
    }
}

/// Task fields as the user phrased them. Dates stay textual until the
/// resolver pins them against a clock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub tags: Vec<String>,
}

impl TaskFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.due_time.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.tags.is_empty()
    }

    fn from_value(value: &Value) -> Self {
        Self {
            title: text(value, &["title", "task_title", "name"]),
            description: text(value, &["description", "details", "notes"]),
            due_date: text(value, &["due_date", "date"]),
            due_time: text(value, &["due_time", "time"]),
            priority: text(value, &["priority"]).and_then(|raw| TaskPriority::parse(&raw)),
            status: text(value, &["status"]).and_then(|raw| TaskStatus::parse(&raw)),
            tags: tags(value.get("tags")),
        }
    }

    /// Fields in `overlay` win over the ones already present.
    fn overlaid(mut self, overlay: TaskFields) -> Self {
        self.title = overlay.title.or(self.title);
        self.description = overlay.description.or(self.description);
        self.due_date = overlay.due_date.or(self.due_date);
        self.due_time = overlay.due_time.or(self.due_time);
        self.priority = overlay.priority.or(self.priority);
        self.status = overlay.status.or(self.status);
        if !overlay.tags.is_empty() {
            self.tags = overlay.tags;
        }
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListEntities {
    pub date_filter: Option<DateFilter>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkCriteria {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date_filter: Option<DateFilter>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionDirection {
    #[default]
    Complete,
    Reopen,
}

impl CompletionDirection {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incomplete" | "reopen" | "undo" | "uncomplete" | "pending" => Self::Reopen,
            _ => Self::Complete,
        }
    }
}

/// What the classifier understood, one typed variant per intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "entities", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractedIntent {
    CreateTask(TaskFields),
    ListTasks(ListEntities),
    UpdateTask { target: Option<String>, fields: TaskFields },
    SearchTasks { query: Option<String> },
    DeleteTask { target: Option<String> },
    CompleteTask { target: Option<String>, direction: CompletionDirection },
    BulkDelete { criteria: BulkCriteria },
    BulkUpdate { criteria: BulkCriteria, fields: TaskFields },
    BulkComplete { criteria: BulkCriteria },
    GetStatistics,
    Unclear,
}

impl ExtractedIntent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::CreateTask(_) => IntentKind::CreateTask,
            Self::ListTasks(_) => IntentKind::ListTasks,
            Self::UpdateTask { .. } => IntentKind::UpdateTask,
            Self::SearchTasks { .. } => IntentKind::SearchTasks,
            Self::DeleteTask { .. } => IntentKind::DeleteTask,
            Self::CompleteTask { .. } => IntentKind::CompleteTask,
            Self::BulkDelete { .. } => IntentKind::BulkDelete,
            Self::BulkUpdate { .. } => IntentKind::BulkUpdate,
            Self::BulkComplete { .. } => IntentKind::BulkComplete,
            Self::GetStatistics => IntentKind::GetStatistics,
            Self::Unclear => IntentKind::Unclear,
        }
    }

    /// Builds the typed variant for `kind` from the loosely shaped entity
    /// object a completion provider returns. Unknown or malformed values
    /// are dropped rather than rejected.
    pub fn from_entities(kind: IntentKind, entities: &Value) -> Self {
        match kind {
            IntentKind::CreateTask => Self::CreateTask(TaskFields::from_value(entities)),
            IntentKind::ListTasks => Self::ListTasks(list_entities(entities)),
            IntentKind::UpdateTask => {
                let mut fields = TaskFields::from_value(entities);
                if let Some(update_fields) = entities.get("update_fields").filter(|v| v.is_object())
                {
                    fields = fields.overlaid(TaskFields::from_value(update_fields));
                }
                // The identifier names the task; it is not a new title.
                let target = target(entities);
                if target.is_some() && fields.title == target {
                    fields.title = None;
                }
                Self::UpdateTask { target, fields }
            }
            IntentKind::SearchTasks => Self::SearchTasks {
                query: text(entities, &["search_query", "query", "keywords"]),
            },
            IntentKind::DeleteTask => Self::DeleteTask { target: target(entities) },
            IntentKind::CompleteTask => Self::CompleteTask {
                target: target(entities),
                direction: text(entities, &["completion_action", "action"])
                    .map(|raw| CompletionDirection::parse(&raw))
                    .unwrap_or_default(),
            },
            IntentKind::BulkDelete => Self::BulkDelete { criteria: bulk_criteria(entities) },
            IntentKind::BulkComplete => Self::BulkComplete { criteria: bulk_criteria(entities) },
            IntentKind::BulkUpdate => Self::BulkUpdate {
                criteria: bulk_criteria(entities),
                fields: entities
                    .get("bulk_updates")
                    .map(TaskFields::from_value)
                    .unwrap_or_default(),
            },
            IntentKind::GetStatistics => Self::GetStatistics,
            IntentKind::Unclear => Self::Unclear,
        }
    }

    pub fn create_title(&self) -> Option<&str> {
        match self {
            Self::CreateTask(fields) => fields.title.as_deref(),
            _ => None,
        }
    }

    pub fn set_create_title(&mut self, title: impl Into<String>) {
        if let Self::CreateTask(fields) = self {
            fields.title = Some(title.into());
        }
    }

    /// JSON snapshot stored alongside the assistant turn.
    pub fn entities_snapshot(&self) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("entities"),
            _ => None,
        }
    }
}

/// Transient classifier output; never persisted as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: ExtractedIntent,
    pub confidence: f64,
    pub clarification_needed: bool,
    pub clarification_question: Option<String>,
}

impl ClassificationResult {
    pub fn new(intent: ExtractedIntent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            clarification_needed: false,
            clarification_question: None,
        }
    }

    pub fn unclear() -> Self {
        Self {
            intent: ExtractedIntent::Unclear,
            confidence: 0.0,
            clarification_needed: true,
            clarification_question: None,
        }
    }

    pub fn kind(&self) -> IntentKind {
        self.intent.kind()
    }
}

fn target(entities: &Value) -> Option<String> {
    text(entities, &["task_identifier", "identifier", "task"])
}

fn list_entities(entities: &Value) -> ListEntities {
    let mut list = ListEntities::default();
    let filters: Vec<String> = match entities.get("filters") {
        Some(Value::String(raw)) => raw.split(',').map(|s| s.trim().to_owned()).collect(),
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(|s| s.trim().to_owned()).collect()
        }
        _ => Vec::new(),
    };
    for filter in &filters {
        let normalized = filter.to_ascii_lowercase().replace(' ', "_");
        if let Some(date_filter) = DateFilter::parse(&normalized) {
            list.date_filter = Some(date_filter);
        } else if normalized == "high_priority" {
            list.priority = Some(TaskPriority::High);
        } else if let Some(status) = TaskStatus::parse(&normalized) {
            list.status = Some(status);
        }
    }

    if let Some(date_filter) =
        text(entities, &["date_filter", "due_date_filter"]).and_then(|raw| DateFilter::parse(&raw))
    {
        list.date_filter = Some(date_filter);
    }
    if let Some(status) = text(entities, &["status"]).and_then(|raw| TaskStatus::parse(&raw)) {
        list.status = Some(status);
    }
    if let Some(priority) =
        text(entities, &["priority"]).and_then(|raw| TaskPriority::parse(&raw))
    {
        list.priority = Some(priority);
    }
    list
}

fn bulk_criteria(entities: &Value) -> BulkCriteria {
    let source = entities.get("bulk_criteria").filter(|v| v.is_object()).unwrap_or(entities);
    BulkCriteria {
        status: text(source, &["status"]).and_then(|raw| TaskStatus::parse(&raw)),
        priority: text(source, &["priority"]).and_then(|raw| TaskPriority::parse(&raw)),
        due_date_filter: text(source, &["due_date_filter", "date_filter"])
            .and_then(|raw| DateFilter::parse(&raw)),
    }
}

/// First non-blank string among `keys`.
fn text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

fn tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(Value::String(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        BulkCriteria, ClassificationResult, CompletionDirection, ExtractedIntent, IntentKind,
        ListEntities,
    };
    use crate::dates::DateFilter;
    use crate::domain::task::{TaskPriority, TaskStatus};

    #[test]
    fn intent_names_round_trip_through_wire_strings() {
        assert_eq!(IntentKind::parse("bulk_delete"), Some(IntentKind::BulkDelete));
        assert_eq!(IntentKind::parse("SMALL_TALK"), None);
        assert_eq!(IntentKind::GetStatistics.as_str(), "GET_STATISTICS");
    }

    #[test]
    fn create_entities_accept_comma_separated_tags() {
        let intent = ExtractedIntent::from_entities(
            IntentKind::CreateTask,
            &json!({
                "title": "Team meeting",
                "due_date": "tomorrow",
                "due_time": "2pm",
                "priority": "HIGH",
                "tags": "work, meetings"
            }),
        );

        let ExtractedIntent::CreateTask(fields) = intent else {
            panic!("expected create");
        };
        assert_eq!(fields.title.as_deref(), Some("Team meeting"));
        assert_eq!(fields.priority, Some(TaskPriority::High));
        assert_eq!(fields.tags, vec!["work", "meetings"]);
    }

    #[test]
    fn list_filters_combine_with_explicit_entities() {
        let intent = ExtractedIntent::from_entities(
            IntentKind::ListTasks,
            &json!({ "filters": ["this_week", "high_priority"], "status": "pending" }),
        );

        assert_eq!(
            intent,
            ExtractedIntent::ListTasks(ListEntities {
                date_filter: Some(DateFilter::ThisWeek),
                status: Some(TaskStatus::Pending),
                priority: Some(TaskPriority::High),
            })
        );
    }

    #[test]
    fn bulk_entities_read_nested_criteria_and_updates() {
        let intent = ExtractedIntent::from_entities(
            IntentKind::BulkUpdate,
            &json!({
                "bulk_criteria": { "status": "pending", "due_date_filter": "overdue" },
                "bulk_updates": { "priority": "urgent" }
            }),
        );

        let ExtractedIntent::BulkUpdate { criteria, fields } = intent else {
            panic!("expected bulk update");
        };
        assert_eq!(
            criteria,
            BulkCriteria {
                status: Some(TaskStatus::Pending),
                priority: None,
                due_date_filter: Some(DateFilter::Overdue),
            }
        );
        assert_eq!(fields.priority, Some(TaskPriority::Urgent));
    }

    #[test]
    fn incomplete_action_reopens() {
        let intent = ExtractedIntent::from_entities(
            IntentKind::CompleteTask,
            &json!({ "task_identifier": "report", "completion_action": "incomplete" }),
        );
        assert_eq!(
            intent,
            ExtractedIntent::CompleteTask {
                target: Some("report".to_owned()),
                direction: CompletionDirection::Reopen,
            }
        );
    }

    #[test]
    fn update_identifier_is_not_treated_as_new_title() {
        let intent = ExtractedIntent::from_entities(
            IntentKind::UpdateTask,
            &json!({
                "task_identifier": "groceries",
                "title": "groceries",
                "update_fields": { "priority": "high" }
            }),
        );

        let ExtractedIntent::UpdateTask { target, fields } = intent else {
            panic!("expected update");
        };
        assert_eq!(target.as_deref(), Some("groceries"));
        assert_eq!(fields.title, None);
        assert_eq!(fields.priority, Some(TaskPriority::High));
    }

    #[test]
    fn confidence_is_clamped_and_snapshot_omits_tag() {
        let result = ClassificationResult::new(ExtractedIntent::GetStatistics, 1.7);
        assert_eq!(result.confidence, 1.0);

        let search = ExtractedIntent::SearchTasks { query: Some("dentist".to_owned()) };
        assert_eq!(search.entities_snapshot(), Some(json!({ "query": "dentist" })));
    }
}
