use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::IntentKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One immutable message in a session's ordered history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub session_id: SessionId,
    pub role: TurnRole,
    pub text: String,
    pub intent: Option<IntentKind>,
    pub entities: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(session_id: SessionId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TurnId(Uuid::new_v4().to_string()),
            session_id,
            role: TurnRole::User,
            text: text.into(),
            intent: None,
            entities: None,
            created_at,
        }
    }

    pub fn assistant(
        session_id: SessionId,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TurnId(Uuid::new_v4().to_string()),
            session_id,
            role: TurnRole::Assistant,
            text: text.into(),
            intent: None,
            entities: None,
            created_at,
        }
    }

    pub fn with_intent(mut self, intent: IntentKind) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_entities(mut self, entities: serde_json::Value) -> Self {
        self.entities = Some(entities);
        self
    }
}
