use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use taskpilot_core::domain::intent::IntentKind;
use taskpilot_core::domain::session::{Session, SessionId, Turn, TurnId, TurnRole, UserId};

use super::task::{format_timestamp, parse_timestamp};
use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn ensure_session(
        &self,
        id: &SessionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_session (id, user_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&id.0)
        .bind(&user_id.0)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, user_id, created_at FROM chat_session WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        let session = Session {
            id: SessionId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        };

        if &session.user_id != user_id {
            return Err(RepositoryError::Conflict(format!(
                "session `{}` belongs to another user",
                id.0
            )));
        }
        Ok(session)
    }

    async fn append_turn(&self, turn: Turn) -> Result<(), RepositoryError> {
        let entities_json = turn
            .entities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_turn (
                id,
                session_id,
                seq,
                role,
                text,
                intent,
                entities_json,
                created_at
             )
             SELECT ?, ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?, ?
             FROM conversation_turn
             WHERE session_id = ?",
        )
        .bind(&turn.id.0)
        .bind(&turn.session_id.0)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(turn.intent.map(|intent| intent.as_str()))
        .bind(entities_json)
        .bind(format_timestamp(turn.created_at))
        .bind(&turn.session_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, seq, role, text, intent, entities_json, created_at
             FROM (
                SELECT id, session_id, seq, role, text, intent, entities_json, created_at
                FROM conversation_turn
                WHERE session_id = ?
                ORDER BY seq DESC
                LIMIT ?
             )
             ORDER BY seq ASC",
        )
        .bind(&session_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(turn_from_row).collect()
    }
}

fn turn_from_row(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = TurnRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown turn role `{role_raw}`")))?;
    let intent = row
        .try_get::<Option<String>, _>("intent")?
        .map(|raw| {
            IntentKind::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{raw}`")))
        })
        .transpose()?;
    let entities = row
        .try_get::<Option<String>, _>("entities_json")?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("invalid entities_json: {error}")))
        })
        .transpose()?;

    Ok(Turn {
        id: TurnId(row.try_get("id")?),
        session_id: SessionId(row.try_get("session_id")?),
        role,
        text: row.try_get("text")?,
        intent,
        entities,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
