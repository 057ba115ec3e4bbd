use serde_json::json;
use taskpilot_core::domain::session::SessionId;
use taskpilot_db::{SessionRepository, SqlSessionRepository};

use crate::commands::{query_failure, with_database, CommandResult};

pub fn run(session: &str, limit: usize) -> CommandResult {
    let session_id = SessionId(session.to_string());
    with_database("history", |pool| async move {
        let repository = SqlSessionRepository::new(pool);
        let turns =
            repository.recent_turns(&session_id, limit).await.map_err(query_failure)?;
        Ok((
            format!("{} turn(s) in session `{}`", turns.len(), session_id.0),
            Some(json!({ "turns": turns })),
        ))
    })
}
