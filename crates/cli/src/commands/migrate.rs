use serde_json::json;

use crate::commands::{query_failure, with_database, CommandResult};

pub fn run() -> CommandResult {
    with_database("migrate", |pool| async move {
        let applied: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&pool)
                .await
                .map_err(query_failure)?;
        Ok(("applied pending migrations".to_string(), Some(json!({ "applied_migrations": applied }))))
    })
}
