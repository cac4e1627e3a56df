use chrono::{DateTime, Utc};
use sqlx::Row;

use loa_core::domain::transaction::TransactionId;

use super::{ActionIdempotencyRepository, RecordedAction, RepositoryError};
use crate::DbPool;

pub struct SqlActionIdempotencyRepository {
    pool: DbPool,
}

impl SqlActionIdempotencyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<RecordedAction, RepositoryError> {
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let transaction_id: String =
        row.try_get("transaction_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor_id: String =
        row.try_get("actor_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decision: String =
        row.try_get("decision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome_json: String =
        row.try_get("outcome_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(RecordedAction {
        request_id,
        transaction_id: TransactionId(transaction_id),
        actor_id,
        decision,
        outcome_json,
        created_at,
    })
}

#[async_trait::async_trait]
impl ActionIdempotencyRepository for SqlActionIdempotencyRepository {
    async fn find(&self, request_id: &str) -> Result<Option<RecordedAction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, transaction_id, actor_id, decision, outcome_json, created_at
             FROM action_idempotency WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    async fn record(&self, record: RecordedAction) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO action_idempotency (request_id, transaction_id, actor_id, decision,
                                             outcome_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(&record.request_id)
        .bind(&record.transaction_id.0)
        .bind(&record.actor_id)
        .bind(&record.decision)
        .bind(&record.outcome_json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use loa_core::domain::transaction::TransactionId;

    use super::SqlActionIdempotencyRepository;
    use crate::repositories::{ActionIdempotencyRepository, RecordedAction};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_record(request_id: &str) -> RecordedAction {
        RecordedAction {
            request_id: request_id.to_string(),
            transaction_id: TransactionId("TX-001".to_string()),
            actor_id: "u-a1".to_string(),
            decision: "approve".to_string(),
            outcome_json: r#"{"status":"approved"}"#.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_and_find_replays_the_stored_outcome() {
        let pool = setup().await;
        let repo = SqlActionIdempotencyRepository::new(pool);

        repo.record(sample_record("req-1")).await.expect("record");

        let found = repo.find("req-1").await.expect("find").expect("should exist");
        assert_eq!(found.outcome_json, r#"{"status":"approved"}"#);
        assert!(repo.find("req-2").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn first_write_wins_for_a_request_id() {
        let pool = setup().await;
        let repo = SqlActionIdempotencyRepository::new(pool);

        repo.record(sample_record("req-1")).await.expect("record");

        let mut second = sample_record("req-1");
        second.outcome_json = r#"{"status":"rejected"}"#.to_string();
        repo.record(second).await.expect("conflicting record is a no-op");

        let found = repo.find("req-1").await.expect("find").expect("should exist");
        assert_eq!(found.outcome_json, r#"{"status":"approved"}"#);
    }
}
