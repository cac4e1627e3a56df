use chrono::{DateTime, Utc};
use sqlx::Row;

use loa_core::domain::chain::{Chain, Decision, SlotInstance, SlotName};
use loa_core::domain::identity::UserId;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::transaction::{Transaction, TransactionId, TransactionType};

use super::{RepositoryError, TransactionRepository};
use crate::repositories::tier::parse_amount;
use crate::DbPool;

pub struct SqlTransactionRepository {
    pool: DbPool,
}

impl SqlTransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_slot(row: &sqlx::sqlite::SqliteRow) -> Result<SlotInstance, RepositoryError> {
    let slot: String = row.try_get("slot").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assignee: Option<String> =
        row.try_get("assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decision: String =
        row.try_get("decision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let remarks: Option<String> =
        row.try_get("remarks").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(SlotInstance {
        slot: SlotName::parse(&slot)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown slot `{slot}`")))?,
        assignee: assignee.map(UserId),
        decision: Decision::parse(&decision)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision}`")))?,
        decided_at: decided_at.as_deref().map(parse_timestamp),
        remarks,
    })
}

fn row_to_transaction(
    row: &sqlx::sqlite::SqliteRow,
    slots: Vec<SlotInstance>,
) -> Result<Transaction, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let division: String =
        row.try_get("division").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tx_type: String =
        row.try_get("tx_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let chain_version: i64 =
        row.try_get("chain_version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cursor_position: Option<i64> =
        row.try_get("cursor_position").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let version = u32::try_from(chain_version)
        .map_err(|_| RepositoryError::Decode(format!("invalid chain version {chain_version}")))?;
    let cursor = cursor_position
        .map(|position| {
            usize::try_from(position).map_err(|_| {
                RepositoryError::Decode(format!("invalid cursor position {position}"))
            })
        })
        .transpose()?;

    Ok(Transaction {
        id: TransactionId(id),
        scope: ScopeKey::new(division, category),
        tx_type: TransactionType::parse(&tx_type)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown transaction type `{tx_type}`")))?,
        amount: parse_amount(&amount)?,
        requested_by: UserId(requested_by),
        chain: Chain { slots, cursor, version },
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

async fn insert_slots(
    executor: &mut sqlx::SqliteConnection,
    transaction: &Transaction,
) -> Result<(), RepositoryError> {
    for (position, slot) in transaction.chain.slots.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approval_slot (transaction_id, position, slot, assignee_id,
                                        decision, decided_at, remarks)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.id.0)
        .bind(position as i64)
        .bind(slot.slot.as_str())
        .bind(slot.assignee.as_ref().map(|user| user.0.clone()))
        .bind(slot.decision.as_str())
        .bind(slot.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&slot.remarks)
        .execute(&mut *executor)
        .await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl TransactionRepository for SqlTransactionRepository {
    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, division, category, tx_type, amount, requested_by,
                    chain_version, cursor_position, created_at, updated_at
             FROM loa_transaction WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let slot_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT slot, assignee_id, decision, decided_at, remarks
             FROM approval_slot WHERE transaction_id = ? ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let slots = slot_rows.iter().map(row_to_slot).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(row_to_transaction(&row, slots)?))
    }

    async fn insert(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO loa_transaction (id, division, category, tx_type, amount, requested_by,
                                          status, chain_version, cursor_position, created_at,
                                          updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.id.0)
        .bind(transaction.scope.division())
        .bind(transaction.scope.category())
        .bind(transaction.tx_type.as_str())
        .bind(transaction.amount.to_string())
        .bind(&transaction.requested_by.0)
        .bind(transaction.status().as_str())
        .bind(i64::from(transaction.chain.version))
        .bind(transaction.chain.cursor.map(|position| position as i64))
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.updated_at.to_rfc3339())
        .execute(&mut *db_tx)
        .await?;

        insert_slots(&mut *db_tx, transaction).await?;

        db_tx.commit().await?;
        Ok(())
    }

    async fn update_chain(
        &self,
        transaction: &Transaction,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut db_tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE loa_transaction
             SET status = ?, chain_version = ?, cursor_position = ?, updated_at = ?
             WHERE id = ? AND chain_version = ?",
        )
        .bind(transaction.status().as_str())
        .bind(i64::from(transaction.chain.version))
        .bind(transaction.chain.cursor.map(|position| position as i64))
        .bind(transaction.updated_at.to_rfc3339())
        .bind(&transaction.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() == 0 {
            db_tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "transaction {} chain version moved past {expected_version}",
                transaction.id.0
            )));
        }

        sqlx::query("DELETE FROM approval_slot WHERE transaction_id = ?")
            .bind(&transaction.id.0)
            .execute(&mut *db_tx)
            .await?;
        insert_slots(&mut *db_tx, transaction).await?;

        db_tx.commit().await?;
        Ok(())
    }
}
