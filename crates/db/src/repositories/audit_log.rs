use chrono::{DateTime, Utc};
use sqlx::Row;

use loa_core::audit::{AuditEntry, SealedAuditEntry};
use loa_core::domain::chain::{Decision, SlotName};
use loa_core::domain::transaction::TransactionId;

use super::{AuditLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_sealed(row: &sqlx::sqlite::SqliteRow) -> Result<SealedAuditEntry, RepositoryError> {
    let entry_id: String =
        row.try_get("entry_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let transaction_id: String =
        row.try_get("transaction_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let slot: String = row.try_get("slot").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String =
        row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decision: String =
        row.try_get("decision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let remarks: Option<String> =
        row.try_get("remarks").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recorded_at: String =
        row.try_get("recorded_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let prev_hash: Option<String> =
        row.try_get("prev_hash").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entry_hash: String =
        row.try_get("entry_hash").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let signature: String =
        row.try_get("signature").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid recorded_at: {error}")))?;
    let version = u32::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("invalid trail version {version}")))?;

    Ok(SealedAuditEntry {
        entry: AuditEntry {
            entry_id,
            transaction_id: TransactionId(transaction_id),
            slot: SlotName::parse(&slot)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown slot `{slot}`")))?,
            actor,
            decision: Decision::parse(&decision)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision}`")))?,
            remarks,
            recorded_at,
        },
        version,
        prev_hash,
        entry_hash,
        signature,
    })
}

#[async_trait::async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, sealed: &SealedAuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_trail (entry_id, transaction_id, version, slot, actor, decision,
                                      remarks, recorded_at, prev_hash, entry_hash, signature)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&sealed.entry.entry_id)
        .bind(&sealed.entry.transaction_id.0)
        .bind(i64::from(sealed.version))
        .bind(sealed.entry.slot.as_str())
        .bind(&sealed.entry.actor)
        .bind(sealed.entry.decision.as_str())
        .bind(&sealed.entry.remarks)
        .bind(sealed.entry.recorded_at.to_rfc3339())
        .bind(&sealed.prev_hash)
        .bind(&sealed.entry_hash)
        .bind(&sealed.signature)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_sealed(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SealedAuditEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT entry_id, transaction_id, version, slot, actor, decision, remarks,
                    recorded_at, prev_hash, entry_hash, signature
             FROM audit_trail WHERE transaction_id = ?
             ORDER BY version DESC LIMIT 1",
        )
        .bind(&transaction_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_sealed(row)?)),
            None => Ok(None),
        }
    }

    async fn history(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<SealedAuditEntry>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT entry_id, transaction_id, version, slot, actor, decision, remarks,
                    recorded_at, prev_hash, entry_hash, signature
             FROM audit_trail WHERE transaction_id = ?
             ORDER BY version ASC",
        )
        .bind(&transaction_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_sealed).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use loa_core::audit::{seal_entry, verify_trail, AuditEntry};
    use loa_core::domain::chain::{Chain, Decision, SlotInstance, SlotName};
    use loa_core::domain::identity::UserId;
    use loa_core::domain::scope::ScopeKey;
    use loa_core::domain::transaction::{Transaction, TransactionId, TransactionType};

    use super::SqlAuditLogRepository;
    use crate::repositories::{AuditLogRepository, SqlTransactionRepository, TransactionRepository};
    use crate::{connect_with_settings, migrations};

    const SIGNING_KEY: &[u8] = b"trail-secret";

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    /// Insert a parent transaction so FK constraints are satisfied.
    async fn insert_transaction(pool: &sqlx::SqlitePool, id: &str) {
        let repo = SqlTransactionRepository::new(pool.clone());
        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId(id.to_string()),
            scope: ScopeKey::new("finance", "purchasing"),
            tx_type: TransactionType::Overtime,
            amount: Decimal::new(120_000, 2),
            requested_by: UserId::new("u-requester"),
            chain: Chain {
                slots: vec![SlotInstance::pending(SlotName::Approver1, UserId::new("u-a1"))],
                cursor: Some(0),
                version: 0,
            },
            created_at: now,
            updated_at: now,
        };
        repo.insert(&transaction).await.expect("insert parent transaction");
    }

    fn entry(id: &str, slot: SlotName, actor: &str) -> AuditEntry {
        AuditEntry::action(
            TransactionId(id.to_string()),
            slot,
            &UserId::new(actor),
            Decision::Approved,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn append_and_history_preserve_seal_order() {
        let pool = setup().await;
        insert_transaction(&pool, "TX-001").await;
        let repo = SqlAuditLogRepository::new(pool);
        let tx_id = TransactionId("TX-001".to_string());

        let first = seal_entry(SIGNING_KEY, None, entry("TX-001", SlotName::Reviewer1, "u-r1"));
        let second =
            seal_entry(SIGNING_KEY, Some(&first), entry("TX-001", SlotName::Approver1, "u-a1"));
        repo.append(&first).await.expect("append first");
        repo.append(&second).await.expect("append second");

        let history = repo.history(&tx_id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[1].version, 2);
        assert_eq!(history[1].prev_hash, Some(history[0].entry_hash.clone()));

        let verification = verify_trail(SIGNING_KEY, &tx_id, &history);
        assert!(verification.valid, "persisted trail should verify");
    }

    #[tokio::test]
    async fn last_sealed_returns_the_latest_entry() {
        let pool = setup().await;
        insert_transaction(&pool, "TX-002").await;
        let repo = SqlAuditLogRepository::new(pool);
        let tx_id = TransactionId("TX-002".to_string());

        assert!(repo.last_sealed(&tx_id).await.expect("empty trail").is_none());

        let first = seal_entry(SIGNING_KEY, None, entry("TX-002", SlotName::Approver1, "u-a1"));
        repo.append(&first).await.expect("append");

        let last = repo.last_sealed(&tx_id).await.expect("query").expect("one entry");
        assert_eq!(last.version, 1);
        assert_eq!(last.entry.actor, "u-a1");
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected_by_the_unique_constraint() {
        let pool = setup().await;
        insert_transaction(&pool, "TX-003").await;
        let repo = SqlAuditLogRepository::new(pool);

        let first = seal_entry(SIGNING_KEY, None, entry("TX-003", SlotName::Approver1, "u-a1"));
        let duplicate = seal_entry(SIGNING_KEY, None, entry("TX-003", SlotName::Approver1, "u-a1"));

        repo.append(&first).await.expect("append");
        let error = repo.append(&duplicate).await.expect_err("same version twice");
        assert!(matches!(error, crate::repositories::RepositoryError::Database(_)));
    }
}
