use std::collections::HashMap;

use tokio::sync::RwLock;

use loa_core::audit::SealedAuditEntry;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::Tier;
use loa_core::domain::transaction::{Transaction, TransactionId};

use super::{
    ActionIdempotencyRepository, AuditLogRepository, RecordedAction, RepositoryError,
    TierRepository, TransactionRepository,
};

#[derive(Default)]
pub struct InMemoryTierRepository {
    tiers: RwLock<HashMap<String, Tier>>,
}

#[async_trait::async_trait]
impl TierRepository for InMemoryTierRepository {
    async fn list_for_scope(&self, scope: &ScopeKey) -> Result<Vec<Tier>, RepositoryError> {
        let tiers = self.tiers.read().await;
        let mut matching: Vec<Tier> =
            tiers.values().filter(|tier| tier.scope == *scope).cloned().collect();
        matching.sort_by_key(|tier| tier.level);
        Ok(matching)
    }

    async fn save(&self, tier: Tier) -> Result<(), RepositoryError> {
        let mut tiers = self.tiers.write().await;
        tiers.insert(tier.id.0.clone(), tier);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<String, Transaction>>,
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id.0).cloned())
    }

    async fn insert(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.id.0.clone(), transaction.clone());
        Ok(())
    }

    async fn update_chain(
        &self,
        transaction: &Transaction,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut transactions = self.transactions.write().await;
        let Some(stored) = transactions.get_mut(&transaction.id.0) else {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} does not exist",
                transaction.id.0
            )));
        };
        if stored.chain.version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} chain version moved past {expected_version}",
                transaction.id.0
            )));
        }
        *stored = transaction.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<HashMap<String, Vec<SealedAuditEntry>>>,
}

#[async_trait::async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: &SealedAuditEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.entry(entry.entry.transaction_id.0.clone()).or_default().push(entry.clone());
        Ok(())
    }

    async fn last_sealed(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SealedAuditEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&transaction_id.0).and_then(|trail| trail.last().cloned()))
    }

    async fn history(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<SealedAuditEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&transaction_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryActionIdempotencyRepository {
    records: RwLock<HashMap<String, RecordedAction>>,
}

#[async_trait::async_trait]
impl ActionIdempotencyRepository for InMemoryActionIdempotencyRepository {
    async fn find(&self, request_id: &str) -> Result<Option<RecordedAction>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(request_id).cloned())
    }

    async fn record(&self, record: RecordedAction) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.entry(record.request_id.clone()).or_insert(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use loa_core::domain::chain::{Chain, Decision, SlotInstance, SlotName};
    use loa_core::domain::identity::UserId;
    use loa_core::domain::scope::ScopeKey;
    use loa_core::domain::tier::{AmountRange, SlotAssignments, Tier, TierId};
    use loa_core::domain::transaction::{Transaction, TransactionId, TransactionType};

    use crate::repositories::{
        InMemoryTierRepository, InMemoryTransactionRepository, RepositoryError, TierRepository,
        TransactionRepository,
    };

    #[tokio::test]
    async fn in_memory_tier_repo_lists_by_scope_in_level_order() {
        let repo = InMemoryTierRepository::default();
        let scope = ScopeKey::new("finance", "purchasing");

        for (id, level) in [("tier-b", 2), ("tier-a", 1)] {
            repo.save(Tier {
                id: TierId(id.to_string()),
                scope: scope.clone(),
                level,
                range: AmountRange::new(
                    Decimal::new(i64::from(level) * 1_000, 0),
                    Decimal::new(i64::from(level) * 2_000, 0),
                ),
                assignments: SlotAssignments::default(),
            })
            .await
            .expect("save tier");
        }

        let tiers = repo.list_for_scope(&scope).await.expect("list");
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].level, 1);

        let none = repo.list_for_scope(&ScopeKey::new("hr", "leave")).await.expect("list");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn in_memory_transaction_repo_enforces_version_check() {
        let repo = InMemoryTransactionRepository::default();
        let now = Utc::now();
        let mut transaction = Transaction {
            id: TransactionId("TX-1".to_string()),
            scope: ScopeKey::new("finance", "purchasing"),
            tx_type: TransactionType::Loan,
            amount: Decimal::new(50_000, 2),
            requested_by: UserId::new("u-req"),
            chain: Chain {
                slots: vec![SlotInstance::pending(SlotName::Approver1, UserId::new("u-a1"))],
                cursor: Some(0),
                version: 0,
            },
            created_at: now,
            updated_at: now,
        };
        repo.insert(&transaction).await.expect("insert");

        transaction.chain.slots[0].decision = Decision::Approved;
        transaction.chain.cursor = None;
        transaction.chain.version = 1;
        repo.update_chain(&transaction, 0).await.expect("update");

        let error = repo.update_chain(&transaction, 0).await.expect_err("stale version");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }
}
