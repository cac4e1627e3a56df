use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use loa_core::audit::SealedAuditEntry;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::Tier;
use loa_core::domain::transaction::{Transaction, TransactionId};

pub mod audit_log;
pub mod idempotency;
pub mod memory;
pub mod tier;
pub mod transaction;

pub use audit_log::SqlAuditLogRepository;
pub use idempotency::SqlActionIdempotencyRepository;
pub use memory::{
    InMemoryActionIdempotencyRepository, InMemoryAuditLogRepository, InMemoryTierRepository,
    InMemoryTransactionRepository,
};
pub use tier::SqlTierRepository;
pub use transaction::SqlTransactionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait TierRepository: Send + Sync {
    /// All tiers for a scope, ascending by level. One call returns the
    /// consistent snapshot a resolve+build pair works against.
    async fn list_for_scope(&self, scope: &ScopeKey) -> Result<Vec<Tier>, RepositoryError>;
    async fn save(&self, tier: Tier) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_id(&self, id: &TransactionId)
        -> Result<Option<Transaction>, RepositoryError>;

    async fn insert(&self, transaction: &Transaction) -> Result<(), RepositoryError>;

    /// Persist an updated chain only if the stored version still equals
    /// `expected_version`; a stale writer gets `Conflict` and no change.
    async fn update_chain(
        &self,
        transaction: &Transaction,
        expected_version: u32,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: &SealedAuditEntry) -> Result<(), RepositoryError>;

    async fn last_sealed(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SealedAuditEntry>, RepositoryError>;

    /// The transaction's trail ordered by seal version (equivalently, by
    /// recorded time).
    async fn history(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<SealedAuditEntry>, RepositoryError>;
}

/// Outcome of an applied signing action, keyed by the caller's request id so
/// retried writes replay the stored response instead of re-entering the
/// state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAction {
    pub request_id: String,
    pub transaction_id: TransactionId,
    pub actor_id: String,
    pub decision: String,
    pub outcome_json: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ActionIdempotencyRepository: Send + Sync {
    async fn find(&self, request_id: &str) -> Result<Option<RecordedAction>, RepositoryError>;
    async fn record(&self, record: RecordedAction) -> Result<(), RepositoryError>;
}
