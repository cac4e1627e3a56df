use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use loa_core::audit::{seal_entry, verify_trail, AuditEntry, SealedAuditEntry};
use loa_core::domain::chain::ChainStatus;
use loa_core::domain::identity::UserId;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::Tier;
use loa_core::domain::transaction::{Transaction, TransactionId, TransactionType};
use loa_core::errors::{ApplicationError, DomainError};
use loa_core::machine::{apply_action, ActionCommand};
use loa_core::org::OrgLookup;
use loa_core::tiers::TierTable;
use loa_core::{build_chain, replay};
use loa_db::repositories::{
    ActionIdempotencyRepository, AuditLogRepository, RecordedAction, RepositoryError,
    TierRepository, TransactionRepository,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transaction `{0}` was not found")]
    UnknownTransaction(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        Self::Application(ApplicationError::from(value))
    }
}

fn persistence(error: RepositoryError) -> ServiceError {
    match error {
        RepositoryError::Conflict(message) => {
            ServiceError::Application(ApplicationError::Conflict(message))
        }
        other => ServiceError::Application(ApplicationError::Persistence(other.to_string())),
    }
}

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub scope: ScopeKey,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub requested_by: UserId,
}

/// Result of an applied (or replayed) signing action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub transaction: Transaction,
    pub status: ChainStatus,
    pub replayed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SlotView {
    pub slot: String,
    pub assignee_id: Option<String>,
    pub assignee_name: Option<String>,
    pub decision: String,
    pub decided_at: Option<String>,
    pub remarks: Option<String>,
    pub current: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusView {
    pub transaction_id: String,
    pub division: String,
    pub category: String,
    pub tx_type: String,
    pub amount: Decimal,
    pub requested_by: String,
    pub requested_by_name: String,
    pub status: ChainStatus,
    pub slots: Vec<SlotView>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntryView {
    pub version: u32,
    pub slot: String,
    pub actor: String,
    pub actor_name: String,
    pub decision: String,
    pub remarks: Option<String>,
    pub recorded_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryView {
    pub transaction_id: String,
    pub entries: Vec<HistoryEntryView>,
    pub trail_valid: bool,
}

/// Orchestrates the pure engine components against the repositories: one
/// method per externally invocable use case.
pub struct WorkflowService {
    tiers: Arc<dyn TierRepository>,
    transactions: Arc<dyn TransactionRepository>,
    audit: Arc<dyn AuditLogRepository>,
    idempotency: Arc<dyn ActionIdempotencyRepository>,
    org: Arc<dyn OrgLookup>,
    signing_key: Vec<u8>,
}

impl WorkflowService {
    pub fn new(
        tiers: Arc<dyn TierRepository>,
        transactions: Arc<dyn TransactionRepository>,
        audit: Arc<dyn AuditLogRepository>,
        idempotency: Arc<dyn ActionIdempotencyRepository>,
        org: Arc<dyn OrgLookup>,
        signing_key: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            tiers,
            transactions,
            audit,
            idempotency,
            org,
            signing_key: signing_key.as_ref().to_vec(),
        }
    }

    /// Admit a tier into its scope's table, validating level uniqueness and
    /// range disjointness against the persisted configuration.
    pub async fn configure_tier(&self, tier: Tier) -> Result<Tier, ServiceError> {
        let mut existing =
            self.tiers.list_for_scope(&tier.scope).await.map_err(persistence)?;
        // Replacing a tier by id must not collide with its own old range.
        existing.retain(|stored| stored.id != tier.id);

        let mut table = TierTable::from_tiers(existing).map_err(|error| {
            ServiceError::Application(ApplicationError::Configuration(format!(
                "stored tier table for scope `{}` is invalid: {error}",
                tier.scope
            )))
        })?;
        table.add_tier(tier.clone()).map_err(DomainError::from)?;

        self.tiers.save(tier.clone()).await.map_err(persistence)?;

        info!(
            event_name = "loa.tier.configured",
            scope = %tier.scope,
            level = tier.level,
            "tier admitted into scope table"
        );
        Ok(tier)
    }

    pub async fn list_tiers(&self, scope: &ScopeKey) -> Result<Vec<Tier>, ServiceError> {
        self.tiers.list_for_scope(scope).await.map_err(persistence)
    }

    /// Resolve the owning tier for (scope, amount), bind a chain, and
    /// persist the new transaction. Resolution misses and unstaffed
    /// mandatory slots abort before anything is written.
    pub async fn submit_transaction(
        &self,
        request: SubmitRequest,
    ) -> Result<Transaction, ServiceError> {
        let tiers =
            self.tiers.list_for_scope(&request.scope).await.map_err(persistence)?;
        let table = TierTable::from_tiers(tiers).map_err(|error| {
            ServiceError::Application(ApplicationError::Configuration(format!(
                "stored tier table for scope `{}` is invalid: {error}",
                request.scope
            )))
        })?;

        let tier = table.resolve(&request.scope, request.amount).map_err(DomainError::from)?;

        let now = Utc::now();
        let transaction_id = TransactionId(Uuid::new_v4().to_string());
        let built = build_chain(tier, request.tx_type, &transaction_id, now)
            .map_err(DomainError::from)?;

        let transaction = Transaction {
            id: transaction_id,
            scope: request.scope,
            tx_type: request.tx_type,
            amount: request.amount,
            requested_by: request.requested_by,
            chain: built.chain,
            created_at: now,
            updated_at: now,
        };

        self.transactions.insert(&transaction).await.map_err(persistence)?;
        self.append_entries(&transaction.id, built.skip_entries).await?;

        info!(
            event_name = "loa.transaction.submitted",
            transaction_id = %transaction.id.0,
            scope = %transaction.scope,
            tier_level = tier.level,
            status = transaction.status().as_str(),
            "transaction submitted and chain bound"
        );
        Ok(transaction)
    }

    /// Apply one signing action. Retried request ids replay the recorded
    /// receipt; concurrent writers racing the same slot are serialized by
    /// the store's chain-version check.
    pub async fn act(&self, command: ActionCommand) -> Result<ActionReceipt, ServiceError> {
        if let Some(request_id) = &command.request_id {
            if let Some(record) =
                self.idempotency.find(request_id).await.map_err(persistence)?
            {
                let mut receipt: ActionReceipt = serde_json::from_str(&record.outcome_json)
                    .map_err(|error| {
                        ServiceError::Application(ApplicationError::Persistence(format!(
                            "recorded action outcome is unreadable: {error}"
                        )))
                    })?;
                receipt.replayed = true;
                return Ok(receipt);
            }
        }

        let mut transaction = self
            .transactions
            .find_by_id(&command.transaction_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ServiceError::UnknownTransaction(command.transaction_id.0.clone()))?;

        let now = Utc::now();
        let expected_version = transaction.chain.version;
        let outcome =
            apply_action(&mut transaction.chain, &command, now).map_err(DomainError::from)?;
        transaction.updated_at = now;

        self.transactions.update_chain(&transaction, expected_version).await.map_err(persistence)?;
        self.append_entries(&transaction.id, outcome.entries).await?;

        info!(
            event_name = "loa.transaction.action_applied",
            transaction_id = %transaction.id.0,
            slot = outcome.slot.as_str(),
            decision = outcome.decision.as_str(),
            status = outcome.status.as_str(),
            "signing action applied"
        );

        let receipt = ActionReceipt {
            status: transaction.status(),
            transaction,
            replayed: false,
        };

        if let Some(request_id) = &command.request_id {
            self.idempotency
                .record(RecordedAction {
                    request_id: request_id.clone(),
                    transaction_id: receipt.transaction.id.clone(),
                    actor_id: command.actor.as_str().to_string(),
                    decision: command.decision.as_str().to_string(),
                    outcome_json: serde_json::to_string(&receipt).map_err(|error| {
                        ServiceError::Application(ApplicationError::Persistence(format!(
                            "could not record action outcome: {error}"
                        )))
                    })?,
                    created_at: now,
                })
                .await
                .map_err(persistence)?;
        }

        Ok(receipt)
    }

    pub async fn get_status(&self, id: &TransactionId) -> Result<StatusView, ServiceError> {
        let transaction = self
            .transactions
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ServiceError::UnknownTransaction(id.0.clone()))?;

        let requested_by_name =
            self.org.resolve_identity(&transaction.requested_by).display_name;
        let current_position = transaction.chain.cursor;
        let slots = transaction
            .chain
            .slots
            .iter()
            .enumerate()
            .map(|(position, slot)| SlotView {
                slot: slot.slot.as_str().to_string(),
                assignee_id: slot.assignee.as_ref().map(|user| user.0.clone()),
                assignee_name: slot
                    .assignee
                    .as_ref()
                    .map(|user| self.org.resolve_identity(user).display_name),
                decision: slot.decision.as_str().to_string(),
                decided_at: slot.decided_at.map(|dt| dt.to_rfc3339()),
                remarks: slot.remarks.clone(),
                current: current_position == Some(position),
            })
            .collect();

        Ok(StatusView {
            transaction_id: transaction.id.0.clone(),
            division: transaction.scope.division().to_string(),
            category: transaction.scope.category().to_string(),
            tx_type: transaction.tx_type.as_str().to_string(),
            amount: transaction.amount,
            requested_by: transaction.requested_by.0.clone(),
            requested_by_name,
            status: transaction.status(),
            slots,
            created_at: transaction.created_at.to_rfc3339(),
            updated_at: transaction.updated_at.to_rfc3339(),
        })
    }

    pub async fn get_history(&self, id: &TransactionId) -> Result<HistoryView, ServiceError> {
        // Existence check first so an unknown id is a 404, not an empty trail.
        self.transactions
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ServiceError::UnknownTransaction(id.0.clone()))?;

        let sealed = self.audit.history(id).await.map_err(persistence)?;
        let verification = verify_trail(&self.signing_key, id, &sealed);

        let entries = sealed
            .iter()
            .map(|sealed| HistoryEntryView {
                version: sealed.version,
                slot: sealed.entry.slot.as_str().to_string(),
                actor: sealed.entry.actor.clone(),
                actor_name: if sealed.entry.is_system() {
                    sealed.entry.actor.clone()
                } else {
                    self.org
                        .resolve_identity(&UserId::new(sealed.entry.actor.clone()))
                        .display_name
                },
                decision: sealed.entry.decision.as_str().to_string(),
                remarks: sealed.entry.remarks.clone(),
                recorded_at: sealed.entry.recorded_at.to_rfc3339(),
            })
            .collect();

        Ok(HistoryView { transaction_id: id.0.clone(), entries, trail_valid: verification.valid })
    }

    /// Rebuild a transaction's chain purely from its recorded trail.
    /// Compliance tooling uses this to cross-check the live chain.
    pub async fn reconstruct_from_trail(
        &self,
        id: &TransactionId,
    ) -> Result<ChainStatus, ServiceError> {
        let transaction = self
            .transactions
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ServiceError::UnknownTransaction(id.0.clone()))?;

        let sealed = self.audit.history(id).await.map_err(persistence)?;
        let entries: Vec<AuditEntry> =
            sealed.into_iter().map(|sealed| sealed.entry).collect();

        let mut fresh = transaction.chain.clone();
        for slot in &mut fresh.slots {
            slot.decision = loa_core::Decision::Pending;
            slot.decided_at = None;
            slot.remarks = None;
        }
        fresh.cursor = Some(0);
        fresh.version = 0;

        Ok(replay(fresh, &entries).status())
    }

    async fn append_entries(
        &self,
        transaction_id: &TransactionId,
        entries: Vec<AuditEntry>,
    ) -> Result<(), ServiceError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut prev: Option<SealedAuditEntry> =
            self.audit.last_sealed(transaction_id).await.map_err(persistence)?;
        for entry in entries {
            let sealed = seal_entry(&self.signing_key, prev.as_ref(), entry);
            self.audit.append(&sealed).await.map_err(persistence)?;
            prev = Some(sealed);
        }
        Ok(())
    }
}
