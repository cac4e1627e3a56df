use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::AuditEntry;
use crate::domain::chain::{Chain, Decision, SlotInstance, SlotName};
use crate::domain::scope::ScopeKey;
use crate::domain::tier::Tier;
use crate::domain::transaction::{TransactionId, TransactionType};

pub const UNASSIGNED_SKIP_REASON: &str = "optional slot unassigned in tier";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainBuildError {
    #[error("mandatory slot `{slot}` is unassigned in tier level {level} of scope `{scope}`")]
    ConfigurationIncomplete { scope: ScopeKey, level: u32, slot: SlotName },
}

/// A chain bound to a transaction plus the system-actor audit entries for
/// slots skipped at build time. The caller appends those entries to the
/// trail in the same unit of work that persists the transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltChain {
    pub chain: Chain,
    pub skip_entries: Vec<AuditEntry>,
}

/// Derive the ordered slot list for `tx_type` from the resolved tier.
///
/// Mandatory unstaffed slots abort the build; optional unstaffed slots are
/// pre-skipped and never become current. The first pending instance in
/// precedence order becomes the chain cursor.
pub fn build_chain(
    tier: &Tier,
    tx_type: TransactionType,
    transaction_id: &TransactionId,
    now: DateTime<Utc>,
) -> Result<BuiltChain, ChainBuildError> {
    let mut slots = Vec::new();
    let mut skip_entries = Vec::new();

    for &slot in tx_type.applicable_slots() {
        match tier.assignments.get(slot) {
            Some(assignee) => slots.push(SlotInstance::pending(slot, assignee.clone())),
            None if slot.is_optional() => {
                slots.push(SlotInstance::skipped(slot, now, UNASSIGNED_SKIP_REASON));
                skip_entries.push(AuditEntry::system_skip(
                    transaction_id.clone(),
                    slot,
                    UNASSIGNED_SKIP_REASON,
                    now,
                ));
            }
            None => {
                return Err(ChainBuildError::ConfigurationIncomplete {
                    scope: tier.scope.clone(),
                    level: tier.level,
                    slot,
                });
            }
        }
    }

    let cursor = slots.iter().position(|slot| slot.decision == Decision::Pending);
    Ok(BuiltChain { chain: Chain { slots, cursor, version: 0 }, skip_entries })
}
