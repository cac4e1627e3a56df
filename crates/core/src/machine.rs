use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::AuditEntry;
use crate::domain::chain::{Chain, ChainStatus, Decision, SlotName};
use crate::domain::identity::UserId;
use crate::domain::transaction::TransactionId;

pub const UPSTREAM_REJECTION_REASON: &str = "upstream rejection";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    Approve,
    Reject,
}

impl ActionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// One signing action against a transaction.
///
/// `request_id` is the caller's de-duplication handle: the machine itself is
/// not idempotent under retried writes, so the service layer replays the
/// recorded outcome for a request id it has already seen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub decision: ActionDecision,
    pub remarks: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("`{actor}` is not the current signer; slot `{expected_slot}` is awaiting its assignee")]
    NotCurrentSigner { actor: UserId, expected_slot: SlotName },
    #[error("transaction already resolved with aggregate status `{status}`")]
    AlreadyTerminal { status: ChainStatus },
}

/// What a successfully applied action produced: the decided slot, the new
/// aggregate status, and the audit entries to append (the actor's entry,
/// plus one system skip per short-circuited slot on rejection).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub slot: SlotName,
    pub decision: Decision,
    pub status: ChainStatus,
    pub entries: Vec<AuditEntry>,
}

/// Apply one signing action to the chain.
///
/// Validation happens before any mutation: a failed action leaves the chain
/// untouched and yields no audit entry. A successful action increments
/// `chain.version`, which the store compares on write so concurrent signers
/// racing the same slot produce exactly one applied action.
pub fn apply_action(
    chain: &mut Chain,
    command: &ActionCommand,
    now: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    let position = match chain.status() {
        status @ (ChainStatus::Approved | ChainStatus::Rejected) => {
            return Err(ActionError::AlreadyTerminal { status });
        }
        ChainStatus::Awaiting { position, slot } => {
            let assigned = chain.slots[position]
                .assignee
                .as_ref()
                .is_some_and(|assignee| *assignee == command.actor);
            if !assigned {
                return Err(ActionError::NotCurrentSigner {
                    actor: command.actor.clone(),
                    expected_slot: slot,
                });
            }
            position
        }
    };

    let slot_name = chain.slots[position].slot;
    let mut entries = Vec::new();

    match command.decision {
        ActionDecision::Approve => {
            decide(chain, position, Decision::Approved, command.remarks.clone(), now);
            chain.cursor = chain.next_pending_after(position);
        }
        ActionDecision::Reject => {
            decide(chain, position, Decision::Rejected, command.remarks.clone(), now);
            chain.cursor = None;

            let later_pending: Vec<usize> = chain
                .slots
                .iter()
                .enumerate()
                .skip(position + 1)
                .filter(|(_, slot)| slot.decision == Decision::Pending)
                .map(|(index, _)| index)
                .collect();
            for index in later_pending {
                decide(chain, index, Decision::Skipped, Some(UPSTREAM_REJECTION_REASON.to_string()), now);
                entries.push(AuditEntry::system_skip(
                    command.transaction_id.clone(),
                    chain.slots[index].slot,
                    UPSTREAM_REJECTION_REASON,
                    now,
                ));
            }
        }
    }

    let decision = chain.slots[position].decision;
    entries.insert(
        0,
        AuditEntry::action(
            command.transaction_id.clone(),
            slot_name,
            &command.actor,
            decision,
            command.remarks.clone(),
            now,
        ),
    );
    chain.version = chain.version.saturating_add(1);

    Ok(ActionOutcome { slot: slot_name, decision, status: chain.status(), entries })
}

fn decide(
    chain: &mut Chain,
    position: usize,
    decision: Decision,
    remarks: Option<String>,
    now: DateTime<Utc>,
) {
    let slot = &mut chain.slots[position];
    slot.decision = decision;
    slot.decided_at = Some(now);
    slot.remarks = remarks;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{apply_action, ActionCommand, ActionDecision, ActionError, UPSTREAM_REJECTION_REASON};
    use crate::domain::chain::{Chain, ChainStatus, Decision, SlotInstance, SlotName};
    use crate::domain::identity::{UserId, SYSTEM_ACTOR};
    use crate::domain::transaction::TransactionId;

    fn command(actor: &str, decision: ActionDecision) -> ActionCommand {
        ActionCommand {
            transaction_id: TransactionId("TX-0001".to_string()),
            actor: UserId::new(actor),
            decision,
            remarks: None,
            request_id: None,
        }
    }

    fn reviewer_then_approver() -> Chain {
        Chain {
            slots: vec![
                SlotInstance::pending(SlotName::Reviewer1, UserId::new("u-1")),
                SlotInstance::pending(SlotName::Approver1, UserId::new("u-2")),
            ],
            cursor: Some(0),
            version: 0,
        }
    }

    #[test]
    fn single_approver_chain_resolves_on_one_approval() {
        let mut chain = Chain {
            slots: vec![SlotInstance::pending(SlotName::Approver1, UserId::new("u-1"))],
            cursor: Some(0),
            version: 0,
        };

        let outcome = apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect("approve");

        assert_eq!(outcome.status, ChainStatus::Approved);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].actor, "u-1");
        assert_eq!(chain.version, 1);
    }

    #[test]
    fn preskipped_optional_slot_does_not_block_resolution() {
        let mut chain = Chain {
            slots: vec![
                SlotInstance::pending(SlotName::Approver1, UserId::new("u-1")),
                SlotInstance::skipped(SlotName::Approver2, Utc::now(), "optional slot unassigned"),
            ],
            cursor: Some(0),
            version: 0,
        };

        let outcome = apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect("approve");

        assert_eq!(outcome.status, ChainStatus::Approved);
    }

    #[test]
    fn approval_advances_to_the_next_pending_slot() {
        let mut chain = reviewer_then_approver();

        let outcome = apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect("reviewer approves");

        assert_eq!(outcome.status, ChainStatus::Awaiting { position: 1, slot: SlotName::Approver1 });
        assert_eq!(chain.cursor, Some(1));

        let outcome = apply_action(&mut chain, &command("u-2", ActionDecision::Approve), Utc::now())
            .expect("approver approves");

        assert_eq!(outcome.status, ChainStatus::Approved);
        assert_eq!(chain.version, 2);
    }

    #[test]
    fn rejection_short_circuits_and_skips_later_slots() {
        let mut chain = reviewer_then_approver();

        let outcome = apply_action(&mut chain, &command("u-1", ActionDecision::Reject), Utc::now())
            .expect("reviewer rejects");

        assert_eq!(outcome.status, ChainStatus::Rejected);
        assert_eq!(chain.slots[1].decision, Decision::Skipped);
        assert_eq!(chain.slots[1].remarks.as_deref(), Some(UPSTREAM_REJECTION_REASON));

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].actor, "u-1");
        assert_eq!(outcome.entries[0].decision, Decision::Rejected);
        assert_eq!(outcome.entries[1].actor, SYSTEM_ACTOR);
        assert_eq!(outcome.entries[1].slot, SlotName::Approver1);

        let error = apply_action(&mut chain, &command("u-2", ActionDecision::Approve), Utc::now())
            .expect_err("already rejected");
        assert_eq!(error, ActionError::AlreadyTerminal { status: ChainStatus::Rejected });
    }

    #[test]
    fn out_of_order_signer_is_refused_without_state_change() {
        let mut chain = reviewer_then_approver();
        let before = chain.clone();

        let error = apply_action(&mut chain, &command("u-2", ActionDecision::Approve), Utc::now())
            .expect_err("approver cannot act before reviewer");

        assert_eq!(
            error,
            ActionError::NotCurrentSigner {
                actor: UserId::new("u-2"),
                expected_slot: SlotName::Reviewer1,
            }
        );
        assert_eq!(chain, before);
    }

    #[test]
    fn unknown_actor_is_refused() {
        let mut chain = reviewer_then_approver();

        let error = apply_action(&mut chain, &command("u-9", ActionDecision::Approve), Utc::now())
            .expect_err("stranger cannot sign");
        assert!(matches!(error, ActionError::NotCurrentSigner { .. }));
    }

    #[test]
    fn replaying_an_applied_action_is_rejected() {
        let mut chain = reviewer_then_approver();

        apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect("first application");

        let error = apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect_err("slot has moved on");
        assert!(matches!(error, ActionError::NotCurrentSigner { .. }));
        assert_eq!(chain.version, 1, "retry must not double-apply");
    }

    #[test]
    fn terminal_chain_refuses_further_actions() {
        let mut chain = Chain {
            slots: vec![SlotInstance::pending(SlotName::Approver1, UserId::new("u-1"))],
            cursor: Some(0),
            version: 0,
        };
        apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect("resolve");

        let error = apply_action(&mut chain, &command("u-1", ActionDecision::Approve), Utc::now())
            .expect_err("terminal");
        assert_eq!(error, ActionError::AlreadyTerminal { status: ChainStatus::Approved });
    }
}
