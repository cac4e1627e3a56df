use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::UserId;

/// Named approval role inside a tier, in fixed signing precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Reviewer1,
    Reviewer2,
    Approver1,
    Approver2,
    Approver3,
}

impl SlotName {
    /// All slots in signing precedence order.
    pub const ORDERED: [SlotName; 5] = [
        SlotName::Reviewer1,
        SlotName::Reviewer2,
        SlotName::Approver1,
        SlotName::Approver2,
        SlotName::Approver3,
    ];

    /// Mandatory slots block chain construction while unstaffed; optional
    /// slots are auto-skipped instead.
    pub fn is_optional(self) -> bool {
        matches!(self, SlotName::Reviewer2 | SlotName::Approver2 | SlotName::Approver3)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reviewer1 => "reviewer1",
            Self::Reviewer2 => "reviewer2",
            Self::Approver1 => "approver1",
            Self::Approver2 => "approver2",
            Self::Approver3 => "approver3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reviewer1" => Some(Self::Reviewer1),
            "reviewer2" => Some(Self::Reviewer2),
            "approver1" => Some(Self::Approver1),
            "approver2" => Some(Self::Approver2),
            "approver3" => Some(Self::Approver3),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signing slot bound to a transaction.
///
/// `assignee` is `None` only for slots pre-skipped at build time because the
/// tier left an optional slot unstaffed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInstance {
    pub slot: SlotName,
    pub assignee: Option<UserId>,
    pub decision: Decision,
    pub decided_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl SlotInstance {
    pub fn pending(slot: SlotName, assignee: UserId) -> Self {
        Self { slot, assignee: Some(assignee), decision: Decision::Pending, decided_at: None, remarks: None }
    }

    pub fn skipped(slot: SlotName, now: DateTime<Utc>, remarks: impl Into<String>) -> Self {
        Self {
            slot,
            assignee: None,
            decision: Decision::Skipped,
            decided_at: Some(now),
            remarks: Some(remarks.into()),
        }
    }
}

/// Aggregate transaction status derived from the chain's slot decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainStatus {
    Awaiting { position: usize, slot: SlotName },
    Approved,
    Rejected,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awaiting { .. } => "awaiting",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered slot instances bound to one transaction.
///
/// `cursor` indexes the single currently-actionable slot; `version`
/// increments on every applied action and backs the optimistic concurrency
/// check in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub slots: Vec<SlotInstance>,
    pub cursor: Option<usize>,
    pub version: u32,
}

impl Chain {
    pub fn status(&self) -> ChainStatus {
        if self.slots.iter().any(|slot| slot.decision == Decision::Rejected) {
            return ChainStatus::Rejected;
        }
        match self.cursor {
            Some(position) => ChainStatus::Awaiting { position, slot: self.slots[position].slot },
            None => ChainStatus::Approved,
        }
    }

    pub fn current(&self) -> Option<&SlotInstance> {
        self.cursor.map(|position| &self.slots[position])
    }

    /// Index of the first pending slot after `position`, skipping
    /// already-skipped instances.
    pub(crate) fn next_pending_after(&self, position: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(position + 1)
            .find(|(_, slot)| slot.decision == Decision::Pending)
            .map(|(index, _)| index)
    }
}
