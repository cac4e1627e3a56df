use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::chain::SlotName;
use crate::domain::identity::UserId;
use crate::domain::scope::ScopeKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierId(pub String);

/// Inclusive amount range `[min, max]` claimed by a tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        self.min <= amount && amount <= self.max
    }

    /// Inclusive-bound intersection; touching bounds count as overlap.
    pub fn overlaps(&self, other: &AmountRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

/// Signer identities designated by a tier, one per slot name.
///
/// `None` means the slot is unstaffed: fatal for mandatory slots at chain
/// build time, auto-skipped for optional ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignments {
    pub reviewer1: Option<UserId>,
    pub reviewer2: Option<UserId>,
    pub approver1: Option<UserId>,
    pub approver2: Option<UserId>,
    pub approver3: Option<UserId>,
}

impl SlotAssignments {
    pub fn get(&self, slot: SlotName) -> Option<&UserId> {
        match slot {
            SlotName::Reviewer1 => self.reviewer1.as_ref(),
            SlotName::Reviewer2 => self.reviewer2.as_ref(),
            SlotName::Approver1 => self.approver1.as_ref(),
            SlotName::Approver2 => self.approver2.as_ref(),
            SlotName::Approver3 => self.approver3.as_ref(),
        }
    }

    pub fn set(&mut self, slot: SlotName, user: Option<UserId>) {
        match slot {
            SlotName::Reviewer1 => self.reviewer1 = user,
            SlotName::Reviewer2 => self.reviewer2 = user,
            SlotName::Approver1 => self.approver1 = user,
            SlotName::Approver2 => self.approver2 = user,
            SlotName::Approver3 => self.approver3 = user,
        }
    }
}

/// One budget tier inside a scope's ordered tier table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub scope: ScopeKey,
    pub level: u32,
    pub range: AmountRange,
    pub assignments: SlotAssignments,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::AmountRange;

    #[test]
    fn range_bounds_are_inclusive() {
        let range = AmountRange::new(Decimal::ZERO, Decimal::new(10_000, 0));

        assert!(range.contains(Decimal::ZERO));
        assert!(range.contains(Decimal::new(10_000, 0)));
        assert!(!range.contains(Decimal::new(10_001, 0)));
        assert!(!range.contains(Decimal::NEGATIVE_ONE));
    }

    #[test]
    fn touching_bounds_count_as_overlap() {
        let low = AmountRange::new(Decimal::ZERO, Decimal::new(10_000, 0));
        let touching = AmountRange::new(Decimal::new(10_000, 0), Decimal::new(50_000, 0));
        let clear = AmountRange::new(Decimal::new(10_001, 0), Decimal::new(50_000, 0));

        assert!(low.overlaps(&touching));
        assert!(!low.overlaps(&clear));
    }
}
