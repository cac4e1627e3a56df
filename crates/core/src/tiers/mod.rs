use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::scope::ScopeKey;
use crate::domain::tier::Tier;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TierConfigError {
    #[error("tier level {level} already exists in scope `{scope}`")]
    DuplicateLevel { scope: ScopeKey, level: u32 },
    #[error(
        "tier level {level} range [{min}, {max}] overlaps level {other_level} in scope `{scope}`"
    )]
    OverlappingRange { scope: ScopeKey, level: u32, other_level: u32, min: Decimal, max: Decimal },
    #[error("tier range is inverted: min {min} exceeds max {max}")]
    InvertedRange { min: Decimal, max: Decimal },
    #[error("tier level must be a positive integer")]
    InvalidLevel,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no authority tier in scope `{scope}` covers amount {amount}")]
    NotFound { scope: ScopeKey, amount: Decimal },
}

/// Ordered tier tables keyed by scope.
///
/// Admission enforces the two configuration invariants: unique levels and
/// non-overlapping inclusive ranges within a scope. Touching bounds
/// (tier1.max == tier2.min) are rejected here rather than tie-broken at
/// resolve time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TierTable {
    tiers_by_scope: HashMap<String, Vec<Tier>>,
}

impl TierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from already-persisted tiers, re-validating every entry.
    pub fn from_tiers(tiers: Vec<Tier>) -> Result<Self, TierConfigError> {
        let mut table = Self::new();
        for tier in tiers {
            table.add_tier(tier)?;
        }
        Ok(table)
    }

    pub fn add_tier(&mut self, tier: Tier) -> Result<(), TierConfigError> {
        if tier.level == 0 {
            return Err(TierConfigError::InvalidLevel);
        }
        if tier.range.is_inverted() {
            return Err(TierConfigError::InvertedRange {
                min: tier.range.min,
                max: tier.range.max,
            });
        }

        let existing = self.tiers_by_scope.entry(tier.scope.as_key()).or_default();
        for other in existing.iter() {
            if other.level == tier.level {
                return Err(TierConfigError::DuplicateLevel {
                    scope: tier.scope.clone(),
                    level: tier.level,
                });
            }
            if other.range.overlaps(&tier.range) {
                return Err(TierConfigError::OverlappingRange {
                    scope: tier.scope.clone(),
                    level: tier.level,
                    other_level: other.level,
                    min: tier.range.min,
                    max: tier.range.max,
                });
            }
        }

        existing.push(tier);
        existing.sort_by_key(|tier| tier.level);
        Ok(())
    }

    /// The scope's tiers in ascending level order; empty when the scope has
    /// no table.
    pub fn tiers_for_scope(&self, scope: &ScopeKey) -> &[Tier] {
        self.tiers_by_scope.get(&scope.as_key()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolve(&self, scope: &ScopeKey, amount: Decimal) -> Result<&Tier, ResolveError> {
        resolve(self.tiers_for_scope(scope), amount)
            .ok_or_else(|| ResolveError::NotFound { scope: scope.clone(), amount })
    }
}

/// Find the tier whose inclusive range contains `amount`.
///
/// Pure function of the given tier list. A `None` means no authority is
/// defined for the amount; callers must block submission, never fall back
/// to the nearest tier.
pub fn resolve(tiers: &[Tier], amount: Decimal) -> Option<&Tier> {
    tiers.iter().find(|tier| tier.range.contains(amount))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ResolveError, TierConfigError, TierTable};
    use crate::domain::identity::UserId;
    use crate::domain::scope::ScopeKey;
    use crate::domain::tier::{AmountRange, SlotAssignments, Tier, TierId};

    fn tier(scope: &ScopeKey, level: u32, min: i64, max: i64) -> Tier {
        Tier {
            id: TierId(format!("tier-{}-{level}", scope.as_key())),
            scope: scope.clone(),
            level,
            range: AmountRange::new(Decimal::new(min, 0), Decimal::new(max, 0)),
            assignments: SlotAssignments {
                approver1: Some(UserId::new("u-approver")),
                ..SlotAssignments::default()
            },
        }
    }

    fn scope() -> ScopeKey {
        ScopeKey::new("finance", "purchasing")
    }

    #[test]
    fn tiers_are_listed_in_level_order() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 2, 10_001, 50_000)).expect("level 2");
        table.add_tier(tier(&scope(), 1, 0, 10_000)).expect("level 1");

        let levels: Vec<u32> =
            table.tiers_for_scope(&scope()).iter().map(|tier| tier.level).collect();
        assert_eq!(levels, [1, 2]);
    }

    #[test]
    fn duplicate_level_is_rejected() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 1, 0, 10_000)).expect("first");

        let error = table.add_tier(tier(&scope(), 1, 20_000, 30_000)).expect_err("duplicate");
        assert!(matches!(error, TierConfigError::DuplicateLevel { level: 1, .. }));
    }

    #[test]
    fn overlapping_range_is_rejected_including_touching_bounds() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 1, 0, 10_000)).expect("first");

        let error = table.add_tier(tier(&scope(), 2, 10_000, 50_000)).expect_err("touching max");
        assert!(matches!(error, TierConfigError::OverlappingRange { other_level: 1, .. }));

        table.add_tier(tier(&scope(), 2, 10_001, 50_000)).expect("adjacent but disjoint");
    }

    #[test]
    fn inverted_range_and_zero_level_are_rejected() {
        let mut table = TierTable::new();

        let error = table.add_tier(tier(&scope(), 1, 500, 100)).expect_err("inverted");
        assert!(matches!(error, TierConfigError::InvertedRange { .. }));

        let error = table.add_tier(tier(&scope(), 0, 0, 100)).expect_err("zero level");
        assert_eq!(error, TierConfigError::InvalidLevel);
    }

    #[test]
    fn same_range_in_another_scope_is_allowed() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 1, 0, 10_000)).expect("finance");
        table
            .add_tier(tier(&ScopeKey::new("operations", "purchasing"), 1, 0, 10_000))
            .expect("operations scope is disjoint");
    }

    #[test]
    fn resolve_picks_the_owning_tier() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 1, 0, 10_000)).expect("level 1");
        table.add_tier(tier(&scope(), 2, 10_001, 50_000)).expect("level 2");

        let resolved = table.resolve(&scope(), Decimal::new(5_000, 0)).expect("within level 1");
        assert_eq!(resolved.level, 1);

        let resolved = table.resolve(&scope(), Decimal::new(10_001, 0)).expect("lower bound");
        assert_eq!(resolved.level, 2);

        let resolved = table.resolve(&scope(), Decimal::new(50_000, 0)).expect("upper bound");
        assert_eq!(resolved.level, 2);
    }

    #[test]
    fn resolve_reports_not_found_outside_configured_ranges() {
        let mut table = TierTable::new();
        table.add_tier(tier(&scope(), 1, 100, 10_000)).expect("level 1");

        let error = table.resolve(&scope(), Decimal::new(15_000, 0)).expect_err("above max");
        assert!(matches!(error, ResolveError::NotFound { .. }));

        let error = table.resolve(&scope(), Decimal::new(50, 0)).expect_err("below min");
        assert!(matches!(error, ResolveError::NotFound { .. }));

        let error = table
            .resolve(&ScopeKey::new("unknown", "scope"), Decimal::new(5_000, 0))
            .expect_err("unconfigured scope");
        assert!(matches!(error, ResolveError::NotFound { .. }));
    }
}
