use rust_decimal::Decimal;

use loa_core::domain::identity::UserId;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::{AmountRange, SlotAssignments, Tier, TierId};
use loa_core::tiers::TierTable;

use crate::repositories::{RepositoryError, SqlTierRepository, TierRepository};
use crate::DbPool;

/// Deterministic demo tier tables for local development and smoke checks:
/// a two-tier purchasing table and a single-tier HR leave table.
pub fn demo_tiers() -> Vec<Tier> {
    vec![
        Tier {
            id: TierId("seed-purchasing-1".to_string()),
            scope: ScopeKey::new("finance", "purchasing"),
            level: 1,
            range: AmountRange::new(Decimal::ZERO, Decimal::new(50_000, 0)),
            assignments: SlotAssignments {
                reviewer1: Some(UserId::new("u-1001")),
                approver1: Some(UserId::new("u-2001")),
                ..SlotAssignments::default()
            },
        },
        Tier {
            id: TierId("seed-purchasing-2".to_string()),
            scope: ScopeKey::new("finance", "purchasing"),
            level: 2,
            range: AmountRange::new(Decimal::new(50_001, 0), Decimal::new(500_000, 0)),
            assignments: SlotAssignments {
                reviewer1: Some(UserId::new("u-1001")),
                reviewer2: Some(UserId::new("u-1002")),
                approver1: Some(UserId::new("u-2001")),
                approver2: Some(UserId::new("u-2002")),
                ..SlotAssignments::default()
            },
        },
        Tier {
            id: TierId("seed-hr-leave-1".to_string()),
            scope: ScopeKey::new("hr", "leave"),
            level: 1,
            range: AmountRange::new(Decimal::ZERO, Decimal::new(30, 0)),
            assignments: SlotAssignments {
                approver1: Some(UserId::new("u-3001")),
                ..SlotAssignments::default()
            },
        },
    ]
}

/// Validate the demo dataset through the tier table rules and persist it.
pub async fn seed_demo_tiers(pool: &DbPool) -> Result<usize, RepositoryError> {
    let tiers = demo_tiers();
    TierTable::from_tiers(tiers.clone())
        .map_err(|error| RepositoryError::Decode(format!("demo tiers are invalid: {error}")))?;

    let repo = SqlTierRepository::new(pool.clone());
    let count = tiers.len();
    for tier in tiers {
        repo.save(tier).await?;
    }
    Ok(count)
}
