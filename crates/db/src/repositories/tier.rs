use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use loa_core::domain::identity::UserId;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::{AmountRange, SlotAssignments, Tier, TierId};

use super::{RepositoryError, TierRepository};
use crate::DbPool;

pub struct SqlTierRepository {
    pool: DbPool,
}

impl SqlTierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid amount `{raw}`: {error}")))
}

fn row_to_tier(row: &sqlx::sqlite::SqliteRow) -> Result<Tier, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let division: String =
        row.try_get("division").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level: i64 = row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_amount: String =
        row.try_get("min_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_amount: String =
        row.try_get("max_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let signer = |column: &str| -> Result<Option<UserId>, RepositoryError> {
        let value: Option<String> =
            row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(value.filter(|value| !value.trim().is_empty()).map(UserId))
    };

    let level = u32::try_from(level)
        .map_err(|_| RepositoryError::Decode(format!("invalid tier level {level}")))?;

    Ok(Tier {
        id: TierId(id),
        scope: ScopeKey::new(division, category),
        level,
        range: AmountRange::new(parse_amount(&min_amount)?, parse_amount(&max_amount)?),
        assignments: SlotAssignments {
            reviewer1: signer("reviewer1_id")?,
            reviewer2: signer("reviewer2_id")?,
            approver1: signer("approver1_id")?,
            approver2: signer("approver2_id")?,
            approver3: signer("approver3_id")?,
        },
    })
}

#[async_trait::async_trait]
impl TierRepository for SqlTierRepository {
    async fn list_for_scope(&self, scope: &ScopeKey) -> Result<Vec<Tier>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, division, category, level, min_amount, max_amount,
                    reviewer1_id, reviewer2_id, approver1_id, approver2_id, approver3_id
             FROM loa_tier
             WHERE division = ? AND category = ?
             ORDER BY level ASC",
        )
        .bind(scope.division())
        .bind(scope.category())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_tier).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, tier: Tier) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let signer = |user: &Option<UserId>| user.as_ref().map(|user| user.0.clone());

        sqlx::query(
            "INSERT INTO loa_tier (id, division, category, level, min_amount, max_amount,
                                   reviewer1_id, reviewer2_id, approver1_id, approver2_id,
                                   approver3_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 level = excluded.level,
                 min_amount = excluded.min_amount,
                 max_amount = excluded.max_amount,
                 reviewer1_id = excluded.reviewer1_id,
                 reviewer2_id = excluded.reviewer2_id,
                 approver1_id = excluded.approver1_id,
                 approver2_id = excluded.approver2_id,
                 approver3_id = excluded.approver3_id,
                 updated_at = excluded.updated_at",
        )
        .bind(&tier.id.0)
        .bind(tier.scope.division())
        .bind(tier.scope.category())
        .bind(i64::from(tier.level))
        .bind(tier.range.min.to_string())
        .bind(tier.range.max.to_string())
        .bind(signer(&tier.assignments.reviewer1))
        .bind(signer(&tier.assignments.reviewer2))
        .bind(signer(&tier.assignments.approver1))
        .bind(signer(&tier.assignments.approver2))
        .bind(signer(&tier.assignments.approver3))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
