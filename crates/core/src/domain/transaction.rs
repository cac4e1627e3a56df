use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::chain::{Chain, ChainStatus, SlotName};
use crate::domain::identity::UserId;
use crate::domain::scope::ScopeKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// The kind of back-office record being approved. The type decides which
/// slots participate: procurement-shaped records go through the review
/// slots, HR-shaped records go straight to the approvers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    PurchaseRequest,
    CanvassItem,
    RateCard,
    BudgetAdjustment,
    LeaveRequest,
    Overtime,
    Loan,
}

impl TransactionType {
    const FULL_SLATE: [SlotName; 5] = [
        SlotName::Reviewer1,
        SlotName::Reviewer2,
        SlotName::Approver1,
        SlotName::Approver2,
        SlotName::Approver3,
    ];
    const APPROVERS_ONLY: [SlotName; 3] =
        [SlotName::Approver1, SlotName::Approver2, SlotName::Approver3];

    /// The slots applicable to this type, in signing precedence order.
    pub fn applicable_slots(self) -> &'static [SlotName] {
        match self {
            Self::PurchaseRequest | Self::CanvassItem | Self::RateCard | Self::BudgetAdjustment => {
                &Self::FULL_SLATE
            }
            Self::LeaveRequest | Self::Overtime | Self::Loan => &Self::APPROVERS_ONLY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseRequest => "purchase_request",
            Self::CanvassItem => "canvass_item",
            Self::RateCard => "rate_card",
            Self::BudgetAdjustment => "budget_adjustment",
            Self::LeaveRequest => "leave_request",
            Self::Overtime => "overtime",
            Self::Loan => "loan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "purchase_request" => Some(Self::PurchaseRequest),
            "canvass_item" => Some(Self::CanvassItem),
            "rate_card" => Some(Self::RateCard),
            "budget_adjustment" => Some(Self::BudgetAdjustment),
            "leave_request" => Some(Self::LeaveRequest),
            "overtime" => Some(Self::Overtime),
            "loan" => Some(Self::Loan),
            _ => None,
        }
    }
}

/// The unit being approved: an RFP, canvass item, leave request, loan,
/// rate card, and so on. Mutated only by signing actions until the
/// aggregate status becomes terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub scope: ScopeKey,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub requested_by: UserId,
    pub chain: Chain,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn status(&self) -> ChainStatus {
        self.chain.status()
    }
}
