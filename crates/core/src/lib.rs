pub mod audit;
pub mod builder;
pub mod config;
pub mod domain;
pub mod errors;
pub mod machine;
pub mod org;
pub mod tiers;

pub use audit::{replay, seal_entry, verify_trail, AuditEntry, SealedAuditEntry, TrailVerification};
pub use builder::{build_chain, BuiltChain, ChainBuildError};
pub use domain::chain::{Chain, ChainStatus, Decision, SlotInstance, SlotName};
pub use domain::identity::{UserId, SYSTEM_ACTOR};
pub use domain::scope::ScopeKey;
pub use domain::tier::{AmountRange, SlotAssignments, Tier, TierId};
pub use domain::transaction::{Transaction, TransactionId, TransactionType};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use machine::{apply_action, ActionCommand, ActionDecision, ActionError, ActionOutcome};
pub use org::{IdentityProfile, InMemoryOrgLookup, OrgLookup};
pub use tiers::{resolve, ResolveError, TierConfigError, TierTable};
