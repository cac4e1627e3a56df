use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier supplied by the organizational directory.
///
/// Optional signer slots model "unassigned" as an absent `Option<UserId>`,
/// never as an in-band sentinel value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reserved actor name recorded on audit entries written by the engine
/// itself (build-time skips, downstream skips after a rejection).
pub const SYSTEM_ACTOR: &str = "system";
