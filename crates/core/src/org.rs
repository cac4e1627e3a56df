use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::identity::UserId;
use crate::domain::scope::normalize_key;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub exists: bool,
    pub display_name: String,
}

/// Directory collaborator used to enrich status and history payloads with
/// display names. Never consulted for decision logic.
pub trait OrgLookup: Send + Sync {
    fn resolve_identity(&self, id: &UserId) -> IdentityProfile;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryOrgLookup {
    names_by_user: HashMap<String, String>,
}

impl InMemoryOrgLookup {
    pub fn with_users(users: Vec<(UserId, String)>) -> Self {
        Self {
            names_by_user: users
                .into_iter()
                .map(|(id, name)| (normalize_key(id.as_str()), name))
                .collect(),
        }
    }
}

impl OrgLookup for InMemoryOrgLookup {
    fn resolve_identity(&self, id: &UserId) -> IdentityProfile {
        match self.names_by_user.get(&normalize_key(id.as_str())) {
            Some(name) => IdentityProfile { exists: true, display_name: name.clone() },
            None => IdentityProfile { exists: false, display_name: id.as_str().to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryOrgLookup, OrgLookup};
    use crate::domain::identity::UserId;

    #[test]
    fn known_users_resolve_to_display_names() {
        let lookup = InMemoryOrgLookup::with_users(vec![(
            UserId::new("u-1001"),
            "R. Santos".to_string(),
        )]);

        let profile = lookup.resolve_identity(&UserId::new("U-1001"));
        assert!(profile.exists);
        assert_eq!(profile.display_name, "R. Santos");
    }

    #[test]
    fn unknown_users_fall_back_to_the_raw_id() {
        let lookup = InMemoryOrgLookup::default();

        let profile = lookup.resolve_identity(&UserId::new("u-ghost"));
        assert!(!profile.exists);
        assert_eq!(profile.display_name, "u-ghost");
    }
}
