use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Organizational key owning one tier table: a division paired with the
/// sub-module/category the authority limits apply to (purchasing, rates,
/// budget adjustments, ...).
///
/// Both components are normalized (trimmed, ASCII-lowercased) at
/// construction so `HR / Payroll` and `hr/payroll` address the same table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeKey {
    division: String,
    category: String,
}

impl<'de> Deserialize<'de> for ScopeKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            division: String,
            category: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(ScopeKey::new(raw.division, raw.category))
    }
}

impl ScopeKey {
    pub fn new(division: impl AsRef<str>, category: impl AsRef<str>) -> Self {
        Self {
            division: normalize_key(division.as_ref()),
            category: normalize_key(category.as_ref()),
        }
    }

    pub fn division(&self) -> &str {
        &self.division
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Canonical single-string form, used as a storage/lookup key.
    pub fn as_key(&self) -> String {
        format!("{}/{}", self.division, self.category)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.division, self.category)
    }
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::ScopeKey;

    #[test]
    fn scope_keys_normalize_case_and_whitespace() {
        let left = ScopeKey::new(" Finance ", "Purchasing");
        let right = ScopeKey::new("finance", " purchasing");

        assert_eq!(left, right);
        assert_eq!(left.as_key(), "finance/purchasing");
    }

    #[test]
    fn distinct_categories_are_distinct_scopes() {
        let purchasing = ScopeKey::new("finance", "purchasing");
        let rates = ScopeKey::new("finance", "rates");

        assert_ne!(purchasing, rates);
    }
}
