use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{Faculty, Scope, ScopeType};

/// Outcome used when there is not enough information to decide eligibility:
/// a voter without a faculty, or an item without any scope metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultEligibility {
    #[default]
    Allow,
    Deny,
}

impl DefaultEligibility {
    pub const fn allows(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl FromStr for DefaultEligibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(format!("expected `allow` or `deny`, got `{s}`")),
        }
    }
}

impl Display for DefaultEligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

/// Decides whether a voter with the given faculty may see and vote in an item
/// with the given scope. Total: every input combination yields an answer.
///
/// `ALL_FACULTIES` admits everyone. Otherwise, missing scope metadata or a
/// missing (or placeholder) voter faculty falls back to `default`, and a
/// known faculty must appear in the scope's list.
pub fn is_eligible(
    voter_faculty: Option<&Faculty>,
    scope: &Scope,
    default: DefaultEligibility,
) -> bool {
    if scope.scope_type == Some(ScopeType::AllFaculties) {
        return true;
    }

    if scope.is_missing() {
        return default.allows();
    }

    match voter_faculty.filter(|faculty| !faculty.is_unspecified()) {
        Some(faculty) => scope.faculties.contains(faculty),
        None => default.allows(),
    }
}
