//! The authenticated actor for one request.

use std::collections::BTreeSet;

use super::claims::{self, ClaimSet};

/// Built fresh per request from a verified claim set; immutable afterwards
/// and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// Stable unique identifier from the provider (`sub` claim).
    pub subject: String,
    /// Human-readable name: `preferred_username`, falling back to `sub`.
    pub preferred_name: String,
    /// Canonical authority strings, deduplicated.
    pub authorities: BTreeSet<String>,
}

impl Principal {
    /// Build a principal from verified claims. Requires a `sub` claim; a
    /// token without a subject identifies nobody.
    #[must_use]
    pub fn from_claims(claims: &ClaimSet) -> Option<Self> {
        let subject = claims
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .filter(|sub| !sub.is_empty())?
            .to_string();
        let preferred_name = claims::display_name(claims).unwrap_or_else(|| subject.clone());
        Some(Self {
            subject,
            preferred_name,
            authorities: claims::normalize(claims),
        })
    }
}
