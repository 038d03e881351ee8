//! Normalization of verified token claims into internal authorities.
//!
//! Keycloak nests roles in two loosely-typed claims: `realm_access` holds a
//! `roles` list, and `resource_access` maps client ids to objects holding
//! their own `roles` list. Both are pattern-matched defensively: a missing
//! or misshapen claim contributes no authorities, never an error.

use serde_json::Value;
use std::collections::BTreeSet;

/// Claim tree of a verified token: names mapped to JSON values.
pub type ClaimSet = serde_json::Map<String, Value>;

/// Union of all authority sources, deduplicated. Duplicate authorities from
/// different claim sources collapse.
#[must_use]
pub fn normalize(claims: &ClaimSet) -> BTreeSet<String> {
    let mut authorities = BTreeSet::new();
    collect_scope_authorities(claims, &mut authorities);
    collect_realm_roles(claims, &mut authorities);
    collect_client_roles(claims, &mut authorities);
    authorities
}

/// Display name precedence: non-empty `preferred_username`, else `sub`.
/// Strict precedence, not a merge.
#[must_use]
pub fn display_name(claims: &ClaimSet) -> Option<String> {
    if let Some(name) = claims
        .get("preferred_username")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
    {
        return Some(name.to_string());
    }
    claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Provider-native `scope` claim, space-separated, passed through with the
/// conventional `SCOPE_` prefix and no case change.
fn collect_scope_authorities(claims: &ClaimSet, authorities: &mut BTreeSet<String>) {
    let Some(scope) = claims.get("scope").and_then(Value::as_str) else {
        return;
    };
    for scope in scope.split_whitespace() {
        authorities.insert(format!("SCOPE_{scope}"));
    }
}

/// `realm_access.roles[]` becomes `ROLE_<UPPERCASE(role)>`.
fn collect_realm_roles(claims: &ClaimSet, authorities: &mut BTreeSet<String>) {
    for role in roles_of(claims.get("realm_access")) {
        authorities.insert(format!("ROLE_{}", role.to_uppercase()));
    }
}

/// `resource_access.<client>.roles[]` becomes
/// `ROLE_<UPPERCASE(client)>_<UPPERCASE(role)>`.
fn collect_client_roles(claims: &ClaimSet, authorities: &mut BTreeSet<String>) {
    let Some(resource_access) = claims.get("resource_access").and_then(Value::as_object) else {
        return;
    };
    for (client_id, client_claims) in resource_access {
        for role in roles_of(Some(client_claims)) {
            authorities.insert(format!(
                "ROLE_{}_{}",
                client_id.to_uppercase(),
                role.to_uppercase()
            ));
        }
    }
}

/// The `roles` string list of a nested access claim, or nothing when the
/// shape does not match.
fn roles_of(claim: Option<&Value>) -> impl Iterator<Item = &str> {
    claim
        .and_then(Value::as_object)
        .and_then(|map| map.get("roles"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> ClaimSet {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn realm_roles_become_prefixed_uppercase_authorities() {
        let claims = claims(json!({
            "realm_access": { "roles": ["admin", "user_manager"] }
        }));
        let authorities = normalize(&claims);
        assert!(authorities.contains("ROLE_ADMIN"));
        assert!(authorities.contains("ROLE_USER_MANAGER"));
        assert_eq!(authorities.len(), 2);
    }

    #[test]
    fn client_roles_carry_the_client_id() {
        let claims = claims(json!({
            "resource_access": {
                "billing-api": { "roles": ["viewer"] }
            }
        }));
        let authorities = normalize(&claims);
        assert!(authorities.contains("ROLE_BILLING-API_VIEWER"));
    }

    #[test]
    fn scope_claim_passes_through_without_case_change() {
        let claims = claims(json!({ "scope": "openid profile email" }));
        let authorities = normalize(&claims);
        assert!(authorities.contains("SCOPE_openid"));
        assert!(authorities.contains("SCOPE_profile"));
        assert!(authorities.contains("SCOPE_email"));
    }

    #[test]
    fn duplicate_authorities_from_different_sources_collapse() {
        let claims = claims(json!({
            "realm_access": { "roles": ["admin", "admin"] }
        }));
        assert_eq!(normalize(&claims).len(), 1);
    }

    #[test]
    fn normalization_is_total_over_missing_or_misshapen_claims() {
        for value in [
            json!({}),
            json!({ "realm_access": "not-an-object" }),
            json!({ "realm_access": { "roles": "not-a-list" } }),
            json!({ "realm_access": { "roles": [42, true, null] } }),
            json!({ "resource_access": [] }),
            json!({ "resource_access": { "app": { "no_roles": [] } } }),
            json!({ "scope": 17 }),
        ] {
            assert!(normalize(&claims(value)).is_empty());
        }
    }

    #[test]
    fn preferred_username_wins_over_subject() {
        let with_name = claims(json!({
            "sub": "7e5c1f", "preferred_username": "alice"
        }));
        assert_eq!(display_name(&with_name).as_deref(), Some("alice"));

        let empty_name = claims(json!({
            "sub": "7e5c1f", "preferred_username": ""
        }));
        assert_eq!(display_name(&empty_name).as_deref(), Some("7e5c1f"));

        let no_subject = claims(json!({}));
        assert!(display_name(&no_subject).is_none());
    }
}
