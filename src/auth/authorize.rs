//! Stateless authorization checks over normalized authorities.
//!
//! Each protected operation declares its required authority set in code;
//! there is no runtime expression language. Semantics are "any of": holding
//! one required authority is enough.

use super::principal::Principal;

/// True iff the principal holds at least one of the required authorities.
#[must_use]
pub fn authorize(principal: &Principal, required_any_of: &[&str]) -> bool {
    required_any_of
        .iter()
        .any(|authority| principal.authorities.contains(*authority))
}

/// Self-access variant for user-resource operations: a principal may always
/// act on the resource whose identifier equals its own subject, regardless
/// of role membership.
#[must_use]
pub fn authorize_self_or(
    principal: &Principal,
    resource_id: &str,
    required_any_of: &[&str],
) -> bool {
    principal.subject == resource_id || authorize(principal, required_any_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn principal(authorities: &[&str]) -> Principal {
        Principal {
            subject: "4f2c".to_string(),
            preferred_name: "alice".to_string(),
            authorities: authorities.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn any_of_semantics() {
        let required = &["ROLE_ADMIN", "ROLE_USER_MANAGER"];
        assert!(authorize(&principal(&["ROLE_ADMIN"]), required));
        assert!(authorize(&principal(&["ROLE_USER_MANAGER", "ROLE_X"]), required));
        assert!(!authorize(&principal(&["ROLE_X"]), required));
        assert!(!authorize(
            &Principal {
                subject: "4f2c".into(),
                preferred_name: "alice".into(),
                authorities: BTreeSet::new(),
            },
            required
        ));
    }

    #[test]
    fn empty_requirement_denies() {
        assert!(!authorize(&principal(&["ROLE_ADMIN"]), &[]));
    }

    #[test]
    fn self_access_ignores_roles() {
        let p = principal(&[]);
        assert!(authorize_self_or(&p, "4f2c", &["ROLE_ADMIN"]));
        assert!(!authorize_self_or(&p, "other", &["ROLE_ADMIN"]));
    }

    #[test]
    fn self_access_still_honors_roles_for_other_resources() {
        let p = principal(&["ROLE_ADMIN"]);
        assert!(authorize_self_or(&p, "other", &["ROLE_ADMIN"]));
    }
}
