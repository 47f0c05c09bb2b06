//! RBAC permission evaluation over wildcard-bearing allow/deny action lists.
//!
//! Decision logic only:
//! - No IO
//! - No panics
//! - Grants are fetched fresh by callers; nothing here is cached.

use regex::Regex;

use crate::grant::PermissionGrant;

/// The privileged action gated by the grant-check workflow.
pub const ROLE_ASSIGNMENT_WRITE_ACTION: &str = "microsoft.authorization/roleassignments/write";

/// Matching granularity for [`evaluate`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Full wildcard matching of both `actions` and `not_actions` against the
    /// requested action.
    Exact,

    /// Read-access check: an action authorizes iff it is literally `*/read`
    /// or `*`; a not-action vetoes iff it is literally `*` or ends with
    /// `/read`.
    CoarseRead,
}

/// Match `want` against a `*`-wildcard pattern.
///
/// Case-insensitive; the pattern is anchored end-to-end, so
/// `Microsoft.Authorization/*/Write` matches
/// `microsoft.authorization/roleassignments/write` but not
/// `...roleassignments/write2`.
pub fn wildcard_match(pattern: &str, want: &str) -> bool {
    let anchored = format!(
        "^{}$",
        regex::escape(&pattern.to_lowercase()).replace("\\*", ".*")
    );
    // The escaped pattern is always a valid regex; treat a compile failure as
    // no-match rather than panicking.
    Regex::new(&anchored)
        .map(|re| re.is_match(&want.to_lowercase()))
        .unwrap_or(false)
}

/// True iff some grant in `grants` authorizes `want`.
///
/// Per grant: at least one allow pattern must match and no deny pattern may
/// match (deny wins within a grant). Across grants the result is a logical
/// OR, independent of grant order. An empty `actions` list never authorizes.
pub fn evaluate(grants: &[PermissionGrant], want: &str, mode: EvaluationMode) -> bool {
    grants.iter().any(|grant| match mode {
        EvaluationMode::Exact => grant_allows_exact(grant, want),
        EvaluationMode::CoarseRead => grant_allows_read(grant),
    })
}

fn grant_allows_exact(grant: &PermissionGrant, want: &str) -> bool {
    let allowed = grant.actions.iter().any(|action| wildcard_match(action, want));
    if !allowed {
        return false;
    }
    !grant
        .not_actions
        .iter()
        .any(|not_action| wildcard_match(not_action, want))
}

fn grant_allows_read(grant: &PermissionGrant) -> bool {
    let allowed = grant
        .actions
        .iter()
        .any(|action| action.eq_ignore_ascii_case("*/read") || action == "*");
    if !allowed {
        return false;
    }
    !grant.not_actions.iter().any(|not_action| {
        not_action == "*" || not_action.to_lowercase().ends_with("/read")
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grant(actions: &[&str], not_actions: &[&str]) -> PermissionGrant {
        PermissionGrant::new(actions.iter().copied(), not_actions.iter().copied())
    }

    #[test]
    fn wildcard_is_case_insensitive_and_anchored() {
        assert!(wildcard_match(
            "Microsoft.Authorization/*/Write",
            "microsoft.authorization/roleassignments/write"
        ));
        assert!(!wildcard_match(
            "Microsoft.Authorization/*/Write",
            "microsoft.authorization/roleassignments/write2"
        ));
    }

    #[test]
    fn star_matches_everything() {
        assert!(wildcard_match("*", ROLE_ASSIGNMENT_WRITE_ACTION));
    }

    #[test]
    fn literal_pattern_requires_full_equality() {
        assert!(wildcard_match(
            "microsoft.authorization/roleassignments/write",
            ROLE_ASSIGNMENT_WRITE_ACTION
        ));
        assert!(!wildcard_match(
            "microsoft.authorization/roleassignments",
            ROLE_ASSIGNMENT_WRITE_ACTION
        ));
    }

    #[test]
    fn regex_metacharacters_in_actions_are_literal() {
        assert!(!wildcard_match("a.c", "abc"));
        assert!(wildcard_match("a.c", "a.c"));
    }

    #[test]
    fn empty_actions_never_authorize() {
        let grants = [grant(&[], &[])];
        assert!(!evaluate(&grants, ROLE_ASSIGNMENT_WRITE_ACTION, EvaluationMode::Exact));
        assert!(!evaluate(&grants, "any/read", EvaluationMode::CoarseRead));
    }

    #[test]
    fn deny_wins_within_a_grant() {
        let grants = [grant(&["*"], &["Microsoft.Authorization/*/Write"])];
        assert!(!evaluate(
            &grants,
            "microsoft.authorization/roleassignments/write",
            EvaluationMode::Exact
        ));
    }

    #[test]
    fn broader_grant_restores_access_excluded_by_narrower_grant() {
        let grants = [
            grant(&["*"], &["Microsoft.Authorization/*/Write"]),
            grant(&["Microsoft.Authorization/roleAssignments/*"], &[]),
        ];
        assert!(evaluate(&grants, ROLE_ASSIGNMENT_WRITE_ACTION, EvaluationMode::Exact));
    }

    #[test]
    fn coarse_read_allows_full_read_grant() {
        let grants = [grant(&["*/read"], &[])];
        assert!(evaluate(&grants, "ignored", EvaluationMode::CoarseRead));
    }

    #[test]
    fn coarse_read_allows_star_grant() {
        let grants = [grant(&["*"], &[])];
        assert!(evaluate(&grants, "ignored", EvaluationMode::CoarseRead));
    }

    #[test]
    fn coarse_read_vetoed_by_read_suffix_not_action() {
        let grants = [grant(&["*"], &["Microsoft.Compute/*/read"])];
        assert!(!evaluate(&grants, "ignored", EvaluationMode::CoarseRead));
    }

    #[test]
    fn coarse_read_ignores_wildcard_expansion_in_actions() {
        // Only the literal full-read grants matter in coarse mode.
        let grants = [grant(&["Microsoft.Storage/*"], &[])];
        assert!(!evaluate(&grants, "ignored", EvaluationMode::CoarseRead));
    }

    proptest! {
        #[test]
        fn evaluation_is_order_independent(
            mut grants in proptest::collection::vec(
                (
                    proptest::collection::vec("[a-z*./]{1,12}", 0..4),
                    proptest::collection::vec("[a-z*./]{1,12}", 0..4),
                ),
                0..6,
            ),
            want in "[a-z./]{1,16}",
        ) {
            let grants: Vec<PermissionGrant> = grants
                .drain(..)
                .map(|(actions, not_actions)| PermissionGrant::new(actions, not_actions))
                .collect();

            let forward = evaluate(&grants, &want, EvaluationMode::Exact);

            let mut reversed = grants.clone();
            reversed.reverse();
            prop_assert_eq!(forward, evaluate(&reversed, &want, EvaluationMode::Exact));
        }
    }
}
