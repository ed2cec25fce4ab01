//! Default rules for the credential API.

use std::collections::BTreeSet;

use crate::policy::context::ScopeType;
use crate::policy::types::{DeprecatedDefinition, HttpOperation, RuleDefinition};

pub const ADMIN_REQUIRED: &str = "role:admin";

pub const SYSTEM_READER_OR_CRED_OWNER: &str =
    "(role:reader and system_scope:all) or user_id:%(target.credential.user_id)s";
pub const SYSTEM_MEMBER_OR_CRED_OWNER: &str =
    "(role:member and system_scope:all) or user_id:%(target.credential.user_id)s";
pub const SYSTEM_ADMIN_OR_CRED_OWNER: &str =
    "(role:admin and system_scope:all) or user_id:%(target.credential.user_id)s";

const CREDENTIAL_DEPRECATED_SINCE: &str = "Stein";
const CREDENTIAL_DEPRECATED_REASON: &str = "As of the Stein release, the credential API now \
    understands how to handle system-scoped tokens in addition to project-scoped tokens, making \
    the API more accessible to users without compromising security or manageability for \
    administrators. The new default policies for this API account for these changes \
    automatically.";

fn identity(action: &str) -> String {
    format!("identity:{action}")
}

fn credential_rule(
    action: &str,
    check_str: &str,
    description: &str,
    path: &str,
    method: &str,
) -> RuleDefinition {
    RuleDefinition {
        name: identity(action),
        check_str: check_str.to_string(),
        scope_types: BTreeSet::from([ScopeType::System, ScopeType::Project]),
        description: description.to_string(),
        operations: vec![HttpOperation::new(path, method)],
        deprecated: Some(DeprecatedDefinition {
            check_str: ADMIN_REQUIRED.to_string(),
            since: CREDENTIAL_DEPRECATED_SINCE.to_string(),
            reason: CREDENTIAL_DEPRECATED_REASON.to_string(),
        }),
    }
}

pub fn credential_rules() -> Vec<RuleDefinition> {
    vec![
        credential_rule(
            "get_credential",
            SYSTEM_READER_OR_CRED_OWNER,
            "Show credentials details.",
            "/v3/credentials/{credential_id}",
            "GET",
        ),
        credential_rule(
            "list_credentials",
            SYSTEM_READER_OR_CRED_OWNER,
            "List credentials.",
            "/v3/credentials",
            "GET",
        ),
        credential_rule(
            "create_credential",
            SYSTEM_ADMIN_OR_CRED_OWNER,
            "Create credential.",
            "/v3/credentials",
            "POST",
        ),
        credential_rule(
            "update_credential",
            SYSTEM_MEMBER_OR_CRED_OWNER,
            "Update credential.",
            "/v3/credentials/{credential_id}",
            "PATCH",
        ),
        credential_rule(
            "delete_credential",
            SYSTEM_ADMIN_OR_CRED_OWNER,
            "Delete credential.",
            "/v3/credentials/{credential_id}",
            "DELETE",
        ),
    ]
}

/// Every built-in rule the service registers.
pub fn default_rules() -> Vec<RuleDefinition> {
    credential_rules()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::check::parse_check;

    #[test]
    fn test_all_defaults_parse() {
        for def in default_rules() {
            parse_check(&def.check_str).unwrap();
            parse_check(&def.deprecated.unwrap().check_str).unwrap();
        }
    }

    #[test]
    fn test_credential_rule_names() {
        let names: Vec<_> = credential_rules().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "identity:get_credential",
                "identity:list_credentials",
                "identity:create_credential",
                "identity:update_credential",
                "identity:delete_credential",
            ]
        );
    }

    #[test]
    fn test_credential_rules_exclude_domain_scope() {
        for def in credential_rules() {
            assert!(!def.scope_types.contains(&ScopeType::Domain));
            assert_eq!(def.operations.len(), 1);
        }
    }

    #[test]
    fn test_deprecated_reason_text() {
        let deprecated = credential_rules().remove(0).deprecated.unwrap();
        assert_eq!(deprecated.since, "Stein");
        assert_eq!(
            deprecated.reason,
            "As of the Stein release, the credential API now understands how to handle \
             system-scoped tokens in addition to project-scoped tokens, making the API more \
             accessible to users without compromising security or manageability for \
             administrators. The new default policies for this API account for these \
             changes automatically."
        );
    }
}
