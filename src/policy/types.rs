use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::policy::check::Check;
use crate::policy::context::{RequestContext, ScopeType};

/// An API call a rule protects, for the generated policy reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpOperation {
    pub path: String,
    pub method: String,
}

impl HttpOperation {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }
}

// ---------- Static rule definitions ----------

/// Uncompiled rule as declared in a defaults table.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub name: String,
    pub check_str: String,
    pub scope_types: BTreeSet<ScopeType>,
    pub description: String,
    pub operations: Vec<HttpOperation>,
    pub deprecated: Option<DeprecatedDefinition>,
}

#[derive(Debug, Clone)]
pub struct DeprecatedDefinition {
    pub check_str: String,
    /// Release the old default was deprecated in, e.g. "Stein"
    pub since: String,
    pub reason: String,
}

// ---------- Compiled registry data ----------

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub check_str: String,
    pub check: Arc<Check>,
    pub scope_types: BTreeSet<ScopeType>,
    pub description: String,
    pub operations: Vec<HttpOperation>,
}

impl Rule {
    /// An empty scope set places no restriction on the token scope.
    pub fn allows_scope(&self, scope: ScopeType) -> bool {
        self.scope_types.is_empty() || self.scope_types.contains(&scope)
    }
}

#[derive(Debug, Clone)]
pub struct DeprecatedRule {
    pub name: String,
    pub check_str: String,
    pub check: Arc<Check>,
    pub since: String,
    pub reason: String,
}

/// One registered operation: the current rule and, while a policy migration
/// is in progress, the rule it replaced.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub rule: Rule,
    pub deprecated: Option<DeprecatedRule>,
}

impl RuleEntry {
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    pub fn is_transitional(&self) -> bool {
        self.deprecated.is_some()
    }
}

// ---------- Decisions ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedRule {
    Current,
    Deprecated,
}

/// Serialized as its display text, so every reason is a plain string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    CheckPassed,
    CheckFailed,
    ScopeNotAllowed,
    DeprecatedFallback,
    MissingAttribute(String),
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::CheckPassed => f.write_str("check_passed"),
            Reason::CheckFailed => f.write_str("check_failed"),
            Reason::ScopeNotAllowed => f.write_str("scope_not_allowed"),
            Reason::DeprecatedFallback => f.write_str("deprecated_fallback"),
            Reason::MissingAttribute(path) => write!(f, "missing_attribute: {path}"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub matched_rule: MatchedRule,
    pub reason: Reason,
}

impl Decision {
    pub fn allow(matched_rule: MatchedRule, reason: Reason) -> Self {
        Self {
            allowed: true,
            matched_rule,
            reason,
        }
    }

    pub fn deny(reason: Reason) -> Self {
        Self {
            allowed: false,
            matched_rule: MatchedRule::Current,
            reason,
        }
    }
}

// ---------- Documentation records ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDoc {
    pub name: String,
    pub check_str: String,
    pub scope_types: Vec<ScopeType>,
    pub description: String,
    pub operations: Vec<HttpOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<DeprecatedDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeprecatedDoc {
    pub check_str: String,
    pub since: String,
    pub reason: String,
}

impl From<&RuleEntry> for RuleDoc {
    fn from(entry: &RuleEntry) -> Self {
        Self {
            name: entry.rule.name.clone(),
            check_str: entry.rule.check_str.clone(),
            scope_types: entry.rule.scope_types.iter().copied().collect(),
            description: entry.rule.description.clone(),
            operations: entry.rule.operations.clone(),
            deprecated: entry.deprecated.as_ref().map(|d| DeprecatedDoc {
                check_str: d.check_str.clone(),
                since: d.since.clone(),
                reason: d.reason.clone(),
            }),
        }
    }
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct EnforceRequest {
    /// e.g. "identity:get_credential"
    pub operation: String,
    pub context: ContextPayload,
}

/// Wire form of a request context; `target` may be a nested object.
#[derive(Debug, Deserialize)]
pub struct ContextPayload {
    #[serde(default)]
    pub roles: BTreeSet<String>,
    pub scope_type: ScopeType,
    pub user_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub target: serde_json::Value,
}

impl From<ContextPayload> for RequestContext {
    fn from(payload: ContextPayload) -> Self {
        let mut ctx = RequestContext::new(payload.user_id, payload.scope_type);
        ctx.roles = payload.roles;
        ctx.project_id = payload.project_id;
        ctx.domain_id = payload.domain_id;
        ctx.with_target_json(&payload.target)
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub rules: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_serializes_as_strings() {
        let decision = Decision::allow(MatchedRule::Deprecated, Reason::DeprecatedFallback);
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "allowed": true,
                "matched_rule": "deprecated",
                "reason": "deprecated_fallback"
            })
        );
    }

    #[test]
    fn test_missing_attribute_reason_is_a_string() {
        let decision = Decision::deny(Reason::MissingAttribute("target.credential.user_id".into()));
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "allowed": false,
                "matched_rule": "current",
                "reason": "missing_attribute: target.credential.user_id"
            })
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Reason::ScopeNotAllowed.to_string(), "scope_not_allowed");
        assert_eq!(
            Reason::MissingAttribute("target.credential.user_id".into()).to_string(),
            "missing_attribute: target.credential.user_id"
        );
    }

    #[test]
    fn test_context_payload_flattens_target() {
        let payload: ContextPayload = serde_json::from_value(json!({
            "roles": ["reader"],
            "scope_type": "project",
            "user_id": "u1",
            "target": { "credential": { "user_id": "u1" } }
        }))
        .unwrap();
        let ctx = RequestContext::from(payload);
        assert!(ctx.has_role("reader"));
        assert_eq!(ctx.target_attr("credential.user_id"), Some("u1"));
    }
}
