use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Authorization granularity of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    System,
    Project,
    Domain,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::System => "system",
            ScopeType::Project => "project",
            ScopeType::Domain => "domain",
        }
    }
}

impl std::fmt::Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(ScopeType::System),
            "project" => Ok(ScopeType::Project),
            "domain" => Ok(ScopeType::Domain),
            other => Err(format!(
                "unknown scope type `{other}` (expected system, project or domain)"
            )),
        }
    }
}

/// Requester attributes a check-string can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    UserId,
    ProjectId,
    DomainId,
}

impl CredentialField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user_id" => Some(CredentialField::UserId),
            "project_id" => Some(CredentialField::ProjectId),
            "domain_id" => Some(CredentialField::DomainId),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialField::UserId => "user_id",
            CredentialField::ProjectId => "project_id",
            CredentialField::DomainId => "domain_id",
        }
    }
}

/// Everything an evaluation may look at: the caller's token attributes and
/// the attributes of the resource being acted on.
///
/// Target keys are dotted paths without the `target.` prefix, so the
/// placeholder `%(target.credential.user_id)s` reads `credential.user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub roles: BTreeSet<String>,
    pub scope_type: ScopeType,
    pub user_id: String,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub target: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, scope_type: ScopeType) -> Self {
        Self {
            roles: BTreeSet::new(),
            scope_type,
            user_id: user_id.into(),
            project_id: None,
            domain_id: None,
            target: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_domain(mut self, domain_id: impl Into<String>) -> Self {
        self.domain_id = Some(domain_id.into());
        self
    }

    pub fn with_target(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.target.insert(path.into(), value.into());
        self
    }

    /// Merge a (possibly nested) JSON object into the target attributes,
    /// flattening nested objects into dot paths.
    pub fn with_target_json(mut self, value: &Value) -> Self {
        flatten_into(&mut self.target, String::new(), value);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn field(&self, field: CredentialField) -> Option<&str> {
        match field {
            CredentialField::UserId => Some(self.user_id.as_str()),
            CredentialField::ProjectId => self.project_id.as_deref(),
            CredentialField::DomainId => self.domain_id.as_deref(),
        }
    }

    pub fn target_attr(&self, path: &str) -> Option<&str> {
        self.target.get(path).map(|s| s.as_str())
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: String, value: &Value) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(out, join(key), child);
            }
        }
        // Arrays and nulls have no scalar form a check can compare with
        Value::Array(_) | Value::Null => {}
        Value::String(s) => {
            if !prefix.is_empty() {
                out.insert(prefix, s.clone());
            }
        }
        Value::Bool(_) | Value::Number(_) => {
            if !prefix.is_empty() {
                out.insert(prefix, value.to_string());
            }
        }
    }
}
