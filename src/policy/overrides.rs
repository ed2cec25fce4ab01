use std::collections::BTreeMap;

use kdl::KdlDocument;

use crate::policy::errors::PolicyError;

/// Operator-supplied check strings, keyed by operation name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    rules: BTreeMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, operation: impl Into<String>, check_str: impl Into<String>) {
        self.rules.insert(operation.into(), check_str.into());
    }

    pub fn get(&self, operation: &str) -> Option<&str> {
        self.rules.get(operation).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parse an override document.
///
/// ```kdl
/// rule "identity:get_credential" "role:admin or user_id:%(target.credential.user_id)s"
/// ```
pub fn parse_overrides(source: &str) -> Result<Overrides, PolicyError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| PolicyError::KdlParse(e.to_string()))?;

    let mut overrides = Overrides::new();

    for node in doc.nodes() {
        match node.name().value() {
            "rule" => {
                let mut args = string_args(node);
                let operation = args.next().ok_or_else(|| {
                    PolicyError::InvalidOverride(
                        "rule node requires an operation name (e.g. rule \"identity:get_credential\" \"role:admin\")"
                            .into(),
                    )
                })?;
                let check_str = args.next().ok_or_else(|| {
                    PolicyError::InvalidOverride(format!(
                        "rule `{operation}` is missing its check string"
                    ))
                })?;
                if args.next().is_some() {
                    return Err(PolicyError::InvalidOverride(format!(
                        "rule `{operation}` takes exactly two arguments"
                    )));
                }
                if overrides.get(operation).is_some() {
                    return Err(PolicyError::InvalidOverride(format!(
                        "rule `{operation}` is overridden more than once"
                    )));
                }
                overrides.insert(operation, check_str);
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(overrides)
}

/// Positional string arguments of a KDL node, in order.
fn string_args(node: &kdl::KdlNode) -> impl Iterator<Item = &str> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
}
