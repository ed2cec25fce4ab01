use std::collections::HashSet;
use std::path::Path;

use crate::policy::cache::CheckCache;
use crate::policy::errors::PolicyError;
use crate::policy::overrides::{parse_overrides, Overrides};
use crate::policy::registry::Registry;
use crate::policy::types::{DeprecatedRule, Rule, RuleDefinition, RuleEntry};

/// Read and parse an operator override file.
pub fn load_overrides(path: &Path) -> Result<Overrides, PolicyError> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| PolicyError::OverrideLoad {
            path: path.display().to_string(),
            source,
        })?;
    let overrides = parse_overrides(&contents)?;
    tracing::info!(
        path = %path.display(),
        overrides = overrides.len(),
        "Loaded policy overrides"
    );
    Ok(overrides)
}

/// Compile rule definitions, with operator overrides applied, into a registry.
///
/// An overridden rule loses its deprecated shadow: the operator has picked
/// the policy explicitly, so there is nothing to migrate from.
pub fn build_registry(
    definitions: &[RuleDefinition],
    overrides: &Overrides,
    cache: &CheckCache,
) -> Result<Registry, PolicyError> {
    let mut registry = Registry::new();

    for def in definitions {
        let (check_str, deprecated) = match overrides.get(&def.name) {
            Some(text) => {
                tracing::debug!(rule = %def.name, check = text, "Applying policy override");
                (text, None)
            }
            None => (def.check_str.as_str(), def.deprecated.as_ref()),
        };

        let deprecated = match deprecated {
            Some(old) => Some(DeprecatedRule {
                name: def.name.clone(),
                check_str: old.check_str.clone(),
                check: cache.compile(&old.check_str)?,
                since: old.since.clone(),
                reason: old.reason.clone(),
            }),
            None => None,
        };

        registry.register(RuleEntry {
            rule: Rule {
                name: def.name.clone(),
                check_str: check_str.to_string(),
                check: cache.compile(check_str)?,
                scope_types: def.scope_types.clone(),
                description: def.description.clone(),
                operations: def.operations.clone(),
            },
            deprecated,
        })?;
    }

    let known: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
    for (operation, _) in overrides.iter() {
        if !known.contains(operation) {
            tracing::warn!("ignoring override for unknown operation `{operation}`");
        }
    }

    tracing::info!(
        rules = registry.len(),
        transitional = registry.transitional_count(),
        overrides = overrides.len(),
        compiled_checks = cache.len(),
        "Built policy registry"
    );

    Ok(registry)
}

/// Check an override set against the rule definitions without building a
/// registry. Returns every problem found rather than stopping at the first.
pub fn validate_overrides(
    definitions: &[RuleDefinition],
    overrides: &Overrides,
) -> Vec<PolicyError> {
    let known: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
    let mut problems = Vec::new();
    for (operation, check_str) in overrides.iter() {
        if !known.contains(operation) {
            problems.push(PolicyError::UnknownOperation(operation.to_string()));
        }
        if let Err(e) = crate::policy::check::parse_check(check_str) {
            problems.push(e);
        }
    }
    problems
}
