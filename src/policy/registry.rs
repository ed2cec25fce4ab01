use std::collections::HashMap;

use crate::policy::errors::PolicyError;
use crate::policy::types::RuleEntry;

/// Compiled rule set, keyed by operation name.
/// Immutable once handed to the enforcer; a reload builds a new one.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RuleEntry>,
    /// operation name -> position in `entries`
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: RuleEntry) -> Result<(), PolicyError> {
        if self.index.contains_key(entry.name()) {
            return Err(PolicyError::DuplicateRule(entry.name().to_string()));
        }
        self.index.insert(entry.name().to_string(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, operation: &str) -> Result<&RuleEntry, PolicyError> {
        self.index
            .get(operation)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| PolicyError::UnknownOperation(operation.to_string()))
    }

    /// Entries in registration order.
    pub fn list_rules(&self) -> impl Iterator<Item = &RuleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn transitional_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_transitional()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::check::Check;
    use crate::policy::types::Rule;
    use std::sync::Arc;

    fn entry(name: &str) -> RuleEntry {
        RuleEntry {
            rule: Rule {
                name: name.into(),
                check_str: "@".into(),
                check: Arc::new(Check::Always),
                scope_types: Default::default(),
                description: String::new(),
                operations: vec![],
            },
            deprecated: None,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(entry("identity:get_credential")).unwrap();
        assert_eq!(
            registry.lookup("identity:get_credential").unwrap().name(),
            "identity:get_credential"
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::new();
        registry.register(entry("identity:get_credential")).unwrap();
        let err = registry.register(entry("identity:get_credential")).unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateRule(ref n) if n == "identity:get_credential"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_operation() {
        let registry = Registry::new();
        let err = registry.lookup("identity:get_widget").unwrap_err();
        assert!(matches!(err, PolicyError::UnknownOperation(_)));
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let mut registry = Registry::new();
        for name in ["b", "a", "c"] {
            registry.register(entry(name)).unwrap();
        }
        let names: Vec<_> = registry.list_rules().map(|e| e.name()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
