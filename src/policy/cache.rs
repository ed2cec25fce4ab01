use std::sync::Arc;

use dashmap::DashMap;

use crate::policy::check::{parse_check, Check};
use crate::policy::errors::PolicyError;

/// Compiled checks keyed by their exact source text.
///
/// Shared between registry builds so a reload only compiles the check
/// strings it has not seen before.
#[derive(Debug, Default)]
pub struct CheckCache {
    compiled: DashMap<String, Arc<Check>>,
}

impl CheckCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, check_str: &str) -> Result<Arc<Check>, PolicyError> {
        if let Some(hit) = self.compiled.get(check_str) {
            return Ok(Arc::clone(hit.value()));
        }

        // Compile outside the shard lock. Two threads racing on the same text
        // produce equal trees and the first insert wins.
        let check = Arc::new(parse_check(check_str)?);
        let entry = self
            .compiled
            .entry(check_str.to_string())
            .or_insert(check);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
