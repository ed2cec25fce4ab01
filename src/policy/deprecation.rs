//! Deprecated-rule fallback.
//!
//! While an operation is migrating from an old default to a new one, the old
//! check string is kept next to the new. A request the new rule rejects but
//! the old rule accepts is still allowed, reported as governed by the
//! deprecated rule, and announced once per operation so operators know which
//! deployments still lean on the old default.

use dashmap::DashSet;
use serde::Serialize;

use crate::policy::check::{evaluate, Check};
use crate::policy::context::RequestContext;
use crate::policy::errors::PolicyError;
use crate::policy::types::{Decision, DeprecatedRule, MatchedRule, Reason, RuleEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeprecationEvent {
    pub operation: String,
    pub since: String,
    pub reason: String,
    pub deprecated_check_str: String,
    pub check_str: String,
}

/// Receiver for deprecation events. Failures are logged and dropped; they
/// never change a decision.
pub trait DeprecationSink: Send + Sync {
    fn record(&self, event: &DeprecationEvent) -> Result<(), String>;
}

/// Default sink: a structured warning through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DeprecationSink for TracingSink {
    fn record(&self, event: &DeprecationEvent) -> Result<(), String> {
        tracing::warn!(
            operation = %event.operation,
            since = %event.since,
            deprecated_check = %event.deprecated_check_str,
            check = %event.check_str,
            reason = %event.reason,
            "Policy `{}` was granted by its deprecated default `{}` (deprecated in {}). \
             Update role assignments for the new default `{}`, or pin the old behaviour \
             with an explicit override",
            event.operation,
            event.deprecated_check_str,
            event.since,
            event.check_str,
        );
        Ok(())
    }
}

/// Remembers which operations have already announced a fallback.
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: DashSet<String>,
}

impl WarnOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per operation name.
    pub fn first(&self, operation: &str) -> bool {
        if self.seen.contains(operation) {
            return false;
        }
        self.seen.insert(operation.to_string())
    }

    pub fn count(&self) -> usize {
        self.seen.len()
    }
}

/// Outcome of running one check: a missing target attribute counts as a
/// failure with its own reason.
fn run_check(check: &Check, ctx: &RequestContext) -> Result<bool, Reason> {
    match evaluate(check, ctx) {
        Ok(true) => Ok(true),
        Ok(false) => Err(Reason::CheckFailed),
        Err(PolicyError::MissingAttribute(path)) => Err(Reason::MissingAttribute(path)),
        Err(other) => {
            tracing::error!(error = %other, "unexpected evaluation failure, denying");
            Err(Reason::CheckFailed)
        }
    }
}

/// Decide an entry whose scope has already been accepted.
pub fn resolve(
    entry: &RuleEntry,
    ctx: &RequestContext,
    enforce_new_defaults_only: bool,
    warned: &WarnOnce,
    sink: &dyn DeprecationSink,
) -> Decision {
    let denial = match run_check(&entry.rule.check, ctx) {
        Ok(_) => return Decision::allow(MatchedRule::Current, Reason::CheckPassed),
        Err(reason) => reason,
    };

    let deprecated = match &entry.deprecated {
        Some(d) if !enforce_new_defaults_only => d,
        _ => return Decision::deny(denial),
    };

    match run_check(&deprecated.check, ctx) {
        Ok(_) => {
            if warned.first(&entry.rule.name) {
                emit(entry, deprecated, sink);
            }
            Decision::allow(MatchedRule::Deprecated, Reason::DeprecatedFallback)
        }
        Err(_) => Decision::deny(denial),
    }
}

fn emit(entry: &RuleEntry, deprecated: &DeprecatedRule, sink: &dyn DeprecationSink) {
    let event = DeprecationEvent {
        operation: entry.rule.name.clone(),
        since: deprecated.since.clone(),
        reason: deprecated.reason.clone(),
        deprecated_check_str: deprecated.check_str.clone(),
        check_str: entry.rule.check_str.clone(),
    };
    if let Err(e) = sink.record(&event) {
        tracing::debug!(operation = %event.operation, error = %e, "failed to record deprecation event");
    }
}
