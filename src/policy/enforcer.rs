use std::sync::Arc;

use parking_lot::RwLock;

use crate::policy::cache::CheckCache;
use crate::policy::context::RequestContext;
use crate::policy::deprecation::{resolve, DeprecationSink, TracingSink, WarnOnce};
use crate::policy::errors::PolicyError;
use crate::policy::loader::build_registry;
use crate::policy::overrides::Overrides;
use crate::policy::registry::Registry;
use crate::policy::types::{Decision, Reason, RuleDefinition, RuleDoc};

/// Operator switches that change how decisions are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcerOptions {
    /// Ignore deprecated rules entirely; only the new defaults decide.
    pub enforce_new_defaults_only: bool,
    /// Deny tokens whose scope is not listed on the rule. When off, the
    /// mismatch is only logged.
    pub enforce_scope: bool,
}

impl Default for EnforcerOptions {
    fn default() -> Self {
        Self {
            enforce_new_defaults_only: false,
            enforce_scope: true,
        }
    }
}

/// The single entry point for authorization decisions.
///
/// Holds the current registry behind an `Arc`; every `enforce` call works on
/// one snapshot, and `reload` swaps the whole registry at once.
pub struct Enforcer {
    registry: RwLock<Arc<Registry>>,
    cache: CheckCache,
    options: EnforcerOptions,
    warned: WarnOnce,
    sink: Box<dyn DeprecationSink>,
}

impl Enforcer {
    pub fn new(registry: Registry, options: EnforcerOptions) -> Self {
        Self::with_sink(registry, options, Box::new(TracingSink))
    }

    pub fn with_sink(
        registry: Registry,
        options: EnforcerOptions,
        sink: Box<dyn DeprecationSink>,
    ) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            cache: CheckCache::new(),
            options,
            warned: WarnOnce::new(),
            sink,
        }
    }

    /// Build the registry from definitions and overrides, sharing this
    /// enforcer's check cache for later reloads.
    pub fn from_definitions(
        definitions: &[RuleDefinition],
        overrides: &Overrides,
        options: EnforcerOptions,
    ) -> Result<Self, PolicyError> {
        let enforcer = Self::new(Registry::new(), options);
        enforcer.rebuild(definitions, overrides)?;
        Ok(enforcer)
    }

    pub fn enforce(&self, operation: &str, ctx: &RequestContext) -> Result<Decision, PolicyError> {
        let registry = self.registry();
        let entry = registry.lookup(operation)?;

        let decision = if entry.rule.allows_scope(ctx.scope_type) {
            resolve(
                entry,
                ctx,
                self.options.enforce_new_defaults_only,
                &self.warned,
                self.sink.as_ref(),
            )
        } else if self.options.enforce_scope {
            Decision::deny(Reason::ScopeNotAllowed)
        } else {
            tracing::warn!(
                operation,
                scope = %ctx.scope_type,
                "token scope is not allowed for this operation; scope enforcement is disabled"
            );
            resolve(
                entry,
                ctx,
                self.options.enforce_new_defaults_only,
                &self.warned,
                self.sink.as_ref(),
            )
        };

        tracing::debug!(
            operation,
            user_id = %ctx.user_id,
            allowed = decision.allowed,
            matched_rule = ?decision.matched_rule,
            reason = %decision.reason,
            "Policy decision"
        );

        Ok(decision)
    }

    /// Snapshot of the registry currently in force.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry.read())
    }

    /// Replace the registry. In-flight `enforce` calls finish on the old one.
    pub fn reload(&self, registry: Registry) {
        let rules = registry.len();
        *self.registry.write() = Arc::new(registry);
        tracing::info!(rules, "Reloaded policy registry");
    }

    /// Compile a new registry and swap it in. On error the current registry
    /// stays in force.
    pub fn rebuild(
        &self,
        definitions: &[RuleDefinition],
        overrides: &Overrides,
    ) -> Result<usize, PolicyError> {
        let registry = build_registry(definitions, overrides, &self.cache)?;
        let rules = registry.len();
        self.reload(registry);
        Ok(rules)
    }

    pub fn list_rules(&self) -> Vec<RuleDoc> {
        self.registry().list_rules().map(RuleDoc::from).collect()
    }

    pub fn options(&self) -> EnforcerOptions {
        self.options
    }

    /// Operations that have fallen back to a deprecated rule so far.
    pub fn deprecation_warnings(&self) -> usize {
        self.warned.count()
    }
}
