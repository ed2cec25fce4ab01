pub mod cache;
pub mod check;
pub mod context;
pub mod defaults;
pub mod deprecation;
pub mod enforcer;
pub mod errors;
pub mod loader;
pub mod overrides;
pub mod registry;
pub mod sample;
pub mod types;
pub mod web;

pub use check::{evaluate, parse_check, Check, Operand};
pub use context::{RequestContext, ScopeType};
pub use enforcer::{Enforcer, EnforcerOptions};
pub use errors::PolicyError;
pub use registry::Registry;
pub use types::{Decision, MatchedRule, Reason, RuleDefinition, RuleEntry};
