//! Verdict - check-string authorization policy engine
//!
//! Parses operator-readable check strings (`role:reader and system_scope:all`),
//! keeps a reloadable registry of per-operation rules, and decides requests,
//! including the fallback to deprecated defaults while a policy migration is
//! in progress.

pub mod policy;
pub mod settings;
