//! End-to-end decisions through the public `Enforcer` API using the
//! built-in credential rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use verdict::policy::defaults::{credential_rules, default_rules, SYSTEM_READER_OR_CRED_OWNER};
use verdict::policy::loader::{load_overrides, validate_overrides};
use verdict::policy::overrides::{parse_overrides, Overrides};
use verdict::policy::{
    evaluate, parse_check, Decision, Enforcer, EnforcerOptions, MatchedRule, PolicyError, Reason,
    RequestContext, ScopeType,
};

const OPERATIONS: [&str; 5] = [
    "identity:get_credential",
    "identity:list_credentials",
    "identity:create_credential",
    "identity:update_credential",
    "identity:delete_credential",
];

fn default_enforcer() -> Enforcer {
    Enforcer::from_definitions(&default_rules(), &Overrides::new(), EnforcerOptions::default())
        .expect("default rules must compile")
}

#[test]
fn test_owner_branch_allows() {
    let check = parse_check(SYSTEM_READER_OR_CRED_OWNER).unwrap();
    let ctx = RequestContext::new("u1", ScopeType::Project)
        .with_role("reader")
        .with_target("credential.user_id", "u1");
    assert!(evaluate(&check, &ctx).unwrap());
}

#[test]
fn test_neither_branch_denies() {
    let check = parse_check(SYSTEM_READER_OR_CRED_OWNER).unwrap();
    let ctx = RequestContext::new("u1", ScopeType::Project).with_target("credential.user_id", "u2");
    assert!(!evaluate(&check, &ctx).unwrap());
}

#[test]
fn test_project_admin_falls_back_to_deprecated_default() {
    let e = default_enforcer();
    let ctx = RequestContext::new("u1", ScopeType::Project)
        .with_role("admin")
        .with_target("credential.user_id", "u2");

    let decision = e.enforce("identity:get_credential", &ctx).unwrap();
    assert_eq!(
        decision,
        Decision::allow(MatchedRule::Deprecated, Reason::DeprecatedFallback)
    );
    assert_eq!(e.deprecation_warnings(), 1);

    // second fallback on the same operation does not warn again
    e.enforce("identity:get_credential", &ctx).unwrap();
    assert_eq!(e.deprecation_warnings(), 1);
}

#[test]
fn test_new_defaults_only_denies_project_admin() {
    let e = Enforcer::from_definitions(
        &default_rules(),
        &Overrides::new(),
        EnforcerOptions {
            enforce_new_defaults_only: true,
            ..Default::default()
        },
    )
    .unwrap();
    let ctx = RequestContext::new("u1", ScopeType::Project)
        .with_role("admin")
        .with_target("credential.user_id", "u2");

    for op in OPERATIONS {
        let decision = e.enforce(op, &ctx).unwrap();
        assert_eq!(decision, Decision::deny(Reason::CheckFailed), "{op}");
    }
    assert_eq!(e.deprecation_warnings(), 0);
}

#[test]
fn test_system_reader_can_read_but_not_write() {
    let e = default_enforcer();
    let ctx = RequestContext::new("auditor", ScopeType::System)
        .with_role("reader")
        .with_target("credential.user_id", "someone-else");

    assert!(e.enforce("identity:get_credential", &ctx).unwrap().allowed);
    assert!(e.enforce("identity:list_credentials", &ctx).unwrap().allowed);
    assert!(!e.enforce("identity:create_credential", &ctx).unwrap().allowed);
    assert!(!e.enforce("identity:delete_credential", &ctx).unwrap().allowed);
}

#[test]
fn test_system_admin_can_do_everything() {
    let e = default_enforcer();
    let ctx = RequestContext::new("root", ScopeType::System)
        .with_role("admin")
        .with_role("member")
        .with_role("reader")
        .with_target("credential.user_id", "u2");

    for op in OPERATIONS {
        let decision = e.enforce(op, &ctx).unwrap();
        assert_eq!(
            decision,
            Decision::allow(MatchedRule::Current, Reason::CheckPassed),
            "{op}"
        );
    }
}

#[test]
fn test_domain_scope_rejected_before_checks() {
    let e = default_enforcer();
    let ctx = RequestContext::new("u1", ScopeType::Domain)
        .with_role("admin")
        .with_target("credential.user_id", "u1");
    for op in OPERATIONS {
        assert_eq!(
            e.enforce(op, &ctx).unwrap(),
            Decision::deny(Reason::ScopeNotAllowed)
        );
    }
}

#[test]
fn test_missing_target_attribute_denies() {
    let e = default_enforcer();
    let ctx = RequestContext::new("u1", ScopeType::Project).with_role("reader");
    let decision = e.enforce("identity:get_credential", &ctx).unwrap();
    assert!(!decision.allowed);
    assert_eq!(
        decision.reason,
        Reason::MissingAttribute("target.credential.user_id".to_string())
    );
}

#[test]
fn test_unknown_operation() {
    let e = default_enforcer();
    let ctx = RequestContext::new("u1", ScopeType::System).with_role("admin");
    assert!(matches!(
        e.enforce("identity:rotate_credential", &ctx),
        Err(PolicyError::UnknownOperation(op)) if op == "identity:rotate_credential"
    ));
}

#[test]
fn test_override_file_replaces_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overrides.kdl");
    std::fs::write(
        &path,
        r#"
// auditors may read any credential
rule "identity:get_credential" "role:auditor or user_id:%(target.credential.user_id)s"
"#,
    )
    .unwrap();

    let overrides = load_overrides(&path).unwrap();
    assert!(validate_overrides(&default_rules(), &overrides).is_empty());

    let e = Enforcer::from_definitions(&default_rules(), &overrides, EnforcerOptions::default())
        .unwrap();
    let auditor = RequestContext::new("a1", ScopeType::Project)
        .with_role("auditor")
        .with_target("credential.user_id", "u2");
    assert!(e.enforce("identity:get_credential", &auditor).unwrap().allowed);

    // the override also drops the deprecated admin fallback
    let project_admin = RequestContext::new("u1", ScopeType::Project)
        .with_role("admin")
        .with_target("credential.user_id", "u2");
    assert!(!e.enforce("identity:get_credential", &project_admin).unwrap().allowed);
    // other operations keep theirs
    assert!(e.enforce("identity:delete_credential", &project_admin).unwrap().allowed);
}

#[test]
fn test_validate_reports_every_problem() {
    let overrides = parse_overrides(
        r#"
rule "identity:get_widget" "role:admin"
rule "identity:get_credential" "role:admin and"
rule "identity:list_credentials" "role:reader"
"#,
    )
    .unwrap();
    let problems = validate_overrides(&credential_rules(), &overrides);
    assert_eq!(problems.len(), 2);
}

#[test]
fn test_reload_is_atomic_under_concurrent_enforce() {
    fn uniform(check: &str) -> Overrides {
        let mut overrides = Overrides::new();
        for op in OPERATIONS {
            overrides.insert(op, check);
        }
        overrides
    }
    let alpha = uniform("role:alpha");
    let beta = uniform("role:beta");

    let e = Arc::new(
        Enforcer::from_definitions(&credential_rules(), &alpha, EnforcerOptions::default())
            .unwrap(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let e = Arc::clone(&e);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let ctx = RequestContext::new("u1", ScopeType::Project).with_role("alpha");
                let mut seen = 0usize;
                while !done.load(Ordering::Relaxed) {
                    let snapshot = e.registry();
                    let first = snapshot.lookup(OPERATIONS[0]).unwrap().rule.check_str.clone();
                    for op in OPERATIONS {
                        assert_eq!(snapshot.lookup(op).unwrap().rule.check_str, first);
                    }
                    // a decision is always either the alpha or the beta outcome
                    let decision = e.enforce(OPERATIONS[2], &ctx).unwrap();
                    assert!(
                        decision == Decision::allow(MatchedRule::Current, Reason::CheckPassed)
                            || decision == Decision::deny(Reason::CheckFailed)
                    );
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for i in 0..200 {
        let overrides = if i % 2 == 0 { &beta } else { &alpha };
        assert_eq!(e.rebuild(&credential_rules(), overrides).unwrap(), 5);
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
    assert_eq!(e.registry().len(), 5);
}
