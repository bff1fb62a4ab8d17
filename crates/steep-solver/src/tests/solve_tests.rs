//! Tests for the constraint solver: determined/free/double-ended
//! classification, variance-directed bindings, unsatisfiability, and the
//! substitution laws the solver guarantees.

use super::*;
use crate::constraints::ConstraintStore;
use crate::solve::{SolveError, solve};
use crate::subtyping::{CheckContext, Relation, SubtypeChecker};
use crate::types::Variance;

fn solve_store(
    env: &TypeEnv,
    store: &ConstraintStore,
    variance: Variance,
) -> Result<crate::Substitution, SolveError> {
    let mut checker = SubtypeChecker::new(env);
    let context = CheckContext::new().with_variance(variance);
    solve(store, &mut checker, &context)
}

fn store(unknowns: &[&str]) -> ConstraintStore {
    ConstraintStore::new(unknowns.iter().map(|s| s.to_string()), vec![]).unwrap()
}

// =============================================================================
// Determined and Free Unknowns
// =============================================================================

#[test]
fn test_lower_bound_only_binds_to_lower() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&integer()), None, &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Covariant).unwrap();
    assert_eq!(subst.get("T"), Some(&integer()));
}

#[test]
fn test_upper_bound_only_binds_to_upper() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", None, Some(&numeric()), &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Covariant).unwrap();
    assert_eq!(subst.get("T"), Some(&numeric()));
}

#[test]
fn test_free_unknown_defaults_to_any() {
    let env = test_env();
    let store = store(&["T"]);
    let subst = solve_store(&env, &store, Variance::Covariant).unwrap();
    assert_eq!(subst.get("T"), Some(&Type::any()));
}

#[test]
fn test_empty_store_solves_to_empty_substitution() {
    let env = test_env();
    let store = ConstraintStore::empty();
    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    assert!(subst.is_empty());
}

// =============================================================================
// Double-Ended Unknowns
// =============================================================================

#[test]
fn test_invariant_tiebreak_prefers_lower() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&integer()), Some(&numeric()), &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    assert_eq!(subst.get("T"), Some(&integer()));
}

#[test]
fn test_covariant_binds_to_lower() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&integer()), Some(&numeric()), &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Covariant).unwrap();
    assert_eq!(subst.get("T"), Some(&integer()));
}

#[test]
fn test_contravariant_binds_to_upper() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&integer()), Some(&numeric()), &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Contravariant).unwrap();
    assert_eq!(subst.get("T"), Some(&numeric()));
}

#[test]
fn test_invariant_picks_the_shallower_bound() {
    let env = test_env();
    let mut store = store(&["T"]);
    // lower: ::Integer (level 1), upper: ::Array[::Integer] | ::Numeric
    // (level 4): the shallower lower bound wins.
    store
        .add(
            "T",
            Some(&integer()),
            Some(&Type::union(vec![array(integer()), numeric()])),
            &env,
        )
        .unwrap();

    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    assert_eq!(subst.get("T"), Some(&integer()));
}

#[test]
fn test_unsatisfiable_bounds() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&string()), Some(&integer()), &env).unwrap();

    let error = solve_store(&env, &store, Variance::Invariant).unwrap_err();
    match error {
        SolveError::UnsatisfiableConstraint {
            variable,
            lower,
            upper,
        } => {
            assert_eq!(variable, "T");
            assert_eq!(lower, string());
            assert_eq!(upper, integer());
        }
        other => panic!("expected unsatisfiable constraint, got {other}"),
    }
}

// =============================================================================
// Nested Stores
// =============================================================================

#[test]
fn test_untracked_variable_solves_through_a_nested_store() {
    let env = test_env();
    let mut store = store(&["T"]);
    // `x` is neither unknown nor rigid here, so verifying
    // ::Array[x] <: ::Array[::Integer] opens a nested store over {x}.
    store
        .add(
            "T",
            Some(&array(Type::var("x"))),
            Some(&array(integer())),
            &env,
        )
        .unwrap();

    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    assert_eq!(subst.get("T"), Some(&array(integer())));
    assert_eq!(subst.get("x"), Some(&integer()));
}

// =============================================================================
// Substitution Laws
// =============================================================================

#[test]
fn test_solution_is_idempotent() {
    let env = test_env();
    let mut store = store(&["T", "U", "V"]);
    store.add("T", Some(&integer()), None, &env).unwrap();
    store
        .add("U", Some(&array(Type::var("x"))), Some(&array(numeric())), &env)
        .unwrap();
    store.add("V", None, None, &env).ok();

    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    for (_, value) in subst.iter() {
        assert_eq!(&subst.apply(value), value, "not idempotent at {value}");
    }
}

#[test]
fn test_solution_satisfies_the_bounds() {
    let env = test_env();
    let mut store = store(&["T"]);
    store.add("T", Some(&integer()), Some(&numeric()), &env).unwrap();

    let subst = solve_store(&env, &store, Variance::Invariant).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    let context = CheckContext::new();
    let bound_t = subst.apply(&Type::var("T"));

    let lower = subst.apply(&store.lower_bound("T"));
    let upper = subst.apply(&store.upper_bound("T"));
    assert!(
        checker
            .check(&Relation::new(lower, bound_t.clone()), &context, None)
            .is_success()
    );
    assert!(
        checker
            .check(&Relation::new(bound_t, upper), &context, None)
            .is_success()
    );
}
