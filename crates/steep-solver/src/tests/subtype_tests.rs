//! Tests for the subtyping checker: trivial verdicts, distribution,
//! nominal hierarchy walks, variance, structural cases, interfaces,
//! coinductive cycles, and bound recording.

use super::*;
use crate::constraints::ConstraintStore;
use crate::subtyping::{CheckContext, FailureReason, Relation, SubtypeChecker};
use crate::types::LogicKind;
use indexmap::IndexMap;

fn check(env: &TypeEnv, sub: Type, sup: Type) -> bool {
    let mut checker = SubtypeChecker::new(env);
    checker
        .check(&Relation::new(sub, sup), &CheckContext::new(), None)
        .is_success()
}

// =============================================================================
// Trivial Verdicts
// =============================================================================

#[test]
fn test_reflexivity() {
    let env = test_env();
    assert!(check(&env, integer(), integer()));
    assert!(check(&env, array(Type::var("A")), array(Type::var("A"))));
}

#[test]
fn test_top_bot_any() {
    let env = test_env();
    assert!(check(&env, Type::bot(), integer()));
    assert!(check(&env, integer(), Type::top()));
    assert!(check(&env, Type::any(), integer()));
    assert!(check(&env, integer(), Type::any()));
    assert!(!check(&env, Type::top(), integer()));
    assert!(!check(&env, integer(), Type::bot()));
}

#[test]
fn test_logic_coerces_to_bool() {
    let env = test_env();
    assert!(check(
        &env,
        Type::logic(LogicKind::Truthy),
        Type::bool_instance()
    ));
    assert!(check(
        &env,
        Type::bool_instance(),
        Type::logic(LogicKind::Envelope)
    ));
    assert!(!check(&env, Type::logic(LogicKind::Falsy), integer()));
}

// =============================================================================
// Nominal Hierarchy
// =============================================================================

#[test]
fn test_superclass_chain() {
    let env = test_env();
    assert!(check(&env, integer(), numeric()));
    assert!(check(&env, integer(), Type::instance("::Object", vec![])));
    assert!(!check(&env, numeric(), integer()));
    assert!(check(&env, Type::instance("::Cat", vec![]), Type::instance("::Animal", vec![])));
}

#[test]
fn test_class_types_walk_the_chain_too() {
    let env = test_env();
    assert!(check(
        &env,
        Type::class("::Cat", vec![]),
        Type::class("::Animal", vec![])
    ));
    assert!(!check(
        &env,
        Type::class("::Animal", vec![]),
        Type::class("::Cat", vec![])
    ));
}

#[test]
fn test_covariant_argument() {
    let env = test_env();
    // ::Array is covariant in its element.
    assert!(check(&env, array(integer()), array(numeric())));
    assert!(!check(&env, array(numeric()), array(integer())));
}

#[test]
fn test_invariant_argument() {
    let env = test_env();
    // ::Hash is invariant in its key.
    let hash = |k: Type, v: Type| Type::instance("::Hash", vec![k, v]);
    assert!(!check(
        &env,
        hash(integer(), string()),
        hash(numeric(), string())
    ));
    assert!(check(
        &env,
        hash(integer(), string()),
        hash(integer(), string())
    ));
}

#[test]
fn test_alias_expansion() {
    let mut env = test_env();
    env.insert_alias(crate::environment::AliasDecl {
        name: "::int_or_str".to_string(),
        type_params: vec![],
        body: Type::union(vec![integer(), string()]),
        loc: None,
    });
    let alias = Type::alias("::int_or_str", vec![]);
    assert!(check(&env, integer(), alias.clone()));
    assert!(check(&env, alias.clone(), Type::union(vec![integer(), string()])));
    assert!(!check(&env, float(), alias));
}

// =============================================================================
// Union / Intersection Distribution
// =============================================================================

#[test]
fn test_union_on_the_left_needs_every_member() {
    let env = test_env();
    assert!(check(&env, Type::union(vec![integer(), float()]), numeric()));
    assert!(!check(&env, Type::union(vec![integer(), string()]), numeric()));
}

#[test]
fn test_union_on_the_right_needs_one_member() {
    let env = test_env();
    assert!(check(&env, integer(), Type::union(vec![string(), numeric()])));
    assert!(!check(&env, float(), Type::union(vec![string(), integer()])));
}

#[test]
fn test_intersection_on_the_left_needs_one_member() {
    let env = test_env();
    let both = Type::intersection(vec![
        Type::instance("::Animal", vec![]),
        Type::interface("::_Each", vec![integer()]),
    ]);
    assert!(check(&env, both, Type::instance("::Animal", vec![])));
}

#[test]
fn test_intersection_on_the_right_needs_every_member() {
    let env = test_env();
    assert!(!check(
        &env,
        integer(),
        Type::intersection(vec![numeric(), string()])
    ));
}

// =============================================================================
// Tuples, Records, Procs
// =============================================================================

#[test]
fn test_tuple_pointwise_covariant() {
    let env = test_env();
    assert!(check(
        &env,
        Type::tuple(vec![integer(), float()]),
        Type::tuple(vec![numeric(), numeric()])
    ));
    assert!(!check(
        &env,
        Type::tuple(vec![integer()]),
        Type::tuple(vec![integer(), integer()])
    ));
}

#[test]
fn test_tuple_is_an_array() {
    let env = test_env();
    assert!(check(
        &env,
        Type::tuple(vec![integer(), float()]),
        array(numeric())
    ));
    assert!(!check(
        &env,
        Type::tuple(vec![integer(), string()]),
        array(numeric())
    ));
    // And an array is an object.
    assert!(check(
        &env,
        Type::tuple(vec![integer()]),
        Type::instance("::Object", vec![])
    ));
}

#[test]
fn test_record_and_proc_lift_to_their_classes() {
    let env = test_env();
    assert!(check(
        &env,
        Type::record(vec![("name".to_string(), string())]),
        Type::instance("::Object", vec![])
    ));
    assert!(check(
        &env,
        Type::proc(vec![], vec![], integer()),
        Type::instance("::Proc", vec![])
    ));
}

#[test]
fn test_record_width_and_depth() {
    let env = test_env();
    let wide = Type::record(vec![
        ("name".to_string(), string()),
        ("age".to_string(), integer()),
    ]);
    let narrow = Type::record(vec![("name".to_string(), string())]);
    let deep = Type::record(vec![("age".to_string(), numeric())]);
    assert!(check(&env, wide.clone(), narrow.clone()));
    assert!(check(&env, wide.clone(), deep));
    assert!(!check(&env, narrow, wide));
}

#[test]
fn test_proc_contravariant_params_covariant_return() {
    let env = test_env();
    let f = Type::proc(vec![numeric()], vec![], integer());
    let g = Type::proc(vec![integer()], vec![], numeric());
    assert!(check(&env, f.clone(), g.clone()));
    assert!(!check(&env, g, f));
}

#[test]
fn test_proc_arity_mismatch() {
    let env = test_env();
    let f = Type::proc(vec![integer()], vec![], integer());
    let g = Type::proc(vec![integer(), integer()], vec![], integer());
    let mut checker = SubtypeChecker::new(&env);
    let result = checker.check(&Relation::new(f, g), &CheckContext::new(), None);
    assert!(matches!(
        result.reason(),
        Some(FailureReason::ParameterMismatch { keyword: None })
    ));
}

#[test]
fn test_proc_keywords_matched_by_name() {
    let env = test_env();
    let f = Type::proc(vec![], vec![("size".to_string(), numeric())], integer());
    let g = Type::proc(vec![], vec![("size".to_string(), integer())], integer());
    let h = Type::proc(vec![], vec![("count".to_string(), integer())], integer());
    assert!(check(&env, f.clone(), g.clone()));
    assert!(!check(&env, g.clone(), f));

    let mut checker = SubtypeChecker::new(&env);
    let result = checker.check(&Relation::new(g, h), &CheckContext::new(), None);
    assert!(matches!(
        result.reason(),
        Some(FailureReason::ParameterMismatch { keyword: Some(k) }) if k == "count"
    ));
}

// =============================================================================
// Interfaces
// =============================================================================

#[test]
fn test_interface_conformance() {
    let mut env = test_env();
    let mut methods = IndexMap::new();
    methods.insert(
        "each".to_string(),
        method(Type::proc(vec![], vec![], array(integer()))),
    );
    env.insert_class(ClassDecl {
        name: "::IntList".to_string(),
        type_params: vec![],
        superclass: Some(Type::instance("::Object", vec![])),
        methods,
        loc: None,
    });

    assert!(check(
        &env,
        Type::instance("::IntList", vec![]),
        Type::interface("::_Each", vec![integer()])
    ));
    // Invariant interface parameter: element type must match exactly.
    assert!(!check(
        &env,
        Type::instance("::IntList", vec![]),
        Type::interface("::_Each", vec![string()])
    ));
}

#[test]
fn test_interface_missing_method() {
    let env = test_env();
    let mut checker = SubtypeChecker::new(&env);
    let result = checker.check(
        &Relation::new(
            Type::instance("::Animal", vec![]),
            Type::interface("::_Each", vec![integer()]),
        ),
        &CheckContext::new(),
        None,
    );
    assert!(matches!(
        result.reason(),
        Some(FailureReason::MissingMethod { name }) if name == "each"
    ));
}

#[test]
fn test_recursive_interface_is_coinductive() {
    let mut env = test_env();
    let mut iface_methods = IndexMap::new();
    iface_methods.insert(
        "children".to_string(),
        method(Type::proc(
            vec![],
            vec![],
            array(Type::interface("::_Tree", vec![])),
        )),
    );
    env.insert_interface(InterfaceDecl {
        name: "::_Tree".to_string(),
        type_params: vec![],
        methods: iface_methods,
        loc: None,
    });
    let mut leaf_methods = IndexMap::new();
    leaf_methods.insert(
        "children".to_string(),
        method(Type::proc(
            vec![],
            vec![],
            array(Type::instance("::Leaf", vec![])),
        )),
    );
    env.insert_class(ClassDecl {
        name: "::Leaf".to_string(),
        type_params: vec![],
        superclass: Some(Type::instance("::Object", vec![])),
        methods: leaf_methods,
        loc: None,
    });

    // Checking ::Leaf <: ::_Tree revisits itself through the return type
    // of `children`; the guard set turns the cycle into a success.
    assert!(check(
        &env,
        Type::instance("::Leaf", vec![]),
        Type::interface("::_Tree", vec![])
    ));
}

// =============================================================================
// Context-Resolved Variables
// =============================================================================

#[test]
fn test_self_resolves_through_context() {
    let env = test_env();
    let mut checker = SubtypeChecker::new(&env);
    let context = CheckContext::new().with_self_type(integer());
    let result = checker.check(
        &Relation::new(Type::var("self"), numeric()),
        &context,
        None,
    );
    assert!(result.is_success());
}

// =============================================================================
// Bound Recording
// =============================================================================

#[test]
fn test_unknown_on_the_right_records_lower_bound() {
    let env = test_env();
    let mut store = ConstraintStore::new(vec!["T".to_string()], vec![]).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    let result = checker.check(
        &Relation::new(integer(), Type::var("T")),
        &CheckContext::new(),
        Some(&mut store),
    );
    assert!(result.is_success());
    assert_eq!(store.lower_bound("T"), integer());
    assert_eq!(store.upper_bound("T"), Type::top());
}

#[test]
fn test_unknown_on_the_left_records_upper_bound() {
    let env = test_env();
    let mut store = ConstraintStore::new(vec!["T".to_string()], vec![]).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    let result = checker.check(
        &Relation::new(Type::var("T"), numeric()),
        &CheckContext::new(),
        Some(&mut store),
    );
    assert!(result.is_success());
    assert_eq!(store.upper_bound("T"), numeric());
}

#[test]
fn test_rigid_variable_is_not_bound() {
    let env = test_env();
    let mut store = ConstraintStore::new(vec!["T".to_string()], vec!["A".to_string()]).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    // `A` is rigid: the check must fail rather than record a bound.
    let result = checker.check(
        &Relation::new(integer(), Type::var("A")),
        &CheckContext::new(),
        Some(&mut store),
    );
    assert!(!result.is_success());
    assert!(store.is_empty());
}

#[test]
fn test_failed_check_leaves_no_bounds() {
    let env = test_env();
    let mut store = ConstraintStore::new(vec!["T".to_string()], vec![]).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    // The pointwise check against the first element records a bound for T
    // before the second element fails the whole relation.
    let result = checker.check(
        &Relation::new(
            Type::tuple(vec![integer(), integer()]),
            Type::tuple(vec![Type::var("T"), string()]),
        ),
        &CheckContext::new(),
        Some(&mut store),
    );
    assert!(!result.is_success());
    assert!(store.is_empty(), "bounds leaked: {store}");
}

#[test]
fn test_failed_union_branch_rolls_back_bounds() {
    let env = test_env();
    let mut store = ConstraintStore::new(vec!["T".to_string()], vec![]).unwrap();
    let mut checker = SubtypeChecker::new(&env);
    // The `[T, ::Integer]` disjunct sorts first, records T's bound, then
    // fails on the second tuple element; the `[top, ::String]` disjunct
    // succeeds without bounds.
    let result = checker.check(
        &Relation::new(
            Type::tuple(vec![integer(), string()]),
            Type::union(vec![
                Type::tuple(vec![Type::var("T"), integer()]),
                Type::tuple(vec![Type::top(), string()]),
            ]),
        ),
        &CheckContext::new(),
        Some(&mut store),
    );
    assert!(result.is_success());
    assert!(store.is_empty(), "failed branch leaked bounds: {store}");
}
