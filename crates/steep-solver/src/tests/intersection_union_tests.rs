//! Tests for union and intersection normalization and the basic type
//! algebra operations: free variables, substitution, level.

use super::*;
use crate::subst::Substitution;
use crate::types::{LogicKind, TypeKind};

// =============================================================================
// Union Normalization
// =============================================================================

#[test]
fn test_union_empty_is_bot() {
    assert_eq!(Type::union(vec![]), Type::bot());
}

#[test]
fn test_intersection_empty_is_top() {
    assert_eq!(Type::intersection(vec![]), Type::top());
}

#[test]
fn test_union_single_member_collapses() {
    assert_eq!(Type::union(vec![integer()]), integer());
    assert_eq!(Type::intersection(vec![string()]), string());
}

#[test]
fn test_union_order_insensitive() {
    let a = Type::union(vec![integer(), string()]);
    let b = Type::union(vec![string(), integer()]);
    assert_eq!(a, b);
}

#[test]
fn test_union_flattens_and_dedups() {
    let nested = Type::union(vec![
        integer(),
        Type::union(vec![string(), integer()]),
    ]);
    if let TypeKind::Union(members) = &nested.kind {
        assert_eq!(members.len(), 2);
    } else {
        panic!("expected a union, got {nested}");
    }
}

#[test]
fn test_union_drops_bot_members() {
    assert_eq!(Type::union(vec![integer(), Type::bot()]), integer());
}

#[test]
fn test_union_with_top_is_top() {
    assert_eq!(Type::union(vec![integer(), Type::top()]), Type::top());
}

#[test]
fn test_union_with_any_is_any() {
    assert_eq!(Type::union(vec![integer(), Type::any()]), Type::any());
}

#[test]
fn test_intersection_with_bot_is_bot() {
    assert_eq!(
        Type::intersection(vec![integer(), Type::bot()]),
        Type::bot()
    );
}

#[test]
fn test_intersection_drops_top_members() {
    assert_eq!(
        Type::intersection(vec![Type::top(), string()]),
        string()
    );
}

// =============================================================================
// Structural Equality
// =============================================================================

#[test]
fn test_equality_ignores_location() {
    let with_loc = integer().with_loc(steep_common::Span::new(3, 12));
    assert_eq!(with_loc, integer());
}

#[test]
fn test_record_key_order_insensitive() {
    let a = Type::record(vec![
        ("x".to_string(), integer()),
        ("y".to_string(), string()),
    ]);
    let b = Type::record(vec![
        ("y".to_string(), string()),
        ("x".to_string(), integer()),
    ]);
    assert_eq!(a, b);
}

#[test]
fn test_tuple_position_sensitive() {
    let a = Type::tuple(vec![integer(), string()]);
    let b = Type::tuple(vec![string(), integer()]);
    assert_ne!(a, b);
}

// =============================================================================
// Free Variables, Level, Substitution
// =============================================================================

#[test]
fn test_free_variables() {
    let ty = Type::proc(
        vec![Type::var("A"), array(Type::var("B"))],
        vec![("k".to_string(), Type::var("A"))],
        Type::var("C"),
    );
    let free: Vec<_> = ty.free_variables().into_iter().collect();
    assert_eq!(free, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
}

#[test]
fn test_level_counts_nodes() {
    assert_eq!(integer().level(), 1);
    assert_eq!(array(integer()).level(), 2);
    assert_eq!(Type::tuple(vec![integer(), array(string())]).level(), 4);
}

#[test]
fn test_substitution_replaces_free_occurrences() {
    let ty = array(Type::var("A"));
    let mut subst = Substitution::new();
    subst.insert("A", integer());
    assert_eq!(subst.apply(&ty), array(integer()));
}

#[test]
fn test_substitution_normalizes_unions() {
    let ty = Type::union(vec![Type::var("A"), integer()]);
    let mut subst = Substitution::new();
    subst.insert("A", integer());
    // A | Integer with A := Integer collapses to Integer.
    assert_eq!(subst.apply(&ty), integer());
}

#[test]
fn test_substitution_merge_rewrites_existing_values() {
    let mut outer = Substitution::new();
    outer.insert("T", array(Type::var("x")));
    let mut inner = Substitution::new();
    inner.insert("x", integer());
    outer.merge(&inner);
    assert_eq!(outer.get("T"), Some(&array(integer())));
    assert_eq!(outer.get("x"), Some(&integer()));
}

// =============================================================================
// Display
// =============================================================================

#[test]
fn test_display() {
    assert_eq!(array(integer()).to_string(), "::Array[::Integer]");
    assert_eq!(
        Type::class("::Cat", vec![]).to_string(),
        "singleton(::Cat)"
    );
    assert_eq!(
        Type::proc(
            vec![integer()],
            vec![("size".to_string(), integer())],
            string()
        )
        .to_string(),
        "(::Integer, size: ::Integer) -> ::String"
    );
    assert_eq!(Type::logic(LogicKind::Truthy).to_string(), "truthy");
}
