//! The constraint solver.
//!
//! `solve` consumes a constraint store and produces a substitution that
//! satisfies every recorded bound, or reports the unknown whose bounds
//! cannot be reconciled. Unsatisfiability is a value, not a panic.

use std::collections::BTreeSet;

use tracing::debug;

use crate::constraints::{ConstraintStore, StoreError};
use crate::subst::Substitution;
use crate::subtyping::{CheckContext, Relation, SubtypeChecker};
use crate::types::{Type, TypeKind, Variance};

#[derive(Clone, Debug, PartialEq)]
pub enum SolveError {
    /// The lower bound of an unknown is not a subtype of its upper bound.
    UnsatisfiableConstraint {
        variable: String,
        lower: Type,
        upper: Type,
    },
    Store(StoreError),
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveError::UnsatisfiableConstraint {
                variable,
                lower,
                upper,
            } => write!(
                f,
                "constraint on `{variable}` is unsatisfiable: {lower} <: {variable} <: {upper}"
            ),
            SolveError::Store(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for SolveError {}

impl From<StoreError> for SolveError {
    fn from(error: StoreError) -> Self {
        SolveError::Store(error)
    }
}

/// How an unknown's bounds classify it.
enum Shape {
    /// Both bounds trivial; defaulted to `any` at the end.
    Free,
    /// Exactly one non-trivial bound; bind to it directly.
    Determined(Type),
    /// Both bounds non-trivial; needs `lower <: upper` verification.
    DoubleEnded { lower: Type, upper: Type },
}

fn classify(store: &ConstraintStore, name: &str) -> Shape {
    let lower = store.lower_bound(name);
    let upper = store.upper_bound(name);
    let lower_trivial = matches!(lower.kind, TypeKind::Bot);
    let upper_trivial = matches!(upper.kind, TypeKind::Top);
    match (lower_trivial, upper_trivial) {
        (true, true) => Shape::Free,
        (true, false) => Shape::Determined(upper),
        (false, true) => Shape::Determined(lower),
        (false, false) => Shape::DoubleEnded { lower, upper },
    }
}

/// Solve a constraint store under a context.
///
/// The elimination performed by `ConstraintStore::add` guarantees stored
/// bounds have no free unknowns of their own store, so every nested store
/// built here ranges over strictly fewer (and disjoint) variables and the
/// recursion terminates.
pub fn solve(
    store: &ConstraintStore,
    checker: &mut SubtypeChecker<'_>,
    context: &CheckContext,
) -> Result<Substitution, SolveError> {
    let mut subst = Substitution::new();
    let mut free = Vec::new();
    let mut double_ended = Vec::new();

    for name in store.unknowns() {
        match classify(store, name) {
            Shape::Free => free.push(name.clone()),
            Shape::Determined(ty) => subst.insert(name.clone(), ty),
            Shape::DoubleEnded { lower, upper } => {
                double_ended.push((name.clone(), lower, upper));
            }
        }
    }

    if !double_ended.is_empty() {
        // Verify each double-ended unknown under a nested store ranging
        // over the variables its bounds still leave free.
        let mut nested_unknowns = BTreeSet::new();
        let mut relations = Vec::new();
        for (name, lower, upper) in &double_ended {
            let lower = subst.apply(lower);
            let upper = subst.apply(upper);
            for var in lower
                .free_variables()
                .into_iter()
                .chain(upper.free_variables())
            {
                if !store.unknown(&var) && !store.rigid(&var) {
                    nested_unknowns.insert(var);
                }
            }
            relations.push((name.clone(), lower, upper));
        }
        debug!(
            unknowns = store.unknown_count(),
            nested = nested_unknowns.len(),
            "solving double-ended constraints"
        );

        let mut nested = ConstraintStore::new(nested_unknowns, store.vars().cloned())?;
        for (name, lower, upper) in &relations {
            let relation = Relation::new(lower.clone(), upper.clone());
            let result = checker.check(&relation, context, Some(&mut nested));
            if !result.is_success() {
                return Err(SolveError::UnsatisfiableConstraint {
                    variable: name.clone(),
                    lower: store.lower_bound(name),
                    upper: store.upper_bound(name),
                });
            }
        }

        let nested_solution = if nested.unknown_count() > 0 {
            let solution = solve(&nested, checker, context)?;
            subst.merge(&solution);
            solution
        } else {
            Substitution::new()
        };

        for (name, lower, upper) in double_ended {
            let chosen = match context.variance {
                Variance::Contravariant => upper,
                Variance::Covariant => lower,
                // The tiebreaker is the nesting level; ties prefer the
                // lower bound.
                Variance::Invariant => {
                    if lower.level() <= upper.level() {
                        lower
                    } else {
                        upper
                    }
                }
            };
            let chosen = nested_solution.apply(&subst.apply(&chosen));
            subst.insert(name, chosen);
        }
    }

    // Unknowns without any bound default to `any`.
    for name in free {
        subst.insert(name, Type::any());
    }

    subst.normalize();
    Ok(subst)
}
