//! The constraint store.
//!
//! One store exists per inference site. It owns the set of variables the
//! solver may bind (`unknowns`), the set of rigid variables that are free
//! in the problem but must not be bound (`vars`), and per-unknown bound
//! sets.
//!
//! Invariants, checked on every mutation:
//! 1. `unknowns` and `vars` are disjoint.
//! 2. Stored bounds have no free unknowns: elimination rewrites them away
//!    before storage.
//! 3. Elimination is polarity-aware so the stored bound stays monotone in
//!    the bounded unknown: an unknown at a covariant position of an upper
//!    bound becomes `top`, of a lower bound `bot`; polarity flips through
//!    proc parameter positions; rigid variables and unknowns at invariant
//!    argument positions become `any`.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::environment::TypeEnv;
use crate::types::{Type, TypeKind, Variance};

/// Errors raised by store mutation. These indicate a bug in the caller,
/// not a failed check; the master reports them as unrecoverable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// `unknowns` and `vars` overlap.
    OverlappingVariables { variable: String },
    /// A stored bound still mentions an unknown after elimination.
    InvariantViolation { variable: String, bound: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::OverlappingVariables { variable } => {
                write!(f, "variable `{variable}` is both unknown and rigid")
            }
            StoreError::InvariantViolation { variable, bound } => {
                write!(
                    f,
                    "bound `{bound}` of unknown `{variable}` still has free unknowns"
                )
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Which side of a bound we are eliminating inside; decides whether an
/// unknown occurrence becomes `top` or `bot`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Polarity {
    /// Upper-bound position: unknowns go to `top`.
    Upper,
    /// Lower-bound position: unknowns go to `bot`.
    Lower,
}

impl Polarity {
    fn flip(self) -> Polarity {
        match self {
            Polarity::Upper => Polarity::Lower,
            Polarity::Lower => Polarity::Upper,
        }
    }

    fn extreme(self) -> Type {
        match self {
            Polarity::Upper => Type::top(),
            Polarity::Lower => Type::bot(),
        }
    }
}

/// Saved bound state, restored when a failed check must not leave bounds
/// behind.
#[derive(Clone, Debug)]
pub struct StoreSnapshot {
    lower: IndexMap<String, Vec<Type>>,
    upper: IndexMap<String, Vec<Type>>,
}

#[derive(Clone, Debug)]
pub struct ConstraintStore {
    unknowns: IndexSet<String>,
    vars: IndexSet<String>,
    lower: IndexMap<String, Vec<Type>>,
    upper: IndexMap<String, Vec<Type>>,
}

impl ConstraintStore {
    pub fn new(
        unknowns: impl IntoIterator<Item = String>,
        vars: impl IntoIterator<Item = String>,
    ) -> Result<Self, StoreError> {
        let unknowns: IndexSet<String> = unknowns.into_iter().collect();
        let vars: IndexSet<String> = vars.into_iter().collect();
        if let Some(overlap) = unknowns.iter().find(|u| vars.contains(*u)) {
            return Err(StoreError::OverlappingVariables {
                variable: overlap.clone(),
            });
        }
        Ok(ConstraintStore {
            unknowns,
            vars,
            lower: IndexMap::new(),
            upper: IndexMap::new(),
        })
    }

    /// A store with no unknowns at all; every variable is rigid.
    pub fn empty() -> Self {
        ConstraintStore {
            unknowns: IndexSet::new(),
            vars: IndexSet::new(),
            lower: IndexMap::new(),
            upper: IndexMap::new(),
        }
    }

    pub fn unknown(&self, name: &str) -> bool {
        self.unknowns.contains(name)
    }

    pub fn rigid(&self, name: &str) -> bool {
        self.vars.contains(name)
    }

    pub fn unknowns(&self) -> impl Iterator<Item = &String> {
        self.unknowns.iter()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknowns.len()
    }

    pub fn vars(&self) -> impl Iterator<Item = &String> {
        self.vars.iter()
    }

    /// True when no bounds have been recorded.
    pub fn is_empty(&self) -> bool {
        self.lower.values().all(Vec::is_empty) && self.upper.values().all(Vec::is_empty)
    }

    /// Iterate unknowns with their recorded bound sets.
    pub fn each(&self) -> impl Iterator<Item = (&String, &[Type], &[Type])> {
        self.unknowns.iter().map(|name| {
            let lower = self.lower.get(name).map(Vec::as_slice).unwrap_or(&[]);
            let upper = self.upper.get(name).map(Vec::as_slice).unwrap_or(&[]);
            (name, lower, upper)
        })
    }

    /// Register bounds for an unknown. `Logic` types are coerced to the
    /// boolean nominal at this boundary. Trivial bounds (`bot` lower,
    /// `top` upper) are dropped silently. The environment supplies the
    /// declared variance of nominal type arguments for elimination.
    pub fn add(
        &mut self,
        variable: &str,
        sub: Option<&Type>,
        sup: Option<&Type>,
        env: &TypeEnv,
    ) -> Result<(), StoreError> {
        if let Some(sub) = sub {
            let bound = self.eliminate(&sub.coerce_logic(), Polarity::Lower, env);
            if !matches!(bound.kind, TypeKind::Bot) {
                self.verify_bound(variable, &bound)?;
                self.lower.entry(variable.to_string()).or_default().push(bound);
            }
        }
        if let Some(sup) = sup {
            let bound = self.eliminate(&sup.coerce_logic(), Polarity::Upper, env);
            if !matches!(bound.kind, TypeKind::Top) {
                self.verify_bound(variable, &bound)?;
                self.upper.entry(variable.to_string()).or_default().push(bound);
            }
        }
        Ok(())
    }

    fn verify_bound(&self, variable: &str, bound: &Type) -> Result<(), StoreError> {
        let free = bound.free_variables();
        if free.iter().any(|v| self.unknowns.contains(v)) {
            return Err(StoreError::InvariantViolation {
                variable: variable.to_string(),
                bound: bound.to_string(),
            });
        }
        Ok(())
    }

    /// The effective lower bound of an unknown: the union of its recorded
    /// lower bounds, `bot` when none.
    pub fn lower_bound(&self, variable: &str) -> Type {
        match self.lower.get(variable) {
            Some(bounds) if !bounds.is_empty() => Type::union(bounds.clone()),
            _ => Type::bot(),
        }
    }

    /// The effective upper bound of an unknown: the intersection of its
    /// recorded upper bounds, `top` when none.
    pub fn upper_bound(&self, variable: &str) -> Type {
        match self.upper.get(variable) {
            Some(bounds) if !bounds.is_empty() => Type::intersection(bounds.clone()),
            _ => Type::top(),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.lower = snapshot.lower;
        self.upper = snapshot.upper;
    }

    /// Rewrite a type so it mentions no unknowns and no rigid variables,
    /// monotone in the unknown being bounded.
    fn eliminate(&self, ty: &Type, polarity: Polarity, env: &TypeEnv) -> Type {
        let kind = match &ty.kind {
            TypeKind::Var(name) => {
                if self.unknowns.contains(name) {
                    return polarity.extreme();
                }
                if self.vars.contains(name) {
                    return Type::any();
                }
                return ty.clone();
            }
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {
                return ty.clone();
            }
            TypeKind::Nominal { kind, name, args } => {
                let variances = env.variances(name);
                let args = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| {
                        let variance = variances
                            .as_ref()
                            .and_then(|vs| vs.get(i).copied())
                            .unwrap_or(Variance::Covariant);
                        match variance {
                            Variance::Covariant => self.eliminate(arg, polarity, env),
                            Variance::Contravariant => self.eliminate(arg, polarity.flip(), env),
                            Variance::Invariant => self.neutralize(arg),
                        }
                    })
                    .collect();
                TypeKind::Nominal {
                    kind: *kind,
                    name: name.clone(),
                    args,
                }
            }
            TypeKind::Union(members) => {
                return Type::union(
                    members
                        .iter()
                        .map(|m| self.eliminate(m, polarity, env))
                        .collect(),
                );
            }
            TypeKind::Intersection(members) => {
                return Type::intersection(
                    members
                        .iter()
                        .map(|m| self.eliminate(m, polarity, env))
                        .collect(),
                );
            }
            TypeKind::Tuple(elems) => TypeKind::Tuple(
                elems
                    .iter()
                    .map(|e| self.eliminate(e, polarity, env))
                    .collect(),
            ),
            TypeKind::Record(fields) => TypeKind::Record(
                fields
                    .iter()
                    .map(|(k, t)| (k.clone(), self.eliminate(t, polarity, env)))
                    .collect(),
            ),
            TypeKind::Proc(proc) => {
                return Type::proc(
                    proc.params
                        .iter()
                        .map(|p| self.eliminate(p, polarity.flip(), env))
                        .collect(),
                    proc.keywords
                        .iter()
                        .map(|(k, t)| (k.clone(), self.eliminate(t, polarity.flip(), env)))
                        .collect(),
                    self.eliminate(&proc.ret, polarity, env),
                );
            }
        };
        Type {
            kind,
            loc: ty.loc,
        }
    }

    /// Replace tracked variables at positions where neither `top` nor
    /// `bot` is monotone.
    fn neutralize(&self, ty: &Type) -> Type {
        let free = ty.free_variables();
        if free
            .iter()
            .all(|v| !self.unknowns.contains(v) && !self.vars.contains(v))
        {
            return ty.clone();
        }
        let mut subst = crate::subst::Substitution::new();
        for var in free {
            if self.unknowns.contains(&var) || self.vars.contains(&var) {
                subst.insert(var, Type::any());
            }
        }
        subst.apply(ty)
    }
}

impl fmt::Display for ConstraintStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.unknowns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{} <: {name} <: {}",
                self.lower_bound(name),
                self.upper_bound(name)
            )?;
        }
        Ok(())
    }
}
