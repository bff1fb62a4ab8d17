//! The subtyping checker.
//!
//! `check` decides `sub <: sup` by structural recursion. When a constraint
//! store is supplied and a type variable on either side is one of its
//! unknowns, the opposite side is recorded as a bound instead of being
//! decided.
//!
//! Revisiting a relation that is already on the checking stack
//! short-circuits to success, giving recursive nominal types their
//! coinductive reading.
//!
//! A failed check never leaves bounds in the store: bounds recorded under
//! a relation that ultimately fails are rolled back.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::constraints::{ConstraintStore, StoreError};
use crate::environment::{MethodDecl, TypeEnv};
use crate::subst::Substitution;
use crate::types::{NominalKind, Type, TypeKind, Variance};

/// An ordered pair whose intended meaning is `sub <: sup`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    pub sub: Type,
    pub sup: Type,
}

impl Relation {
    pub fn new(sub: Type, sup: Type) -> Self {
        Relation { sub, sup }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <: {}", self.sub, self.sup)
    }
}

/// Why a check failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    TypeMismatch { sub: Type, sup: Type },
    MissingMethod { name: String },
    ParameterMismatch { keyword: Option<String> },
    UnsatisfiableBound { variable: String, message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::TypeMismatch { sub, sup } => {
                write!(f, "`{sub}` is not a subtype of `{sup}`")
            }
            FailureReason::MissingMethod { name } => {
                write!(f, "method `{name}` is missing")
            }
            FailureReason::ParameterMismatch { keyword: Some(keyword) } => {
                write!(f, "keyword parameter `{keyword}` does not match")
            }
            FailureReason::ParameterMismatch { keyword: None } => {
                write!(f, "parameters do not match")
            }
            FailureReason::UnsatisfiableBound { variable, message } => {
                write!(f, "cannot bound `{variable}`: {message}")
            }
        }
    }
}

/// Result of a subtype check: the trace is the stack of relations that
/// led to the verdict.
#[derive(Clone, Debug)]
pub enum SubtypeResult {
    Success {
        trace: Vec<Relation>,
    },
    Failure {
        trace: Vec<Relation>,
        reason: FailureReason,
    },
}

impl SubtypeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SubtypeResult::Success { .. })
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            SubtypeResult::Success { .. } => None,
            SubtypeResult::Failure { reason, .. } => Some(reason),
        }
    }

    pub fn trace(&self) -> &[Relation] {
        match self {
            SubtypeResult::Success { trace } | SubtypeResult::Failure { trace, .. } => trace,
        }
    }
}

/// Context a check runs under. The reserved variables `self`, `instance`
/// and `class` resolve through it; `variance` directs how the solver picks
/// bindings for double-ended unknowns.
#[derive(Clone, Debug, Default)]
pub struct CheckContext {
    pub self_type: Option<Type>,
    pub instance_type: Option<Type>,
    pub class_type: Option<Type>,
    pub variance: Variance,
}

impl CheckContext {
    pub fn new() -> Self {
        CheckContext::default()
    }

    #[must_use]
    pub fn with_variance(mut self, variance: Variance) -> Self {
        self.variance = variance;
        self
    }

    #[must_use]
    pub fn with_self_type(mut self, ty: Type) -> Self {
        self.self_type = Some(ty);
        self
    }

    fn resolve_reserved(&self, name: &str) -> Option<&Type> {
        match name {
            "self" => self.self_type.as_ref(),
            "instance" => self.instance_type.as_ref(),
            "class" => self.class_type.as_ref(),
            _ => None,
        }
    }
}

pub struct SubtypeChecker<'e> {
    env: &'e TypeEnv,
    assumptions: FxHashSet<Relation>,
    trace: Vec<Relation>,
}

impl<'e> SubtypeChecker<'e> {
    pub fn new(env: &'e TypeEnv) -> Self {
        SubtypeChecker {
            env,
            assumptions: FxHashSet::default(),
            trace: Vec::new(),
        }
    }

    pub fn env(&self) -> &TypeEnv {
        self.env
    }

    fn success(&self) -> SubtypeResult {
        SubtypeResult::Success {
            trace: self.trace.clone(),
        }
    }

    fn failure(&self, reason: FailureReason) -> SubtypeResult {
        SubtypeResult::Failure {
            trace: self.trace.clone(),
            reason,
        }
    }

    fn mismatch(&self, relation: &Relation) -> SubtypeResult {
        self.failure(FailureReason::TypeMismatch {
            sub: relation.sub.clone(),
            sup: relation.sup.clone(),
        })
    }

    /// Check a subtyping relation, recording bounds for unknowns into
    /// `constraints` when present.
    pub fn check(
        &mut self,
        relation: &Relation,
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        if self.assumptions.contains(relation) {
            return self.success();
        }
        trace!(sub = %relation.sub, sup = %relation.sup, "check");

        self.assumptions.insert(relation.clone());
        self.trace.push(relation.clone());
        let snapshot = constraints.as_deref().map(ConstraintStore::snapshot);

        let result = self.check_relation(relation, context, constraints.as_deref_mut());

        if !result.is_success() {
            if let (Some(snapshot), Some(store)) = (snapshot, constraints.as_deref_mut()) {
                store.restore(snapshot);
            }
        }
        self.trace.pop();
        self.assumptions.remove(relation);
        result
    }

    fn check_relation(
        &mut self,
        relation: &Relation,
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        let sub = &relation.sub;
        let sup = &relation.sup;

        // Trivial verdicts first.
        if matches!(sub.kind, TypeKind::Any) || matches!(sup.kind, TypeKind::Any) {
            return self.success();
        }
        if matches!(sub.kind, TypeKind::Bot) {
            return self.success();
        }
        if matches!(sup.kind, TypeKind::Top) {
            return self.success();
        }
        if sub == sup {
            return self.success();
        }

        // Logic types only carry truthiness; compared against anything
        // else they stand for the boolean nominal, the same coercion the
        // constraint store applies at its boundary.
        if sub.is_logic() {
            let relation = Relation::new(sub.coerce_logic(), sup.clone());
            return self.check(&relation, context, constraints);
        }
        if sup.is_logic() {
            let relation = Relation::new(sub.clone(), sup.coerce_logic());
            return self.check(&relation, context, constraints);
        }

        // `self` / `instance` / `class` resolve through the context.
        if let TypeKind::Var(name) = &sub.kind {
            if let Some(resolved) = context.resolve_reserved(name) {
                let relation = Relation::new(resolved.clone(), sup.clone());
                return self.check(&relation, context, constraints);
            }
        }
        if let TypeKind::Var(name) = &sup.kind {
            if let Some(resolved) = context.resolve_reserved(name) {
                let relation = Relation::new(sub.clone(), resolved.clone());
                return self.check(&relation, context, constraints);
            }
        }

        // Unknowns are never decided: the opposite side becomes a bound.
        if let TypeKind::Var(name) = &sup.kind {
            if let Some(store) = constraints.as_deref_mut() {
                if store.unknown(name) {
                    return match store.add(name, Some(sub), None, self.env) {
                        Ok(()) => self.success(),
                        Err(error) => self.store_failure(name, &error),
                    };
                }
            }
        }
        if let TypeKind::Var(name) = &sub.kind {
            if let Some(store) = constraints.as_deref_mut() {
                if store.unknown(name) {
                    return match store.add(name, None, Some(sup), self.env) {
                        Ok(()) => self.success(),
                        Err(error) => self.store_failure(name, &error),
                    };
                }
            }
        }

        // Union/intersection distribution; the universally-quantified
        // directions come first.
        if let TypeKind::Union(members) = &sub.kind {
            return self.check_all(
                members.iter().map(|m| Relation::new(m.clone(), sup.clone())),
                context,
                constraints,
            );
        }
        if let TypeKind::Intersection(members) = &sup.kind {
            return self.check_all(
                members.iter().map(|m| Relation::new(sub.clone(), m.clone())),
                context,
                constraints,
            );
        }
        if let TypeKind::Union(members) = &sup.kind {
            return self.check_any(
                members.iter().map(|m| Relation::new(sub.clone(), m.clone())),
                relation,
                context,
                constraints,
            );
        }
        if let TypeKind::Intersection(members) = &sub.kind {
            return self.check_any(
                members.iter().map(|m| Relation::new(m.clone(), sup.clone())),
                relation,
                context,
                constraints,
            );
        }

        // Aliases expand through the environment.
        if let TypeKind::Nominal {
            kind: NominalKind::Alias,
            name,
            args,
        } = &sub.kind
        {
            return match self.env.expand_alias(name, args) {
                Some(expanded) => {
                    let relation = Relation::new(expanded, sup.clone());
                    self.check(&relation, context, constraints)
                }
                None => self.mismatch(relation),
            };
        }
        if let TypeKind::Nominal {
            kind: NominalKind::Alias,
            name,
            args,
        } = &sup.kind
        {
            return match self.env.expand_alias(name, args) {
                Some(expanded) => {
                    let relation = Relation::new(sub.clone(), expanded);
                    self.check(&relation, context, constraints)
                }
                None => self.mismatch(relation),
            };
        }

        // Interfaces are structural: every method the interface demands
        // must be present on the subtype with a compatible signature.
        if let TypeKind::Nominal {
            kind: NominalKind::Interface,
            name,
            args,
        } = &sup.kind
        {
            return self.check_interface(relation, name, args, context, constraints);
        }

        match (&sub.kind, &sup.kind) {
            (
                TypeKind::Nominal {
                    kind: NominalKind::Instance,
                    name: sub_name,
                    args: sub_args,
                },
                TypeKind::Nominal {
                    kind: NominalKind::Instance,
                    name: sup_name,
                    args: sup_args,
                },
            ) => {
                if sub_name == sup_name {
                    self.check_nominal_args(relation, sub_name, sub_args, sup_args, context, constraints)
                } else {
                    // Walk the superclass chain from the subtype side.
                    match self.env.superclass_of(sub_name, sub_args) {
                        Some(superclass) => {
                            let relation = Relation::new(superclass, sup.clone());
                            self.check(&relation, context, constraints)
                        }
                        None => self.mismatch(relation),
                    }
                }
            }
            (
                TypeKind::Nominal {
                    kind: NominalKind::Class,
                    name: sub_name,
                    args: sub_args,
                },
                TypeKind::Nominal {
                    kind: NominalKind::Class,
                    name: sup_name,
                    args: sup_args,
                },
            ) => {
                if sub_name == sup_name {
                    self.check_nominal_args(relation, sub_name, sub_args, sup_args, context, constraints)
                } else {
                    match self.env.superclass_of(sub_name, sub_args) {
                        Some(superclass) => {
                            let superclass = match superclass.kind {
                                TypeKind::Nominal { name, args, .. } => Type::class(name, args),
                                other => Type::new(other),
                            };
                            let relation = Relation::new(superclass, sup.clone());
                            self.check(&relation, context, constraints)
                        }
                        None => self.mismatch(relation),
                    }
                }
            }
            (TypeKind::Tuple(sub_elems), TypeKind::Tuple(sup_elems)) => {
                if sub_elems.len() != sup_elems.len() {
                    return self.mismatch(relation);
                }
                self.check_all(
                    sub_elems
                        .iter()
                        .zip(sup_elems.iter())
                        .map(|(s, t)| Relation::new(s.clone(), t.clone())),
                    context,
                    constraints,
                )
            }
            // A tuple is an array of the union of its element types.
            (
                TypeKind::Tuple(elems),
                TypeKind::Nominal {
                    kind: NominalKind::Instance,
                    ..
                },
            ) => {
                let array = Type::instance("::Array", vec![Type::union(elems.clone())]);
                let relation = Relation::new(array, sup.clone());
                self.check(&relation, context, constraints)
            }
            // A record is a symbol-keyed hash.
            (
                TypeKind::Record(fields),
                TypeKind::Nominal {
                    kind: NominalKind::Instance,
                    ..
                },
            ) => {
                let value = Type::union(fields.iter().map(|(_, t)| t.clone()).collect());
                let hash = Type::instance(
                    "::Hash",
                    vec![Type::instance("::Symbol", vec![]), value],
                );
                let relation = Relation::new(hash, sup.clone());
                self.check(&relation, context, constraints)
            }
            // A proc is a ::Proc.
            (
                TypeKind::Proc(_),
                TypeKind::Nominal {
                    kind: NominalKind::Instance,
                    ..
                },
            ) => {
                let relation = Relation::new(Type::instance("::Proc", vec![]), sup.clone());
                self.check(&relation, context, constraints)
            }
            (TypeKind::Record(sub_fields), TypeKind::Record(sup_fields)) => {
                // The super record's keys must all be present.
                for (key, sup_ty) in sup_fields {
                    let Some((_, sub_ty)) = sub_fields.iter().find(|(k, _)| k == key) else {
                        return self.mismatch(relation);
                    };
                    let field_relation = Relation::new(sub_ty.clone(), sup_ty.clone());
                    let result = self.check(&field_relation, context, constraints.as_deref_mut());
                    if !result.is_success() {
                        return result;
                    }
                }
                self.success()
            }
            (TypeKind::Proc(sub_proc), TypeKind::Proc(sup_proc)) => {
                if sub_proc.params.len() != sup_proc.params.len() {
                    return self.failure(FailureReason::ParameterMismatch { keyword: None });
                }
                // Parameters are contravariant.
                for (sub_param, sup_param) in sub_proc.params.iter().zip(sup_proc.params.iter()) {
                    let param_relation = Relation::new(sup_param.clone(), sub_param.clone());
                    let result = self.check(&param_relation, context, constraints.as_deref_mut());
                    if !result.is_success() {
                        return result;
                    }
                }
                // Keywords are matched by name, contravariant too.
                if sub_proc.keywords.len() != sup_proc.keywords.len() {
                    return self.failure(FailureReason::ParameterMismatch { keyword: None });
                }
                for (key, sup_ty) in &sup_proc.keywords {
                    let Some((_, sub_ty)) = sub_proc.keywords.iter().find(|(k, _)| k == key) else {
                        return self.failure(FailureReason::ParameterMismatch {
                            keyword: Some(key.clone()),
                        });
                    };
                    let keyword_relation = Relation::new(sup_ty.clone(), sub_ty.clone());
                    let result = self.check(&keyword_relation, context, constraints.as_deref_mut());
                    if !result.is_success() {
                        return result;
                    }
                }
                // Return types are covariant.
                let ret_relation =
                    Relation::new(sub_proc.ret.clone(), sup_proc.ret.clone());
                self.check(&ret_relation, context, constraints)
            }
            _ => self.mismatch(relation),
        }
    }

    fn store_failure(&self, variable: &str, error: &StoreError) -> SubtypeResult {
        self.failure(FailureReason::UnsatisfiableBound {
            variable: variable.to_string(),
            message: error.to_string(),
        })
    }

    /// Every relation must hold.
    fn check_all(
        &mut self,
        relations: impl Iterator<Item = Relation>,
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        for relation in relations {
            let result = self.check(&relation, context, constraints.as_deref_mut());
            if !result.is_success() {
                return result;
            }
        }
        self.success()
    }

    /// At least one relation must hold; short-circuits on the first
    /// success. Bounds recorded by failed branches are rolled back by
    /// `check` itself.
    fn check_any(
        &mut self,
        relations: impl Iterator<Item = Relation>,
        whole: &Relation,
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        for relation in relations {
            let result = self.check(&relation, context, constraints.as_deref_mut());
            if result.is_success() {
                return result;
            }
        }
        self.mismatch(whole)
    }

    fn check_nominal_args(
        &mut self,
        relation: &Relation,
        name: &str,
        sub_args: &[Type],
        sup_args: &[Type],
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        if sub_args.len() != sup_args.len() {
            return self.mismatch(relation);
        }
        let variances = self
            .env
            .variances(name)
            .unwrap_or_else(|| vec![Variance::Invariant; sub_args.len()]);
        for ((sub_arg, sup_arg), variance) in
            sub_args.iter().zip(sup_args.iter()).zip(variances)
        {
            let result = match variance {
                Variance::Covariant => {
                    let arg_relation = Relation::new(sub_arg.clone(), sup_arg.clone());
                    self.check(&arg_relation, context, constraints.as_deref_mut())
                }
                Variance::Contravariant => {
                    let arg_relation = Relation::new(sup_arg.clone(), sub_arg.clone());
                    self.check(&arg_relation, context, constraints.as_deref_mut())
                }
                Variance::Invariant => {
                    // Mutual subtyping.
                    let forward = Relation::new(sub_arg.clone(), sup_arg.clone());
                    let result = self.check(&forward, context, constraints.as_deref_mut());
                    if !result.is_success() {
                        return result;
                    }
                    let backward = Relation::new(sup_arg.clone(), sub_arg.clone());
                    self.check(&backward, context, constraints.as_deref_mut())
                }
            };
            if !result.is_success() {
                return result;
            }
        }
        self.success()
    }

    /// `sub <: _Interface[...]`: every method the interface demands must
    /// exist on the subtype with a compatible signature.
    fn check_interface(
        &mut self,
        relation: &Relation,
        name: &str,
        args: &[Type],
        context: &CheckContext,
        mut constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        let Some(expected) = self.env.interface_methods(name, args) else {
            return self.mismatch(relation);
        };
        for (method_name, expected_method) in expected {
            let Some(actual_method) = self.method_on(&relation.sub, &method_name) else {
                return self.failure(FailureReason::MissingMethod { name: method_name });
            };
            let result = self.check_method_pair(
                &actual_method,
                &expected_method,
                context,
                constraints.as_deref_mut(),
            );
            if !result.is_success() {
                return result;
            }
        }
        self.success()
    }

    /// Find a method on the subtype side of an interface check.
    fn method_on(&self, ty: &Type, method: &str) -> Option<MethodDecl> {
        match &ty.kind {
            TypeKind::Nominal {
                kind: NominalKind::Instance,
                name,
                args,
            } => self.env.method_of(name, args, method),
            TypeKind::Nominal {
                kind: NominalKind::Interface,
                name,
                args,
            } => self
                .env
                .interface_methods(name, args)?
                .into_iter()
                .find(|(n, _)| n == method)
                .map(|(_, decl)| decl),
            _ => None,
        }
    }

    /// Compare two method signatures, aligning generic parameters by
    /// position first.
    fn check_method_pair(
        &mut self,
        actual: &MethodDecl,
        expected: &MethodDecl,
        context: &CheckContext,
        constraints: Option<&mut ConstraintStore>,
    ) -> SubtypeResult {
        if actual.type_params.len() != expected.type_params.len() {
            return self.failure(FailureReason::ParameterMismatch { keyword: None });
        }
        let expected_ty = if expected.type_params.is_empty() {
            expected.ty.clone()
        } else {
            let mut rename = Substitution::new();
            for (from, to) in expected.type_params.iter().zip(actual.type_params.iter()) {
                rename.insert(from.clone(), Type::var(to.clone()));
            }
            rename.apply(&expected.ty)
        };
        let relation = Relation::new(actual.ty.clone(), expected_ty);
        self.check(&relation, context, constraints)
    }
}
