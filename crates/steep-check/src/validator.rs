//! Per-file validation.
//!
//! `check_file` produces the diagnostics a code worker publishes for one
//! signature file: syntax errors, duplicate definitions, unknown type
//! names, wrong type-application arity, and incompatible method
//! overrides. Override checking against a generic supermethod is an
//! inference site: the supermethod's type parameters become the unknowns
//! of a constraint store, and the solver decides whether the override can
//! instantiate them.

use std::fmt;
use std::path::Path;

use steep_common::{Diagnostic, Span, diagnostic_codes};
use steep_solver::{
    CheckContext, ConstraintStore, FailureReason, Relation, SolveError, SubtypeChecker,
    Substitution, Type, TypeKind, Variance, solve,
};
use steep_syntax::{ClassDef, Decl, TypeExpr, TypeExprKind};
use tracing::debug;

use crate::loader::{CheckService, SourceFile, qualify};

/// A violated internal invariant (a bug, not a user error). The current
/// check is abandoned and the master reports it as unrecoverable.
#[derive(Clone, Debug)]
pub struct InternalError(pub String);

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InternalError {}

impl CheckService {
    /// Validate one signature file against the environment.
    pub fn check_file(&self, path: &Path) -> Result<Vec<Diagnostic>, InternalError> {
        let Some(file) = self.file(path) else {
            return Ok(Vec::new());
        };
        debug!(path = %path.display(), "checking signature file");

        if let Some(error) = &file.parse_error {
            return Ok(vec![Diagnostic::error(
                file.line_map.span_to_range(error.span, &file.source),
                diagnostic_codes::SYNTAX_ERROR,
                error.message.clone(),
            )]);
        }

        let mut diagnostics = Vec::new();

        for duplicate in self.duplicates() {
            if duplicate.path == path {
                diagnostics.push(Diagnostic::error(
                    file.line_map.span_to_range(duplicate.span, &file.source),
                    diagnostic_codes::DUPLICATE_DEFINITION,
                    format!("`{}` is already defined", duplicate.name),
                ));
            }
        }

        for decl in &file.decls {
            self.validate_decl(file, decl, &mut diagnostics)?;
        }

        Ok(diagnostics)
    }

    fn validate_decl(
        &self,
        file: &SourceFile,
        decl: &Decl,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), InternalError> {
        match decl {
            Decl::Class(def) => {
                let scope: Vec<String> = def.type_params.iter().map(|p| p.name.clone()).collect();
                if let Some(superclass) = &def.superclass {
                    self.validate_type(file, superclass, &scope, diagnostics);
                }
                for method in &def.methods {
                    let mut method_scope = scope.clone();
                    method_scope.extend(method.type_params.iter().cloned());
                    self.validate_type(file, &method.ty, &method_scope, diagnostics);
                }
                self.validate_overrides(file, def, diagnostics)?;
            }
            Decl::Interface(def) => {
                let scope: Vec<String> = def.type_params.iter().map(|p| p.name.clone()).collect();
                for method in &def.methods {
                    let mut method_scope = scope.clone();
                    method_scope.extend(method.type_params.iter().cloned());
                    self.validate_type(file, &method.ty, &method_scope, diagnostics);
                }
            }
            Decl::Alias(def) => {
                let scope: Vec<String> = def.type_params.iter().map(|p| p.name.clone()).collect();
                self.validate_type(file, &def.body, &scope, diagnostics);
            }
        }
        Ok(())
    }

    /// Walk a type expression, reporting unknown names and wrong arity at
    /// their precise spans.
    fn validate_type(
        &self,
        file: &SourceFile,
        expr: &TypeExpr,
        scope: &[String],
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        match &expr.kind {
            TypeExprKind::Name { name, args } => {
                if scope.iter().any(|s| s == name) {
                    if !args.is_empty() {
                        diagnostics.push(self.error_at(
                            file,
                            expr.span,
                            diagnostic_codes::INVALID_TYPE_APPLICATION,
                            format!("type variable `{name}` does not take type arguments"),
                        ));
                    }
                    return;
                }
                let qualified = qualify(name);
                match self.env().arity(&qualified) {
                    None => {
                        diagnostics.push(self.error_at(
                            file,
                            expr.span,
                            diagnostic_codes::UNKNOWN_TYPE_NAME,
                            format!("unknown type name: `{qualified}`"),
                        ));
                    }
                    Some(expected) if expected != args.len() => {
                        diagnostics.push(self.error_at(
                            file,
                            expr.span,
                            diagnostic_codes::INVALID_TYPE_APPLICATION,
                            format!(
                                "`{qualified}` expects {expected} type argument(s), got {}",
                                args.len()
                            ),
                        ));
                    }
                    Some(_) => {}
                }
                for arg in args {
                    self.validate_type(file, arg, scope, diagnostics);
                }
            }
            TypeExprKind::Singleton { name } => {
                let qualified = qualify(name);
                if self.env().class_decl(&qualified).is_none() {
                    diagnostics.push(self.error_at(
                        file,
                        expr.span,
                        diagnostic_codes::UNKNOWN_TYPE_NAME,
                        format!("unknown class name: `{qualified}`"),
                    ));
                }
            }
            TypeExprKind::Top
            | TypeExprKind::Bot
            | TypeExprKind::Any
            | TypeExprKind::SelfType => {}
            TypeExprKind::Union(members) | TypeExprKind::Intersection(members) => {
                for member in members {
                    self.validate_type(file, member, scope, diagnostics);
                }
            }
            TypeExprKind::Tuple(elems) => {
                for elem in elems {
                    self.validate_type(file, elem, scope, diagnostics);
                }
            }
            TypeExprKind::Record(fields) => {
                for (_, ty) in fields {
                    self.validate_type(file, ty, scope, diagnostics);
                }
            }
            TypeExprKind::Proc {
                params,
                keywords,
                ret,
            } => {
                for param in params {
                    self.validate_type(file, param, scope, diagnostics);
                }
                for (_, ty) in keywords {
                    self.validate_type(file, ty, scope, diagnostics);
                }
                self.validate_type(file, ret, scope, diagnostics);
            }
        }
    }

    // =========================================================================
    // Override Checking
    // =========================================================================

    /// Each method redefined in a subclass must be usable where the
    /// inherited one is expected.
    fn validate_overrides(
        &self,
        file: &SourceFile,
        def: &ClassDef,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), InternalError> {
        let qualified = qualify(&def.name);
        let Some(class) = self.env().class_decl(&qualified) else {
            // Skipped duplicate; the duplicate diagnostic covers it.
            return Ok(());
        };
        let class_params: Vec<String> =
            class.type_params.iter().map(|p| p.name.clone()).collect();
        let class_args: Vec<Type> = class_params.iter().map(Type::var).collect();
        let Some(superclass) = class.superclass.clone() else {
            return Ok(());
        };
        let self_type = Type::instance(qualified.clone(), class_args.clone());
        let subst = {
            let mut subst = Substitution::new();
            for (param, arg) in class_params.iter().zip(class_args.iter()) {
                subst.insert(param.clone(), arg.clone());
            }
            subst
        };
        let superclass = subst.apply(&superclass);
        let TypeKind::Nominal {
            name: super_name,
            args: super_args,
            ..
        } = &superclass.kind
        else {
            return Ok(());
        };

        for method in &def.methods {
            let Some(own) = class.methods.get(&method.name) else {
                continue;
            };
            let Some(inherited) = self.env().method_of(super_name, super_args, &method.name)
            else {
                continue;
            };

            // Rigid variables: the subclass's parameters and the
            // override's own generics. The supermethod's generics become
            // the unknowns of a fresh store, renamed so the two sets
            // cannot collide.
            let mut rename = Substitution::new();
            let mut unknowns = Vec::new();
            for param in &inherited.type_params {
                let fresh = format!("{param}^");
                rename.insert(param.clone(), Type::var(fresh.clone()));
                unknowns.push(fresh);
            }
            let inherited_ty = rename.apply(&inherited.ty);

            let mut rigid: Vec<String> = class_params.clone();
            rigid.extend(own.type_params.iter().cloned());

            let context = CheckContext::new()
                .with_self_type(self_type.clone())
                .with_variance(Variance::Covariant);
            let mut checker = SubtypeChecker::new(self.env());
            let relation = Relation::new(own.ty.clone(), inherited_ty.clone());

            if unknowns.is_empty() {
                let result = checker.check(&relation, &context, None);
                if let Some(reason) = result.reason() {
                    diagnostics.push(self.error_at(
                        file,
                        method.name_span,
                        diagnostic_codes::INCOMPATIBLE_OVERRIDE,
                        format!(
                            "`{}#{}` is not compatible with the inherited method: {reason}",
                            qualified, method.name
                        ),
                    ));
                }
                continue;
            }

            let store = ConstraintStore::new(unknowns, rigid);
            let mut store = match store {
                Ok(store) => store,
                Err(error) => return Err(InternalError(error.to_string())),
            };
            let result = checker.check(&relation, &context, Some(&mut store));
            if let Some(reason) = result.reason() {
                // A failed bound registration is a bug in the store's
                // invariants, not a property of the user's signatures.
                if let FailureReason::UnsatisfiableBound { message, .. } = reason {
                    return Err(InternalError(message.clone()));
                }
                diagnostics.push(self.error_at(
                    file,
                    method.name_span,
                    diagnostic_codes::INCOMPATIBLE_OVERRIDE,
                    format!(
                        "`{}#{}` is not compatible with the inherited method: {reason}",
                        qualified, method.name
                    ),
                ));
                continue;
            }
            match solve(&store, &mut checker, &context) {
                Ok(_) => {}
                Err(error @ SolveError::UnsatisfiableConstraint { .. }) => {
                    diagnostics.push(self.error_at(
                        file,
                        method.name_span,
                        diagnostic_codes::UNSATISFIABLE_CONSTRAINT,
                        format!(
                            "`{}#{}` cannot instantiate the inherited method: {error}",
                            qualified, method.name
                        ),
                    ));
                }
                Err(SolveError::Store(error)) => {
                    return Err(InternalError(error.to_string()));
                }
            }
        }
        Ok(())
    }

    fn error_at(
        &self,
        file: &SourceFile,
        span: Span,
        code: &str,
        message: String,
    ) -> Diagnostic {
        Diagnostic::error(
            file.line_map.span_to_range(span, &file.source),
            code,
            message,
        )
    }
}
