//! Type algebra, subtyping checker, and constraint solver for steep.
//!
//! The pipeline: signature loading builds a [`TypeEnv`]; checking opens a
//! [`ConstraintStore`] per inference site, runs the [`SubtypeChecker`]
//! over subtyping obligations (recording bounds for unknowns), and
//! finally [`solve`]s the store into a [`Substitution`].

pub mod constraints;
pub mod environment;
pub mod solve;
pub mod subst;
pub mod subtyping;
pub mod types;

pub use constraints::{ConstraintStore, StoreError};
pub use environment::{AliasDecl, ClassDecl, InterfaceDecl, MethodDecl, TypeEnv, TypeParam};
pub use solve::{SolveError, solve};
pub use subst::Substitution;
pub use subtyping::{CheckContext, FailureReason, Relation, SubtypeChecker, SubtypeResult};
pub use types::{LogicKind, NominalKind, ProcType, Type, TypeKind, Variance};

#[cfg(test)]
mod tests;
