//! Signature environment loading and validation.
//!
//! Every worker loads the signature environment through [`CheckService`]:
//! code workers call [`CheckService::check_file`] on their assigned files
//! and publish the diagnostics; the interaction worker answers hover /
//! completion / definition queries; the signature worker watches the
//! environment-wide duplicate set.

pub mod loader;
pub mod project;
mod query;
pub mod validator;

pub use loader::{CheckService, DeclKind, Duplicate, NameTable, SourceFile, qualify};
pub use project::{Project, SIGNATURE_EXTENSION};
pub use validator::InternalError;

#[cfg(test)]
mod tests;
