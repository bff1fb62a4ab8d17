//! Scanner and parser for steep signature files.
//!
//! Signature files declare the intended types of classes, interfaces and
//! aliases:
//!
//! ```text
//! class Stack[out A] < Object
//!   def push: (A) -> Stack[A]
//!   def pop: () -> A
//! end
//!
//! interface _Each[A]
//!   def each: () -> Array[A]
//! end
//!
//! type int_or_string = Integer | String
//! ```
//!
//! Parsing is whitespace-insensitive; `#` starts a line comment. The
//! parser produces a syntax-level AST ([`ast`]); name resolution (which
//! identifiers are type variables, which are nominals) happens later,
//! against the signature environment.

pub mod ast;
pub mod parser;
pub mod token;

pub use ast::{
    AliasDef, ClassDef, Decl, InterfaceDef, MethodDef, TypeExpr, TypeExprKind, TypeParamDef,
    VarianceDef,
};
pub use parser::{ParseError, Parser, parse_file};
pub use token::{Scanner, Token, TokenKind};
