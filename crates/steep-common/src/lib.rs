//! Common types and utilities shared across the steep crates.
//!
//! This crate provides foundational types used everywhere:
//! - Source spans (`Span`) as byte offsets into signature files
//! - Position/Range types for LSP line/column locations (`Position`,
//!   `Range`, `Location`, `LineMap`)
//! - Diagnostics (`Diagnostic`, `Severity`, diagnostic code constants)

// Span - Source location tracking (byte offsets)
pub mod span;
pub use span::Span;

// Position/Range types for line/column source locations
pub mod position;
pub use position::{LineMap, Location, Position, Range};

// Diagnostics emitted by signature validation and type checking
pub mod diagnostics;
pub use diagnostics::{Diagnostic, Severity, diagnostic_codes};
