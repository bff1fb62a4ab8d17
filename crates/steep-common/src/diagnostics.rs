//! Diagnostic types for signature validation and type checking.
//!
//! Diagnostics travel over LSP `textDocument/publishDiagnostics`, so they
//! carry LSP ranges rather than byte offsets. Codes are stable strings
//! grouped by namespace (`Signature::...`).

use serde::{Deserialize, Serialize};

use crate::position::Range;

/// Diagnostic severity, numbered per the LSP specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        match severity {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Information => 3,
            Severity::Hint => 4,
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Severity::Error),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Information),
            4 => Ok(Severity::Hint),
            other => Err(format!("invalid diagnostic severity: {other}")),
        }
    }
}

/// A diagnostic attached to a range of a signature file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    #[must_use]
    pub fn error(range: Range, code: &str, message: String) -> Self {
        Self {
            range,
            severity: Severity::Error,
            code: code.to_string(),
            message,
        }
    }
}

/// Stable diagnostic code strings.
pub mod diagnostic_codes {
    pub const SYNTAX_ERROR: &str = "Signature::SyntaxError";
    pub const UNKNOWN_TYPE_NAME: &str = "Signature::UnknownTypeName";
    pub const INVALID_TYPE_APPLICATION: &str = "Signature::InvalidTypeApplication";
    pub const DUPLICATE_DEFINITION: &str = "Signature::DuplicateDefinition";
    pub const INCOMPATIBLE_OVERRIDE: &str = "Signature::IncompatibleOverride";
    pub const UNSATISFIABLE_CONSTRAINT: &str = "Signature::UnsatisfiableConstraint";
}
