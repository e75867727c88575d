//! Output validation: closed-world contract checks and the tighter
//! per-section caps applied to copy proposals.

pub mod caps;
pub mod contracts;
pub mod schema;

use serde::Serialize;
use std::fmt;

pub use caps::enforce_section_caps;
pub use contracts::{validate, validate_text, MAX_VARIANTS, SCHEMA_VERSION};

/// Failure category reported by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// Not a parseable JSON object.
    InvalidJson,
    /// Structural, type, enum, length or cardinality failure.
    SchemaViolation,
    /// Passed the schema but broke a per-section cap.
    CapViolation,
}

impl ValidationCode {
    /// Wire name of the code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::SchemaViolation => "schema_violation",
            Self::CapViolation => "cap_violation",
        }
    }
}

/// Every violation found, with the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// Category of the first failing stage.
    pub code: ValidationCode,
    /// Every violation, as `"<path>: <problem>"`.
    pub errors: Vec<String>,
}

impl ValidationFailure {
    /// Failure with a code and its violations.
    pub const fn new(code: ValidationCode, errors: Vec<String>) -> Self {
        Self { code, errors }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} error(s))", self.code.as_str(), self.errors.len())
    }
}
