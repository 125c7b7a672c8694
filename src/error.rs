use thiserror::Error;

/// Crate-wide result alias, mirroring the one-error-enum convention used
/// throughout the engine.
pub type Result<A, E = Error> = std::result::Result<A, E>;

/// The wire-visible error taxonomy (see spec §7).
///
/// Every decode/encode failure is a value, never a panic: callers get a
/// `field_id` and, where meaningful, a `bit_offset` so they can locate the
/// offending byte without re-parsing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template error on field {field}: {reason}")]
    Template { field: String, reason: String },

    #[error("buffer underflow: needed {needed} bits, {remaining} remaining at offset {bit_offset}")]
    BufferUnderflow {
        needed: u64,
        remaining: u64,
        bit_offset: u64,
    },

    #[error("buffer overflow: value does not fit in {size} bits")]
    BufferOverflow { size: u32 },

    #[error("no registered template matches the input header")]
    NoMatchingTemplate,

    #[error("field {field}: no choice alternative matched and no default type is set")]
    ChoiceUnmatched { field: String },

    #[error("checksum mismatch on field {field}: expected {expected:#x}, computed {computed:#x}")]
    ChecksumMismatch {
        field: String,
        expected: u64,
        computed: u64,
    },

    #[error("validation failed for field {field}: {reason}")]
    ValidationFailure { field: String, reason: String },

    #[error("converter error on field {field}: {reason}")]
    ConverterError { field: String, reason: String },

    #[error("expression error: {0}")]
    ExprError(#[from] ExprError),

    #[error("encode error for key '{key}': {reason}")]
    EncodeError { key: String, reason: String },
}

impl Error {
    pub fn template(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Template {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn converter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ConverterError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ValidationFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Expression parse/evaluate failures, kept distinct from [`Error`] so the
/// evaluator can be exercised (and unit-tested) without pulling in the rest
/// of the engine's error surface; they convert into [`Error::ExprError`] at
/// the boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("failed to parse expression '{expr}': {reason}")]
    Parse { expr: String, reason: String },

    #[error("type error in expression: {0}")]
    Type(String),

    #[error("unresolved identifier '{0}'")]
    UnresolvedIdentifier(String),

    #[error("unsupported host reference '{0}'")]
    UnsupportedHostCall(String),
}
