//! # Centralized Error Handling
//!
//! Unified error types for the crate using `thiserror`.
//!
//! Each failure kind callers need to react to separately gets its own
//! variant: close-time accounting failures (`MissingVariants`) may be
//! suppressed by callers unwinding from an earlier error, while an empty
//! output file (`EmptyOutput`) is always surfaced. Every error owns its
//! message string; there is no shared formatting buffer.

use thiserror::Error;

use crate::codec::CodecStatus;

/// Main error type for pgen write operations
#[derive(Error, Debug)]
pub enum PgenError {
    /// I/O errors (file missing, permission denied, write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad open/append arguments (count bounds, flag-combination violations)
    #[error("Invalid argument: {message}")]
    Validation { message: String },

    /// An append's allele-code array contains an unrepresentable value
    #[error("Invalid allele code: {message}")]
    InvalidAlleleCode { message: String },

    /// A non-success status from a codec-engine call
    #[error("{context} ({status})")]
    Codec {
        status: CodecStatus,
        context: String,
    },

    /// Close-time accounting mismatch between written and declared variants
    #[error(
        "pgen file closed with {written} variants written, \
         expected {expected} (declared count minus dropped variants)"
    )]
    MissingVariants { written: u64, expected: u64 },

    /// Close called with zero variants written; an empty pgen is never valid
    #[error("pgen file closed with no variants written; an empty pgen file is not valid")]
    EmptyOutput,
}

/// Type alias for Results using PgenError
pub type Result<T> = std::result::Result<T, PgenError>;

impl PgenError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid-allele-code error
    pub fn invalid_allele_code(message: impl Into<String>) -> Self {
        Self::InvalidAlleleCode {
            message: message.into(),
        }
    }

    /// Wrap a codec-engine status with a human-readable tag
    pub fn codec(status: CodecStatus, context: impl Into<String>) -> Self {
        Self::Codec {
            status,
            context: context.into(),
        }
    }
}
