// This module defines the error type for the ravel back end using the thiserror crate.
// CompileError covers the three failure classes of the pipeline: constructs the linearizer
// does not implement (a hard stop for the whole compilation unit), internal contract
// violations detected by the CFG builder and the code generator (unterminated blocks,
// operands of the wrong kind, opcodes reaching a stage that cannot handle them), and
// failures reported by the embedding host through the callback interface. Each variant
// carries the proc/block/opcode context needed to locate the problem. CompileResult<T> is
// the convenience alias used throughout the crate.

//! Error types for the ravel compiler.

use thiserror::Error;

/// Main error type for a compilation unit.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unimplemented language feature: {feature}")]
    Unimplemented { feature: String },

    #[error("Block {block} of proc {proc} does not end in a branch or return")]
    UnterminatedBlock { proc: u32, block: u32 },

    #[error("Invalid operand in proc {proc}: {reason}")]
    InvalidOperand { proc: u32, reason: String },

    #[error("Unexpected opcode {opcode} in {stage}")]
    UnexpectedOpcode {
        opcode: &'static str,
        stage: &'static str,
    },

    #[error("Unknown symbol id {id}")]
    UnknownSymbol { id: u32 },

    #[error("Host callback failed: {reason}")]
    Host { reason: String },

    #[error("Failed to read syntax tree: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    /// Shorthand for [`CompileError::Unimplemented`].
    pub fn unimplemented(feature: impl Into<String>) -> Self {
        CompileError::Unimplemented {
            feature: feature.into(),
        }
    }

    /// Shorthand for [`CompileError::InvalidOperand`].
    pub fn invalid_operand(proc: u32, reason: impl Into<String>) -> Self {
        CompileError::InvalidOperand {
            proc,
            reason: reason.into(),
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
