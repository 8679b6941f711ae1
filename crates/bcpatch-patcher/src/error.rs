//! Patcher error types.

use bcpatch_bytecode::BytecodeError;
use thiserror::Error;

/// Errors that can occur while patching a program.
///
/// Every variant is terminal: a program whose patch failed must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The input instruction stream does not decode with the opcode table.
    #[error("malformed bytecode: {0}")]
    Decode(#[from] BytecodeError),

    /// The policy returned an insertion that is empty or does not decode
    /// into whole instructions.
    #[error("invalid insertion before {position}: {reason}")]
    InvalidInsertion { position: usize, reason: String },

    /// The policy itself reported a failure.
    #[error("policy failed at {position}: {message}")]
    Policy { position: usize, message: String },

    /// A relocated jump no longer starts with the opcode it was recorded with.
    #[error("internal: jump at {position} expected opcode {expected}, found {found:?}")]
    JumpMismatch {
        position: usize,
        expected: u8,
        found: Option<u8>,
    },

    /// A relocated target no longer fits the jump's operand width.
    #[error("jump at {position} cannot reach {target}: operand too narrow")]
    TargetOverflow { position: usize, target: usize },

    /// Re-encoding a relocated jump failed.
    #[error("internal: cannot re-encode jump at {position}: {source}")]
    Encode {
        position: usize,
        #[source]
        source: BytecodeError,
    },

    /// The inserted sequence itself cannot be encoded, e.g. a constant index
    /// wider than its operand.
    #[error("cannot encode insertion: {0}")]
    Snippet(#[source] BytecodeError),

    /// A jump target does not land on an instruction start.
    #[error("jump at {position} targets {target}, which is not an instruction start")]
    DanglingJump { position: usize, target: usize },

    /// The yield threshold must be greater than zero.
    #[error("yield threshold must be greater than 0")]
    InvalidThreshold,
}

impl PatchError {
    /// True for failures of the patcher itself rather than of its input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::JumpMismatch { .. } | Self::Encode { .. })
    }

    /// Convenience constructor for policies reporting a failure.
    pub fn policy(position: usize, message: impl Into<String>) -> Self {
        Self::Policy {
            position,
            message: message.into(),
        }
    }
}

/// Patcher result type alias.
pub type PatchResult<T> = Result<T, PatchError>;
