//! Bytecode encode/decode error types.

use thiserror::Error;

/// Errors raised while decoding or encoding instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// The opcode byte has no entry in the operand-width table.
    #[error("invalid opcode {opcode} at {position}")]
    UnknownOpcode { opcode: u8, position: usize },

    /// The operand bytes of an instruction run past the end of the buffer.
    #[error("truncated instruction (opcode {opcode}) at {position}: need {needed} operand bytes, {available} available")]
    Truncated {
        opcode: u8,
        position: usize,
        needed: usize,
        available: usize,
    },

    /// Wrong number of operands supplied to the encoder.
    #[error("opcode {opcode} expects {expected} operands, got {got}")]
    OperandCount {
        opcode: u8,
        expected: usize,
        got: usize,
    },

    /// An operand value does not fit in its encoded width.
    #[error("operand {value} of opcode {opcode} does not fit in {width} byte(s)")]
    OperandOverflow { opcode: u8, value: usize, width: u8 },

    /// An operand width other than 1, 2 or 4 bytes.
    #[error("unsupported operand width {width} for opcode {opcode}")]
    InvalidWidth { opcode: u8, width: u8 },

    /// A jump-class opcode declared without enough operands for its targets.
    #[error("jump opcode {opcode} declares {operands} operand(s), needs at least {needed}")]
    MissingJumpOperand {
        opcode: u8,
        operands: usize,
        needed: usize,
    },

    /// The encoder was asked for an opcode the table does not define.
    #[error("opcode {0} is not defined in the opcode table")]
    Undefined(u8),
}

/// Error returned by a host [`Callable`](crate::Callable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("call to {callee} failed: {message}")]
pub struct CallError {
    pub callee: String,
    pub message: String,
}

impl CallError {
    pub fn new(callee: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            callee: callee.into(),
            message: message.into(),
        }
    }
}

/// Bytecode result type alias.
pub type BytecodeResult<T> = Result<T, BytecodeError>;
