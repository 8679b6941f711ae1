//! Bytecode model shared by the patcher and its hosts.
//!
//! This crate defines the instruction encoding, the operand-width table,
//! the lazy instruction cursor, and the program/function/constant types that
//! the patcher rewrites in place.

pub mod builder;
pub mod cursor;
pub mod disasm;
pub mod encoding;
pub mod error;
pub mod opcode;
pub mod program;

pub use builder::FunctionBuilder;
pub use cursor::InstructionCursor;
pub use disasm::{format_source_map, Disassembly};
pub use encoding::{encode, encode_into, read_operand, read_operands, Operands};
pub use error::{BytecodeError, BytecodeResult, CallError};
pub use opcode::{BinaryOperator, JumpClass, Opcode, OpcodeInfo, OpcodeTable};
pub use program::{Callable, Constant, Function, Program, SourceMap};
