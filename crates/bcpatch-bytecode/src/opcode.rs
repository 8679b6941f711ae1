//! Instruction set and operand-width table.
//!
//! Every instruction is a one-byte opcode followed by zero or more
//! big-endian operands.  The byte width of each operand is fixed per opcode
//! and looked up in an [`OpcodeTable`]:
//!
//! ```text
//! ┌────────┬────────────┬────────────┬─────┐
//! │ opcode │ operand 0  │ operand 1  │ ... │
//! │ 1 byte │ 1/2/4 byte │ 1/2/4 byte │     │
//! └────────┴────────────┴────────────┴─────┘
//! ```
//!
//! The table also classifies each opcode as plain, single-target jump or
//! dual-target protected-region setup ([`JumpClass`]).  Jump operands are
//! absolute byte offsets into the owning function's instruction buffer.

use crate::error::{BytecodeError, BytecodeResult};

/// Control-transfer classification of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpClass {
    /// Falls through to the next instruction.
    Plain,
    /// Jump family with one target in operand slot 0.
    SingleJump,
    /// Protected-region setup: handler target in slot 0, cleanup target in
    /// slot 1.  A target of 0 means "not configured".
    DualJump,
}

impl JumpClass {
    /// Number of target operands carried by this class.
    pub fn target_count(self) -> usize {
        match self {
            Self::Plain => 0,
            Self::SingleJump => 1,
            Self::DualJump => 2,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Built-in instruction set
// ══════════════════════════════════════════════════════════════════════════════

/// The built-in stack-machine instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Noop = 0,
    /// Push constant `[index: u16]`.
    Constant = 1,
    Null = 2,
    True = 3,
    False = 4,
    Pop = 5,
    /// `[local: u8]`
    GetLocal = 6,
    /// `[local: u8]`
    SetLocal = 7,
    /// `[local: u8]`
    DefineLocal = 8,
    /// `[operator: u8]`, see [`BinaryOperator`].
    BinaryOp = 9,
    /// `[num_args: u8, spread: u8]`
    Call = 10,
    /// `[has_value: u8]`
    Return = 11,
    /// `[target: u32]`
    Jump = 12,
    /// Pop, jump when falsy. `[target: u32]`
    JumpFalsy = 13,
    /// Jump keeping the value when falsy, else pop. `[target: u32]`
    AndJump = 14,
    /// Jump keeping the value when truthy, else pop. `[target: u32]`
    OrJump = 15,
    /// `[catch: u32, finally: u32]`
    SetupTry = 16,
    SetupCatch = 17,
    SetupFinally = 18,
    /// `[has_value: u8]`
    Throw = 19,
}

impl Opcode {
    pub const ALL: [Opcode; 20] = [
        Opcode::Noop,
        Opcode::Constant,
        Opcode::Null,
        Opcode::True,
        Opcode::False,
        Opcode::Pop,
        Opcode::GetLocal,
        Opcode::SetLocal,
        Opcode::DefineLocal,
        Opcode::BinaryOp,
        Opcode::Call,
        Opcode::Return,
        Opcode::Jump,
        Opcode::JumpFalsy,
        Opcode::AndJump,
        Opcode::OrJump,
        Opcode::SetupTry,
        Opcode::SetupCatch,
        Opcode::SetupFinally,
        Opcode::Throw,
    ];

    /// Upper-case mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            Self::Noop => "NOOP",
            Self::Constant => "CONSTANT",
            Self::Null => "NULL",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Pop => "POP",
            Self::GetLocal => "GETLOCAL",
            Self::SetLocal => "SETLOCAL",
            Self::DefineLocal => "DEFINELOCAL",
            Self::BinaryOp => "BINARYOP",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::Jump => "JUMP",
            Self::JumpFalsy => "JUMPFALSY",
            Self::AndJump => "ANDJUMP",
            Self::OrJump => "ORJUMP",
            Self::SetupTry => "SETUPTRY",
            Self::SetupCatch => "SETUPCATCH",
            Self::SetupFinally => "SETUPFINALLY",
            Self::Throw => "THROW",
        }
    }

    /// Byte widths of the operands, in order.
    pub fn operand_widths(self) -> &'static [u8] {
        match self {
            Self::Constant => &[2],
            Self::GetLocal | Self::SetLocal | Self::DefineLocal => &[1],
            Self::BinaryOp | Self::Return | Self::Throw => &[1],
            Self::Call => &[1, 1],
            Self::Jump | Self::JumpFalsy | Self::AndJump | Self::OrJump => &[4],
            Self::SetupTry => &[4, 4],
            Self::Noop
            | Self::Null
            | Self::True
            | Self::False
            | Self::Pop
            | Self::SetupCatch
            | Self::SetupFinally => &[],
        }
    }

    pub fn class(self) -> JumpClass {
        match self {
            Self::Jump | Self::JumpFalsy | Self::AndJump | Self::OrJump => JumpClass::SingleJump,
            Self::SetupTry => JumpClass::DualJump,
            _ => JumpClass::Plain,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.to_byte()
    }
}

/// Operator codes carried by [`Opcode::BinaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOperator {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Less = 3,
    Greater = 4,
    Equal = 5,
}

impl BinaryOperator {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Add),
            1 => Some(Self::Sub),
            2 => Some(Self::Mul),
            3 => Some(Self::Less),
            4 => Some(Self::Greater),
            5 => Some(Self::Equal),
            _ => None,
        }
    }
}

impl From<BinaryOperator> for usize {
    fn from(op: BinaryOperator) -> usize {
        op as usize
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operand-width table
// ══════════════════════════════════════════════════════════════════════════════

/// Table entry describing one opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub name: String,
    pub widths: Vec<u8>,
    pub class: JumpClass,
    operand_len: usize,
}

impl OpcodeInfo {
    pub fn new(name: impl Into<String>, widths: &[u8], class: JumpClass) -> Self {
        Self {
            name: name.into(),
            widths: widths.to_vec(),
            class,
            operand_len: widths.iter().map(|w| *w as usize).sum(),
        }
    }

    /// Total operand byte length (the instruction is `1 + operand_len` bytes).
    #[inline]
    pub fn operand_len(&self) -> usize {
        self.operand_len
    }
}

/// Operand-width table keyed by opcode byte.
///
/// Supplied by the compiler/VM that owns the instruction set.  Opcodes with
/// no entry are undecodable.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeInfo>>,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl OpcodeTable {
    /// A table with no opcodes defined.
    pub fn empty() -> Self {
        Self {
            entries: vec![None; 256],
        }
    }

    /// Table describing the built-in [`Opcode`] set.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for op in Opcode::ALL {
            table.entries[op.to_byte() as usize] =
                Some(OpcodeInfo::new(op.name(), op.operand_widths(), op.class()));
        }
        table
    }

    /// Define (or redefine) an opcode.
    ///
    /// Widths must be 1, 2 or 4 bytes; jump classes need an operand for
    /// every target slot.
    pub fn define(
        &mut self,
        opcode: u8,
        name: impl Into<String>,
        widths: &[u8],
        class: JumpClass,
    ) -> BytecodeResult<&mut Self> {
        if let Some(&width) = widths.iter().find(|w| !matches!(w, 1 | 2 | 4)) {
            return Err(BytecodeError::InvalidWidth { opcode, width });
        }
        if widths.len() < class.target_count() {
            return Err(BytecodeError::MissingJumpOperand {
                opcode,
                operands: widths.len(),
                needed: class.target_count(),
            });
        }
        self.entries[opcode as usize] = Some(OpcodeInfo::new(name, widths, class));
        Ok(self)
    }

    #[inline]
    pub fn get(&self, opcode: u8) -> Option<&OpcodeInfo> {
        self.entries[opcode as usize].as_ref()
    }

    /// Classify an opcode; `None` for opcodes missing from the table.
    pub fn classify(&self, opcode: u8) -> Option<JumpClass> {
        self.get(opcode).map(|info| info.class)
    }

    /// Mnemonic of an opcode, if defined.
    pub fn name(&self, opcode: u8) -> Option<&str> {
        self.get(opcode).map(|info| info.name.as_str())
    }
}
