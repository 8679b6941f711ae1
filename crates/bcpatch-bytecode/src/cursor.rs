//! Lazy forward-only instruction cursor.
//!
//! The cursor walks an instruction buffer one instruction at a time, using
//! the [`OpcodeTable`] only to learn each instruction's length.  Operands are
//! decoded on demand.  The first decode failure is sticky: once the cursor
//! has failed, every later [`advance`](InstructionCursor::advance) returns
//! `false` until the next [`reset`](InstructionCursor::reset).

use crate::encoding::{read_operand, read_operands, Operands};
use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::{JumpClass, OpcodeInfo, OpcodeTable};

pub struct InstructionCursor<'a> {
    table: &'a OpcodeTable,
    insts: &'a [u8],
    /// Start offset of the next instruction.
    next: usize,
    position: usize,
    opcode: u8,
    offset: usize,
    info: Option<&'a OpcodeInfo>,
    error: Option<BytecodeError>,
}

impl<'a> InstructionCursor<'a> {
    pub fn new(table: &'a OpcodeTable, insts: &'a [u8]) -> Self {
        Self {
            table,
            insts,
            next: 0,
            position: 0,
            opcode: 0,
            offset: 0,
            info: None,
            error: None,
        }
    }

    /// Restart at offset 0 of `insts`, clearing any sticky error.
    pub fn reset(&mut self, insts: &'a [u8]) {
        self.insts = insts;
        self.next = 0;
        self.position = 0;
        self.opcode = 0;
        self.offset = 0;
        self.info = None;
        self.error = None;
    }

    /// Move to the next instruction.
    ///
    /// Returns `false` at the end of the buffer or on the first decode error.
    pub fn advance(&mut self) -> bool {
        if self.error.is_some() || self.next >= self.insts.len() {
            return false;
        }
        let position = self.next;
        let opcode = self.insts[position];
        let table: &'a OpcodeTable = self.table;
        let Some(info) = table.get(opcode) else {
            self.error = Some(BytecodeError::UnknownOpcode { opcode, position });
            return false;
        };
        let needed = info.operand_len();
        let available = self.insts.len() - position - 1;
        if needed > available {
            self.error = Some(BytecodeError::Truncated {
                opcode,
                position,
                needed,
                available,
            });
            return false;
        }
        self.position = position;
        self.opcode = opcode;
        self.offset = needed;
        self.info = Some(info);
        self.next = position + 1 + needed;
        true
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Start offset of the current instruction.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Operand byte length of the current instruction.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Table entry of the current instruction; `None` before the first
    /// successful [`advance`](Self::advance).
    pub fn info(&self) -> Option<&'a OpcodeInfo> {
        self.info
    }

    pub fn class(&self) -> JumpClass {
        self.info.map_or(JumpClass::Plain, |info| info.class)
    }

    /// Decode all operands of the current instruction.
    ///
    /// Returned by value: the inline buffer holds up to four operands
    /// without allocating.
    pub fn operands(&self) -> Operands {
        let mut out = Operands::new();
        if let Some(info) = self.info {
            read_operands(&info.widths, self.operand_bytes(), &mut out);
        }
        out
    }

    /// Decode a single operand of the current instruction.
    pub fn operand(&self, slot: usize) -> Option<usize> {
        read_operand(&self.info?.widths, self.operand_bytes(), slot)
    }

    /// Raw bytes of the current instruction, opcode included.
    pub fn bytes(&self) -> &'a [u8] {
        &self.insts[self.position..self.position + 1 + self.offset]
    }

    fn operand_bytes(&self) -> &'a [u8] {
        &self.insts[self.position + 1..self.position + 1 + self.offset]
    }

    /// The sticky decode error, if any.
    pub fn error(&self) -> Option<&BytecodeError> {
        self.error.as_ref()
    }

    /// Convert the sticky error into a result.
    pub fn finish(&self) -> BytecodeResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
