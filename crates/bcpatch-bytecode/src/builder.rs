//! Incremental function assembler.
//!
//! Used by front-ends and tests to lay out instruction streams directly,
//! with back-patching for forward jumps.

use crate::encoding::{encode_into, read_operands, Operands};
use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::OpcodeTable;
use crate::program::{Function, SourceMap};

pub struct FunctionBuilder<'t> {
    table: &'t OpcodeTable,
    name: String,
    instructions: Vec<u8>,
    source_map: SourceMap,
    num_params: usize,
    num_locals: usize,
    variadic: bool,
}

impl<'t> FunctionBuilder<'t> {
    pub fn new(table: &'t OpcodeTable) -> Self {
        Self {
            table,
            name: String::new(),
            instructions: Vec::new(),
            source_map: SourceMap::new(),
            num_params: 0,
            num_locals: 0,
            variadic: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn params(mut self, num_params: usize, variadic: bool) -> Self {
        self.num_params = num_params;
        self.variadic = variadic;
        self
    }

    pub fn locals(mut self, num_locals: usize) -> Self {
        self.num_locals = num_locals;
        self
    }

    /// Current end of the buffer; the position the next instruction gets.
    pub fn label(&self) -> usize {
        self.instructions.len()
    }

    /// Emit an instruction and return its position.
    pub fn emit(&mut self, opcode: impl Into<u8>, operands: &[usize]) -> BytecodeResult<usize> {
        let position = self.instructions.len();
        encode_into(&mut self.instructions, self.table, opcode.into(), operands)?;
        Ok(position)
    }

    /// Emit an instruction mapped to source-location `source`.
    pub fn emit_at(
        &mut self,
        source: usize,
        opcode: impl Into<u8>,
        operands: &[usize],
    ) -> BytecodeResult<usize> {
        let position = self.emit(opcode, operands)?;
        self.source_map.insert(position, source);
        Ok(position)
    }

    /// Overwrite operand `slot` of the instruction at `position`.
    pub fn patch_operand(&mut self, position: usize, slot: usize, value: usize) -> BytecodeResult<()> {
        let opcode = *self
            .instructions
            .get(position)
            .ok_or(BytecodeError::Truncated {
                opcode: 0,
                position,
                needed: 1,
                available: 0,
            })?;
        let info = self.table.get(opcode).ok_or(BytecodeError::UnknownOpcode { opcode, position })?;
        let mut operands = Operands::new();
        let available = self.instructions.len() - position - 1;
        read_operands(&info.widths, &self.instructions[position + 1..], &mut operands).ok_or(
            BytecodeError::Truncated {
                opcode,
                position,
                needed: info.operand_len(),
                available,
            },
        )?;
        if slot >= operands.len() {
            return Err(BytecodeError::OperandCount {
                opcode,
                expected: operands.len(),
                got: slot + 1,
            });
        }
        operands[slot] = value;

        let mut encoded = Vec::with_capacity(1 + info.operand_len());
        encode_into(&mut encoded, self.table, opcode, &operands)?;
        self.instructions[position..position + encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    pub fn finish(self) -> Function {
        Function {
            name: self.name,
            instructions: self.instructions,
            source_map: self.source_map,
            num_params: self.num_params,
            num_locals: self.num_locals,
            variadic: self.variadic,
        }
    }
}
