//! Instruction encoder and operand reader.

use smallvec::SmallVec;

use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::OpcodeTable;

/// Decoded operands of one instruction.  Inline for up to four operands, so
/// decoding never allocates for the built-in instruction set.
pub type Operands = SmallVec<[usize; 4]>;

/// Append the encoding of `opcode` with `operands` to `buf`.
pub fn encode_into(
    buf: &mut Vec<u8>,
    table: &OpcodeTable,
    opcode: u8,
    operands: &[usize],
) -> BytecodeResult<()> {
    let info = table.get(opcode).ok_or(BytecodeError::Undefined(opcode))?;
    if info.widths.len() != operands.len() {
        return Err(BytecodeError::OperandCount {
            opcode,
            expected: info.widths.len(),
            got: operands.len(),
        });
    }

    buf.reserve(1 + info.operand_len());
    buf.push(opcode);
    for (&width, &value) in info.widths.iter().zip(operands) {
        match width {
            1 => {
                let v = u8::try_from(value)
                    .map_err(|_| BytecodeError::OperandOverflow { opcode, value, width })?;
                buf.push(v);
            }
            2 => {
                let v = u16::try_from(value)
                    .map_err(|_| BytecodeError::OperandOverflow { opcode, value, width })?;
                buf.extend_from_slice(&v.to_be_bytes());
            }
            4 => {
                let v = u32::try_from(value)
                    .map_err(|_| BytecodeError::OperandOverflow { opcode, value, width })?;
                buf.extend_from_slice(&v.to_be_bytes());
            }
            _ => return Err(BytecodeError::InvalidWidth { opcode, width }),
        }
    }
    Ok(())
}

/// Encode a single instruction into a fresh buffer.
pub fn encode(table: &OpcodeTable, opcode: u8, operands: &[usize]) -> BytecodeResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(1 + operands.len() * 4);
    encode_into(&mut buf, table, opcode, operands)?;
    Ok(buf)
}

/// Read operands laid out by `widths` from the start of `bytes` into `out`.
///
/// `out` is cleared first.  Returns the number of bytes consumed, or `None`
/// when `bytes` is too short.
pub fn read_operands(widths: &[u8], bytes: &[u8], out: &mut Operands) -> Option<usize> {
    out.clear();
    let mut offset = 0;
    for &width in widths {
        let width = width as usize;
        let raw = bytes.get(offset..offset + width)?;
        let value = raw.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        out.push(value);
        offset += width;
    }
    Some(offset)
}

/// Read the operand at `slot` without decoding the others.
pub fn read_operand(widths: &[u8], bytes: &[u8], slot: usize) -> Option<usize> {
    let width = *widths.get(slot)? as usize;
    let start: usize = widths[..slot].iter().map(|w| *w as usize).sum();
    let raw = bytes.get(start..start + width)?;
    Some(raw.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}
