//! Structural check of jump operands.

use bcpatch_bytecode::{Function, InstructionCursor, JumpClass, OpcodeTable};

use crate::error::{PatchError, PatchResult};

/// Check that `insts` decodes completely and that every jump target, other
/// than a protected-region sentinel, is the start of an instruction.
pub fn verify_instructions(table: &OpcodeTable, insts: &[u8]) -> PatchResult<()> {
    let mut starts = vec![false; insts.len()];
    let mut jumps = Vec::new();

    let mut cursor = InstructionCursor::new(table, insts);
    while cursor.advance() {
        starts[cursor.position()] = true;
        let class = cursor.class();
        for slot in 0..class.target_count() {
            if let Some(target) = cursor.operand(slot) {
                if class == JumpClass::DualJump && target == 0 {
                    continue;
                }
                jumps.push((cursor.position(), target));
            }
        }
    }
    cursor.finish()?;

    for (position, target) in jumps {
        if !starts.get(target).copied().unwrap_or(false) {
            return Err(PatchError::DanglingJump { position, target });
        }
    }
    Ok(())
}

pub fn verify_function(table: &OpcodeTable, function: &Function) -> PatchResult<()> {
    verify_instructions(table, &function.instructions)
}
