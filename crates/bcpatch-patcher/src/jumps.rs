//! Position tracker for jump-class instructions.
//!
//! Jumps are captured before a function is rewritten and shifted as
//! insertions happen, so that positions and targets are always expressed in
//! output coordinates.

use bcpatch_bytecode::JumpClass;

/// One target operand of one jump-class instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRecord {
    /// Start offset of the jump instruction.
    pub position: usize,
    /// Target carried by operand `slot`.
    pub target: usize,
    pub opcode: u8,
    pub slot: usize,
    pub class: JumpClass,
    /// Set once position or target moved; only relocated records are
    /// rewritten.
    pub relocated: bool,
}

impl JumpRecord {
    /// Protected-region setups use target 0 for "no handler".
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.class == JumpClass::DualJump && self.target == 0
    }

    /// Account for `size` bytes inserted at output offset `at`.
    pub fn shift(&mut self, at: usize, size: usize) {
        if self.position >= at {
            self.relocated = true;
            self.position += size;
        }
        if self.target < at || self.is_sentinel() {
            return;
        }
        self.relocated = true;
        self.target += size;
    }
}

/// Jump records of the function being rewritten.
#[derive(Debug, Default)]
pub struct PositionTracker {
    records: Vec<JumpRecord>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all records, keeping the allocation.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn record(&mut self, position: usize, target: usize, opcode: u8, slot: usize, class: JumpClass) {
        self.records.push(JumpRecord {
            position,
            target,
            opcode,
            slot,
            class,
            relocated: false,
        });
    }

    pub fn shift(&mut self, at: usize, size: usize) {
        for record in &mut self.records {
            record.shift(at, size);
        }
    }

    pub fn records(&self) -> &[JumpRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
