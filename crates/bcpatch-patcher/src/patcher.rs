//! Relocating rewrite engine.
//!
//! Each function is rewritten in three passes:
//!
//! 1. **Capture**: walk the buffer, record every jump target operand and
//!    load the source map.
//! 2. **Stream**: walk again, asking the policy about each instruction and
//!    copying it into a fresh buffer, preceded by any inserted bytes.  Every
//!    insertion shifts the recorded jumps and source positions that sit at or
//!    after the insertion point.
//! 3. **Patch**: rewrite the target operand of every relocated jump.
//!
//! The new buffer and source map replace the old ones only after all three
//! passes succeed.  The entry function is visited first, then pool functions
//! in pool order.

use bcpatch_bytecode::{
    encode_into, read_operands, BytecodeError, Function, InstructionCursor, OpcodeTable, Operands,
    Program,
};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{PatchError, PatchResult};
use crate::jumps::{JumpRecord, PositionTracker};
use crate::options::PatchOptions;
use crate::source_map::SourceMapTracker;
use crate::verify::verify_instructions;

/// What to do with the instruction under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchAction {
    /// Copy the instruction unchanged.
    Advance,
    /// Emit these bytes, then the instruction.  The bytes must decode into
    /// whole instructions; jump operands inside them are not relocated.
    InsertBefore(Vec<u8>),
}

/// Decides where and what to insert.
///
/// Called once per instruction, in order, with the cursor positioned on the
/// instruction.  Positions seen by the policy are input positions.
pub trait PatchPolicy {
    fn visit(&mut self, cursor: &InstructionCursor<'_>) -> PatchResult<PatchAction>;
}

impl<P: PatchPolicy + ?Sized> PatchPolicy for &mut P {
    fn visit(&mut self, cursor: &InstructionCursor<'_>) -> PatchResult<PatchAction> {
        (**self).visit(cursor)
    }
}

/// Closure adapter, see [`policy_fn`].
pub struct FnPolicy<F>(F);

impl<F> PatchPolicy for FnPolicy<F>
where
    F: FnMut(&InstructionCursor<'_>) -> PatchResult<PatchAction>,
{
    fn visit(&mut self, cursor: &InstructionCursor<'_>) -> PatchResult<PatchAction> {
        (self.0)(cursor)
    }
}

/// Turn a closure into a [`PatchPolicy`].
///
/// ```
/// use bcpatch_patcher::{policy_fn, PatchAction};
///
/// let mut policy = policy_fn(|cursor| {
///     Ok(if cursor.position() == 0 {
///         PatchAction::InsertBefore(vec![0])
///     } else {
///         PatchAction::Advance
///     })
/// });
/// # let _ = &mut policy;
/// ```
pub fn policy_fn<F>(f: F) -> FnPolicy<F>
where
    F: FnMut(&InstructionCursor<'_>) -> PatchResult<PatchAction>,
{
    FnPolicy(f)
}

/// Summary of a successful patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// Functions visited, entry function included.
    pub functions: usize,
    /// Insertion sites across all functions.
    pub insertions: usize,
    pub bytes_inserted: usize,
    /// Jump operands rewritten in the patch pass.
    pub jumps_relocated: usize,
}

impl PatchReport {
    fn merge(&mut self, other: PatchReport) {
        self.functions += other.functions;
        self.insertions += other.insertions;
        self.bytes_inserted += other.bytes_inserted;
        self.jumps_relocated += other.jumps_relocated;
    }
}

/// Rewrite engine.  Trackers are reused across functions and programs.
pub struct Patcher<'t> {
    table: &'t OpcodeTable,
    options: PatchOptions,
    jumps: PositionTracker,
    source_map: SourceMapTracker,
}

impl<'t> Patcher<'t> {
    pub fn new(table: &'t OpcodeTable) -> Self {
        Self::with_options(table, PatchOptions::default())
    }

    pub fn with_options(table: &'t OpcodeTable, options: PatchOptions) -> Self {
        Self {
            table,
            options,
            jumps: PositionTracker::new(),
            source_map: SourceMapTracker::new(),
        }
    }

    /// Patch every function of `program`.
    ///
    /// On error the program may be partially rewritten and must be
    /// discarded.
    pub fn patch<P>(&mut self, program: &mut Program, policy: &mut P) -> PatchResult<PatchReport>
    where
        P: PatchPolicy + ?Sized,
    {
        let mut report = PatchReport::default();
        for function in program.functions_mut() {
            let stats = self.patch_function(function, policy)?;
            report.merge(stats);
        }
        debug!(
            functions = report.functions,
            insertions = report.insertions,
            bytes_inserted = report.bytes_inserted,
            jumps_relocated = report.jumps_relocated,
            "patched program"
        );
        Ok(report)
    }

    /// Patch a single function.  Buffer and source map are replaced together,
    /// and only on success.
    pub fn patch_function<P>(
        &mut self,
        function: &mut Function,
        policy: &mut P,
    ) -> PatchResult<PatchReport>
    where
        P: PatchPolicy + ?Sized,
    {
        let table = self.table;
        let input = function.instructions.as_slice();

        // ── capture ─────────────────────────────────────────────────────────
        self.jumps.reset();
        let mut cursor = InstructionCursor::new(table, input);
        while cursor.advance() {
            let class = cursor.class();
            for slot in 0..class.target_count() {
                let target = cursor.operand(slot).ok_or(BytecodeError::MissingJumpOperand {
                    opcode: cursor.opcode(),
                    operands: slot,
                    needed: class.target_count(),
                })?;
                self.jumps
                    .record(cursor.position(), target, cursor.opcode(), slot, class);
            }
        }
        cursor.finish()?;
        self.source_map.reset(&function.source_map);

        // ── stream ──────────────────────────────────────────────────────────
        let mut report = PatchReport {
            functions: 1,
            ..PatchReport::default()
        };
        let mut output = Vec::with_capacity(input.len());
        cursor.reset(input);
        while cursor.advance() {
            if let PatchAction::InsertBefore(bytes) = policy.visit(&cursor)? {
                self.check_insertion(&bytes, cursor.position())?;
                let at = output.len();
                self.jumps.shift(at, bytes.len());
                self.source_map.shift(at, bytes.len());
                output.extend_from_slice(&bytes);
                trace!(
                    function = function.display_name(),
                    input_position = cursor.position(),
                    at,
                    size = bytes.len(),
                    "inserted"
                );
                report.insertions += 1;
                report.bytes_inserted += bytes.len();
            }
            output.extend_from_slice(cursor.bytes());
        }
        cursor.finish()?;

        // ── patch ───────────────────────────────────────────────────────────
        report.jumps_relocated = relocate_jumps(table, self.jumps.records(), &mut output)?;
        if self.options.verify_jumps {
            verify_instructions(table, &output)?;
        }

        debug!(
            function = function.display_name(),
            before = input.len(),
            after = output.len(),
            insertions = report.insertions,
            "patched function"
        );
        function.instructions = output;
        function.source_map = self.source_map.materialize();
        Ok(report)
    }

    fn check_insertion(&self, bytes: &[u8], position: usize) -> PatchResult<()> {
        if bytes.is_empty() {
            return Err(PatchError::InvalidInsertion {
                position,
                reason: "empty insertion".to_string(),
            });
        }
        let mut cursor = InstructionCursor::new(self.table, bytes);
        while cursor.advance() {}
        cursor.finish().map_err(|err| PatchError::InvalidInsertion {
            position,
            reason: err.to_string(),
        })
    }
}

/// Write final targets into every relocated jump of `output`.
///
/// Each record must point at an instruction starting with its opcode.
fn relocate_jumps(
    table: &OpcodeTable,
    records: &[JumpRecord],
    output: &mut [u8],
) -> PatchResult<usize> {
    let mut operands = Operands::new();
    let mut encoded = Vec::with_capacity(16);
    let mut count = 0;

    for record in records.iter().filter(|r| r.relocated) {
        let position = record.position;
        let found = output.get(position).copied();
        let info = match found {
            Some(opcode) if opcode == record.opcode => table.get(opcode),
            _ => None,
        };
        let Some(info) = info else {
            return Err(PatchError::JumpMismatch {
                position,
                expected: record.opcode,
                found,
            });
        };

        let start = position + 1;
        read_operands(&info.widths, &output[start..], &mut operands).ok_or(
            PatchError::Encode {
                position,
                source: BytecodeError::Truncated {
                    opcode: record.opcode,
                    position,
                    needed: info.operand_len(),
                    available: output.len() - start,
                },
            },
        )?;
        operands[record.slot] = record.target;

        encoded.clear();
        encode_into(&mut encoded, table, record.opcode, &operands).map_err(|source| {
            match source {
                BytecodeError::OperandOverflow { .. } => PatchError::TargetOverflow {
                    position,
                    target: record.target,
                },
                source => PatchError::Encode { position, source },
            }
        })?;
        output[position..position + encoded.len()].copy_from_slice(&encoded);

        trace!(position, slot = record.slot, target = record.target, "relocated jump");
        count += 1;
    }
    Ok(count)
}
