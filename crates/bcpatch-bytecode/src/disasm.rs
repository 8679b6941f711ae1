//! Human-readable listings.
//!
//! ```text
//! Params:0 Variadic:false Locals:1
//! Instructions:
//! 0000 CONSTANT        3
//! 0003 CALL            0    0
//! SourceMap:map[3:8]
//! ```
//!
//! Undecodable tails are rendered as a single `<error: ...>` line rather than
//! failing the whole listing.

use std::fmt;

use crate::cursor::InstructionCursor;
use crate::opcode::OpcodeTable;
use crate::program::{Function, Program};

/// Display adapter returned by [`Function::disassemble`].
pub struct Disassembly<'a> {
    table: &'a OpcodeTable,
    function: &'a Function,
}

impl Function {
    pub fn disassemble<'a>(&'a self, table: &'a OpcodeTable) -> Disassembly<'a> {
        Disassembly {
            table,
            function: self,
        }
    }

    /// One line per instruction, without the header and source map.
    pub fn listing(&self, table: &OpcodeTable) -> Vec<String> {
        let mut lines = Vec::new();
        let mut cursor = InstructionCursor::new(table, &self.instructions);
        while cursor.advance() {
            lines.push(format_instruction(&cursor));
        }
        if let Some(err) = cursor.error() {
            lines.push(format!("<error: {err}>"));
        }
        lines
    }
}

fn format_instruction(cursor: &InstructionCursor<'_>) -> String {
    let name = cursor.info().map_or("?", |info| info.name.as_str());
    let operands: Vec<String> = cursor.operands().iter().map(|o| o.to_string()).collect();
    format!("{:04} {:<15} {}", cursor.position(), name, operands.join("    "))
        .trim_end()
        .to_string()
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.function;
        writeln!(
            f,
            "Params:{} Variadic:{} Locals:{}",
            func.num_params, func.variadic, func.num_locals
        )?;
        writeln!(f, "Instructions:")?;
        for line in func.listing(self.table) {
            writeln!(f, "{line}")?;
        }
        write!(f, "SourceMap:{}", format_source_map(func))
    }
}

/// `map[k:v k:v]` with keys ascending.
pub fn format_source_map(func: &Function) -> String {
    let entries: Vec<String> = func
        .source_map
        .iter()
        .map(|(pos, id)| format!("{pos}:{id}"))
        .collect();
    format!("map[{}]", entries.join(" "))
}

impl Program {
    /// Disassemble every function in visiting order, separated by blank lines.
    pub fn disassemble(&self, table: &OpcodeTable) -> String {
        self.functions()
            .map(|func| format!("{}:\n{}", func.display_name(), func.disassemble(table)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
