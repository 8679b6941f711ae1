//! Shared fixtures and a reference interpreter for the integration tests.

#![allow(dead_code)]

use bcpatch_bytecode::Opcode as Op;
use bcpatch_bytecode::{
    read_operands, BinaryOperator, Callable, Constant, Function, FunctionBuilder,
    InstructionCursor, Opcode, OpcodeTable, Operands, Program,
};
use bcpatch_patcher::verify_function;

// ══════════════════════════════════════════════════════════════════════════════
// Fixtures
// ══════════════════════════════════════════════════════════════════════════════

/// Assemble `(source_id, opcode, operands)` triples into a function.
pub fn assemble(table: &OpcodeTable, insts: &[(usize, Opcode, &[usize])]) -> Function {
    let mut b = FunctionBuilder::new(table);
    for (source, op, operands) in insts {
        b.emit_at(*source, *op, operands)
            .unwrap_or_else(|e| panic!("assemble {op:?}: {e}"));
    }
    b.finish()
}

const GREATER: usize = BinaryOperator::Greater as usize;
const LESS: usize = BinaryOperator::Less as usize;
const ADD: usize = BinaryOperator::Add as usize;
const SUB: usize = BinaryOperator::Sub as usize;

/// ```text
/// a := 2
/// try { throw a } catch err { for a > 0 { a -= 1 } } finally { return }
/// ```
pub fn try_catch_loop(table: &OpcodeTable) -> Program {
    let main = assemble(
        table,
        &[
            (8, Op::Constant, &[0]),           // 0
            (3, Op::DefineLocal, &[0]),        // 3
            (11, Op::SetupTry, &[26, 55]),     // 5
            (25, Op::GetLocal, &[0]),          // 14
            (19, Op::Throw, &[1]),             // 16
            (30, Op::Null, &[]),               // 18
            (11, Op::DefineLocal, &[1]),       // 19
            (11, Op::Jump, &[55]),             // 21
            (30, Op::SetupCatch, &[]),         // 26
            (30, Op::SetLocal, &[1]),          // 27
            (48, Op::GetLocal, &[0]),          // 29
            (52, Op::Constant, &[1]),          // 31
            (48, Op::BinaryOp, &[GREATER]),    // 34
            (44, Op::JumpFalsy, &[55]),        // 36
            (59, Op::GetLocal, &[0]),          // 41
            (60, Op::Constant, &[2]),          // 43
            (59, Op::BinaryOp, &[SUB]),        // 46
            (59, Op::SetLocal, &[0]),          // 48
            (44, Op::Jump, &[29]),             // 50
            (70, Op::SetupFinally, &[]),       // 55
            (82, Op::Return, &[0]),            // 56
            (11, Op::Throw, &[0]),             // 58
            (0, Op::Return, &[0]),             // 60
        ],
    )
    .with_locals(0, 2);
    let mut program = Program::new(main);
    program.push_constant(Constant::Int(2));
    program.push_constant(Constant::Int(0));
    program.push_constant(Constant::Int(1));
    program
}

/// ```text
/// a := 1
/// try { throw a } finally { return }
/// ```
pub fn try_finally(table: &OpcodeTable) -> Program {
    let main = assemble(
        table,
        &[
            (8, Op::Constant, &[0]),      // 0
            (3, Op::DefineLocal, &[0]),   // 3
            (11, Op::SetupTry, &[0, 18]), // 5
            (25, Op::GetLocal, &[0]),     // 14
            (19, Op::Throw, &[1]),        // 16
            (30, Op::SetupFinally, &[]),  // 18
            (42, Op::Return, &[0]),       // 19
            (11, Op::Throw, &[0]),        // 21
            (0, Op::Return, &[0]),        // 23
        ],
    )
    .with_locals(0, 1);
    let mut program = Program::new(main);
    program.push_constant(Constant::Int(1));
    program
}

/// An empty body: `RETURN 0`.
pub fn empty_body(table: &OpcodeTable) -> Program {
    Program::new(assemble(table, &[(0, Opcode::Return, &[0])]))
}

/// `for {}`: a single jump to itself at entry.
pub fn spin_loop(table: &OpcodeTable) -> Program {
    Program::new(assemble(table, &[(0, Opcode::Jump, &[0])]))
}

/// `for {}` after a prologue, so the loop edge is distinct from the entry.
pub fn spin_loop_after_prologue(table: &OpcodeTable) -> Program {
    Program::new(assemble(
        table,
        &[(0, Opcode::Null, &[]), (1, Opcode::Pop, &[]), (2, Opcode::Jump, &[1])],
    ))
}

/// ```text
/// i := 0
/// for i < limit { i += 1 }
/// ```
pub fn counting_loop(table: &OpcodeTable, limit: i64) -> Program {
    let main = assemble(
        table,
        &[
            (1, Op::Constant, &[0]),        // 0
            (1, Op::DefineLocal, &[0]),     // 3
            (2, Op::GetLocal, &[0]),        // 5
            (2, Op::Constant, &[1]),        // 7
            (2, Op::BinaryOp, &[LESS]),     // 10
            (2, Op::JumpFalsy, &[31]),      // 12
            (3, Op::GetLocal, &[0]),        // 17
            (3, Op::Constant, &[2]),        // 19
            (3, Op::BinaryOp, &[ADD]),      // 22
            (3, Op::SetLocal, &[0]),        // 24
            (2, Op::Jump, &[5]),            // 26
            (4, Op::Return, &[0]),          // 31
        ],
    )
    .with_locals(0, 1);
    let mut program = Program::new(main);
    program.push_constant(Constant::Int(0));
    program.push_constant(Constant::Int(limit));
    program.push_constant(Constant::Int(1));
    program
}

/// ```text
/// f := func() {}
/// f()
/// ```
pub fn closure_call(table: &OpcodeTable) -> Program {
    let main = assemble(
        table,
        &[
            (1, Op::Constant, &[0]),
            (1, Op::DefineLocal, &[0]),
            (2, Op::GetLocal, &[0]),
            (2, Op::Call, &[0, 0]),
            (2, Op::Pop, &[]),
            (0, Op::Return, &[0]),
        ],
    )
    .with_name("main")
    .with_locals(0, 1);
    let f = assemble(table, &[(1, Op::Return, &[0])]).with_name("f");
    let mut program = Program::new(main);
    program.push_constant(f);
    program
}

// ══════════════════════════════════════════════════════════════════════════════
// Inspection helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Decode a function into `(position, opcode, operands)` triples.
pub fn decode(table: &OpcodeTable, function: &Function) -> Vec<(usize, Opcode, Vec<usize>)> {
    let mut out = Vec::new();
    let mut cursor = InstructionCursor::new(table, &function.instructions);
    while cursor.advance() {
        let op = Opcode::from_byte(cursor.opcode()).expect("built-in opcode");
        out.push((cursor.position(), op, cursor.operands().to_vec()));
    }
    cursor.finish().expect("decodes completely");
    out
}

/// Panic unless every function of `program` has valid jump targets.
pub fn assert_jumps_valid(table: &OpcodeTable, program: &Program) {
    for function in program.functions() {
        if let Err(err) = verify_function(table, function) {
            panic!(
                "{}: {err}\n{}",
                function.display_name(),
                function.disassemble(table)
            );
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Reference interpreter
// ══════════════════════════════════════════════════════════════════════════════

const STEP_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Try,
    Catch,
    Finally,
}

#[derive(Debug)]
struct Handler {
    catch: usize,
    finally: usize,
    phase: Phase,
    pending: Option<Constant>,
}

/// Minimal stack machine for the built-in instruction set.
pub struct Vm<'p> {
    program: &'p Program,
    table: &'p OpcodeTable,
    steps: usize,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, table: &'p OpcodeTable) -> Self {
        Self {
            program,
            table,
            steps: 0,
        }
    }

    pub fn run(&mut self) -> Result<Constant, String> {
        let program = self.program;
        self.call_function(&program.main, &[])
    }

    fn call_function(&mut self, function: &Function, args: &[Constant]) -> Result<Constant, String> {
        let insts = &function.instructions;
        let mut locals = vec![Constant::Null; function.num_locals.max(args.len())];
        locals[..args.len()].clone_from_slice(args);
        let mut stack: Vec<Constant> = Vec::new();
        let mut handlers: Vec<Handler> = Vec::new();
        let mut operands = Operands::new();
        let mut ip = 0;

        loop {
            self.steps += 1;
            if self.steps > STEP_LIMIT {
                return Err("step limit exceeded".to_string());
            }
            let byte = *insts
                .get(ip)
                .ok_or_else(|| format!("ip {ip} out of bounds"))?;
            let info = self
                .table
                .get(byte)
                .ok_or_else(|| format!("invalid opcode {byte} at {ip}"))?;
            read_operands(&info.widths, &insts[ip + 1..], &mut operands)
                .ok_or_else(|| format!("truncated instruction at {ip}"))?;
            let op = Opcode::from_byte(byte).ok_or_else(|| format!("unknown opcode {byte}"))?;
            ip += 1 + info.operand_len();

            match op {
                Opcode::Noop | Opcode::SetupCatch => {}
                Opcode::Constant => {
                    let value = self
                        .program
                        .constants
                        .get(operands[0])
                        .cloned()
                        .ok_or_else(|| format!("no constant {}", operands[0]))?;
                    stack.push(value);
                }
                Opcode::Null => stack.push(Constant::Null),
                Opcode::True => stack.push(Constant::Bool(true)),
                Opcode::False => stack.push(Constant::Bool(false)),
                Opcode::Pop => {
                    pop(&mut stack)?;
                }
                Opcode::GetLocal => {
                    let value = locals
                        .get(operands[0])
                        .cloned()
                        .ok_or_else(|| format!("no local {}", operands[0]))?;
                    stack.push(value);
                }
                Opcode::SetLocal | Opcode::DefineLocal => {
                    let value = pop(&mut stack)?;
                    let slot = operands[0];
                    if slot >= locals.len() {
                        locals.resize(slot + 1, Constant::Null);
                    }
                    locals[slot] = value;
                }
                Opcode::BinaryOp => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(binary(operands[0], left, right)?);
                }
                Opcode::Call => {
                    let argc = operands[0];
                    if stack.len() < argc + 1 {
                        return Err("stack underflow in call".to_string());
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let result = match pop(&mut stack)? {
                        Constant::Function(f) => self.call_function(&f, &args)?,
                        Constant::Callable(c) => {
                            Callable::call(c.as_ref(), &args).map_err(|e| e.to_string())?
                        }
                        other => return Err(format!("not callable: {other:?}")),
                    };
                    stack.push(result);
                }
                Opcode::Return => {
                    return if operands[0] == 1 {
                        pop(&mut stack)
                    } else {
                        Ok(Constant::Null)
                    };
                }
                Opcode::Jump => ip = operands[0],
                Opcode::JumpFalsy => {
                    if !pop(&mut stack)?.is_truthy() {
                        ip = operands[0];
                    }
                }
                Opcode::AndJump => {
                    if peek(&stack)?.is_truthy() {
                        pop(&mut stack)?;
                    } else {
                        ip = operands[0];
                    }
                }
                Opcode::OrJump => {
                    if peek(&stack)?.is_truthy() {
                        ip = operands[0];
                    } else {
                        pop(&mut stack)?;
                    }
                }
                Opcode::SetupTry => handlers.push(Handler {
                    catch: operands[0],
                    finally: operands[1],
                    phase: Phase::Try,
                    pending: None,
                }),
                Opcode::SetupFinally => {
                    if let Some(handler) = handlers.last_mut() {
                        handler.phase = Phase::Finally;
                    }
                }
                Opcode::Throw => {
                    let error = if operands[0] == 1 {
                        pop(&mut stack)?
                    } else {
                        // End of a finally block: re-raise whatever it deferred.
                        match handlers.pop() {
                            Some(Handler {
                                pending: Some(error),
                                ..
                            }) => error,
                            _ => continue,
                        }
                    };
                    ip = unwind(&mut handlers, &mut stack, error)?;
                }
            }
        }
    }
}

fn unwind(
    handlers: &mut Vec<Handler>,
    stack: &mut Vec<Constant>,
    error: Constant,
) -> Result<usize, String> {
    while let Some(handler) = handlers.last_mut() {
        if handler.phase == Phase::Try && handler.catch != 0 {
            handler.phase = Phase::Catch;
            stack.push(error);
            return Ok(handler.catch);
        }
        if handler.phase != Phase::Finally && handler.finally != 0 {
            handler.phase = Phase::Finally;
            handler.pending = Some(error);
            return Ok(handler.finally);
        }
        handlers.pop();
    }
    Err(format!("uncaught error: {error:?}"))
}

fn pop(stack: &mut Vec<Constant>) -> Result<Constant, String> {
    stack.pop().ok_or_else(|| "stack underflow".to_string())
}

fn peek(stack: &[Constant]) -> Result<&Constant, String> {
    stack.last().ok_or_else(|| "stack underflow".to_string())
}

fn binary(operator: usize, left: Constant, right: Constant) -> Result<Constant, String> {
    let op = u8::try_from(operator)
        .ok()
        .and_then(BinaryOperator::from_byte)
        .ok_or_else(|| format!("unknown operator {operator}"))?;
    if op == BinaryOperator::Equal {
        return Ok(Constant::Bool(left == right));
    }
    let (Constant::Int(l), Constant::Int(r)) = (&left, &right) else {
        return Err(format!("unsupported operands {left:?} {right:?}"));
    };
    Ok(match op {
        BinaryOperator::Add => Constant::Int(l + r),
        BinaryOperator::Sub => Constant::Int(l - r),
        BinaryOperator::Mul => Constant::Int(l * r),
        BinaryOperator::Less => Constant::Bool(l < r),
        BinaryOperator::Greater => Constant::Bool(l > r),
        BinaryOperator::Equal => Constant::Bool(l == r),
    })
}

/// Run `program` with the built-in opcode table.
pub fn run(program: &Program) -> Result<Constant, String> {
    let table = OpcodeTable::standard();
    Vm::new(program, &table).run()
}
