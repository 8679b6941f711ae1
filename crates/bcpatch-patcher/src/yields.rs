//! Cooperative-yield injection.
//!
//! Inserts a call to a host callable at the top of every function and before
//! every backward unconditional jump:
//!
//! ```text
//! CONSTANT <k>
//! CALL     0    0
//! POP
//! ```
//!
//! `k` is the pool index the callable receives when it is appended after a
//! successful patch.  Every loop iteration and every function entry thus
//! ticks the callable, which yields the current thread once per
//! `threshold` calls.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bcpatch_bytecode::{
    encode_into, CallError, Callable, Constant, InstructionCursor, Opcode, OpcodeTable, Program,
};
use tracing::{debug, trace};

use crate::error::{PatchError, PatchResult};
use crate::options::YieldOptions;
use crate::patcher::{PatchAction, PatchPolicy, PatchReport, Patcher};

/// Name and type name of the injected callable.
pub const YIELD_CALLABLE_NAME: &str = "<yield>";

/// Host primitive invoked when the threshold is reached.
pub type YieldHook = Arc<dyn Fn() + Send + Sync>;

/// Encode the call sequence for the callable at pool index `index`.
pub fn yield_snippet(table: &OpcodeTable, index: usize) -> PatchResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(7);
    encode_into(&mut buf, table, Opcode::Constant.into(), &[index]).map_err(PatchError::Snippet)?;
    encode_into(&mut buf, table, Opcode::Call.into(), &[0, 0]).map_err(PatchError::Snippet)?;
    encode_into(&mut buf, table, Opcode::Pop.into(), &[]).map_err(PatchError::Snippet)?;
    Ok(buf)
}

// ══════════════════════════════════════════════════════════════════════════════
// Policy
// ══════════════════════════════════════════════════════════════════════════════

/// Inserts the yield snippet at function entry and before backward jumps.
#[derive(Debug, Clone)]
pub struct YieldPolicy {
    snippet: Vec<u8>,
    sites: usize,
}

impl YieldPolicy {
    pub fn new(table: &OpcodeTable, callable_index: usize) -> PatchResult<Self> {
        Ok(Self {
            snippet: yield_snippet(table, callable_index)?,
            sites: 0,
        })
    }

    /// Insertion sites chosen so far.
    pub fn sites(&self) -> usize {
        self.sites
    }
}

impl PatchPolicy for YieldPolicy {
    fn visit(&mut self, cursor: &InstructionCursor<'_>) -> PatchResult<PatchAction> {
        let position = cursor.position();
        let backward = cursor.opcode() == Opcode::Jump.to_byte()
            && cursor.operand(0).is_some_and(|target| target < position);
        if position == 0 || backward {
            self.sites += 1;
            return Ok(PatchAction::InsertBefore(self.snippet.clone()));
        }
        Ok(PatchAction::Advance)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Injected callable
// ══════════════════════════════════════════════════════════════════════════════

/// Counts invocations and yields once per `threshold` calls.
///
/// Safe to call from several threads: the counter is bumped with a
/// fetch-add and reset with a compare-exchange, so a yield may fire a few
/// calls early or late under contention, but every increment is counted and
/// a given count is reset at most once.
pub struct YieldCallable {
    counter: AtomicU32,
    num_calls: AtomicU64,
    num_yields: AtomicU64,
    threshold: u32,
    park_thread: bool,
    hook: YieldHook,
}

impl YieldCallable {
    /// Callable using [`std::thread::yield_now`] as its yield primitive.
    pub fn new(options: &YieldOptions) -> PatchResult<Self> {
        Self::with_hook(options, Arc::new(std::thread::yield_now))
    }

    pub fn with_hook(options: &YieldOptions, hook: YieldHook) -> PatchResult<Self> {
        options.validate()?;
        Ok(Self {
            counter: AtomicU32::new(0),
            num_calls: AtomicU64::new(0),
            num_yields: AtomicU64::new(0),
            threshold: options.threshold,
            park_thread: options.should_park(),
            hook,
        })
    }

    /// Record one call; returns true when this call yielded.
    pub fn tick(&self) -> bool {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        let count = self.counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        if count < self.threshold {
            return false;
        }
        if self
            .counter
            .compare_exchange(count, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let yields = self.num_yields.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(yields, "yielding");
        (self.hook)();
        if self.park_thread {
            std::thread::sleep(Duration::from_nanos(1));
        }
        true
    }

    /// Total invocations since construction.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Calls since the last yield.
    pub fn pending(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn num_yields(&self) -> u64 {
        self.num_yields.load(Ordering::Relaxed)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn parks_thread(&self) -> bool {
        self.park_thread
    }
}

impl fmt::Debug for YieldCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldCallable")
            .field("threshold", &self.threshold)
            .field("park_thread", &self.park_thread)
            .field("num_calls", &self.num_calls())
            .field("num_yields", &self.num_yields())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for YieldCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(YIELD_CALLABLE_NAME)
    }
}

impl Callable for YieldCallable {
    fn name(&self) -> &str {
        YIELD_CALLABLE_NAME
    }

    fn call(&self, _args: &[Constant]) -> Result<Constant, CallError> {
        self.tick();
        Ok(Constant::Null)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Entry points
// ══════════════════════════════════════════════════════════════════════════════

/// Result of [`inject_yields_with`].
#[derive(Debug, Clone)]
pub struct YieldInjection {
    /// Insertion sites across all functions.
    pub sites: usize,
    /// The callable appended to the constant pool.
    pub callable: Arc<YieldCallable>,
    pub report: PatchReport,
}

/// Inject yields using the built-in opcode table and default options.
///
/// Returns the number of insertion sites.  On error the program must be
/// discarded.
pub fn inject_yields(program: &mut Program, threshold: u32) -> PatchResult<usize> {
    let table = OpcodeTable::standard();
    let options = YieldOptions::with_threshold(threshold);
    inject_yields_with(program, &table, &options, None).map(|injection| injection.sites)
}

/// Inject yields, optionally replacing the yield primitive.
///
/// The options are validated before the program is touched.
pub fn inject_yields_with(
    program: &mut Program,
    table: &OpcodeTable,
    options: &YieldOptions,
    hook: Option<YieldHook>,
) -> PatchResult<YieldInjection> {
    let callable = match hook {
        Some(hook) => YieldCallable::with_hook(options, hook)?,
        None => YieldCallable::new(options)?,
    };
    let callable = Arc::new(callable);

    let index = program.constants.len();
    let mut policy = YieldPolicy::new(table, index)?;
    let report = Patcher::new(table).patch(program, &mut policy)?;

    let shared: Arc<dyn Callable> = callable.clone();
    program.push_constant(Constant::Callable(shared));

    debug!(
        sites = policy.sites(),
        index,
        threshold = callable.threshold(),
        park_thread = callable.parks_thread(),
        "injected yield callable"
    );
    Ok(YieldInjection {
        sites: policy.sites(),
        callable,
        report,
    })
}
