//! Relocating bytecode patcher.
//!
//! # Architecture
//!
//! The patcher takes a compiled [`bcpatch_bytecode::Program`] and inserts
//! instruction sequences chosen by a [`PatchPolicy`] into every function,
//! keeping all jump targets and source-map positions valid:
//!
//! - [`jumps`]: jump records captured before rewriting, shifted per insertion
//! - [`source_map`]: position → source-location id, shifted per insertion
//! - [`patcher`]: the capture / stream / patch rewrite engine
//! - [`yields`]: the cooperative-yield policy and its injected callable
//!
//! ## Usage
//!
//! ```
//! use bcpatch_bytecode::{Function, Opcode, Program};
//! use bcpatch_patcher::inject_yields;
//!
//! let mut program = Program::new(Function::new(vec![Opcode::Return.into(), 0]));
//! let sites = inject_yields(&mut program, 100).unwrap();
//! assert_eq!(sites, 1);
//! assert_eq!(program.constants.len(), 1);
//! ```

pub mod error;
pub mod jumps;
pub mod options;
pub mod patcher;
pub mod source_map;
pub mod verify;
pub mod yields;

pub use error::{PatchError, PatchResult};
pub use jumps::{JumpRecord, PositionTracker};
pub use options::{PatchOptions, YieldOptions, DEFAULT_YIELD_THRESHOLD};
pub use patcher::{policy_fn, FnPolicy, PatchAction, PatchPolicy, PatchReport, Patcher};
pub use source_map::SourceMapTracker;
pub use verify::{verify_function, verify_instructions};
pub use yields::{
    inject_yields, inject_yields_with, yield_snippet, YieldCallable, YieldHook, YieldInjection,
    YieldPolicy, YIELD_CALLABLE_NAME,
};
