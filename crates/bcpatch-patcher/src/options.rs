//! Configuration options for patching and yield injection.

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};

/// Options controlling the rewrite engine.
///
/// # Example
///
/// ```
/// use bcpatch_patcher::PatchOptions;
///
/// let options = PatchOptions { verify_jumps: true };
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    /// Re-check every rewritten function: each jump target must land on an
    /// instruction start.
    ///
    /// Default: false
    pub verify_jumps: bool,
}

/// Options for the injected yield callable.
///
/// # Example
///
/// ```
/// use bcpatch_patcher::YieldOptions;
///
/// let options = YieldOptions {
///     threshold: 1000,
///     ..YieldOptions::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YieldOptions {
    /// Number of callable invocations between two yields.  Must be > 0.
    ///
    /// Default: 100
    pub threshold: u32,

    /// Also sleep the OS thread briefly after yielding.
    ///
    /// `None` detects it: parking is enabled when only one logical processor
    /// is available, where a plain yield may not let other work run.
    ///
    /// Default: None
    pub park_thread: Option<bool>,
}

pub const DEFAULT_YIELD_THRESHOLD: u32 = 100;

impl Default for YieldOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_YIELD_THRESHOLD,
            park_thread: None,
        }
    }
}

impl YieldOptions {
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PatchResult<()> {
        if self.threshold == 0 {
            return Err(PatchError::InvalidThreshold);
        }
        Ok(())
    }

    /// Resolve [`park_thread`](Self::park_thread) against the host.
    pub fn should_park(&self) -> bool {
        self.park_thread.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() == 1)
                .unwrap_or(false)
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
