//! Source-map tracker: instruction position → source-location id.
//!
//! Positions and ids are held as two parallel arrays while a function is
//! rewritten and turned back into a [`SourceMap`] once, at the end of the
//! pass.  Shifting preserves order, so positions stay unique.

use bcpatch_bytecode::SourceMap;

#[derive(Debug, Default)]
pub struct SourceMapTracker {
    positions: Vec<usize>,
    ids: Vec<usize>,
}

impl SourceMapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `map`, replacing any previous contents.
    pub fn reset(&mut self, map: &SourceMap) {
        self.positions.clear();
        self.ids.clear();
        self.positions.reserve(map.len());
        self.ids.reserve(map.len());
        for (&pos, &id) in map {
            self.positions.push(pos);
            self.ids.push(id);
        }
    }

    /// Account for `size` bytes inserted at output offset `at`.
    pub fn shift(&mut self, at: usize, size: usize) {
        for pos in &mut self.positions {
            if *pos >= at {
                *pos += size;
            }
        }
    }

    pub fn materialize(&self) -> SourceMap {
        self.positions
            .iter()
            .copied()
            .zip(self.ids.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
