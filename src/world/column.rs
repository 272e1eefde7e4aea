//! # Column Module
//!
//! This module provides `Column`, the run-length staging buffer that terrain
//! generators fill one vertical column at a time. A column is decoded into a
//! chunk's dense voxel tensor, and along the way it tracks which heights of
//! the chunk stay uniform across all 256 columns.
//!
//! ## Equilevel tracking
//!
//! The first column decoded into a chunk becomes the reference. Every later
//! column is diffed against the reference with a two-pointer merge over the
//! two run lists, producing `+1`/`-1` deltas at the heights where agreement
//! starts or stops. Integrating the deltas with a prefix sum yields, per
//! height, the number of columns that disagree with the reference; heights
//! with a zero sum are "equilevels" and let the mesher skip whole slices.

use super::chunk::Chunk;
use super::registry::{BlockId, Registry};
use super::{BUILD_HEIGHT, WORLD_HEIGHT};
use crate::renderer::TerrainMesh;

/// A maximal vertical run of one block kind. `limit` is the exclusive top.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Run {
    /// The block filling the run.
    pub block: BlockId,
    /// One past the highest y of the run.
    pub limit: u8,
}

/// The solid and water surface of a column, sampled for LOD tiles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceField {
    /// The block at the surface, or air if there is none.
    pub block: BlockId,
    /// One past the highest y the surface occupies.
    pub height: u8,
}

/// A run-length encoded vertical column plus equilevel bookkeeping.
///
/// One `Column` is reused for every column of every chunk; `reset` clears
/// the per-column state while the reference run list and mismatch counters
/// persist for the duration of a chunk fill.
pub struct Column {
    runs: Vec<Run>,
    decorations: Vec<(BlockId, u8)>,
    reference: Vec<Run>,
    mismatches: Vec<i32>,
}

impl Column {
    /// Creates an empty column.
    pub fn new() -> Self {
        Column {
            runs: Vec::with_capacity(16),
            decorations: Vec::with_capacity(4),
            reference: Vec::with_capacity(16),
            mismatches: vec![0; WORLD_HEIGHT],
        }
    }

    /// Extends the column with `block` up to height `height` (exclusive).
    ///
    /// Heights at or below the current top are ignored, so generators can
    /// emit layers unconditionally. A push of the same block as the topmost
    /// run extends that run instead of starting a new one.
    pub fn push(&mut self, block: BlockId, height: usize) {
        let height = height.min(BUILD_HEIGHT) as u8;
        if height <= self.top() {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.block == block {
                last.limit = height;
                return;
            }
        }
        self.runs.push(Run { block, limit: height });
    }

    /// Overwrites the single voxel at `y` with `block`, after the runs are
    /// decoded. Used for decorations such as plants and tree trunks.
    pub fn overwrite(&mut self, block: BlockId, y: usize) {
        if y >= BUILD_HEIGHT {
            return;
        }
        self.decorations.push((block, y as u8));
    }

    /// One past the highest occupied y, or 0 for an empty column.
    pub fn top(&self) -> u8 {
        self.runs.last().map_or(0, |run| run.limit)
    }

    /// The decoded run list, lowest first.
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Clears the per-column state. Reference and mismatch state survive.
    pub fn reset(&mut self) {
        self.runs.clear();
        self.decorations.clear();
    }

    /// Decodes this column into chunk-local column `(x, z)` and folds its
    /// shape into the equilevel deltas.
    ///
    /// `first` marks the first column of a chunk fill; it seeds the
    /// reference run list and zeroes the mismatch counters.
    pub fn fill_chunk<M: TerrainMesh>(
        &mut self,
        x: usize,
        z: usize,
        chunk: &mut Chunk<M>,
        first: bool,
        registry: &Registry,
    ) {
        let mut start = 0;
        for run in &self.runs {
            let limit = run.limit as usize;
            if run.block != BlockId::AIR {
                chunk.set_column(x, z, start, limit - start, run.block, registry);
            }
            start = limit;
        }
        for &(block, y) in &self.decorations {
            chunk.set_column(x, z, y as usize, 1, block, registry);
        }
        self.detect_equilevel_changes(first);
    }

    /// Integrates the accumulated mismatch deltas and writes the chunk's
    /// equilevel bitset. Call once after all 256 columns are decoded.
    ///
    /// # Panics
    ///
    /// Panics if the running mismatch count goes negative or does not
    /// return to zero, which would mean the deltas were recorded wrong.
    pub fn commit_equilevels<M: TerrainMesh>(&mut self, chunk: &mut Chunk<M>) {
        let mut count = 0;
        for (y, &delta) in self.mismatches.iter().enumerate() {
            count += delta;
            assert!(count >= 0);
            chunk.set_equilevel(y, count == 0);
        }
        assert_eq!(count, 0);
        self.reference.clear();
    }

    /// Diffs this column's runs against the reference and records `+1` at
    /// each height where they stop agreeing and `-1` where they agree again.
    fn detect_equilevel_changes(&mut self, first: bool) {
        if first {
            self.reference.clear();
            self.reference.extend_from_slice(&self.runs);
            self.mismatches.fill(0);
            for &(_, y) in &self.decorations {
                record_mismatch(&mut self.mismatches, y as usize);
            }
            return;
        }

        let mut matched = true;
        let (mut base, mut test) = (0, 0);
        let (mut base_start, mut test_start) = (0usize, 0usize);
        while base_start < BUILD_HEIGHT {
            let (base_block, base_limit) = run_or_air(&self.reference, base);
            let (test_block, test_limit) = run_or_air(&self.runs, test);
            if matched != (base_block == test_block) {
                let height = base_start.max(test_start);
                self.mismatches[height] += if matched { 1 } else { -1 };
                matched = !matched;
            }
            if base_limit <= test_limit {
                base_start = base_limit;
                base += 1;
            }
            if test_limit <= base_limit {
                test_start = test_limit;
                test += 1;
            }
        }
        assert_eq!(base_start, test_start);
        if !matched {
            self.mismatches[BUILD_HEIGHT] -= 1;
        }
        for &(_, y) in &self.decorations {
            record_mismatch(&mut self.mismatches, y as usize);
        }
    }

    /// Samples the solid and water surfaces of this column for LOD tiles.
    ///
    /// The topmost run whose top-face material is liquid becomes the water
    /// field; the topmost run that is not becomes the solid field.
    pub fn surface(&self, registry: &Registry) -> (SurfaceField, SurfaceField) {
        let mut solid = SurfaceField::default();
        let mut water = SurfaceField::default();
        for run in self.runs.iter().rev() {
            if run.block == BlockId::AIR {
                continue;
            }
            let material = registry.block(run.block).faces[2];
            let liquid = material != super::registry::MaterialId::NONE
                && registry.material(material).liquid;
            if liquid {
                if water.block == BlockId::AIR {
                    water = SurfaceField { block: run.block, height: run.limit };
                }
            } else if solid.block == BlockId::AIR {
                solid = SurfaceField { block: run.block, height: run.limit };
            }
            if solid.block != BlockId::AIR {
                break;
            }
        }
        (solid, water)
    }
}

impl Default for Column {
    fn default() -> Self {
        Column::new()
    }
}

// A decoration makes exactly one height differ from the reference. Counting
// it twice for a decorated reference column is fine: the sum stays positive,
// which is all the equilevel test needs.
fn record_mismatch(mismatches: &mut [i32], y: usize) {
    mismatches[y] += 1;
    if y + 1 < WORLD_HEIGHT {
        mismatches[y + 1] -= 1;
    }
}

/// Reads run `index`, treating everything past the last run as air up to
/// the build height. Generators are not required to cap their columns with
/// an explicit air run.
fn run_or_air(runs: &[Run], index: usize) -> (BlockId, usize) {
    match runs.get(index) {
        Some(run) => (run.block, run.limit as usize),
        None => (BlockId::AIR, BUILD_HEIGHT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: BlockId = BlockId(2);
    const DIRT: BlockId = BlockId(3);

    #[test]
    fn push_merges_equal_blocks() {
        let mut column = Column::new();
        column.push(STONE, 10);
        column.push(STONE, 20);
        column.push(DIRT, 24);
        assert_eq!(
            column.runs(),
            &[Run { block: STONE, limit: 20 }, Run { block: DIRT, limit: 24 }]
        );
    }

    #[test]
    fn push_ignores_non_increasing_heights() {
        let mut column = Column::new();
        column.push(STONE, 10);
        column.push(DIRT, 10);
        column.push(DIRT, 4);
        assert_eq!(column.runs(), &[Run { block: STONE, limit: 10 }]);
        assert_eq!(column.top(), 10);
    }

    #[test]
    fn push_clamps_to_build_height() {
        let mut column = Column::new();
        column.push(STONE, WORLD_HEIGHT + 50);
        assert_eq!(column.top() as usize, BUILD_HEIGHT);
    }

    #[test]
    fn identical_columns_produce_no_mismatches() {
        let mut column = Column::new();
        column.push(STONE, 8);
        column.push(DIRT, 12);
        column.detect_equilevel_changes(true);
        column.detect_equilevel_changes(false);
        assert!(column.mismatches.iter().all(|&d| d == 0));
    }

    #[test]
    fn differing_columns_bracket_the_disagreement() {
        let mut column = Column::new();
        column.push(STONE, 8);
        column.detect_equilevel_changes(true);

        column.reset();
        column.push(STONE, 6);
        column.detect_equilevel_changes(false);

        // Heights 6 and 7 hold stone in the reference but air here.
        let mut sums = vec![0; WORLD_HEIGHT];
        let mut count = 0;
        for (y, sum) in sums.iter_mut().enumerate() {
            count += column.mismatches[y];
            *sum = count;
        }
        for (y, &sum) in sums.iter().enumerate() {
            let expected = if (6..8).contains(&y) { 1 } else { 0 };
            assert_eq!(sum, expected, "height {}", y);
        }
    }

    #[test]
    fn surface_splits_water_from_solid() {
        let mut registry = Registry::new();
        let stone_mat = registry.add_material(crate::world::registry::MaterialData {
            liquid: false,
            alpha_test: false,
            texture: 0,
            color: [1.0; 4],
        });
        let water_mat = registry.add_material(crate::world::registry::MaterialData {
            liquid: true,
            alpha_test: false,
            texture: 1,
            color: [0.3, 0.3, 1.0, 0.8],
        });
        let stone = registry.add_block(crate::world::registry::BlockData {
            opaque: true,
            solid: true,
            light: 0,
            faces: [stone_mat; 6],
        });
        let water = registry.add_block(crate::world::registry::BlockData {
            opaque: false,
            solid: false,
            light: 0,
            faces: [water_mat; 6],
        });

        let mut column = Column::new();
        column.push(stone, 40);
        column.push(water, 64);
        let (solid, liquid) = column.surface(&registry);
        assert_eq!(solid, SurfaceField { block: stone, height: 40 });
        assert_eq!(liquid, SurfaceField { block: water, height: 64 });
    }
}
