//! # Chunk Module
//!
//! This module provides `Chunk`, a 16 x 256 x 16 pillar of voxels together
//! with everything derived from them: the heightmap, the block-light field,
//! the equilevel bitset, and the chunk's mesh handles.
//!
//! ## Lighting
//!
//! Light is propagated chunk-locally with an incremental best-first flood.
//! Every cell satisfies the fixpoint rule implemented by `query_light`: an
//! opaque cell holds its own emission, a cell at or above its column height
//! holds full sunlight, and any other cell holds one less than the maximum
//! of its neighbors and its own sources. When a cell changes, only the
//! neighbors whose value could have depended on it are re-enqueued; the
//! band of affected levels is computed from the old and new values.
//!
//! A cell's stored light can only be wrong if it is in the dirty set, so
//! an empty dirty set certifies the whole field.
//!
//! Border cells additionally carry light received from neighboring chunks.
//! The world refreshes that inflow from the neighbors' edge sets and
//! heightmaps each time the chunk is remeshed, so light crosses chunk
//! borders over successive frames.

use std::collections::{HashMap, HashSet};

use bitvec::prelude::*;
use log::debug;

use super::circle::{ChunkPos, CircleElement};
use super::registry::{BlockId, Registry};
use super::tensor::{Tensor2, Tensor3};
use super::{BUILD_HEIGHT, CHUNK_BITS, CHUNK_MASK, CHUNK_WIDTH, NUM_NEIGHBORS, SUNLIGHT_LEVEL};
use crate::loader::Loader;
use crate::renderer::TerrainMesh;
use crate::world::column::Column;

/// One step of light propagation in chunk index space.
///
/// `diff` is added to a voxel index to reach the neighbor; the step is out
/// of bounds exactly when the masked index bits equal `test`.
struct LightSpread {
    diff: i32,
    mask: i32,
    test: i32,
}

/// The six propagation directions: -x, +x, -z, +z, -y, +y. The first four
/// are the planar directions used when seeding at height discontinuities.
const LIGHT_SPREAD: [LightSpread; 6] = [
    LightSpread { diff: -0x0100, mask: 0x0f00, test: 0x0000 },
    LightSpread { diff: 0x0100, mask: 0x0f00, test: 0x0f00 },
    LightSpread { diff: -0x1000, mask: 0xf000, test: 0x0000 },
    LightSpread { diff: 0x1000, mask: 0xf000, test: 0xf000 },
    LightSpread { diff: -0x0001, mask: 0x00ff, test: 0x0000 },
    LightSpread { diff: 0x0001, mask: 0x00ff, test: 0x00ff },
];

/// After a cell changes from `prev` to `next`, the highest neighbor level
/// that could need a requery.
fn max_updated_neighbor_light(next: i32, prev: i32) -> i32 {
    let max = next.max(prev);
    max - i32::from(max < SUNLIGHT_LEVEL as i32) - i32::from(next > prev)
}

/// After a cell changes from `prev` to `next`, the lowest neighbor level
/// that could need a requery.
fn min_updated_neighbor_light(next: i32, prev: i32) -> i32 {
    next.min(prev) - i32::from(next > prev)
}

/// Whether a voxel index lies on the chunk's x or z border.
fn is_edge(index: usize) -> bool {
    let mask = CHUNK_MASK as usize;
    let x = (index >> 8) & mask;
    let z = (index >> 12) & mask;
    x == 0 || x == mask || z == 0 || z == mask
}

/// A 16 x 256 x 16 pillar of voxels and its derived state.
pub struct Chunk<M: TerrainMesh> {
    point: ChunkPos,
    neighbors: usize,
    pub(crate) dirty: bool,
    pub(crate) solid: Option<M>,
    pub(crate) water: Option<M>,
    pub(crate) voxels: Tensor3<BlockId>,
    /// One past the highest non-air voxel of each column.
    pub(crate) heightmap: Tensor2<u8>,
    /// Per column, the height below which sunlight is not known to be
    /// full. The mesher uses it to tag sky-lit faces.
    pub(crate) light_map: Tensor2<u8>,
    pub(crate) lights: Tensor3<u8>,
    /// Bit y is set when every voxel at height y holds the same block.
    pub(crate) equilevels: BitVec,
    light_dirty: HashSet<usize>,
    light_next: HashSet<usize>,
    light_edges: HashSet<usize>,
    point_lights: HashMap<usize, u8>,
    incoming_light: HashMap<usize, u8>,
}

impl<M: TerrainMesh> Chunk<M> {
    /// Creates an empty, unlit chunk at `point`.
    pub fn new(point: ChunkPos) -> Self {
        Chunk {
            point,
            neighbors: 0,
            dirty: false,
            solid: None,
            water: None,
            voxels: Tensor3::chunk(BlockId::AIR),
            heightmap: Tensor2::chunk(0),
            light_map: Tensor2::chunk(0),
            lights: Tensor3::chunk(SUNLIGHT_LEVEL as u8),
            equilevels: bitvec![1; super::WORLD_HEIGHT],
            light_dirty: HashSet::new(),
            light_next: HashSet::new(),
            light_edges: HashSet::new(),
            point_lights: HashMap::new(),
            incoming_light: HashMap::new(),
        }
    }

    /// The chunk's position in chunk coordinates.
    pub fn point(&self) -> ChunkPos {
        self.point
    }

    /// Whether all 8 planar neighbors are loaded. Only ready chunks mesh,
    /// since meshing reads a one-voxel border from every neighbor.
    pub fn is_ready(&self) -> bool {
        self.neighbors == NUM_NEIGHBORS
    }

    /// Whether the voxels changed since the last mesh build.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether this chunk should be remeshed this frame.
    pub fn needs_remesh(&self) -> bool {
        self.dirty && self.is_ready()
    }

    /// Whether the chunk currently owns any mesh.
    pub fn has_mesh(&self) -> bool {
        self.solid.is_some() || self.water.is_some()
    }

    /// The solid mesh handle, if any.
    pub fn solid_mesh(&self) -> Option<&M> {
        self.solid.as_ref()
    }

    /// The translucent mesh handle, if any.
    pub fn water_mesh(&self) -> Option<&M> {
        self.water.as_ref()
    }

    pub(crate) fn neighbor_loaded(&mut self) {
        self.neighbors += 1;
        assert!(self.neighbors <= NUM_NEIGHBORS);
    }

    pub(crate) fn neighbor_disposed(&mut self) {
        assert!(self.neighbors > 0);
        self.neighbors -= 1;
    }

    /// Releases the chunk's meshes. Called on eviction.
    pub(crate) fn dispose(mut self) {
        if let Some(mesh) = self.solid.take() {
            mesh.dispose();
        }
        if let Some(mesh) = self.water.take() {
            mesh.dispose();
        }
    }

    /// Fills the chunk from a terrain generator, one column at a time, then
    /// commits equilevels and initializes lighting.
    pub fn load(&mut self, loader: &mut dyn Loader, column: &mut Column, registry: &Registry) {
        let bx = self.point.x << CHUNK_BITS;
        let bz = self.point.y << CHUNK_BITS;
        let mut first = true;
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                column.reset();
                loader.load_column(bx + x as i32, bz + z as i32, column);
                column.fill_chunk(x, z, self, first, registry);
                first = false;
            }
        }
        column.commit_equilevels(self);
        self.lighting_init(registry);
        self.dirty = true;
        debug!("loaded chunk ({}, {})", self.point.x, self.point.y);
    }

    /// The block at chunk-local `(x, y, z)`.
    pub fn get_block(&self, x: usize, y: usize, z: usize) -> BlockId {
        self.voxels.get(x, y, z)
    }

    /// Sets one voxel, maintaining the heightmap and equilevels and seeding
    /// the light flood at the changed cell.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        assert!(y < BUILD_HEIGHT);
        let index = self.voxels.index(x, y, z);
        if self.voxels.data[index] == block {
            return;
        }
        self.voxels.data[index] = block;
        self.light_dirty.insert(index);
        self.update_heightmap(x, z, y, 1, block, index);
        self.equilevels.set(y, false);
        self.dirty = true;
    }

    /// The stored light level at chunk-local `(x, y, z)`, 0 to 15.
    pub fn get_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.lights.get(x, y, z)
    }

    /// Attaches a point light source to a cell, or detaches it when
    /// `level` is 0. Levels cap below full sunlight.
    pub fn set_point_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        let index = self.voxels.index(x, y, z);
        let level = level.min(SUNLIGHT_LEVEL as u8 - 1);
        if level == 0 {
            self.point_lights.remove(&index);
        } else {
            self.point_lights.insert(index, level);
        }
        self.light_dirty.insert(index);
        self.dirty = true;
    }

    /// One past the highest non-air voxel of column `(x, z)`.
    pub fn height(&self, x: usize, z: usize) -> usize {
        self.heightmap.get(x, z) as usize
    }

    /// Whether every voxel at height y holds the same block.
    pub fn equilevel(&self, y: usize) -> bool {
        self.equilevels[y]
    }

    pub(crate) fn set_equilevel(&mut self, y: usize, value: bool) {
        self.equilevels.set(y, value);
    }

    /// Fills a vertical span of column `(x, z)` during generation. Spans
    /// decode bottom-up, so the heightmap shortcut for non-air fills holds.
    pub(crate) fn set_column(
        &mut self,
        x: usize,
        z: usize,
        start: usize,
        count: usize,
        block: BlockId,
        registry: &Registry,
    ) {
        let index = self.voxels.index(x, start, z);
        self.voxels.data[index..index + count].fill(block);
        if registry.block(block).light > 0 {
            for offset in 0..count {
                self.light_dirty.insert(index + offset);
            }
        }
        self.update_heightmap(x, z, start, count, block, index);
    }

    /// Repairs column `(x, z)`'s height after `[start, start + count)` was
    /// filled with `block`. `index` is the voxel index of `(x, start, z)`.
    fn update_heightmap(
        &mut self,
        x: usize,
        z: usize,
        start: usize,
        count: usize,
        block: BlockId,
        index: usize,
    ) {
        let end = start + count;
        let offset = self.heightmap.index(x, z);
        let height = self.heightmap.data[offset] as usize;
        if block == BlockId::AIR {
            if start < height && height <= end {
                // The old top was carved out; scan down for the new one.
                let mut fall = 0;
                while fall < start && self.voxels.data[index - fall - 1] == BlockId::AIR {
                    fall += 1;
                }
                self.heightmap.data[offset] = (start - fall) as u8;
            }
        } else if height < end {
            self.heightmap.data[offset] = end as u8;
        }
    }

    /// Seeds the light flood after generation.
    ///
    /// Every cell at or above its column height is fully sunlit and every
    /// cell below is dark, which is already the fixpoint except where
    /// columns of different heights meet. Those frontier cells, plus any
    /// non-opaque cell just under its surface and any emitters seeded
    /// during generation, form the initial dirty set.
    fn lighting_init(&mut self, registry: &Registry) {
        self.lights.data.fill(SUNLIGHT_LEVEL as u8);
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                let index = x << 8 | z << 12;
                let height = self.heightmap.data[index >> 8] as usize;
                for spread in &LIGHT_SPREAD[0..4] {
                    if (index as i32 & spread.mask) == spread.test {
                        continue;
                    }
                    let nindex = (index as i32 + spread.diff) as usize;
                    let nheight = self.heightmap.data[nindex >> 8] as usize;
                    for y in height..nheight {
                        self.light_dirty.insert(nindex + y);
                    }
                }
                if height > 0 {
                    let below = index + height - 1;
                    if !registry.block(self.voxels.data[below]).opaque {
                        self.light_dirty.insert(below);
                    }
                    self.lights.data[index..index + height].fill(0);
                }
                self.light_map.data[index >> 8] = height as u8;
            }
        }
        self.light_edges.clear();
    }

    /// Collects the light `neighbor` shines across the shared border,
    /// keyed by the receiving cell's index in this chunk. `mask` selects
    /// the border axis and `test` the neighbor's facing side.
    ///
    /// Partially-lit border cells come from the neighbor's sparse edge
    /// set; fully sunlit spans come from comparing column heights, since
    /// the edge set omits cells at full sunlight.
    pub(crate) fn receive_border_light(
        &self,
        neighbor: &Chunk<M>,
        mask: i32,
        test: i32,
        into: &mut HashMap<usize, u8>,
    ) {
        let add = |into: &mut HashMap<usize, u8>, index: usize, level: u8| {
            let entry = into.entry(index).or_insert(0);
            *entry = (*entry).max(level);
        };

        for &index in &neighbor.light_edges {
            if (index as i32 & mask) != test {
                continue;
            }
            let level = neighbor.lights.data[index];
            if level > 1 {
                add(into, index ^ mask as usize, level - 1);
            }
        }

        let stride = if mask == 0x0f00 { 0x1000 } else { 0x0100 };
        let source = test as usize;
        let target = source ^ mask as usize;
        for j in 0..CHUNK_WIDTH {
            let offset = j * stride;
            let height = neighbor.heightmap.data[(source + offset) >> 8] as usize;
            let bound = self.heightmap.data[(target + offset) >> 8] as usize;
            for y in height..bound {
                add(into, target + offset + y, SUNLIGHT_LEVEL as u8 - 1);
            }
        }
    }

    /// Replaces the light entering this chunk across its borders and
    /// seeds the flood wherever the inflow changed.
    pub(crate) fn set_incoming_light(&mut self, sources: HashMap<usize, u8>) {
        for &index in self.incoming_light.keys() {
            if !sources.contains_key(&index) {
                self.light_dirty.insert(index);
            }
        }
        for (&index, &level) in &sources {
            if self.incoming_light.get(&index) != Some(&level) {
                self.light_dirty.insert(index);
            }
        }
        self.incoming_light = sources;
    }

    /// Runs the light flood to its fixpoint.
    ///
    /// Returns whether the set of partially-lit border cells changed, in
    /// which case neighboring chunks may render stale light and should be
    /// marked dirty by the caller.
    pub(crate) fn lighting_update(&mut self, registry: &Registry) -> bool {
        if self.light_dirty.is_empty() {
            return false;
        }
        let mut edges_changed = false;
        let mut prev = std::mem::take(&mut self.light_dirty);
        let mut next = std::mem::take(&mut self.light_next);

        while !prev.is_empty() {
            for &index in prev.iter() {
                let before = self.lights.data[index] as i32;
                let after = query_light(
                    &self.voxels,
                    &self.lights,
                    &self.heightmap,
                    &self.point_lights,
                    &self.incoming_light,
                    registry,
                    index,
                ) as i32;
                if after == before {
                    continue;
                }
                self.lights.data[index] = after as u8;

                if after < SUNLIGHT_LEVEL as i32 {
                    let col = index >> 8;
                    let bound = (index & 0xff) + 1;
                    if (self.light_map.data[col] as usize) < bound {
                        self.light_map.data[col] = bound as u8;
                    }
                }

                if is_edge(index) {
                    let partial = 1 < after && after < SUNLIGHT_LEVEL as i32;
                    let changed = if partial {
                        self.light_edges.insert(index)
                    } else {
                        self.light_edges.remove(&index)
                    };
                    edges_changed |= changed;
                }

                // Only neighbors whose value could have depended on this
                // cell need a requery. The band is a heuristic over the
                // decrease-by-one rule; values outside it are unaffected.
                let hi = max_updated_neighbor_light(after, before);
                let lo = min_updated_neighbor_light(after, before);
                for spread in &LIGHT_SPREAD {
                    if (index as i32 & spread.mask) == spread.test {
                        continue;
                    }
                    let nindex = (index as i32 + spread.diff) as usize;
                    let level = self.lights.data[nindex] as i32;
                    if lo <= level && level <= hi {
                        next.insert(nindex);
                    }
                }
            }
            std::mem::swap(&mut prev, &mut next);
            next.clear();
        }

        self.light_dirty = prev;
        self.light_next = next;
        edges_changed
    }
}

impl<M: TerrainMesh> CircleElement for Chunk<M> {
    fn point(&self) -> ChunkPos {
        self.point
    }
}

/// The light level cell `index` should hold given its neighbors.
#[allow(clippy::too_many_arguments)]
fn query_light(
    voxels: &Tensor3<BlockId>,
    lights: &Tensor3<u8>,
    heightmap: &Tensor2<u8>,
    point_lights: &HashMap<usize, u8>,
    incoming_light: &HashMap<usize, u8>,
    registry: &Registry,
    index: usize,
) -> u8 {
    let data = registry.block(voxels.data[index]);
    if data.opaque {
        return data.light;
    }
    let from_point = point_lights.get(&index).copied().unwrap_or(0);
    let base = data.light.max(from_point) as i32;

    let y = index & 0xff;
    let height = heightmap.data[index >> 8] as usize;
    if y >= height {
        return SUNLIGHT_LEVEL as u8;
    }

    // Light arriving across a chunk border acts like a source at the
    // receiving cell.
    let from_border = incoming_light.get(&index).copied().unwrap_or(0) as i32;
    let mut max = base.max(from_border) + 1;
    for spread in &LIGHT_SPREAD {
        if (index as i32 & spread.mask) == spread.test {
            continue;
        }
        max = max.max(lights.data[(index as i32 + spread.diff) as usize] as i32);
    }
    (max - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{base_registry, BlockKind, FlatLoader};
    use crate::renderer::NullMesh;
    use cgmath::Point2;

    fn flat_chunk(height: usize) -> (Chunk<NullMesh>, Registry) {
        let registry = base_registry();
        let mut loader = FlatLoader::grassland(height);
        let mut column = Column::new();
        let mut chunk = Chunk::new(Point2::new(0, 0));
        chunk.load(&mut loader, &mut column, &registry);
        (chunk, registry)
    }

    /// Checks the fixpoint rule at every cell.
    fn assert_light_fixpoint(chunk: &Chunk<NullMesh>, registry: &Registry) {
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                for y in 0..super::super::WORLD_HEIGHT {
                    let index = chunk.voxels.index(x, y, z);
                    let expected = query_light(
                        &chunk.voxels,
                        &chunk.lights,
                        &chunk.heightmap,
                        &chunk.point_lights,
                        &chunk.incoming_light,
                        registry,
                        index,
                    );
                    assert_eq!(
                        chunk.lights.data[index], expected,
                        "light at ({}, {}, {})",
                        x, y, z
                    );
                }
            }
        }
    }

    #[test]
    fn load_builds_heightmap_and_equilevels() {
        let (chunk, _) = flat_chunk(5);
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                assert_eq!(chunk.height(x, z), 5);
                assert_eq!(chunk.get_block(x, 4, z), BlockKind::Grass.id());
                assert_eq!(chunk.get_block(x, 5, z), BlockKind::Air.id());
            }
        }
        for y in 0..super::super::WORLD_HEIGHT {
            assert!(chunk.equilevel(y), "height {}", y);
        }
    }

    #[test]
    fn set_block_carves_heightmap_down() {
        let (mut chunk, _registry) = flat_chunk(5);
        chunk.set_block(3, 4, 3, BlockId::AIR);
        assert_eq!(chunk.height(3, 3), 4);
        chunk.set_block(3, 3, 3, BlockId::AIR);
        assert_eq!(chunk.height(3, 3), 3);
        assert_eq!(chunk.height(4, 3), 5);
        assert!(!chunk.equilevel(4));
    }

    #[test]
    fn set_block_raises_heightmap() {
        let (mut chunk, _registry) = flat_chunk(5);
        chunk.set_block(7, 40, 7, BlockKind::Stone.id());
        assert_eq!(chunk.height(7, 7), 41);
        // Carving an air pocket below the top leaves the height alone.
        chunk.set_block(7, 40, 7, BlockId::AIR);
        assert_eq!(chunk.height(7, 7), 5);
    }

    #[test]
    fn flat_terrain_is_lit_without_work() {
        let (mut chunk, registry) = flat_chunk(5);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 5, 8), SUNLIGHT_LEVEL as u8);
        assert_eq!(chunk.get_light(8, 4, 8), 0);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn floating_platform_shades_the_cell_below() {
        let (mut chunk, registry) = flat_chunk(5);
        chunk.set_block(8, 100, 8, BlockKind::Stone.id());
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 101, 8), 15);
        assert_eq!(chunk.get_light(8, 100, 8), 0);
        assert_eq!(chunk.get_light(8, 99, 8), 14);
        assert!(chunk.light_map.get(8, 8) >= 100);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn embedded_fungus_glows_and_decays() {
        let (mut chunk, registry) = flat_chunk(64);
        chunk.set_block(8, 30, 8, BlockKind::Fungus.id());
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 30, 8), 9);
        // Every neighbor is opaque stone, so the glow stops there.
        assert_eq!(chunk.get_light(8, 31, 8), 0);
        assert_light_fixpoint(&chunk, &registry);

        chunk.set_block(8, 31, 8, BlockId::AIR);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 31, 8), 8);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn removing_a_source_darkens_its_halo() {
        let (mut chunk, registry) = flat_chunk(64);
        chunk.set_block(8, 30, 8, BlockKind::Fungus.id());
        chunk.set_block(8, 31, 8, BlockId::AIR);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 31, 8), 8);

        chunk.set_block(8, 30, 8, BlockKind::Stone.id());
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 31, 8), 0);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn point_lights_attach_and_detach() {
        let (mut chunk, registry) = flat_chunk(64);
        chunk.set_block(8, 20, 8, BlockId::AIR);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 20, 8), 0);

        chunk.set_point_light(8, 20, 8, 12);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 20, 8), 12);

        chunk.set_point_light(8, 20, 8, 0);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(8, 20, 8), 0);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn border_light_seeds_and_decays() {
        let (mut chunk, registry) = flat_chunk(64);
        chunk.set_block(0, 30, 8, BlockId::AIR);
        chunk.set_block(1, 30, 8, BlockId::AIR);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(0, 30, 8), 0);

        // Light arriving across the -x border holds the cell at its level
        // and spreads inward with decay.
        let index = chunk.voxels.index(0, 30, 8);
        let mut incoming = HashMap::new();
        incoming.insert(index, 10u8);
        chunk.set_incoming_light(incoming);
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(0, 30, 8), 10);
        assert_eq!(chunk.get_light(1, 30, 8), 9);
        assert_light_fixpoint(&chunk, &registry);

        // Withdrawing the inflow darkens both cells again.
        chunk.set_incoming_light(HashMap::new());
        chunk.lighting_update(&registry);
        assert_eq!(chunk.get_light(0, 30, 8), 0);
        assert_eq!(chunk.get_light(1, 30, 8), 0);
        assert_light_fixpoint(&chunk, &registry);
    }

    #[test]
    fn neighbors_shine_edge_and_sky_light_across_the_border() {
        let (mut glowing, registry) = flat_chunk(64);
        let (mut receiver, _) = flat_chunk(64);

        // An emitter on the glowing chunk's +x border, with an air pocket
        // so the edge set carries partial levels.
        glowing.set_block(15, 30, 8, BlockKind::Fungus.id());
        glowing.set_block(14, 30, 8, BlockId::AIR);
        glowing.lighting_update(&registry);
        receiver.set_block(0, 30, 8, BlockId::AIR);
        receiver.lighting_update(&registry);

        // The receiver sits at +x of the glowing chunk: the border axis is
        // x and the glowing side faces from x = 15.
        let mut incoming = HashMap::new();
        receiver.receive_border_light(&glowing, 0x0f00, 0x0f00, &mut incoming);
        let index = receiver.voxels.index(0, 30, 8);
        assert_eq!(incoming.get(&index), Some(&8));

        // A taller receiver column is sunlit from the side: the glowing
        // chunk's surface is at 64, so cells from 64 up to the receiver's
        // height read one below full sunlight.
        receiver.set_block(0, 80, 0, BlockKind::Stone.id());
        let mut incoming = HashMap::new();
        receiver.receive_border_light(&glowing, 0x0f00, 0x0f00, &mut incoming);
        let lit = receiver.voxels.index(0, 70, 0);
        assert_eq!(incoming.get(&lit), Some(&(SUNLIGHT_LEVEL as u8 - 1)));
    }

    #[test]
    fn border_glow_reports_edge_changes() {
        let (mut chunk, registry) = flat_chunk(64);
        chunk.lighting_update(&registry);
        chunk.set_block(0, 30, 8, BlockKind::Fungus.id());
        assert!(chunk.lighting_update(&registry));
        // A second run with nothing dirty reports no change.
        assert!(!chunk.lighting_update(&registry));
    }
}
