//! # Frontier Module
//!
//! This module provides the `Frontier`, the level-of-detail pyramid that
//! surrounds the full-detail chunk disk with progressively coarser terrain
//! tiles so the horizon never ends at a wall of fog.
//!
//! ## Structure
//!
//! The frontier keeps `FRONTIER_LEVELS` rings of `FrontierChunk`s in
//! [`Circle`]s of their own. A chunk at level `l` spans `2^(l + 1)` regular
//! chunks per side and is sampled from the terrain generator at a stride of
//! `2^(l + 1)` blocks. Level `l` re-centers at the world center shifted
//! right by `l + 1`, so every ring stays concentric.
//!
//! ## Seamless handoff
//!
//! Each frontier chunk tracks a 4-bit mask of which of its children (the
//! four chunks one level finer, or real chunk meshes at level 0) currently
//! have geometry. A tile is normally meshed only once all four children
//! are, so coarse geometry is ready before fine geometry retires; a small
//! extra budget meshes partially-covered tiles to bound pop-in stalls.
//! Quadrants whose child is visible are hidden per-slice rather than
//! remeshed.
//!
//! ## Multimeshes
//!
//! Tiles are grouped 4 x 4 into a [`LodMultiMesh`]: one solid and one
//! translucent mesh holding up to 64 tagged slices (16 tiles x 4
//! quadrants) whose visibility toggles in O(1). Slice data stays resident
//! while any slot in the group is live, so a tile that re-enters the ring
//! shows its old geometry without remeshing.

use std::collections::HashMap;

use bitvec::prelude::*;
use cgmath::Point2;
use log::debug;

use super::circle::{Circle, CircleElement, ChunkPos};
use super::column::Column;
use super::registry::Registry;
use super::{CHUNK_WIDTH, NUM_LOD_CHUNKS_TO_MESH_PER_FRAME};
use crate::loader::Loader;
use crate::meshing::{FrontierCell, TerrainMesher};
use crate::renderer::{Quad, Renderer, TerrainMesh};

/// The number of LOD rings. The outermost covers terrain 64 chunks across
/// per tile.
pub const FRONTIER_LEVELS: usize = 6;

/// Cells per tile side. Every level uses the same grid; only the cell
/// scale changes.
pub const FRONTIER_SIZE: usize = 16;

/// Tiles per multimesh side.
const GROUP_SIZE: usize = 4;

/// Slices per multimesh: one per tile quadrant.
const NUM_SLICES: usize = GROUP_SIZE * GROUP_SIZE * 4;

/// One tile of the LOD pyramid.
pub struct FrontierChunk {
    point: ChunkPos,
    level: usize,
    /// Which children currently have geometry, bit `k` for child
    /// `(2p.x + (k & 1), 2p.z + (k >> 1))`.
    mask: u8,
}

impl FrontierChunk {
    /// The children-with-geometry mask.
    pub fn mask(&self) -> u8 {
        self.mask
    }
}

impl CircleElement for FrontierChunk {
    fn point(&self) -> ChunkPos {
        self.point
    }
}

/// The multimesh slot of a frontier chunk within its 4 x 4 group.
fn slot_of(point: ChunkPos) -> usize {
    ((point.x & 3) | ((point.y & 3) << 2)) as usize
}

/// The map key of the group a frontier chunk belongs to.
fn group_key(point: ChunkPos, level: usize) -> (i32, i32, usize) {
    (point.x >> 2, point.y >> 2, level)
}

/// A 4 x 4 group of LOD tiles sharing one solid and one translucent mesh.
///
/// Geometry for all slots accumulates into shared quad buffers; each quad
/// is tagged with its slice id, and visibility is toggled per slice. The
/// buffers are freed only when no slot in the group is live, so re-entering
/// tiles reuse their old geometry.
pub struct LodMultiMesh<M: TerrainMesh> {
    origin: (i32, i32),
    solid: Option<M>,
    water: Option<M>,
    solid_quads: Vec<Quad>,
    water_quads: Vec<Quad>,
    meshed: [bool; GROUP_SIZE * GROUP_SIZE],
    enabled: u16,
    visible: BitArr!(for NUM_SLICES, in u32),
}

impl<M: TerrainMesh> LodMultiMesh<M> {
    fn new(origin: (i32, i32)) -> Self {
        LodMultiMesh {
            origin,
            solid: None,
            water: None,
            solid_quads: Vec::new(),
            water_quads: Vec::new(),
            meshed: [false; GROUP_SIZE * GROUP_SIZE],
            enabled: 0,
            visible: BitArray::ZERO,
        }
    }

    /// Whether `slot` has geometry resident in the shared buffers.
    pub fn is_meshed(&self, slot: usize) -> bool {
        self.meshed[slot]
    }

    /// Appends a freshly meshed slot and re-uploads the shared buffers.
    fn append_slot<R: Renderer<Mesh = M>>(
        &mut self,
        renderer: &mut R,
        slot: usize,
        solid: &[Quad],
        water: &[Quad],
    ) {
        assert!(!self.meshed[slot]);
        self.meshed[slot] = true;
        self.solid_quads.extend_from_slice(solid);
        self.water_quads.extend_from_slice(water);
        self.upload(renderer);
    }

    fn upload<R: Renderer<Mesh = M>>(&mut self, renderer: &mut R) {
        for (mesh, quads, translucent) in [
            (&mut self.solid, &self.solid_quads, false),
            (&mut self.water, &self.water_quads, true),
        ] {
            if quads.is_empty() {
                continue;
            }
            match mesh {
                Some(mesh) => mesh.set_geometry(quads),
                None => {
                    let mut created = renderer.add_terrain_mesh(quads, translucent);
                    created.set_position(self.origin.0, 0, self.origin.1);
                    for id in 0..NUM_SLICES {
                        created.show(id as u8, self.visible[id]);
                    }
                    *mesh = Some(created);
                }
            }
        }
    }

    /// Shows the quadrant slices of `slot` named by `bits` and hides the
    /// rest, marking the slot live.
    fn show_slot(&mut self, slot: usize, bits: u8) {
        self.enabled |= 1 << slot;
        for k in 0..4 {
            let id = 4 * slot + k;
            let shown = bits >> k & 1 != 0;
            if self.visible[id] == shown {
                continue;
            }
            self.visible.set(id, shown);
            if let Some(mesh) = self.solid.as_mut() {
                mesh.show(id as u8, shown);
            }
            if let Some(mesh) = self.water.as_mut() {
                mesh.show(id as u8, shown);
            }
        }
    }

    /// Hides `slot` and marks it dead. Returns true when the whole group
    /// went dead and its meshes were freed.
    fn disable_slot(&mut self, slot: usize) -> bool {
        self.show_slot(slot, 0);
        self.enabled &= !(1 << slot);
        if self.enabled != 0 {
            return false;
        }
        if let Some(mesh) = self.solid.take() {
            mesh.dispose();
        }
        if let Some(mesh) = self.water.take() {
            mesh.dispose();
        }
        self.solid_quads.clear();
        self.water_quads.clear();
        self.meshed = [false; GROUP_SIZE * GROUP_SIZE];
        self.visible = BitArray::ZERO;
        true
    }
}

/// The LOD pyramid around the chunk disk.
pub struct Frontier<M: TerrainMesh> {
    levels: Vec<Circle<FrontierChunk>>,
    meshes: HashMap<(i32, i32, usize), LodMultiMesh<M>>,
    tile: Vec<FrontierCell>,
    column: Column,
}

impl<M: TerrainMesh> Frontier<M> {
    /// Creates an empty pyramid whose rings hold `radius` tiles.
    pub fn new(radius: f64) -> Self {
        Frontier {
            levels: (0..FRONTIER_LEVELS).map(|_| Circle::new(radius)).collect(),
            meshes: HashMap::new(),
            tile: vec![FrontierCell::default(); FRONTIER_SIZE * FRONTIER_SIZE],
            column: Column::new(),
        }
    }

    /// The number of live multimesh groups, across all levels.
    pub fn num_groups(&self) -> usize {
        self.meshes.len()
    }

    /// A multimesh by group key, for inspection.
    pub fn group(&self, key: (i32, i32, usize)) -> Option<&LodMultiMesh<M>> {
        self.meshes.get(&key)
    }

    /// Re-centers every ring on the new chunk-coordinate center, retiring
    /// tiles that fell off the far side.
    pub fn recenter(&mut self, center: ChunkPos) {
        for (level, circle) in self.levels.iter_mut().enumerate() {
            let scaled = Point2::new(center.x >> (level + 1), center.y >> (level + 1));
            for retired in circle.recenter(scaled) {
                let key = group_key(retired.point, retired.level);
                if let Some(group) = self.meshes.get_mut(&key) {
                    if group.disable_slot(slot_of(retired.point)) {
                        self.meshes.remove(&key);
                        debug!("freed LOD group {:?}", key);
                    }
                }
            }
        }
    }

    /// Meshes up to a small budget of tiles and reconciles quadrant
    /// visibility against child geometry everywhere.
    ///
    /// `chunk_has_mesh` reports whether the level-0 child at a chunk
    /// position currently renders, which is what a quadrant's visibility
    /// must complement.
    pub fn remesh<R: Renderer<Mesh = M>>(
        &mut self,
        registry: &Registry,
        loader: &mut dyn Loader,
        mesher: &mut TerrainMesher,
        renderer: &mut R,
        chunk_has_mesh: impl Fn(ChunkPos) -> bool,
    ) {
        let mut budget = NUM_LOD_CHUNKS_TO_MESH_PER_FRAME;
        let mut extra = 1;

        for level in 0..FRONTIER_LEVELS {
            let mut points = Vec::new();
            self.levels[level].each(|point| {
                points.push(point);
                false
            });
            let masks: Vec<u8> = points
                .iter()
                .map(|&point| self.child_mask(level, point, &chunk_has_mesh))
                .collect();

            let Frontier { levels, meshes, tile, column } = self;
            let circle = &mut levels[level];

            for (&point, &mask) in points.iter().zip(&masks) {
                if circle.get(point).is_none() {
                    circle.set(FrontierChunk { point, level, mask });
                } else if let Some(chunk) = circle.get_mut(point) {
                    chunk.mask = mask;
                }

                let slot = slot_of(point);
                let key = group_key(point, level);
                let meshed = meshes.get(&key).map_or(false, |g| g.is_meshed(slot));

                if !meshed && budget > 0 && (mask == 0b1111 || extra > 0) {
                    if mask != 0b1111 {
                        extra -= 1;
                    }
                    budget -= 1;

                    let span = (CHUNK_WIDTH as i32) << (level + 1);
                    let scale = 1 << (level + 1);
                    sample_tile(loader, column, registry, point, scale, tile);
                    let rel = ((point.x & 3) * span, (point.y & 3) * span);
                    mesher.mesh_frontier(registry, tile, FRONTIER_SIZE, rel, scale, slot);

                    let group = meshes.entry(key).or_insert_with(|| {
                        let origin = (
                            (point.x >> 2) * (span << 2),
                            (point.y >> 2) * (span << 2),
                        );
                        LodMultiMesh::new(origin)
                    });
                    group.append_slot(
                        renderer,
                        slot,
                        mesher.solid_geometry(),
                        mesher.water_geometry(),
                    );
                }

                if let Some(group) = meshes.get_mut(&key) {
                    if group.is_meshed(slot) {
                        group.show_slot(slot, !mask & 0xf);
                    }
                }
            }
        }
    }

    /// Which children of a tile currently have geometry of their own.
    fn child_mask(
        &self,
        level: usize,
        point: ChunkPos,
        chunk_has_mesh: &impl Fn(ChunkPos) -> bool,
    ) -> u8 {
        let mut mask = 0;
        for k in 0..4i32 {
            let child = Point2::new(2 * point.x + (k & 1), 2 * point.y + (k >> 1));
            let covered = if level == 0 {
                chunk_has_mesh(child)
            } else {
                let key = group_key(child, level - 1);
                self.levels[level - 1].get(child).is_some()
                    && self
                        .meshes
                        .get(&key)
                        .map_or(false, |g| g.is_meshed(slot_of(child)))
            };
            if covered {
                mask |= 1 << k;
            }
        }
        mask
    }
}

/// Samples one LOD tile from the terrain generator at the level's stride.
fn sample_tile(
    loader: &mut dyn Loader,
    column: &mut Column,
    registry: &Registry,
    point: ChunkPos,
    scale: i32,
    tile: &mut [FrontierCell],
) {
    let span = scale * FRONTIER_SIZE as i32;
    let bx = point.x * span;
    let bz = point.y * span;
    for cz in 0..FRONTIER_SIZE {
        for cx in 0..FRONTIER_SIZE {
            column.reset();
            loader.load_column(bx + (cx as i32) * scale, bz + (cz as i32) * scale, column);
            let (solid, water) = column.surface(registry);
            tile[cx + FRONTIER_SIZE * cz] = FrontierCell { solid, water };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{base_registry, FlatLoader};
    use crate::renderer::NullRenderer;

    fn drive(
        frontier: &mut Frontier<crate::renderer::NullMesh>,
        registry: &Registry,
        loader: &mut dyn Loader,
        mesher: &mut TerrainMesher,
        renderer: &mut NullRenderer,
        frames: usize,
    ) {
        for _ in 0..frames {
            frontier.remesh(registry, loader, mesher, renderer, |_| false);
        }
    }

    #[test]
    fn rings_fill_under_budget() {
        let registry = base_registry();
        let mut loader = FlatLoader::grassland(5);
        let mut mesher = TerrainMesher::new();
        let mut renderer = NullRenderer::new();
        let stats = renderer.stats();
        let mut frontier = Frontier::new(1.5);
        frontier.recenter(Point2::new(0, 0));

        drive(&mut frontier, &registry, &mut loader, &mut mesher, &mut renderer, 64);

        assert!(frontier.num_groups() > 0);
        assert!(stats.live() > 0);
        assert!(stats.quads_uploaded() > 0);
    }

    #[test]
    fn tiles_without_children_are_fully_visible() {
        let registry = base_registry();
        let mut loader = FlatLoader::grassland(5);
        let mut mesher = TerrainMesher::new();
        let mut renderer = NullRenderer::new();
        let mut frontier = Frontier::new(1.5);
        frontier.recenter(Point2::new(0, 0));

        drive(&mut frontier, &registry, &mut loader, &mut mesher, &mut renderer, 64);

        // No chunk meshes and no finished finer rings near the center, so
        // the meshed tile at the origin of some level shows all quadrants.
        let group = frontier.group((0, 0, FRONTIER_LEVELS - 1)).unwrap();
        assert!(group.is_meshed(slot_of(Point2::new(0, 0))));
    }

    #[test]
    fn recentering_far_away_frees_groups() {
        let registry = base_registry();
        let mut loader = FlatLoader::grassland(5);
        let mut mesher = TerrainMesher::new();
        let mut renderer = NullRenderer::new();
        let stats = renderer.stats();
        let mut frontier = Frontier::new(1.5);
        frontier.recenter(Point2::new(0, 0));

        drive(&mut frontier, &registry, &mut loader, &mut mesher, &mut renderer, 64);
        assert!(stats.live() > 0);

        // Far enough that every ring evicts everything it held.
        frontier.recenter(Point2::new(1 << 16, 1 << 16));
        assert_eq!(stats.live(), 0);
        assert_eq!(frontier.num_groups(), 0);
    }

    #[test]
    fn covered_quadrants_hide_their_slices() {
        let registry = base_registry();
        let mut loader = FlatLoader::grassland(5);
        let mut mesher = TerrainMesher::new();
        let mut renderer = NullRenderer::new();
        let mut frontier = Frontier::new(1.5);
        frontier.recenter(Point2::new(0, 0));

        // Pretend every chunk renders: level-0 tiles keep all quadrants
        // hidden once meshed.
        for _ in 0..64 {
            frontier.remesh(&registry, &mut loader, &mut mesher, &mut renderer, |_| true);
        }

        let origin = Point2::new(0, 0);
        let group = frontier.group(group_key(origin, 0)).unwrap();
        assert!(group.is_meshed(slot_of(origin)));
        if let Some(mesh) = group.solid.as_ref() {
            for k in 0..4u8 {
                assert!(!mesh.is_shown((4 * slot_of(origin) as u8) + k));
            }
        }
    }
}
