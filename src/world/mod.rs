//! # World Module
//!
//! This module ties the engine together: a [`Circle`] of loaded chunks, the
//! LOD [`Frontier`] beyond them, the block [`Registry`], and one shared
//! [`TerrainMesher`]. The `World` owns the per-frame budgets: `recenter`
//! loads a bounded number of chunks per call and `remesh` rebuilds a
//! bounded number of meshes, so a moving camera costs a predictable slice
//! of each frame.

pub mod chunk;
pub mod circle;
pub mod column;
pub mod frontier;
pub mod registry;
pub mod tensor;

use std::collections::HashMap;

use cgmath::{Point2, Vector2};
use log::debug;

use crate::loader::Loader;
use crate::meshing::{MesherOffset, TerrainMesher, MESHER_OFFSETS};
use crate::renderer::{Quad, Renderer, TerrainMesh};
use chunk::Chunk;
use circle::{Circle, ChunkPos};
use column::Column;
use frontier::Frontier;
use registry::{BlockId, Registry};
use tensor::{Tensor2, Tensor3};

/// Chunk width as a power of two.
pub const CHUNK_BITS: usize = 4;
/// Chunk width in voxels.
pub const CHUNK_WIDTH: usize = 1 << CHUNK_BITS;
/// Mask extracting a chunk-local coordinate.
pub const CHUNK_MASK: i32 = CHUNK_WIDTH as i32 - 1;
/// World height in voxels.
pub const WORLD_HEIGHT: usize = 256;
/// The topmost buildable height. The top voxel layer stays air so the
/// mesher's padded buffers always have open sky above them.
pub const BUILD_HEIGHT: usize = WORLD_HEIGHT - 1;
/// Full sunlight. Light values range from 0 to this, inclusive.
pub const SUNLIGHT_LEVEL: usize = 15;
/// The number of planar neighbors of a chunk.
pub const NUM_NEIGHBORS: usize = 8;

/// Chunks loaded per `recenter` call.
pub const NUM_CHUNKS_TO_LOAD_PER_FRAME: usize = 1;
/// Chunks meshed per `remesh` call, once the innermost ring is clean.
pub const NUM_CHUNKS_TO_MESH_PER_FRAME: usize = 1;
/// LOD tiles meshed per `remesh` call.
pub const NUM_LOD_CHUNKS_TO_MESH_PER_FRAME: usize = 1;

/// The innermost chunks always mesh, regardless of the per-frame budget.
const MESH_LOOKAHEAD: usize = 9;

/// The chunk-coordinate deltas of the 8 planar neighbors.
pub const NEIGHBORS: [(i32, i32); NUM_NEIGHBORS] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Per planar border: the neighbor's chunk delta, the voxel-index mask of
/// the border axis, and the masked value of the neighbor's facing side.
const LIGHT_BORDERS: [((i32, i32), i32, i32); 4] = [
    ((-1, 0), 0x0f00, 0x0f00),
    ((1, 0), 0x0f00, 0x0000),
    ((0, -1), 0xf000, 0xf000),
    ((0, 1), 0xf000, 0x0000),
];

/// The whole voxel world: chunks, LOD frontier, registry, and budgets.
pub struct World<R: Renderer> {
    chunks: Circle<Chunk<R::Mesh>>,
    frontier: Frontier<R::Mesh>,
    registry: Registry,
    mesher: TerrainMesher,
    loader: Box<dyn Loader>,
    column: Column,
    renderer: R,
}

impl<R: Renderer> World<R> {
    /// Creates a world that keeps chunks loaded within `radius` chunks of
    /// the center and LOD rings of the same radius beyond them.
    pub fn new(renderer: R, loader: Box<dyn Loader>, registry: Registry, radius: f64) -> Self {
        World {
            chunks: Circle::new(radius + 0.5),
            frontier: Frontier::new(radius + 0.5),
            registry,
            mesher: TerrainMesher::new(),
            loader,
            column: Column::new(),
            renderer,
        }
    }

    /// The block registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The renderer the world draws through.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The loaded chunk at a chunk coordinate, if any.
    pub fn chunk(&self, point: ChunkPos) -> Option<&Chunk<R::Mesh>> {
        self.chunks.get(point)
    }

    /// The LOD frontier, for inspection.
    pub fn frontier(&self) -> &Frontier<R::Mesh> {
        &self.frontier
    }

    /// The block at a world position. Below the world is unloaded-opaque,
    /// at or above the build height is air, and unloaded chunks read as
    /// the opaque placeholder so callers never see through them.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        if y < 0 {
            return BlockId::UNKNOWN;
        }
        if y >= BUILD_HEIGHT as i32 {
            return BlockId::AIR;
        }
        let (xm, zm) = (x & CHUNK_MASK, z & CHUNK_MASK);
        match self.chunks.get(chunk_pos(x, z)) {
            Some(chunk) => chunk.get_block(xm as usize, y as usize, zm as usize),
            None => BlockId::UNKNOWN,
        }
    }

    /// The light level at a world position, 0 to [`SUNLIGHT_LEVEL`].
    pub fn get_light_level(&self, x: i32, y: i32, z: i32) -> u8 {
        if y < 0 {
            return 0;
        }
        if y >= WORLD_HEIGHT as i32 {
            return SUNLIGHT_LEVEL as u8;
        }
        let (xm, zm) = (x & CHUNK_MASK, z & CHUNK_MASK);
        match self.chunks.get(chunk_pos(x, z)) {
            Some(chunk) => chunk.get_light(xm as usize, y as usize, zm as usize),
            None => SUNLIGHT_LEVEL as u8,
        }
    }

    /// Sets the block at a world position. Out-of-range heights and
    /// unloaded chunks are ignored.
    ///
    /// An edit on a chunk border also dirties the neighbors that copy the
    /// edited voxel into their meshing halo.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockId) {
        if !(0..BUILD_HEIGHT as i32).contains(&y) {
            return;
        }
        let point = chunk_pos(x, z);
        let (xm, zm) = (x & CHUNK_MASK, z & CHUNK_MASK);
        if let Some(chunk) = self.chunks.get_mut(point) {
            chunk.set_block(xm as usize, y as usize, zm as usize, block);
        } else {
            return;
        }

        let mut dirty_neighbor = |dx: i32, dz: i32| {
            if let Some(neighbor) = self.chunks.get_mut(point + Vector2::new(dx, dz)) {
                neighbor.dirty = true;
            }
        };
        if xm == 0 {
            dirty_neighbor(-1, 0);
        }
        if xm == CHUNK_MASK {
            dirty_neighbor(1, 0);
        }
        if zm == 0 {
            dirty_neighbor(0, -1);
        }
        if zm == CHUNK_MASK {
            dirty_neighbor(0, 1);
        }
        if xm == 0 && zm == 0 {
            dirty_neighbor(-1, -1);
        }
        if xm == 0 && zm == CHUNK_MASK {
            dirty_neighbor(-1, 1);
        }
        if xm == CHUNK_MASK && zm == 0 {
            dirty_neighbor(1, -1);
        }
        if xm == CHUNK_MASK && zm == CHUNK_MASK {
            dirty_neighbor(1, 1);
        }
    }

    /// Attaches a point light at a world position, or detaches it when
    /// `level` is 0.
    pub fn set_point_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if !(0..WORLD_HEIGHT as i32).contains(&y) {
            return;
        }
        let (xm, zm) = (x & CHUNK_MASK, z & CHUNK_MASK);
        if let Some(chunk) = self.chunks.get_mut(chunk_pos(x, z)) {
            chunk.set_point_light(xm as usize, y as usize, zm as usize, level);
        }
    }

    /// Moves the center of the world to the block position `(x, z)`.
    ///
    /// Chunks that fall outside the disk are disposed and their neighbors
    /// notified; then up to [`NUM_CHUNKS_TO_LOAD_PER_FRAME`] vacant points
    /// are loaded, closest to the center first.
    pub fn recenter(&mut self, x: i32, z: i32) {
        let center = Point2::new(x >> CHUNK_BITS, z >> CHUNK_BITS);
        self.frontier.recenter(center);

        for chunk in self.chunks.recenter(center) {
            let point = chunk.point();
            chunk.dispose();
            for &(dx, dz) in &NEIGHBORS {
                if let Some(neighbor) = self.chunks.get_mut(point + Vector2::new(dx, dz)) {
                    neighbor.neighbor_disposed();
                }
            }
            debug!("disposed chunk ({}, {})", point.x, point.y);
        }

        let mut to_load = Vec::new();
        self.chunks.each(|point| {
            if self.chunks.get(point).is_none() {
                to_load.push(point);
            }
            to_load.len() >= NUM_CHUNKS_TO_LOAD_PER_FRAME
        });

        for point in to_load {
            let mut loaded = 0;
            for &(dx, dz) in &NEIGHBORS {
                if let Some(neighbor) = self.chunks.get_mut(point + Vector2::new(dx, dz)) {
                    neighbor.neighbor_loaded();
                    loaded += 1;
                }
            }
            let mut chunk = Chunk::new(point);
            chunk.load(self.loader.as_mut(), &mut self.column, &self.registry);
            for _ in 0..loaded {
                chunk.neighbor_loaded();
            }
            self.chunks.set(chunk);
        }
    }

    /// Rebuilds dirty meshes under the per-frame budget, then advances the
    /// LOD frontier.
    ///
    /// The [`MESH_LOOKAHEAD`] chunks nearest the center are exempt from the
    /// budget, so edits next to the camera never wait behind distant loads.
    pub fn remesh(&mut self) {
        let mut total = 0;
        let mut meshed = 0;
        let mut targets = Vec::new();
        self.chunks.each(|point| {
            total += 1;
            if total > MESH_LOOKAHEAD && meshed >= NUM_CHUNKS_TO_MESH_PER_FRAME {
                return true;
            }
            if let Some(chunk) = self.chunks.get(point) {
                if chunk.needs_remesh() {
                    targets.push(point);
                    meshed += 1;
                }
            }
            false
        });
        for point in targets {
            self.remesh_chunk(point);
        }

        let World { frontier, chunks, registry, loader, mesher, renderer, .. } = self;
        frontier.remesh(registry, loader.as_mut(), mesher, renderer, |point| {
            chunks.get(point).map_or(false, |chunk| chunk.has_mesh())
        });
    }

    /// The light the planar neighbors shine across `point`'s borders.
    fn gather_border_light(&self, point: ChunkPos) -> HashMap<usize, u8> {
        let mut incoming = HashMap::new();
        if let Some(center) = self.chunks.get(point) {
            for &(delta, mask, test) in &LIGHT_BORDERS {
                let neighbor = self.chunks.get(point + Vector2::new(delta.0, delta.1));
                if let Some(neighbor) = neighbor {
                    center.receive_border_light(neighbor, mask, test, &mut incoming);
                }
            }
        }
        incoming
    }

    /// Rebuilds one chunk's meshes from scratch.
    fn remesh_chunk(&mut self, point: ChunkPos) {
        // Settle lighting first so the mesher tags sky-lit faces from a
        // current light map. Border inflow is pulled from the neighbors'
        // edge sets; if this chunk's own partially-lit border cells
        // changed, the neighbors remesh and pull in turn.
        let incoming = self.gather_border_light(point);
        let edges_changed = match self.chunks.get_mut(point) {
            Some(chunk) => {
                assert!(chunk.needs_remesh());
                chunk.set_incoming_light(incoming);
                chunk.lighting_update(&self.registry)
            }
            None => return,
        };
        if edges_changed {
            for &(dx, dz) in &NEIGHBORS {
                if let Some(neighbor) = self.chunks.get_mut(point + Vector2::new(dx, dz)) {
                    neighbor.dirty = true;
                }
            }
        }

        let World { chunks, mesher, registry, renderer, .. } = self;
        let center = match chunks.get(point) {
            Some(chunk) => chunk,
            None => return,
        };

        for y in 0..WORLD_HEIGHT {
            mesher.equilevels[y + 1] = center.equilevels[y] as u8;
        }
        for offset in &MESHER_OFFSETS {
            let delta = Vector2::new(offset.delta.0, offset.delta.1);
            let neighbor = chunks.get(point + delta);
            match neighbor {
                Some(chunk) => {
                    copy_heightmap(&mut mesher.heightmap, &chunk.heightmap, offset);
                    copy_heightmap(&mut mesher.light_map, &chunk.light_map, offset);
                    copy_voxels(&mut mesher.voxels, &chunk.voxels, offset);
                }
                None => {
                    zero_heightmap(&mut mesher.heightmap, offset);
                    zero_heightmap(&mut mesher.light_map, offset);
                    zero_voxels(&mut mesher.voxels, offset);
                }
            }
            if offset.delta != (0, 0) {
                merge_equilevels(&mut mesher.equilevels, center, neighbor, offset);
            }
        }

        #[cfg(debug_assertions)]
        mesher.check_equilevels();

        mesher.mesh_chunk(registry);

        if let Some(chunk) = chunks.get_mut(point) {
            update_mesh(renderer, &mut chunk.solid, &mesher.solid_geo, false, point);
            update_mesh(renderer, &mut chunk.water, &mesher.water_geo, true, point);
            chunk.dirty = false;
        }
    }
}

/// The chunk coordinate containing a block position.
fn chunk_pos(x: i32, z: i32) -> ChunkPos {
    Point2::new(x >> CHUNK_BITS, z >> CHUNK_BITS)
}

/// Replaces, creates, or disposes one of a chunk's meshes to match the
/// freshly built geometry.
fn update_mesh<R: Renderer>(
    renderer: &mut R,
    slot: &mut Option<R::Mesh>,
    quads: &[Quad],
    translucent: bool,
    point: ChunkPos,
) {
    if quads.is_empty() {
        if let Some(mesh) = slot.take() {
            mesh.dispose();
        }
        return;
    }
    match slot {
        Some(mesh) => mesh.set_geometry(quads),
        None => {
            let mut mesh = renderer.add_terrain_mesh(quads, translucent);
            mesh.show(0, true);
            *slot = Some(mesh);
        }
    }
    if let Some(mesh) = slot.as_mut() {
        mesh.set_position(
            point.x << CHUNK_BITS,
            0,
            point.y << CHUNK_BITS,
        );
    }
}

/// Copies one region of a chunk-sized 2-D map into the mesher's padded map.
fn copy_heightmap(dst: &mut Tensor2<u8>, src: &Tensor2<u8>, offset: &MesherOffset) {
    for x in 0..offset.size.0 {
        for z in 0..offset.size.1 {
            let value = src.get(offset.src.0 + x, offset.src.1 + z);
            dst.set(offset.dst.0 + x, offset.dst.1 + z, value);
        }
    }
}

/// Copies whole voxel columns into the mesher's padded tensor at y = 1.
fn copy_voxels(dst: &mut Tensor3<BlockId>, src: &Tensor3<BlockId>, offset: &MesherOffset) {
    for x in 0..offset.size.0 {
        for z in 0..offset.size.1 {
            let s = src.index(offset.src.0 + x, 0, offset.src.1 + z);
            let d = dst.index(offset.dst.0 + x, 1, offset.dst.1 + z);
            dst.data[d..d + WORLD_HEIGHT].copy_from_slice(&src.data[s..s + WORLD_HEIGHT]);
        }
    }
}

/// Zeroes a region of the padded 2-D maps where no neighbor is loaded. A
/// zero height reads as open sky, which errs toward lit faces.
fn zero_heightmap(dst: &mut Tensor2<u8>, offset: &MesherOffset) {
    for x in 0..offset.size.0 {
        for z in 0..offset.size.1 {
            dst.set(offset.dst.0 + x, offset.dst.1 + z, 0);
        }
    }
}

/// Fills unloaded halo columns with air.
fn zero_voxels(dst: &mut Tensor3<BlockId>, offset: &MesherOffset) {
    for x in 0..offset.size.0 {
        for z in 0..offset.size.1 {
            let d = dst.index(offset.dst.0 + x, 1, offset.dst.1 + z);
            dst.data[d..d + WORLD_HEIGHT].fill(BlockId::AIR);
        }
    }
}

/// Narrows the padded equilevel array by a neighbor's border voxels.
///
/// A height stays uniform only if the neighbor's border row matches the
/// center's uniform block there. A neighbor that is itself uniform at the
/// height with the same block passes without scanning. Missing neighbors
/// contribute air, so any non-air uniform height is broken.
fn merge_equilevels<M: TerrainMesh>(
    dst: &mut [u8],
    center: &Chunk<M>,
    neighbor: Option<&Chunk<M>>,
    offset: &MesherOffset,
) {
    let neighbor = match neighbor {
        Some(chunk) => chunk,
        None => {
            for i in 0..WORLD_HEIGHT {
                if dst[i + 1] != 0 && center.voxels.data[i] != BlockId::AIR {
                    dst[i + 1] = 0;
                }
            }
            return;
        }
    };

    debug_assert!(offset.size.0 == 1 || offset.size.1 == 1);
    let along_z = offset.size.0 == 1;
    let stride = neighbor.voxels.stride[if along_z { 2 } else { 0 }];
    let index = neighbor.voxels.index(offset.src.0, 0, offset.src.1);
    let count = if along_z { offset.size.1 } else { offset.size.0 };

    for i in 0..WORLD_HEIGHT {
        if dst[i + 1] == 0 {
            continue;
        }
        let base = center.voxels.data[i];
        if neighbor.equilevels[i] && neighbor.voxels.data[i] == base {
            continue;
        }
        for c in 0..count {
            if neighbor.voxels.data[index + c * stride + i] != base {
                dst[i + 1] = 0;
                break;
            }
        }
    }
}
