//! # Meshing Module
//!
//! This module provides `TerrainMesher`, which turns voxel data into packed
//! quad buffers with greedy meshing.
//!
//! ## Scratch buffers
//!
//! The mesher owns padded copies of the chunk being meshed: an 18 x 258 x 18
//! voxel tensor, 18 x 18 height and light maps, and a 258-entry equilevel
//! array. The interior 16 x 256 x 16 region is the chunk itself; the one-cell
//! halo comes from the 8 planar neighbors, with a synthetic opaque floor at
//! y = 0 and open air at y = 257. Ambient occlusion and face visibility can
//! then sample across chunk borders without bounds checks.
//!
//! ## Greedy meshing
//!
//! For each sweep axis, each slice gets a mask of [`FaceMask`] records, one
//! per cell boundary. Runs of equal masks merge into rectangles, first along
//! one in-plane axis and then the other. Merging on exact mask equality
//! keeps material, direction, lighting, and AO seams on quad borders.
//!
//! The y axis is privileged: chunk columns are contiguous in memory and the
//! equilevel array lets whole uniform slices be skipped, so the x sweep
//! swaps its in-plane axes to keep the inner loop walking columns.

pub mod mask;

use log::trace;

use crate::renderer::Quad;
use crate::world::column::SurfaceField;
use crate::world::registry::{BlockId, MaterialData, MaterialId, Registry};
use crate::world::tensor::{Tensor2, Tensor3};
use crate::world::{CHUNK_WIDTH, WORLD_HEIGHT};
use mask::FaceMask;

/// One entry of the nine-way copy that fills the mesher's padded buffers:
/// the neighbor's chunk-coordinate delta, the destination corner in the
/// padded buffer, the source corner in the neighbor, and the copy extent.
/// All coordinates are `(x, z)`.
pub struct MesherOffset {
    /// Neighbor delta in chunk coordinates.
    pub delta: (i32, i32),
    /// Destination corner in the padded buffer.
    pub dst: (usize, usize),
    /// Source corner in the neighbor chunk.
    pub src: (usize, usize),
    /// Copy extent.
    pub size: (usize, usize),
}

const W: usize = CHUNK_WIDTH;
const L: usize = CHUNK_WIDTH - 1;
const N: usize = CHUNK_WIDTH + 1;

/// The center chunk and its 8 planar neighbors, center first.
pub const MESHER_OFFSETS: [MesherOffset; 9] = [
    MesherOffset { delta: (0, 0), dst: (1, 1), src: (0, 0), size: (W, W) },
    MesherOffset { delta: (-1, 0), dst: (0, 1), src: (L, 0), size: (1, W) },
    MesherOffset { delta: (1, 0), dst: (N, 1), src: (0, 0), size: (1, W) },
    MesherOffset { delta: (0, -1), dst: (1, 0), src: (0, L), size: (W, 1) },
    MesherOffset { delta: (0, 1), dst: (1, N), src: (0, 0), size: (W, 1) },
    MesherOffset { delta: (-1, -1), dst: (0, 0), src: (L, L), size: (1, 1) },
    MesherOffset { delta: (-1, 1), dst: (0, N), src: (L, 0), size: (1, 1) },
    MesherOffset { delta: (1, -1), dst: (N, 0), src: (0, L), size: (1, 1) },
    MesherOffset { delta: (1, 1), dst: (N, N), src: (0, 0), size: (1, 1) },
];

/// One cell of an LOD tile: the sampled solid and water surfaces.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrontierCell {
    /// The topmost non-liquid surface.
    pub solid: SurfaceField,
    /// The topmost liquid surface, if any.
    pub water: SurfaceField,
}

/// Per-axis wave bits applied to liquid quads.
const WAVE_VALUES: [u8; 3] = [0b0110, 0b1111, 0b1100];

const fn pack_indices(indices: [u32; 6]) -> u32 {
    let mut result = 0;
    let mut i = 0;
    while i < 6 {
        result |= indices[i] << (i * 2);
        i += 1;
    }
    result
}

/// The four triangulations of a quad: two diagonals times two windings.
const INDEX_OFFSETS: [u32; 4] = [
    pack_indices([0, 1, 2, 0, 2, 3]),
    pack_indices([1, 2, 3, 0, 1, 3]),
    pack_indices([0, 2, 1, 0, 3, 2]),
    pack_indices([3, 1, 0, 3, 2, 1]),
];

/// Picks the diagonal that splits a quad so that AO interpolates smoothly:
/// the one connecting the corners with the larger occlusion sum.
fn get_triangle_hint(ao: u8) -> bool {
    let a00 = ao & 3;
    let a10 = (ao >> 2) & 3;
    let a11 = (ao >> 4) & 3;
    let a01 = (ao >> 6) & 3;
    if a00 == a11 {
        return if a10 == a01 { a10 == 3 } else { true };
    }
    if a10 == a01 {
        false
    } else {
        a00 + a11 > a10 + a01
    }
}

/// Appends a packed quad.
#[allow(clippy::too_many_arguments)]
fn add_quad(
    quads: &mut Vec<Quad>,
    material: &MaterialData,
    dir: i32,
    lit: bool,
    ao: u8,
    wave: u8,
    d: usize,
    w: i32,
    h: i32,
    pos: [i32; 3],
) {
    let hint = get_triangle_hint(ao);
    let indices = if dir > 0 {
        if hint { INDEX_OFFSETS[2] } else { INDEX_OFFSETS[3] }
    } else if hint {
        INDEX_OFFSETS[0]
    } else {
        INDEX_OFFSETS[1]
    };
    quads.push(Quad::pack(
        pos[0],
        pos[1],
        pos[2],
        w,
        h,
        indices,
        material.texture,
        ao,
        wave,
        lit,
        d,
        dir,
    ));
}

/// Greedy mesher with reusable padded scratch buffers.
///
/// One instance serves a whole world; `mesh_chunk` and `mesh_frontier`
/// leave their output in `solid_geo` and `water_geo` until the next call.
pub struct TerrainMesher {
    /// Padded voxels; y = 0 is a synthetic opaque floor, y = 257 open air.
    pub(crate) voxels: Tensor3<BlockId>,
    /// Padded column heights, in chunk space.
    pub(crate) heightmap: Tensor2<u8>,
    /// Padded sunlight bounds, in chunk space.
    pub(crate) light_map: Tensor2<u8>,
    /// Padded equilevel flags; entries 0 and 257 are always set.
    pub(crate) equilevels: Vec<u8>,
    /// Opaque and alpha-tested quads from the last mesh call.
    pub(crate) solid_geo: Vec<Quad>,
    /// Translucent quads from the last mesh call.
    pub(crate) water_geo: Vec<Quad>,
    mask_data: Vec<FaceMask>,
    mask_union: Vec<FaceMask>,
    height_mask: Vec<SurfaceField>,
}

impl TerrainMesher {
    /// Creates a mesher with empty scratch buffers.
    ///
    /// The synthetic floor uses [`BlockId::UNKNOWN`]: opaque, so the world
    /// bottom never emits downward faces, and faceless, so it emits none
    /// of its own.
    pub fn new() -> Self {
        let mut voxels = Tensor3::mesh(BlockId::AIR);
        let top = voxels.shape[1] - 1;
        for x in 0..voxels.shape[0] {
            for z in 0..voxels.shape[2] {
                voxels.set(x, 0, z, BlockId::UNKNOWN);
                voxels.set(x, top, z, BlockId::AIR);
            }
        }
        TerrainMesher {
            voxels,
            heightmap: Tensor2::mesh(0),
            light_map: Tensor2::mesh(0),
            equilevels: vec![1; WORLD_HEIGHT + 2],
            solid_geo: Vec::new(),
            water_geo: Vec::new(),
            mask_data: Vec::new(),
            mask_union: Vec::new(),
            height_mask: Vec::new(),
        }
    }

    /// The opaque quads of the last mesh call.
    pub fn solid_geometry(&self) -> &[Quad] {
        &self.solid_geo
    }

    /// The translucent quads of the last mesh call.
    pub fn water_geometry(&self) -> &[Quad] {
        &self.water_geo
    }

    /// Meshes the padded buffers, skipping uniform vertical spans.
    ///
    /// Two consecutive equilevels can be skipped when their blocks are
    /// identical (no boundary at all) or both opaque (the boundary is
    /// invisible). Everything else is fed to the sweep in maximal bands,
    /// clipped to the tallest column.
    pub fn mesh_chunk(&mut self, registry: &Registry) {
        self.solid_geo.clear();
        self.water_geo.clear();

        let mut max_height = 0;
        for &entry in &self.heightmap.data {
            max_height = max_height.max(entry as usize + 1);
        }

        let skip_level = |mesher: &TerrainMesher, i: usize| -> bool {
            if mesher.equilevels[i] + mesher.equilevels[i + 1] != 2 {
                return false;
            }
            let block0 = mesher.voxels.data[i];
            let block1 = mesher.voxels.data[i + 1];
            if block0 == block1 {
                return true;
            }
            registry.block(block0).opaque && registry.block(block1).opaque
        };

        let limit = self.equilevels.len() - 1;
        let mut i = 0;
        while i < limit {
            if skip_level(self, i) {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < limit && !skip_level(self, j) {
                j += 1;
            }
            let y_min = i;
            let y_max = j.min(max_height) + 1;
            if y_min >= y_max {
                break;
            }
            self.compute_chunk_geometry(registry, y_min, y_max);
            i = j;
        }
        trace!(
            "meshed chunk band: {} solid, {} water quads",
            self.solid_geo.len(),
            self.water_geo.len()
        );
    }

    /// Meshes one LOD tile into the four quadrant slices of a multimesh.
    ///
    /// `tile` is an `n` x `n` grid of sampled surfaces, `pos` the tile's
    /// origin relative to the multimesh, `scale` the world size of one
    /// cell, and `slot` the tile's slot in the multimesh; quadrant `k`
    /// tags its quads with slice id `4 * slot + k`.
    pub fn mesh_frontier(
        &mut self,
        registry: &Registry,
        tile: &[FrontierCell],
        n: usize,
        pos: (i32, i32),
        scale: i32,
        slot: usize,
    ) {
        self.solid_geo.clear();
        self.water_geo.clear();

        assert!(n % 2 == 0);
        assert_eq!(tile.len(), n * n);
        let half = n / 2;

        for k in 0..4 {
            let x_offset = if k & 1 != 0 { half } else { 0 };
            let z_offset = if k & 2 != 0 { half } else { 0 };
            let sub = (
                pos.0 + (x_offset as i32) * scale,
                pos.1 + (z_offset as i32) * scale,
            );
            let tag = (4 * slot + k) as u8;
            let base = x_offset + n * z_offset;
            self.compute_frontier_geometry(registry, tile, base, n, half, sub, scale, tag, true);
            self.compute_frontier_geometry(registry, tile, base, n, half, sub, scale, tag, false);
        }
    }

    /// Sweeps one vertical band `[y_min, y_max)` of the padded buffers
    /// along all three axes.
    fn compute_chunk_geometry(&mut self, registry: &Registry, y_min: usize, y_max: usize) {
        let stride = [
            self.voxels.stride[0] as i32,
            self.voxels.stride[1] as i32,
            self.voxels.stride[2] as i32,
        ];
        let shape = [
            self.voxels.shape[0] as i32,
            (y_max - y_min) as i32,
            self.voxels.shape[2] as i32,
        ];

        for dx in 0..3usize {
            // Sweep order y, x, z; d is the axis the faces are normal to.
            let d = if dx == 2 { dx } else { 1 - dx };
            let face = 2 * d;
            let v = if d == 1 { 0 } else { 1 };
            let u = 3 - d - v;
            let ld = shape[d] - 1;
            let lu = shape[u] - 2;
            let lv = shape[v] - 2;
            let sd = stride[d];
            let su = stride[u];
            let sv = stride[v];
            let base = su + sv + (y_min as i32) * stride[1];

            // The x sweep swaps (u, v) to keep the inner loop on the
            // contiguous y axis; su_fixed/sv_fixed and w_fixed/h_fixed
            // below undo the swap for the shader's benefit.
            let su_fixed = if d > 0 { su } else { sv };
            let sv_fixed = if d > 0 { sv } else { su };

            let area = (lu * lv) as usize;
            if self.mask_data.len() < area {
                self.mask_data.resize(area, FaceMask::EMPTY);
            }
            if self.mask_union.len() < lu as usize {
                self.mask_union.resize(lu as usize, FaceMask::EMPTY);
            }

            for id in 0..ld {
                let mut n = 0usize;
                let mut complete_union = FaceMask::EMPTY;
                for iu in 0..lu {
                    self.mask_union[iu as usize] = FaceMask::EMPTY;
                    let mut index = base + id * sd + iu * su;
                    for _iv in 0..lv {
                        let mask = self.face_mask(registry, index as usize, sd, face, su_fixed, sv_fixed);
                        self.mask_data[n] = mask;
                        self.mask_union[iu as usize] = self.mask_union[iu as usize].union(mask);
                        complete_union = complete_union.union(mask);
                        n += 1;
                        index += sv;
                    }
                }
                if complete_union.is_empty() {
                    continue;
                }

                // The x and z halos belong to neighboring chunks. Keep only
                // the faces pointing into this chunk so a face is never
                // meshed by both of its owners.
                if d != 1 {
                    if id == 0 {
                        for mask in &mut self.mask_data[..area] {
                            if mask.dir() < 0 {
                                *mask = FaceMask::EMPTY;
                            }
                        }
                    } else if id == ld - 1 {
                        for mask in &mut self.mask_data[..area] {
                            if !mask.is_empty() && mask.dir() > 0 {
                                *mask = FaceMask::EMPTY;
                            }
                        }
                    }
                }

                self.emit_rectangles(registry, d, u, v, id, lu, lv, y_min);
            }
        }
    }

    /// Builds the mask for the face between `index` and `index + sd`.
    fn face_mask(
        &self,
        registry: &Registry,
        index: usize,
        sd: i32,
        face: usize,
        su_fixed: i32,
        sv_fixed: i32,
    ) -> FaceMask {
        let block0 = self.voxels.data[index];
        let block1 = self.voxels.data[index + sd as usize];
        if block0 == block1 {
            return FaceMask::EMPTY;
        }
        let dir = get_face_dir(registry, block0, block1, face);
        if dir == 0 {
            return FaceMask::EMPTY;
        }

        let material = if dir > 0 {
            registry.block(block0).faces[face]
        } else {
            registry.block(block1).faces[face + 1]
        };
        // Opaque blocks may leave faces uncovered (the unloaded-terrain
        // placeholder does); those boundaries render nothing.
        if material == MaterialId::NONE {
            return FaceMask::EMPTY;
        }

        let air_index = if dir > 0 { index + sd as usize } else { index };
        let ao = self.pack_ao_mask(registry, air_index, su_fixed, sv_fixed);

        // The face is sky-lit when its open cell is above the sunlight
        // bound of its column. Scratch y is chunk y plus one.
        let col = air_index / self.voxels.stride[0];
        let y = air_index % self.voxels.stride[0];
        debug_assert!(y >= 1);
        let lit = (self.light_map.data[col] as usize) <= y - 1;

        FaceMask::pack(material, dir, lit, ao)
    }

    /// Merges equal masks into maximal rectangles and emits their quads.
    #[allow(clippy::too_many_arguments)]
    fn emit_rectangles(
        &mut self,
        registry: &Registry,
        d: usize,
        u: usize,
        v: usize,
        id: i32,
        lu: i32,
        lv: i32,
        y_min: usize,
    ) {
        let mut n = 0usize;
        for iu in 0..lu {
            if self.mask_union[iu as usize].is_empty() {
                n += lv as usize;
                continue;
            }

            let mut iv = 0;
            while iv < lv {
                let mask = self.mask_data[n];
                if mask.is_empty() {
                    iv += 1;
                    n += 1;
                    continue;
                }

                let mut h = 1;
                while h < lv - iv {
                    if mask != self.mask_data[n + h as usize] {
                        break;
                    }
                    h += 1;
                }

                let mut w = 1;
                let mut nw = n + lv as usize;
                'outer: while w < lu - iu {
                    for x in 0..h as usize {
                        if mask != self.mask_data[nw + x] {
                            break 'outer;
                        }
                    }
                    w += 1;
                    nw += lv as usize;
                }

                let mut pos = [0i32; 3];
                pos[d] = id;
                pos[u] = iu;
                pos[v] = iv;
                pos[1] += y_min as i32;

                let ao = mask.ao();
                let dir = mask.dir();
                let lit = mask.lit();
                let material = registry.material(mask.material());
                let translucent = material.color[3] < 1.0;

                let w_fixed = if d > 0 { w } else { h };
                let h_fixed = if d > 0 { h } else { w };

                let voxels = &self.voxels;
                let quads = if translucent { &mut self.water_geo } else { &mut self.solid_geo };
                if material.liquid {
                    if d == 1 {
                        if dir > 0 {
                            add_quad(quads, material, dir, lit, ao, WAVE_VALUES[1], d, w, h, pos);
                            patch_liquid_surface_quads(voxels, registry, quads, lit, ao, w, h, pos);
                        } else {
                            add_quad(quads, material, dir, lit, ao, 0, d, w, h, pos);
                        }
                    } else if h == lv - iv {
                        add_quad(
                            quads, material, dir, lit, ao, WAVE_VALUES[d], d, w_fixed, h_fixed, pos,
                        );
                    } else {
                        split_liquid_side_quads(
                            voxels, registry, quads, material, dir, lit, ao, WAVE_VALUES[d], d, w,
                            h, pos,
                        );
                    }
                } else {
                    add_quad(quads, material, dir, lit, ao, 0, d, w_fixed, h_fixed, pos);
                    if material.alpha_test {
                        add_quad(quads, material, -dir, lit, ao, 0, d, w_fixed, h_fixed, pos);
                    }
                }

                // Clear the merged region so it is not emitted again.
                let mut nw = n;
                for _ in 0..w {
                    for hx in 0..h as usize {
                        self.mask_data[nw + hx] = FaceMask::EMPTY;
                    }
                    nw += lv as usize;
                }

                iv += h;
                n += h as usize;
            }
        }
    }

    /// Packs per-corner ambient occlusion for the face whose open cell is
    /// `air_index`. A corner is occluded by its two orthogonal neighbors
    /// in the face plane, falling back to the diagonal when both are open.
    fn pack_ao_mask(&self, registry: &Registry, air_index: usize, dj: i32, dk: i32) -> u8 {
        let at = |offset: i32| -> BlockId {
            self.voxels.data[(air_index as i32 + offset) as usize]
        };
        let solid = |block: BlockId| -> bool { registry.block(block).solid };

        let b0 = at(dj);
        let b1 = at(-dj);
        let b2 = at(dk);
        let b3 = at(-dk);

        // Fast path for fully open faces, the common case in the air.
        let bsum = b0.0 as u32 + b1.0 as u32 + b2.0 as u32 + b3.0 as u32;
        if bsum == 0 {
            let d0 = at(-dj - dk);
            let d1 = at(-dj + dk);
            let d2 = at(dj - dk);
            let d3 = at(dj + dk);
            let dsum = d0.0 as u32 + d1.0 as u32 + d2.0 as u32 + d3.0 as u32;
            if dsum == 0 {
                return 0;
            }
            let a00 = solid(d0) as u8;
            let a01 = solid(d1) as u8;
            let a10 = solid(d2) as u8;
            let a11 = solid(d3) as u8;
            return (a01 << 6) | (a11 << 4) | (a10 << 2) | a00;
        }

        let mut a00 = 0u8;
        let mut a01 = 0u8;
        let mut a10 = 0u8;
        let mut a11 = 0u8;
        if solid(b0) {
            a10 += 1;
            a11 += 1;
        }
        if solid(b1) {
            a00 += 1;
            a01 += 1;
        }
        if solid(b2) {
            a01 += 1;
            a11 += 1;
        }
        if solid(b3) {
            a00 += 1;
            a10 += 1;
        }

        if a00 == 0 && solid(at(-dj - dk)) {
            a00 += 1;
        }
        if a01 == 0 && solid(at(-dj + dk)) {
            a01 += 1;
        }
        if a10 == 0 && solid(at(dj - dk)) {
            a10 += 1;
        }
        if a11 == 0 && solid(at(dj + dk)) {
            a11 += 1;
        }

        // Corner order matches the vertex order assumed by the shader.
        (a01 << 6) | (a11 << 4) | (a10 << 2) | a00
    }

    /// Meshes one quadrant of an LOD tile from its height fields.
    ///
    /// Side walls use 1-D greedy runs with a fixed AO; top faces use 2-D
    /// greedy meshing that consumes the height mask destructively, which
    /// is why sides go first.
    #[allow(clippy::too_many_arguments)]
    fn compute_frontier_geometry(
        &mut self,
        registry: &Registry,
        tile: &[FrontierCell],
        base: usize,
        row: usize,
        n: usize,
        pos: (i32, i32),
        scale: i32,
        tag: u8,
        solid: bool,
    ) {
        let size = n + 2;
        let area = size * size;
        if self.height_mask.len() < area {
            self.height_mask.resize(area, SurfaceField::default());
        }
        // The border stays air so edge runs terminate naturally.
        for cell in self.height_mask[..area].iter_mut() {
            *cell = SurfaceField::default();
        }
        for z in 0..n {
            let target = (z + 1) * size + 1;
            for x in 0..n {
                let cell = tile[base + x + row * z];
                self.height_mask[target + x] = if solid { cell.solid } else { cell.water };
            }
        }

        let quads = if solid { &mut self.solid_geo } else { &mut self.water_geo };

        // Side walls, skipped for water: distant water reads as a surface.
        let side_range = if solid { 0..4 } else { 0..0 };
        for k in side_range {
            let d = if k & 2 != 0 { 2 } else { 0 };
            let dir = if k & 1 != 0 { -1 } else { 1 };

            let si = if d == 0 { 1i32 } else { size as i32 };
            let sj = size as i32 + 1 - si;
            let ao = if d == 0 { 0x82 } else { 0x0a };
            let di = if dir > 0 { si } else { -si };

            for i in 0..n as i32 {
                let ii = if dir > 0 { 1 } else { 0 };
                let mut offset = (i + 1) * si + sj;
                let mut j = 0i32;
                while j < n as i32 {
                    let field = self.height_mask[offset as usize];
                    if field.block == BlockId::AIR {
                        j += 1;
                        offset += sj;
                        continue;
                    }
                    // One material per block at a distance; per-side
                    // textures would shimmer at this scale.
                    let id = registry.block(field.block).faces[2];
                    if id == MaterialId::NONE {
                        j += 1;
                        offset += sj;
                        continue;
                    }
                    let neighbor_height =
                        self.height_mask[(offset + di) as usize].height;
                    if neighbor_height >= field.height {
                        j += 1;
                        offset += sj;
                        continue;
                    }

                    let mut w = 1i32;
                    let limit = n as i32 - j;
                    let mut index = offset + sj;
                    while w < limit {
                        let next = self.height_mask[index as usize];
                        let next_over = self.height_mask[(index + di) as usize];
                        if next.block != field.block
                            || next.height != field.height
                            || next_over.height != neighbor_height
                        {
                            break;
                        }
                        w += 1;
                        index += sj;
                    }

                    let px = if d == 0 { (i + ii) * scale } else { j * scale };
                    let pz = if d == 0 { j * scale } else { (i + ii) * scale };
                    let wi = if d == 0 {
                        (field.height - neighbor_height) as i32
                    } else {
                        w * scale
                    };
                    let hi = if d == 0 {
                        w * scale
                    } else {
                        (field.height - neighbor_height) as i32
                    };

                    let material = registry.material(id);
                    let wave = if material.liquid { 0b1111 } else { 0 };
                    let quad_pos = [pos.0 + px, neighbor_height as i32, pos.1 + pz];
                    add_quad(quads, material, dir, true, ao, wave, d, wi, hi, quad_pos);
                    if let Some(quad) = quads.last_mut() {
                        quad.set_lod_mask(tag);
                    }

                    offset += w * sj;
                    j += w;
                }
            }
        }

        // Top faces, meshed greedily in 2-D. This pass eats the mask.
        for z in 0..n {
            let mut x = 0usize;
            while x < n {
                let start = (z + 1) * size + 1 + x;
                let field = self.height_mask[start];
                if field.block == BlockId::AIR {
                    x += 1;
                    continue;
                }
                let id = registry.block(field.block).faces[2];
                if id == MaterialId::NONE {
                    x += 1;
                    continue;
                }

                let matches = |other: SurfaceField| -> bool {
                    other.block == field.block && other.height == field.height
                };

                let lx = n - x;
                let lz = n - z;
                let mut w = 1usize;
                while w < lz {
                    if !matches(self.height_mask[start + w * size]) {
                        break;
                    }
                    w += 1;
                }
                let mut h = 1usize;
                'grow: while h < lx {
                    for i in 0..w {
                        if !matches(self.height_mask[start + h + i * size]) {
                            break 'grow;
                        }
                    }
                    h += 1;
                }

                let material = registry.material(id);
                let wave = if material.liquid { 0b1111 } else { 0 };
                let quad_pos = [
                    pos.0 + (x as i32) * scale,
                    field.height as i32,
                    pos.1 + (z as i32) * scale,
                ];
                add_quad(
                    quads,
                    material,
                    1,
                    true,
                    0,
                    wave,
                    1,
                    scale * w as i32,
                    scale * h as i32,
                    quad_pos,
                );
                if let Some(quad) = quads.last_mut() {
                    quad.set_lod_mask(tag);
                }

                for wi in 0..w {
                    for hi in 0..h {
                        self.height_mask[start + wi * size + hi].block = BlockId::AIR;
                    }
                }

                x += h;
            }
        }
    }

    /// Verifies that every set equilevel really is uniform. Debug builds
    /// run this after the nine-way copy merges neighbor equilevels.
    #[cfg(debug_assertions)]
    pub(crate) fn check_equilevels(&self) {
        for (i, &flag) in self.equilevels.iter().enumerate() {
            if flag == 0 {
                continue;
            }
            let expected = self.voxels.data[i];
            for x in 0..self.voxels.shape[0] {
                for z in 0..self.voxels.shape[2] {
                    debug_assert!(
                        self.voxels.get(x, i, z) == expected,
                        "equilevel {} is not uniform at ({}, {})",
                        i,
                        x,
                        z
                    );
                }
            }
        }
    }
}

impl Default for TerrainMesher {
    fn default() -> Self {
        TerrainMesher::new()
    }
}

/// Which of two adjacent blocks contributes the face between them.
///
/// Opposing opaque blocks hide the boundary; an opaque block always wins
/// against a non-opaque one. Between two non-opaque blocks, equal materials
/// cancel (no internal faces inside a liquid) and a missing material loses.
fn get_face_dir(registry: &Registry, block0: BlockId, block1: BlockId, face: usize) -> i32 {
    let data0 = registry.block(block0);
    let data1 = registry.block(block1);
    match (data0.opaque, data1.opaque) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => -1,
        (false, false) => {
            let material0 = data0.faces[face];
            let material1 = data1.faces[face + 1];
            if material0 == material1 {
                0
            } else if material0 == MaterialId::NONE {
                -1
            } else if material1 == MaterialId::NONE {
                1
            } else {
                0
            }
        }
    }
}

/// Patches the rim of a liquid surface quad.
///
/// Waves displace a liquid's upper surface downward. Where the quad meets
/// liquid whose surface is covered from above, the covered surface stays
/// put, so thin vertical strips fill the step the displacement opens up.
/// The strips reuse the quad's AO as-is, though each rim face should
/// really broadcast a different pair of its corners.
#[allow(clippy::too_many_arguments)]
fn patch_liquid_surface_quads(
    voxels: &Tensor3<BlockId>,
    registry: &Registry,
    quads: &mut Vec<Quad>,
    lit: bool,
    ao: u8,
    w: i32,
    h: i32,
    pos: [i32; 3],
) {
    let [base_x, base_y, base_z] = pos;
    let water = voxels.get((base_x + 1) as usize, base_y as usize, (base_z + 1) as usize);
    let id = registry.block(water).faces[0];
    if id == MaterialId::NONE {
        return;
    }
    let material = registry.material(id);

    let patch = |x: i32, z: i32, face: usize| -> bool {
        let ax = (base_x + x + 1) as usize;
        let az = (base_z + z + 1) as usize;
        let below = registry.block(voxels.get(ax, base_y as usize, az));
        if below.opaque || below.faces[face] == MaterialId::NONE {
            return false;
        }
        let above = registry.block(voxels.get(ax, base_y as usize + 1, az));
        above.opaque || above.faces[3] != MaterialId::NONE
    };

    let mut tmp = pos;
    for face in 4..6 {
        let dz = if face == 4 { -1 } else { w };
        let wave = WAVE_VALUES[1] - WAVE_VALUES[2];
        let mut x = 0;
        while x < h {
            if !patch(x, dz, face) {
                x += 1;
                continue;
            }
            let start = x;
            x += 1;
            while x < h && patch(x, dz, face) {
                x += 1;
            }
            tmp[0] = base_x + start;
            tmp[2] = base_z + dz.max(0);
            add_quad(quads, material, 1, lit, ao, wave, 2, x - start, 0, tmp);
        }
    }

    for face in 0..2 {
        let dx = if face == 0 { -1 } else { h };
        let wave = WAVE_VALUES[1] - WAVE_VALUES[0];
        let mut z = 0;
        while z < w {
            if !patch(dx, z, face) {
                z += 1;
                continue;
            }
            let start = z;
            z += 1;
            while z < w && patch(dx, z, face) {
                z += 1;
            }
            tmp[0] = base_x + dx.max(0);
            tmp[2] = base_z + start;
            add_quad(quads, material, 1, lit, ao, wave, 0, 0, z - start, tmp);
        }
    }
}

/// Splits a vertical liquid quad along its top edge.
///
/// The top vertices of a liquid side face wave only where the cell above
/// is not more liquid, and that test can flip along the quad's width, so
/// one merged rectangle may come out as several.
#[allow(clippy::too_many_arguments)]
fn split_liquid_side_quads(
    voxels: &Tensor3<BlockId>,
    registry: &Registry,
    quads: &mut Vec<Quad>,
    material: &MaterialData,
    dir: i32,
    lit: bool,
    ao: u8,
    wave: u8,
    d: usize,
    w: i32,
    h: i32,
    pos: [i32; 3],
) {
    let [base_x, base_y, base_z] = pos;
    let ax = base_x + i32::from(!(d == 0 && dir > 0));
    let az = base_z + i32::from(!(d == 2 && dir > 0));
    let ay = (base_y + h + 1) as usize;

    let test = |i: i32| -> bool {
        let above = if d == 0 {
            voxels.get(ax as usize, ay, (az + i) as usize)
        } else {
            voxels.get((ax + i) as usize, ay, az as usize)
        };
        let data = registry.block(above);
        data.opaque || data.faces[3] == MaterialId::NONE
    };

    let mut tmp = pos;
    let mut last = test(0);
    let mut i = 0;
    while i < w {
        let mut j = i + 1;
        while j < w && test(j) == last {
            j += 1;
        }
        let w_fixed = if d > 0 { j - i } else { h };
        let h_fixed = if d > 0 { h } else { j - i };
        let top = if last { wave } else { 0 };
        add_quad(quads, material, dir, lit, ao, top, d, w_fixed, h_fixed, tmp);
        tmp[2 - d] += j - i;
        last = !last;
        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{base_registry, BlockKind};

    fn fill_interior(mesher: &mut TerrainMesher, block: BlockId, y_range: std::ops::Range<usize>) {
        for x in 1..=CHUNK_WIDTH {
            for z in 1..=CHUNK_WIDTH {
                for y in y_range.clone() {
                    mesher.voxels.set(x, y + 1, z, block);
                }
                mesher.heightmap.set(x, z, y_range.end as u8);
                mesher.light_map.set(x, z, y_range.end as u8);
            }
        }
        // Rows holding the block differ from the air halo, so they are not
        // uniform in the padded buffer even though the chunk interior is.
        for y in 0..WORLD_HEIGHT {
            mesher.equilevels[y + 1] = (!y_range.contains(&y)) as u8;
        }
    }

    /// Sums quad areas per face direction.
    fn face_area(quads: &[Quad], d: usize, dir: i32) -> u64 {
        quads
            .iter()
            .filter(|q| q.d() == d && q.dir() == dir)
            .map(|q| q.w() as u64 * q.h() as u64)
            .sum()
    }

    #[test]
    fn uniform_slab_meshes_to_six_rectangles() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();
        fill_interior(&mut mesher, BlockKind::Stone.id(), 0..8);
        mesher.mesh_chunk(&registry);

        // Halo faces are suppressed, so only the top meshes: the bottom
        // rests on the synthetic floor and the sides face the halo.
        assert!(mesher.water_geometry().is_empty());
        assert_eq!(face_area(mesher.solid_geometry(), 1, 1), 256);
        assert_eq!(face_area(mesher.solid_geometry(), 0, 1), 0);
        assert_eq!(face_area(mesher.solid_geometry(), 2, -1), 0);
        // The top face merges into a single 16 x 16 quad.
        let tops: Vec<_> = mesher
            .solid_geometry()
            .iter()
            .filter(|q| q.d() == 1 && q.dir() == 1)
            .collect();
        assert_eq!(tops.len(), 1);
        assert_eq!((tops[0].w(), tops[0].h()), (16, 16));
        assert_eq!(tops[0].y(), 8);
    }

    #[test]
    fn lone_cube_shows_five_faces() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();
        // A single stone block floating in the open interior.
        mesher.voxels.set(8, 41, 8, BlockKind::Stone.id());
        mesher.heightmap.set(8, 8, 41);
        mesher.light_map.set(8, 8, 41);
        for y in 40..=41 {
            mesher.equilevels[y + 1] = 0;
        }
        mesher.mesh_chunk(&registry);

        // All six faces are exposed, each with area 1.
        let quads = mesher.solid_geometry();
        let total: u64 = (0..3)
            .flat_map(|d| [1, -1].map(|dir| face_area(quads, d, dir)))
            .sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn greedy_area_matches_naive_area() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();
        let mut rng = fastrand::Rng::with_seed(17);

        // A random lumpy heightmap; all faces must tile the same area a
        // per-voxel mesher would emit.
        let mut heights = [[0usize; CHUNK_WIDTH]; CHUNK_WIDTH];
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                let h = rng.usize(1..6);
                heights[x][z] = h;
                for y in 0..h {
                    mesher.voxels.set(x + 1, y + 1, z + 1, BlockKind::Stone.id());
                }
                mesher.heightmap.set(x + 1, z + 1, h as u8);
                mesher.light_map.set(x + 1, z + 1, h as u8);
            }
        }
        for y in 0..8 {
            mesher.equilevels[y + 1] = 0;
        }

        mesher.mesh_chunk(&registry);
        let quads = mesher.solid_geometry();

        // Top faces: one cell per column.
        assert_eq!(face_area(quads, 1, 1), (CHUNK_WIDTH * CHUNK_WIDTH) as u64);

        // Side faces: exposed wall area between adjacent columns, interior
        // boundaries only (halo faces are suppressed).
        let mut expected_x = 0u64;
        let mut expected_z = 0u64;
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                if x + 1 < CHUNK_WIDTH {
                    expected_x +=
                        (heights[x][z] as i64 - heights[x + 1][z] as i64).unsigned_abs();
                }
                if z + 1 < CHUNK_WIDTH {
                    expected_z +=
                        (heights[x][z] as i64 - heights[x][z + 1] as i64).unsigned_abs();
                }
            }
        }
        let actual_x = face_area(quads, 0, 1) + face_area(quads, 0, -1);
        let actual_z = face_area(quads, 2, 1) + face_area(quads, 2, -1);
        assert_eq!(actual_x, expected_x);
        assert_eq!(actual_z, expected_z);
    }

    #[test]
    fn water_routes_to_the_translucent_buffer() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();
        fill_interior(&mut mesher, BlockKind::Water.id(), 0..4);
        mesher.mesh_chunk(&registry);

        assert!(mesher.water_geometry().iter().any(|q| q.d() == 1 && q.dir() == 1));
        let surface = mesher
            .water_geometry()
            .iter()
            .find(|q| q.d() == 1 && q.dir() == 1)
            .unwrap();
        assert_eq!(surface.wave(), 0b1111);
        assert!(mesher.solid_geometry().is_empty());
    }

    #[test]
    fn liquid_side_quads_split_where_the_surface_is_covered() {
        let registry = base_registry();
        let water = registry.block(BlockKind::Water.id()).faces[0];
        let material = registry.material(water);

        // A water wall 4 cells tall at the x = 8 plane. For the first
        // half of its run the cell above the top edge holds more water,
        // so only the second half waves.
        let mut voxels = Tensor3::mesh(BlockId::AIR);
        for z in 1..5 {
            voxels.set(8, 5, z, BlockKind::Water.id());
        }
        let mut quads = Vec::new();
        split_liquid_side_quads(
            &voxels,
            &registry,
            &mut quads,
            material,
            1,
            true,
            0,
            WAVE_VALUES[0],
            0,
            8,
            4,
            [8, 0, 0],
        );

        assert_eq!(quads.len(), 2);
        assert_eq!(quads[0].wave(), 0);
        assert_eq!((quads[0].z(), quads[0].h()), (0, 4));
        assert_eq!(quads[1].wave(), WAVE_VALUES[0]);
        assert_eq!((quads[1].z(), quads[1].h()), (4, 4));
    }

    #[test]
    fn covered_liquid_rims_get_patch_strips() {
        let registry = base_registry();
        let water = BlockKind::Water.id();

        let mut voxels = Tensor3::mesh(BlockId::AIR);
        // The surface quad's own liquid cell.
        voxels.set(3, 5, 3, water);
        // Water just past the quad's -z rim, with stone resting on it: its
        // surface stays put while the quad's rim waves down.
        for x in 3..6 {
            voxels.set(x, 5, 2, water);
            voxels.set(x, 6, 2, BlockKind::Stone.id());
        }

        let mut quads = Vec::new();
        patch_liquid_surface_quads(&voxels, &registry, &mut quads, true, 0, 4, 3, [2, 5, 2]);

        assert_eq!(quads.len(), 1);
        let quad = quads[0];
        assert_eq!(quad.d(), 2);
        assert_eq!((quad.w(), quad.h()), (3, 0));
        assert_eq!(quad.wave(), WAVE_VALUES[1] - WAVE_VALUES[2]);
        assert_eq!((quad.x(), quad.y(), quad.z()), (2, 5, 2));
    }

    #[test]
    fn liquid_surfaces_patch_around_resting_blocks() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();
        fill_interior(&mut mesher, BlockKind::Water.id(), 0..4);
        // A stone block sits on the pond and covers one surface cell.
        mesher.voxels.set(8, 5, 8, BlockKind::Stone.id());
        mesher.heightmap.set(8, 8, 5);
        mesher.light_map.set(8, 8, 5);
        mesher.equilevels[5] = 0;
        mesher.mesh_chunk(&registry);

        let patches: Vec<_> = mesher
            .water_geometry()
            .iter()
            .filter(|q| q.w() == 0 || q.h() == 0)
            .collect();
        assert!(!patches.is_empty());
        assert!(patches.iter().all(|q| {
            q.wave() == WAVE_VALUES[1] - WAVE_VALUES[2]
                || q.wave() == WAVE_VALUES[1] - WAVE_VALUES[0]
        }));
    }

    #[test]
    fn face_dir_rules() {
        let registry = base_registry();
        let stone = BlockKind::Stone.id();
        let water = BlockKind::Water.id();
        let air = BlockId::AIR;
        assert_eq!(get_face_dir(&registry, stone, stone, 0), 0);
        assert_eq!(get_face_dir(&registry, stone, air, 0), 1);
        assert_eq!(get_face_dir(&registry, air, stone, 0), -1);
        assert_eq!(get_face_dir(&registry, water, water, 2), 0);
        assert_eq!(get_face_dir(&registry, water, air, 2), 1);
        assert_eq!(get_face_dir(&registry, air, water, 2), -1);
    }

    #[test]
    fn triangle_hint_follows_ao_diagonals() {
        // Equal corners, no occlusion: either diagonal works; hint is false.
        assert!(!get_triangle_hint(0));
        // Occlusion on the a00/a11 diagonal flips the split.
        let ao = 0b00_01_00_01; // a00 = 1, a11 = 1
        assert!(get_triangle_hint(ao));
    }

    #[test]
    fn frontier_tile_meshes_tops_and_sides() {
        let registry = base_registry();
        let mut mesher = TerrainMesher::new();

        let n = 16usize;
        let mut tile = vec![FrontierCell::default(); n * n];
        for z in 0..n {
            for x in 0..n {
                let height = if x < 8 { 40 } else { 30 };
                tile[x + n * z].solid =
                    SurfaceField { block: BlockKind::Grass.id(), height };
                tile[x + n * z].water = if height < 32 {
                    SurfaceField { block: BlockKind::Water.id(), height: 32 }
                } else {
                    SurfaceField::default()
                };
            }
        }

        mesher.mesh_frontier(&registry, &tile, n, (0, 0), 2, 5);

        // Every quadrant contributes tagged top faces.
        let tags: std::collections::HashSet<u8> =
            mesher.solid_geometry().iter().map(|q| q.lod_mask()).collect();
        assert_eq!(tags, (0..4).map(|k| (4 * 5 + k) as u8).collect());

        // The cliff between the two plateaus appears as x-facing walls.
        assert!(mesher.solid_geometry().iter().any(|q| q.d() == 0));

        // Water has tops but no sides.
        assert!(!mesher.water_geometry().is_empty());
        assert!(mesher.water_geometry().iter().all(|q| q.d() == 1));

        // Top coverage tiles each quadrant exactly once per surface.
        let top_area: u64 = mesher
            .solid_geometry()
            .iter()
            .filter(|q| q.d() == 1)
            .map(|q| (q.w() * q.h()) as u64)
            .sum();
        assert_eq!(top_area, (n * n * 4) as u64);
    }
}
