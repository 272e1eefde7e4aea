//! # Renderer Module
//!
//! This module defines the seam between the world engine and whatever draws
//! it. The engine never talks to a GPU directly; it hands fully packed quad
//! buffers to a [`Renderer`] and keeps opaque [`TerrainMesh`] handles.
//!
//! ## Quad format
//!
//! Each quad is four `u32` words, `bytemuck`-castable for direct upload:
//!
//! ```text
//! word 0: x | y << 16
//! word 1: z | indices << 16
//! word 2: w | h << 16
//! word 3: lod_mask | texture << 8 | ao << 16 | wave << 24 | d << 28 | lit << 30 | dir << 31
//! ```
//!
//! Positions are mesh-local and must fit in 16 bits. `indices` picks which
//! diagonal splits the quad into triangles. `lod_mask` is zero for chunk
//! quads; LOD quads use it to tag which multimesh slice owns them.

use bytemuck::{Pod, Zeroable};

/// A packed terrain quad, ready for upload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Quad(pub [u32; 4]);

impl Quad {
    /// Packs a quad from its unpacked fields.
    ///
    /// # Panics
    ///
    /// Debug builds assert that every positional field fits its bit budget.
    #[allow(clippy::too_many_arguments)]
    pub fn pack(
        x: i32,
        y: i32,
        z: i32,
        w: i32,
        h: i32,
        indices: u32,
        texture: u8,
        ao: u8,
        wave: u8,
        lit: bool,
        d: usize,
        dir: i32,
    ) -> Quad {
        debug_assert!((0..=u16::MAX as i32).contains(&x));
        debug_assert!((0..=u16::MAX as i32).contains(&y));
        debug_assert!((0..=u16::MAX as i32).contains(&z));
        debug_assert!((0..=u16::MAX as i32).contains(&w));
        debug_assert!((0..=u16::MAX as i32).contains(&h));
        debug_assert!(indices <= u16::MAX as u32);
        debug_assert!(wave < 16 && d < 3);
        Quad([
            (x as u32) | (y as u32) << 16,
            (z as u32) | indices << 16,
            (w as u32) | (h as u32) << 16,
            (texture as u32) << 8
                | (ao as u32) << 16
                | (wave as u32) << 24
                | (d as u32) << 28
                | (lit as u32) << 30
                | ((dir > 0) as u32) << 31,
        ])
    }

    /// The mesh-local x origin.
    pub fn x(&self) -> u32 {
        self.0[0] & 0xffff
    }

    /// The mesh-local y origin.
    pub fn y(&self) -> u32 {
        self.0[0] >> 16
    }

    /// The mesh-local z origin.
    pub fn z(&self) -> u32 {
        self.0[1] & 0xffff
    }

    /// The triangulation selector.
    pub fn indices(&self) -> u32 {
        self.0[1] >> 16
    }

    /// The quad extent along the first in-plane axis.
    pub fn w(&self) -> u32 {
        self.0[2] & 0xffff
    }

    /// The quad extent along the second in-plane axis.
    pub fn h(&self) -> u32 {
        self.0[2] >> 16
    }

    /// The LOD slice mask; zero for chunk quads.
    pub fn lod_mask(&self) -> u8 {
        self.0[3] as u8
    }

    /// The texture slot.
    pub fn texture(&self) -> u8 {
        (self.0[3] >> 8) as u8
    }

    /// The packed per-corner ambient occlusion.
    pub fn ao(&self) -> u8 {
        (self.0[3] >> 16) as u8
    }

    /// The per-axis wave bits for liquid surfaces.
    pub fn wave(&self) -> u8 {
        (self.0[3] >> 24) as u8 & 0xf
    }

    /// The sweep axis: 0 for x, 1 for y, 2 for z.
    pub fn d(&self) -> usize {
        (self.0[3] >> 28) as usize & 0x3
    }

    /// Whether the face is in full sunlight.
    pub fn lit(&self) -> bool {
        self.0[3] >> 30 & 1 != 0
    }

    /// The face direction along the sweep axis, `+1` or `-1`.
    pub fn dir(&self) -> i32 {
        if self.0[3] >> 31 != 0 { 1 } else { -1 }
    }

    /// Sets the LOD slice mask in place.
    pub fn set_lod_mask(&mut self, mask: u8) {
        self.0[3] = (self.0[3] & !0xff) | mask as u32;
    }
}

/// A handle to uploaded terrain geometry.
pub trait TerrainMesh {
    /// Releases the geometry. Consumes the handle so a disposed mesh can
    /// never be shown again.
    fn dispose(self);

    /// Replaces the geometry in place.
    fn set_geometry(&mut self, quads: &[Quad]);

    /// The quads currently uploaded.
    fn geometry(&self) -> &[Quad];

    /// Moves the mesh to a world position.
    fn set_position(&mut self, x: i32, y: i32, z: i32);

    /// Toggles visibility of the LOD slice tagged `mask` without touching
    /// the geometry. Chunk meshes pass `mask == 0` for the whole mesh.
    fn show(&mut self, mask: u8, shown: bool);
}

/// The interface the engine renders through.
pub trait Renderer {
    /// The mesh handle this renderer produces.
    type Mesh: TerrainMesh;

    /// Uploads a quad buffer and returns a handle to it. Translucent
    /// meshes draw after opaque ones.
    fn add_terrain_mesh(&mut self, quads: &[Quad], translucent: bool) -> Self::Mesh;
}

pub use null::{NullMesh, NullRenderer, RenderStats};

/// A renderer that uploads nothing and counts everything. Backs the test
/// suite and headless benchmarks.
mod null {
    use super::{Quad, Renderer, TerrainMesh};
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    /// Allocation counters shared by a [`NullRenderer`] and its meshes.
    #[derive(Default)]
    pub struct RenderStats {
        allocated: Cell<usize>,
        disposed: Cell<usize>,
        quads_uploaded: Cell<usize>,
    }

    impl RenderStats {
        /// Meshes created since the renderer was built.
        pub fn allocated(&self) -> usize {
            self.allocated.get()
        }

        /// Meshes disposed since the renderer was built.
        pub fn disposed(&self) -> usize {
            self.disposed.get()
        }

        /// Meshes currently alive.
        pub fn live(&self) -> usize {
            self.allocated.get() - self.disposed.get()
        }

        /// Total quads passed to `add_terrain_mesh` and `set_geometry`.
        pub fn quads_uploaded(&self) -> usize {
            self.quads_uploaded.get()
        }
    }

    /// A renderer that records uploads without a GPU.
    #[derive(Default)]
    pub struct NullRenderer {
        stats: Rc<RenderStats>,
    }

    impl NullRenderer {
        /// Creates a renderer with fresh counters.
        pub fn new() -> Self {
            NullRenderer::default()
        }

        /// A handle to the shared counters, valid after the renderer moves.
        pub fn stats(&self) -> Rc<RenderStats> {
            self.stats.clone()
        }
    }

    impl Renderer for NullRenderer {
        type Mesh = NullMesh;

        fn add_terrain_mesh(&mut self, quads: &[Quad], translucent: bool) -> NullMesh {
            self.stats.allocated.set(self.stats.allocated.get() + 1);
            self.stats
                .quads_uploaded
                .set(self.stats.quads_uploaded.get() + quads.len());
            NullMesh {
                quads: quads.to_vec(),
                position: (0, 0, 0),
                translucent,
                shown: HashSet::new(),
                stats: self.stats.clone(),
            }
        }
    }

    /// The mesh handle produced by [`NullRenderer`].
    pub struct NullMesh {
        quads: Vec<Quad>,
        position: (i32, i32, i32),
        translucent: bool,
        shown: HashSet<u8>,
        stats: Rc<RenderStats>,
    }

    impl NullMesh {
        /// The world position last set.
        pub fn position(&self) -> (i32, i32, i32) {
            self.position
        }

        /// Whether this mesh was uploaded as translucent.
        pub fn translucent(&self) -> bool {
            self.translucent
        }

        /// Whether the slice tagged `mask` is shown.
        pub fn is_shown(&self, mask: u8) -> bool {
            self.shown.contains(&mask)
        }
    }

    impl TerrainMesh for NullMesh {
        fn dispose(self) {
            self.stats.disposed.set(self.stats.disposed.get() + 1);
        }

        fn set_geometry(&mut self, quads: &[Quad]) {
            self.stats
                .quads_uploaded
                .set(self.stats.quads_uploaded.get() + quads.len());
            self.quads.clear();
            self.quads.extend_from_slice(quads);
        }

        fn geometry(&self) -> &[Quad] {
            &self.quads
        }

        fn set_position(&mut self, x: i32, y: i32, z: i32) {
            self.position = (x, y, z);
        }

        fn show(&mut self, mask: u8, shown: bool) {
            if shown {
                self.shown.insert(mask);
            } else {
                self.shown.remove(&mask);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_fields_round_trip() {
        let quad = Quad::pack(17, 250, 3, 16, 9, 1, 42, 0b1001_0110, 0b0110, true, 2, -1);
        assert_eq!(quad.x(), 17);
        assert_eq!(quad.y(), 250);
        assert_eq!(quad.z(), 3);
        assert_eq!(quad.w(), 16);
        assert_eq!(quad.h(), 9);
        assert_eq!(quad.indices(), 1);
        assert_eq!(quad.texture(), 42);
        assert_eq!(quad.ao(), 0b1001_0110);
        assert_eq!(quad.wave(), 0b0110);
        assert!(quad.lit());
        assert_eq!(quad.d(), 2);
        assert_eq!(quad.dir(), -1);
        assert_eq!(quad.lod_mask(), 0);
    }

    #[test]
    fn quads_cast_to_bytes() {
        let quads = [Quad::pack(1, 2, 3, 4, 5, 0, 6, 7, 0, false, 0, 1); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&quads);
        assert_eq!(bytes.len(), 3 * 16);
    }

    #[test]
    fn null_renderer_counts_lifecycles() {
        let mut renderer = NullRenderer::new();
        let stats = renderer.stats();
        let quads = [Quad::default(); 5];
        let mesh = renderer.add_terrain_mesh(&quads, false);
        let other = renderer.add_terrain_mesh(&quads[..2], true);
        assert_eq!(stats.allocated(), 2);
        assert_eq!(stats.live(), 2);
        assert_eq!(stats.quads_uploaded(), 7);
        mesh.dispose();
        assert_eq!(stats.live(), 1);
        assert!(other.translucent());
    }
}
