//! # Registry Module
//!
//! This module provides the `Registry`, the immutable catalog of block and
//! material definitions that every other system consults.
//!
//! ## Identifiers
//!
//! Blocks and materials are referred to by small integer handles. `BlockId(0)`
//! is always air and `BlockId(1)` is always the placeholder returned for
//! unloaded terrain; both are registered by [`Registry::new`]. `MaterialId(0)`
//! means "no material on this face".
//!
//! ## Validation
//!
//! Definitions are validated when they are added, not when they are used.
//! A block that names a material that was never registered is rejected
//! immediately, so the hot paths (meshing, lighting) can index without
//! checking.

use log::debug;
use serde::Deserialize;

/// The number of faces on a voxel cube, ordered +x, -x, +y, -y, +z, -z.
/// The face for sweep axis `d` and direction `dir` is `2 * d + (dir < 0)`.
pub const NUM_FACES: usize = 6;

/// A handle to a registered block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u8);

impl BlockId {
    /// The empty block. Always registered first.
    pub const AIR: BlockId = BlockId(0);
    /// The placeholder for terrain that has not been loaded yet.
    /// Always registered second. Opaque and solid, but renders no faces.
    pub const UNKNOWN: BlockId = BlockId(1);
}

/// A handle to a registered material, or `NONE` for a faceless side.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u8);

impl MaterialId {
    /// The absent material. Faces with this id emit no geometry.
    pub const NONE: MaterialId = MaterialId(0);
}

/// The per-block properties consulted by storage, lighting, and meshing.
#[derive(Clone, Debug)]
pub struct BlockData {
    /// Whether the block stops light and hides faces behind it.
    pub opaque: bool,
    /// Whether the block counts toward ambient occlusion.
    pub solid: bool,
    /// The light level this block emits, 0 for none. Capped below full
    /// sunlight so emitters never masquerade as sky-lit cells.
    pub light: u8,
    /// The material on each face, ordered +x, -x, +y, -y, +z, -z.
    pub faces: [MaterialId; NUM_FACES],
}

/// The per-material properties consulted by meshing.
#[derive(Clone, Debug)]
pub struct MaterialData {
    /// Whether quads of this material wave and render translucent.
    pub liquid: bool,
    /// Whether this material needs a second, back-facing quad for
    /// alpha-tested cutouts.
    pub alpha_test: bool,
    /// The texture slot for the render pipeline.
    pub texture: u8,
    /// An RGBA tint; alpha below 1 routes quads to the translucent mesh.
    pub color: [f32; 4],
}

/// The immutable catalog of blocks and materials.
pub struct Registry {
    blocks: Vec<BlockData>,
    materials: Vec<MaterialData>,
}

impl Registry {
    /// Creates a registry holding only the reserved entries: the `NONE`
    /// material, the air block, and the unknown block.
    pub fn new() -> Self {
        let mut registry = Registry {
            blocks: Vec::new(),
            materials: vec![MaterialData {
                liquid: false,
                alpha_test: false,
                texture: 0,
                color: [0.0; 4],
            }],
        };
        let air = registry.add_block(BlockData {
            opaque: false,
            solid: false,
            light: 0,
            faces: [MaterialId::NONE; NUM_FACES],
        });
        assert_eq!(air, BlockId::AIR);
        let unknown = registry.add_block(BlockData {
            opaque: true,
            solid: true,
            light: 0,
            faces: [MaterialId::NONE; NUM_FACES],
        });
        assert_eq!(unknown, BlockId::UNKNOWN);
        registry
    }

    /// Registers a material and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if the material table is full or the color channels fall
    /// outside `[0, 1]`.
    pub fn add_material(&mut self, data: MaterialData) -> MaterialId {
        assert!(self.materials.len() < u8::MAX as usize, "material table full");
        assert!(data.color.iter().all(|&c| (0.0..=1.0).contains(&c)));
        let id = MaterialId(self.materials.len() as u8);
        self.materials.push(data);
        id
    }

    /// Registers a block and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if the block table is full, a face names an unregistered
    /// material, or the emitted light level is not below full sunlight.
    pub fn add_block(&mut self, data: BlockData) -> BlockId {
        assert!(self.blocks.len() <= u8::MAX as usize, "block table full");
        assert!(data.light < super::SUNLIGHT_LEVEL as u8);
        for &face in &data.faces {
            assert!(
                (face.0 as usize) < self.materials.len(),
                "block face names unregistered material {}",
                face.0
            );
        }
        let id = BlockId(self.blocks.len() as u8);
        self.blocks.push(data);
        id
    }

    /// Looks up the properties of a block.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.0 as usize]
    }

    /// Looks up the properties of a material.
    ///
    /// # Panics
    ///
    /// Panics if `id` is `MaterialId::NONE`.
    #[inline]
    pub fn material(&self, id: MaterialId) -> &MaterialData {
        assert!(id != MaterialId::NONE);
        &self.materials[id.0 as usize]
    }

    /// The number of registered blocks, reserved entries included.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Builds a registry from a JSON document.
    ///
    /// The document lists materials first, then blocks whose `faces` arrays
    /// refer to materials by name. A `faces` array may hold zero entries
    /// (faceless), one entry (all sides), or six entries (per side, ordered
    /// +x, -x, +y, -y, +z, -z).
    ///
    /// # Panics
    ///
    /// Panics if a block face names a material absent from the document.
    pub fn from_json(json: &str) -> serde_json::Result<Registry> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        let mut registry = Registry::new();
        let mut names = Vec::with_capacity(config.materials.len());
        for def in config.materials {
            let id = registry.add_material(MaterialData {
                liquid: def.liquid,
                alpha_test: def.alpha_test,
                texture: def.texture,
                color: def.color,
            });
            names.push((def.name, id));
        }
        let resolve = |name: &str| -> MaterialId {
            names
                .iter()
                .find(|(n, _)| n == name)
                .map(|&(_, id)| id)
                .unwrap_or_else(|| panic!("unregistered material: {}", name))
        };
        for def in config.blocks {
            let faces = match def.faces.len() {
                0 => [MaterialId::NONE; NUM_FACES],
                1 => [resolve(&def.faces[0]); NUM_FACES],
                NUM_FACES => {
                    let mut faces = [MaterialId::NONE; NUM_FACES];
                    for (face, name) in faces.iter_mut().zip(&def.faces) {
                        *face = resolve(name);
                    }
                    faces
                }
                n => panic!("block {} has {} faces; expected 0, 1, or 6", def.name, n),
            };
            let id = registry.add_block(BlockData {
                opaque: def.opaque,
                solid: def.solid,
                light: def.light,
                faces,
            });
            debug!("registered block {} as {:?}", def.name, id);
        }
        Ok(registry)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[derive(Deserialize)]
struct RegistryConfig {
    materials: Vec<MaterialDef>,
    blocks: Vec<BlockDef>,
}

#[derive(Deserialize)]
struct MaterialDef {
    name: String,
    #[serde(default)]
    liquid: bool,
    #[serde(default)]
    alpha_test: bool,
    #[serde(default)]
    texture: u8,
    #[serde(default = "default_color")]
    color: [f32; 4],
}

#[derive(Deserialize)]
struct BlockDef {
    name: String,
    #[serde(default)]
    opaque: bool,
    #[serde(default)]
    solid: bool,
    #[serde(default)]
    light: u8,
    #[serde(default)]
    faces: Vec<String>,
}

fn default_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}
