//! # Loader Module
//!
//! This module defines the [`Loader`] trait that terrain generation plugs
//! into, the standard block palette, and two generators: a Perlin-noise
//! terrain for interactive use and a flat world for tests.
//!
//! Generators never see chunks. They fill one run-length [`Column`] at a
//! time, which keeps them trivially portable to worker threads later.

use log::info;
use noise::{NoiseFn, Perlin};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::world::column::Column;
use crate::world::registry::{BlockData, BlockId, MaterialData, MaterialId, Registry, NUM_FACES};

/// A source of terrain, queried one vertical column at a time.
pub trait Loader {
    /// Fills `column` with the terrain at world column `(x, z)`. The column
    /// arrives empty.
    fn load_column(&mut self, x: i32, z: i32, column: &mut Column);
}

/// The standard block palette registered by [`base_registry`].
///
/// The discriminants are the block ids, so `BlockKind::Stone.id()` and
/// `BlockKind::from_id` convert both ways without a table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum BlockKind {
    /// The empty block.
    Air = 0,
    /// The placeholder for unloaded terrain.
    Unknown,
    /// The indestructible world floor.
    Bedrock,
    /// Plain stone.
    Stone,
    /// Subsurface soil.
    Dirt,
    /// Grass-topped soil.
    Grass,
    /// Beach and lakebed sand.
    Sand,
    /// High-altitude snow cover.
    Snow,
    /// Exposed cliff rock.
    Rock,
    /// Tree trunk.
    Trunk,
    /// Alpha-tested foliage.
    Bush,
    /// A glowing mushroom; the palette's only light emitter.
    Fungus,
    /// Translucent waving water.
    Water,
}

impl BlockKind {
    /// The block id this kind registers as.
    pub fn id(self) -> BlockId {
        BlockId(self as u8)
    }

    /// The kind behind a block id, if it belongs to the standard palette.
    pub fn from_id(id: BlockId) -> Option<BlockKind> {
        BlockKind::from_u8(id.0)
    }
}

/// Builds the registry for the standard palette.
///
/// # Panics
///
/// Panics if the registered ids drift from the [`BlockKind`] discriminants.
pub fn base_registry() -> Registry {
    let mut registry = Registry::new();

    let opaque = |texture: u8| MaterialData {
        liquid: false,
        alpha_test: false,
        texture,
        color: [1.0; 4],
    };
    let bedrock = registry.add_material(opaque(0));
    let stone = registry.add_material(opaque(1));
    let dirt = registry.add_material(opaque(2));
    let grass_top = registry.add_material(opaque(3));
    let grass_side = registry.add_material(opaque(4));
    let sand = registry.add_material(opaque(5));
    let snow = registry.add_material(opaque(6));
    let rock = registry.add_material(opaque(7));
    let trunk_side = registry.add_material(opaque(8));
    let trunk_top = registry.add_material(opaque(9));
    let bush = registry.add_material(MaterialData {
        liquid: false,
        alpha_test: true,
        texture: 10,
        color: [1.0; 4],
    });
    let fungus = registry.add_material(MaterialData {
        liquid: false,
        alpha_test: true,
        texture: 11,
        color: [1.0; 4],
    });
    let water = registry.add_material(MaterialData {
        liquid: true,
        alpha_test: false,
        texture: 12,
        color: [0.25, 0.45, 0.9, 0.8],
    });

    let solid = |faces: [MaterialId; NUM_FACES]| BlockData {
        opaque: true,
        solid: true,
        light: 0,
        faces,
    };
    let expect = |id: BlockId, kind: BlockKind| {
        assert_eq!(id, kind.id(), "palette drifted at {:?}", kind);
    };
    expect(registry.add_block(solid([bedrock; NUM_FACES])), BlockKind::Bedrock);
    expect(registry.add_block(solid([stone; NUM_FACES])), BlockKind::Stone);
    expect(registry.add_block(solid([dirt; NUM_FACES])), BlockKind::Dirt);
    expect(
        registry.add_block(solid([
            grass_side, grass_side, grass_top, dirt, grass_side, grass_side,
        ])),
        BlockKind::Grass,
    );
    expect(registry.add_block(solid([sand; NUM_FACES])), BlockKind::Sand);
    expect(registry.add_block(solid([snow; NUM_FACES])), BlockKind::Snow);
    expect(registry.add_block(solid([rock; NUM_FACES])), BlockKind::Rock);
    expect(
        registry.add_block(solid([
            trunk_side, trunk_side, trunk_top, trunk_top, trunk_side, trunk_side,
        ])),
        BlockKind::Trunk,
    );
    expect(
        registry.add_block(BlockData {
            opaque: false,
            solid: false,
            light: 0,
            faces: [bush; NUM_FACES],
        }),
        BlockKind::Bush,
    );
    expect(
        registry.add_block(BlockData {
            opaque: false,
            solid: false,
            light: 9,
            faces: [fungus; NUM_FACES],
        }),
        BlockKind::Fungus,
    );
    expect(
        registry.add_block(BlockData {
            opaque: false,
            solid: false,
            light: 0,
            faces: [water; NUM_FACES],
        }),
        BlockKind::Water,
    );

    info!("registered {} blocks", registry.num_blocks());
    registry
}

/// Perlin-noise terrain with beaches, cliffs, snow caps, and scattered
/// decorations.
pub struct NoiseLoader {
    perlin: Perlin,
    seed: u64,
    sea_level: i32,
}

impl NoiseLoader {
    /// Creates a generator from a seed.
    pub fn new(seed: u32) -> Self {
        NoiseLoader {
            perlin: Perlin::new(seed),
            seed: seed as u64,
            sea_level: 64,
        }
    }

    /// Three octaves of Perlin noise in roughly `[-1, 1]`.
    fn fbm(&self, x: f64, z: f64) -> f64 {
        let mut sum = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0 / 192.0;
        for _ in 0..3 {
            sum += amplitude * self.perlin.get([x * frequency, z * frequency]);
            amplitude *= 0.5;
            frequency *= 2.0;
        }
        sum / 1.75
    }

    fn surface_height(&self, x: i32, z: i32) -> i32 {
        let noise = self.fbm(x as f64, z as f64);
        self.sea_level - 8 + (noise * 40.0).round() as i32
    }
}

impl Loader for NoiseLoader {
    fn load_column(&mut self, x: i32, z: i32, column: &mut Column) {
        let height = self.surface_height(x, z).max(2);
        let sea = self.sea_level;

        column.push(BlockKind::Bedrock.id(), 1);
        column.push(BlockKind::Stone.id(), (height - 3).max(1) as usize);
        let surface = if height > sea + 24 {
            BlockKind::Snow
        } else if height > sea + 16 {
            BlockKind::Rock
        } else if height <= sea + 1 {
            BlockKind::Sand
        } else {
            BlockKind::Grass
        };
        if surface == BlockKind::Grass {
            column.push(BlockKind::Dirt.id(), (height - 1) as usize);
        }
        column.push(surface.id(), height as usize);
        if height < sea {
            column.push(BlockKind::Water.id(), sea as usize);
        }

        // Decorations are seeded per column so reloads are reproducible.
        if surface == BlockKind::Grass {
            let mut rng = fastrand::Rng::with_seed(
                self.seed ^ (x as u64).wrapping_mul(0x9e3779b97f4a7c15) ^ (z as u64) << 32,
            );
            match rng.u32(0..100) {
                0..=2 => column.overwrite(BlockKind::Bush.id(), height as usize),
                3 => column.overwrite(BlockKind::Fungus.id(), height as usize),
                4 => {
                    let top = height as usize + rng.usize(3..6);
                    for y in height as usize..top {
                        column.overwrite(BlockKind::Trunk.id(), y);
                    }
                }
                _ => {}
            }
        }
    }
}

/// A flat slab of terrain, the workhorse of the test suite.
pub struct FlatLoader {
    layers: Vec<(BlockId, usize)>,
}

impl FlatLoader {
    /// Creates a loader that stacks `layers` bottom-up in every column.
    /// Each entry is a block and the exclusive height it fills up to.
    pub fn new(layers: Vec<(BlockId, usize)>) -> Self {
        FlatLoader { layers }
    }

    /// Bedrock, stone, and a grass surface at height `height`.
    pub fn grassland(height: usize) -> Self {
        assert!(height >= 3);
        FlatLoader::new(vec![
            (BlockKind::Bedrock.id(), 1),
            (BlockKind::Stone.id(), height - 1),
            (BlockKind::Grass.id(), height),
        ])
    }
}

impl Loader for FlatLoader {
    fn load_column(&mut self, _x: i32, _z: i32, column: &mut Column) {
        for &(block, height) in &self.layers {
            column.push(block, height);
        }
    }
}
