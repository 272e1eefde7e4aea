#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! A chunked voxel world engine: dense chunk storage, incremental block
//! lighting, greedy meshing with ambient occlusion, and a level-of-detail
//! frontier that carries terrain out to the horizon.
//!
//! ## Key Modules
//!
//! * `world` - Chunk storage, the block registry, lighting, and the `World`
//!   orchestrator with its per-frame load and mesh budgets
//! * `meshing` - The greedy mesher that turns voxels into packed quads
//! * `loader` - The terrain-generation interface and the standard palette
//! * `renderer` - The seam to whatever draws the quads; includes a counting
//!   null renderer for tests and headless runs
//!
//! ## Architecture
//!
//! The engine is renderer-agnostic: everything above the [`Renderer`] trait
//! is plain data transformation, and the whole pipeline runs headless. The
//! data flow per frame is:
//!
//! 1. `World::recenter` evicts out-of-range chunks and loads new columns
//!    through the [`loader::Loader`].
//! 2. `World::remesh` settles lighting on dirty chunks, rebuilds their
//!    quad buffers, and advances the LOD frontier, all under fixed budgets.
//!
//! ## Usage
//!
//! ```no_run
//! use voxel_world::loader::{base_registry, NoiseLoader};
//! use voxel_world::renderer::NullRenderer;
//! use voxel_world::world::World;
//!
//! let loader = Box::new(NoiseLoader::new(7));
//! let mut world = World::new(NullRenderer::new(), loader, base_registry(), 8.0);
//! world.recenter(0, 0);
//! world.remesh();
//! ```

pub mod loader;
pub mod meshing;
pub mod renderer;
pub mod world;

pub use renderer::{NullRenderer, Quad, Renderer, TerrainMesh};
pub use world::registry::{BlockId, MaterialId, Registry};
pub use world::World;

/// Initializes logging to stdout, filtered by the `RUST_LOG` environment
/// variable.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
}
