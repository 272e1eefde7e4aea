//! # Voxel World Headless Demo
//!
//! Generates noise terrain around a camera that walks east, then reports
//! how much geometry the engine produced. Useful for eyeballing load and
//! mesh throughput without a GPU.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --release
//! ```

use log::info;

use voxel_world::loader::{base_registry, NoiseLoader};
use voxel_world::renderer::NullRenderer;
use voxel_world::world::World;

fn main() {
    voxel_world::init_logging();

    let renderer = NullRenderer::new();
    let stats = renderer.stats();
    let loader = Box::new(NoiseLoader::new(7));
    let mut world = World::new(renderer, loader, base_registry(), 8.0);

    for frame in 0i32..600 {
        world.recenter(frame / 4, 0);
        world.remesh();
    }

    info!(
        "{} meshes live ({} allocated, {} disposed), {} quads uploaded",
        stats.live(),
        stats.allocated(),
        stats.disposed(),
        stats.quads_uploaded()
    );
}
