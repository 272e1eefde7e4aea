//! End-to-end tests driving the whole engine through its public surface:
//! a `World` over a terrain loader, rendered into the counting null
//! renderer.

use cgmath::Point2;

use voxel_world::loader::{base_registry, BlockKind, FlatLoader, NoiseLoader};
use voxel_world::renderer::NullRenderer;
use voxel_world::world::{World, CHUNK_BITS, NUM_CHUNKS_TO_LOAD_PER_FRAME, SUNLIGHT_LEVEL};
use voxel_world::BlockId;

fn flat_world(radius: f64, height: usize) -> World<NullRenderer> {
    World::new(
        NullRenderer::new(),
        Box::new(FlatLoader::grassland(height)),
        base_registry(),
        radius,
    )
}

/// Loads the full disk at the origin and meshes until budgets go idle.
fn settle(world: &mut World<NullRenderer>, frames: usize) {
    for _ in 0..frames {
        world.recenter(0, 0);
        world.remesh();
    }
}

#[test]
fn loads_are_budgeted_per_frame() {
    let mut world = flat_world(4.5, 8);
    for calls in 1..=10 {
        world.recenter(0, 0);
        // Each call may load at most the per-frame budget.
        let mut loaded = 0;
        for x in -5i32..=5 {
            for z in -5i32..=5 {
                if world.chunk(Point2::new(x, z)).is_some() {
                    loaded += 1;
                }
            }
        }
        assert!(loaded <= calls * NUM_CHUNKS_TO_LOAD_PER_FRAME);
    }
}

#[test]
fn chunks_load_closest_first() {
    let mut world = flat_world(4.5, 8);
    world.recenter(0, 0);
    assert!(world.chunk(Point2::new(0, 0)).is_some());
    world.recenter(0, 0);
    world.recenter(0, 0);
    // After three loads, nothing further than distance 1 is loaded.
    for x in -5i32..=5 {
        for z in -5i32..=5 {
            if x * x + z * z > 1 {
                assert!(world.chunk(Point2::new(x, z)).is_none(), "({}, {})", x, z);
            }
        }
    }
}

#[test]
fn edits_appear_in_reads_and_meshes() {
    let mut world = flat_world(1.5, 8);
    settle(&mut world, 64);
    let stats = world.renderer().stats();
    let before = stats.quads_uploaded();

    world.set_block(5, 40, 5, BlockKind::Stone.id());
    assert_eq!(world.get_block(5, 40, 5), BlockKind::Stone.id());
    world.remesh();
    assert!(stats.quads_uploaded() > before);

    world.set_block(5, 40, 5, BlockId::AIR);
    assert_eq!(world.get_block(5, 40, 5), BlockId::AIR);
}

#[test]
fn carved_caves_darken_with_depth() {
    let mut world = flat_world(1.5, 64);
    settle(&mut world, 64);

    // Dig a shaft from the surface down, then a side pocket. Light falls
    // off by one per cell from the lit shaft into the pocket.
    for y in 30..64 {
        world.set_block(8, y, 8, BlockId::AIR);
    }
    world.set_block(9, 30, 8, BlockId::AIR);
    world.set_block(10, 30, 8, BlockId::AIR);
    world.remesh();

    assert_eq!(world.get_light_level(8, 70, 8), SUNLIGHT_LEVEL as u8);
    assert_eq!(world.get_light_level(8, 30, 8), SUNLIGHT_LEVEL as u8);
    assert_eq!(world.get_light_level(9, 30, 8), SUNLIGHT_LEVEL as u8 - 1);
    assert_eq!(world.get_light_level(10, 30, 8), SUNLIGHT_LEVEL as u8 - 2);
    // Still buried.
    assert_eq!(world.get_light_level(12, 30, 8), 0);
}

#[test]
fn light_crosses_chunk_borders() {
    let mut world = flat_world(2.5, 64);
    settle(&mut world, 128);

    // A pocket straddling the seam between chunks (0, 0) and (1, 0), with
    // a glowing block on the near side of the seam.
    world.set_block(14, 30, 8, BlockId::AIR);
    world.set_block(16, 30, 8, BlockId::AIR);
    world.set_block(17, 30, 8, BlockId::AIR);
    world.set_block(15, 30, 8, BlockKind::Fungus.id());
    for _ in 0..8 {
        world.remesh();
    }

    assert_eq!(world.get_light_level(14, 30, 8), 8);
    assert_eq!(world.get_light_level(16, 30, 8), 8);
    assert_eq!(world.get_light_level(17, 30, 8), 7);
}

#[test]
fn noise_world_generates_and_meshes() {
    let renderer = NullRenderer::new();
    let stats = renderer.stats();
    let mut world = World::new(
        renderer,
        Box::new(NoiseLoader::new(7)),
        base_registry(),
        2.5,
    );
    settle(&mut world, 128);

    assert!(stats.live() > 0);
    assert!(stats.quads_uploaded() > 0);
    // The world floor is bedrock everywhere.
    assert_eq!(world.get_block(3, 0, -7), BlockKind::Bedrock.id());
    assert_eq!(world.get_block(3, -1, -7), BlockId::UNKNOWN);
}

#[test]
fn walking_across_the_world_balances_allocations() {
    let mut world = flat_world(2.5, 8);
    let stats = world.renderer().stats();
    settle(&mut world, 64);
    let live_at_rest = stats.live();
    assert!(live_at_rest > 0);

    // Walk east a long way, then let the world settle again. Every mesh
    // left behind must have been disposed.
    for step in 0i32..512 {
        world.recenter(step << CHUNK_BITS, 0);
        world.remesh();
    }
    for _ in 0..64 {
        world.recenter(511 << CHUNK_BITS, 0);
        world.remesh();
    }
    assert!(stats.disposed() > 0);
    // Steady state holds about as many meshes as at the origin; frontier
    // groups along the path are freed as their slots retire.
    assert!(stats.live() <= 4 * live_at_rest + 16);
}

#[test]
fn frontier_extends_past_the_chunk_disk() {
    let mut world = flat_world(2.5, 8);
    settle(&mut world, 128);
    assert!(world.frontier().num_groups() > 0);
}
