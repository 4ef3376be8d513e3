//! Demonstration arena for the engine binary and scenario tests.
//!
//! Builds a flat plain with three obstacles that plain walking cannot get
//! past: a walled pit (escape route), a cliff plateau (tower or stairs) and
//! a chasm (bridge).

use botfleet_types::{BlockPos, Vec3};
use serde::Serialize;
use tracing::info;

use crate::error::WorldError;
use crate::sim::SimWorld;

/// Half-width of the square ground plane.
const ARENA_HALF_WIDTH: i32 = 40;

/// Height of the walls around the pit, in blocks above the ground.
const PIT_WALL_HEIGHT: i32 = 3;

/// Elevation of the plateau's top block.
const PLATEAU_TOP: i32 = 6;

/// Depth of the chasm floor below ground level.
const CHASM_FLOOR: i32 = -8;

/// Standing points of interest in the arena.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArenaLandmarks {
    /// Open ground where groups are spawned.
    pub spawn: Vec3,
    /// Inside the walled pit.
    pub pit: Vec3,
    /// On top of the cliff plateau.
    pub plateau_top: Vec3,
    /// At the foot of the cliff, on the plain.
    pub cliff_base: Vec3,
    /// Just before the chasm.
    pub chasm_near_side: Vec3,
    /// Across the chasm from the spawn.
    pub chasm_far_side: Vec3,
}

/// Build the demonstration arena into `world`.
///
/// # Errors
///
/// Returns [`WorldError::RegionTooLarge`] if any fill exceeds the world's
/// bulk edit limit.
pub fn create_demo_arena(world: &SimWorld) -> Result<ArenaLandmarks, WorldError> {
    // Ground plane at y = 0.
    world.fill(
        BlockPos::new(-ARENA_HALF_WIDTH, 0, -ARENA_HALF_WIDTH),
        BlockPos::new(ARENA_HALF_WIDTH, 0, ARENA_HALF_WIDTH),
    )?;

    // Walled pit: a single open cell ringed by three-high walls.
    let pit = BlockPos::new(20, 1, 0);
    for (dx, dz) in botfleet_types::LATERAL_DIRECTIONS {
        world.fill(
            pit.offset(dx, 0, dz),
            pit.offset(dx, PIT_WALL_HEIGHT - 1, dz),
        )?;
    }

    // Cliff plateau on the west side.
    world.fill(
        BlockPos::new(-30, 1, -10),
        BlockPos::new(-20, PLATEAU_TOP, 10),
    )?;

    // Chasm across the south approach with a floor far below.
    for x in -5..=5 {
        for z in 20..=24 {
            world.remove_block(BlockPos::new(x, 0, z));
        }
    }
    world.fill(BlockPos::new(-5, CHASM_FLOOR, 20), BlockPos::new(5, CHASM_FLOOR, 24))?;

    let landmarks = ArenaLandmarks {
        spawn: BlockPos::new(0, 0, 0).top_center(),
        pit: pit.below().top_center(),
        plateau_top: BlockPos::new(-25, PLATEAU_TOP, 0).top_center(),
        cliff_base: BlockPos::new(-19, 0, 0).top_center(),
        chasm_near_side: BlockPos::new(0, 0, 18).top_center(),
        chasm_far_side: BlockPos::new(0, 0, 27).top_center(),
    };
    info!(blocks = world.block_count(), "demo arena built");
    Ok(landmarks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::WorldQuery;

    #[test]
    fn landmarks_are_standable() {
        let world = SimWorld::new();
        let marks = create_demo_arena(&world).unwrap();
        for point in [
            marks.spawn,
            marks.pit,
            marks.plateau_top,
            marks.cliff_base,
            marks.chasm_near_side,
            marks.chasm_far_side,
        ] {
            assert!(world.is_standable(point.to_block()), "not standable: {point}");
        }
    }

    #[test]
    fn pit_is_walled_in_with_open_sky() {
        let world = SimWorld::new();
        let marks = create_demo_arena(&world).unwrap();
        let feet = marks.pit.to_block();
        let walled = botfleet_types::LATERAL_DIRECTIONS
            .into_iter()
            .filter(|(dx, dz)| world.is_solid(feet.offset(*dx, 0, *dz)))
            .count();
        assert_eq!(walled, 8);
        assert!(world.is_air(feet.offset(0, 2, 0)));
    }

    #[test]
    fn chasm_has_no_ground_within_reach() {
        let world = SimWorld::new();
        create_demo_arena(&world).unwrap();
        assert_eq!(world.find_ground_below(BlockPos::new(0, 0, 22), 3), None);
    }
}
