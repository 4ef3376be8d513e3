//! Read-only terrain and entity queries.
//!
//! [`WorldQuery`] is the interface the decision core uses to look at the
//! world. Every method is a pure query with no side effects, and every
//! scan is bounded so no call can loop indefinitely.
//!
//! Implementors only need to provide [`WorldQuery::is_solid`],
//! [`WorldQuery::entity`] and [`WorldQuery::entities_near`]; the ground
//! searches and line-of-sight test have default implementations built on
//! `is_solid`.

use botfleet_types::{BlockPos, EntityRef, EntitySnapshot, Vec3};

/// Maximum number of samples taken along a line-of-sight ray.
const MAX_SIGHT_SAMPLES: u32 = 256;

/// Distance between line-of-sight samples, in blocks.
const SIGHT_SAMPLE_STEP: f64 = 0.25;

/// Terrain and entity queries provided by the host world.
///
/// Implementations must be shareable across the worker pool: the AI pass
/// queries the world from many threads at once.
pub trait WorldQuery: Send + Sync {
    /// Whether the block cell is solid (cannot be walked through).
    fn is_solid(&self, pos: BlockPos) -> bool;

    /// Look up a single entity by reference.
    ///
    /// Returns `None` if the entity does not exist or is not loaded.
    fn entity(&self, entity: EntityRef) -> Option<EntitySnapshot>;

    /// All living entities within `radius` of `center`.
    fn entities_near(&self, center: Vec3, radius: f64) -> Vec<EntitySnapshot>;

    /// Whether the block cell is air.
    fn is_air(&self, pos: BlockPos) -> bool {
        !self.is_solid(pos)
    }

    /// Whether an entity could stand with its feet in `feet`: the feet and
    /// head cells are air and the cell below is solid.
    fn is_standable(&self, feet: BlockPos) -> bool {
        self.is_air(feet) && self.is_air(feet.above()) && self.is_solid(feet.below())
    }

    /// Find the first solid block at or below `from`, scanning at most
    /// `depth` cells down.
    fn find_ground_below(&self, from: BlockPos, depth: u32) -> Option<BlockPos> {
        (0..=depth)
            .map(|d| from.offset(0, -i32::try_from(d).unwrap_or(i32::MAX), 0))
            .find(|pos| self.is_solid(*pos))
    }

    /// Find the first standable feet cell at or above `from`, scanning at
    /// most `height` cells up.
    fn find_ground_above(&self, from: BlockPos, height: u32) -> Option<BlockPos> {
        (0..=height)
            .map(|d| from.offset(0, i32::try_from(d).unwrap_or(i32::MAX), 0))
            .find(|pos| self.is_standable(*pos))
    }

    /// Find the standable feet cell in the column `(x, z)` closest to
    /// elevation `around_y`, searching at most `window` cells up and down.
    ///
    /// Candidates are tried in order of distance from `around_y`, preferring
    /// the higher cell on ties.
    fn find_standable_near(&self, x: i32, z: i32, around_y: i32, window: u32) -> Option<BlockPos> {
        let window = i32::try_from(window).unwrap_or(i32::MAX);
        for d in 0..=window {
            let up = BlockPos::new(x, around_y.saturating_add(d), z);
            if self.is_standable(up) {
                return Some(up);
            }
            if d > 0 {
                let down = BlockPos::new(x, around_y.saturating_sub(d), z);
                if self.is_standable(down) {
                    return Some(down);
                }
            }
        }
        None
    }

    /// Whether a straight segment from `from` to `to` passes only through
    /// air. Sampling stops after a fixed number of steps; longer segments
    /// are reported as blocked.
    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        let length = from.distance(to);
        let samples = (length / SIGHT_SAMPLE_STEP).ceil();
        if samples > f64::from(MAX_SIGHT_SAMPLES) {
            return false;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = samples.max(1.0) as u32;
        let start_cell = from.to_block();
        let end_cell = to.to_block();
        (1..steps).all(|i| {
            let t = f64::from(i) / f64::from(steps);
            let point = Vec3::new(
                (to.x - from.x).mul_add(t, from.x),
                (to.y - from.y).mul_add(t, from.y),
                (to.z - from.z).mul_add(t, from.z),
            );
            let cell = point.to_block();
            cell == start_cell || cell == end_cell || self.is_air(cell)
        })
    }
}
