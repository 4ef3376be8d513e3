//! Follow-target computation.
//!
//! Each follower stands on a fixed bearing around its leader, derived from
//! its identity. Close followers keep 2.0 to 3.5 blocks away; radius
//! followers spread across 70% to 90% of the group follow radius so the
//! group fans out instead of clumping on the leader.
//!
//! Distance draws come from a generator seeded by identity and a coarse
//! tick bucket, so a target only changes when the bucket rolls over or the
//! leader moves far. Within a bucket the same inputs always give the same
//! point.
//!
//! Speed is the base factor times a slow pace jitter times a catch-up boost
//! that grows in tiers as the follower falls behind.

use rand::Rng;

use botfleet_types::{FollowerClass, Vec3};
use botfleet_world::WorldQuery;

use crate::agent::Agent;
use crate::config::PositioningConfig;
use crate::seed::{self, salt};

/// The cached follow target of one agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowState {
    /// Where the agent is walking to.
    pub target: Vec3,
    /// Leader position when the target was computed.
    pub leader_at: Vec3,
    /// Recompute bucket the target was computed in.
    pub bucket: u64,
}

/// Result of one follow step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowPlan {
    /// Where to walk.
    pub target: Vec3,
    /// Speed factor to walk at.
    pub speed: f64,
    /// Whether the target was recomputed on this call.
    pub recomputed: bool,
}

/// Computes where a follower should stand and how fast to get there.
#[derive(Debug, Clone, Copy)]
pub struct PositioningEngine<'a> {
    config: &'a PositioningConfig,
}

impl<'a> PositioningEngine<'a> {
    /// Create an engine over the given tunables.
    pub const fn new(config: &'a PositioningConfig) -> Self {
        Self { config }
    }

    /// The unsnapped target for a follower in a given bucket.
    ///
    /// Pure in its inputs: same seed, class, leader, radius and bucket give
    /// the same point.
    pub fn raw_target(
        &self,
        seed: u64,
        class: FollowerClass,
        leader: Vec3,
        radius: f64,
        bucket: u64,
    ) -> Vec3 {
        let (min, max) = match class {
            FollowerClass::Close => (self.config.close_min_distance, self.config.close_max_distance),
            FollowerClass::Radius => (
                radius * self.config.radius_min_fraction,
                radius * self.config.radius_max_fraction,
            ),
        };
        let distance = if max > min {
            seed::bucket_rng(seed, salt::DISTANCE, bucket).random_range(min..=max)
        } else {
            min
        };
        let angle = seed::follow_angle(seed);
        leader.offset(angle.cos() * distance, 0.0, angle.sin() * distance)
    }

    /// Snap a point onto the walkable surface nearest the leader's
    /// elevation. Falls back to the raw point when no ground is found
    /// within the window.
    pub fn snap_to_ground(&self, world: &dyn WorldQuery, point: Vec3, leader: Vec3) -> Vec3 {
        let column = point.to_block();
        let around = leader.to_block().y;
        world
            .find_standable_near(column.x, column.z, around, self.config.ground_snap_window)
            .map_or(point.with_y(leader.y), |feet| point.with_y(f64::from(feet.y)))
    }

    /// Pace multiplier for an agent at `tick`, redrawn once per pace bucket.
    pub fn pace(&self, seed: u64, tick: u64) -> f64 {
        let (min, max) = (self.config.pace_jitter_min, self.config.pace_jitter_max);
        if max <= min {
            return min;
        }
        let bucket = seed::bucket_index(seed, tick, self.config.pace_bucket_ticks);
        seed::bucket_rng(seed, salt::PACE, bucket).random_range(min..=max)
    }

    /// Catch-up boost for a follower `distance` away from its leader.
    pub fn boost(&self, distance: f64, radius: f64) -> f64 {
        if distance > radius * self.config.catch_up_far_factor {
            self.config.catch_up_far_boost
        } else if distance > radius * self.config.catch_up_near_factor {
            self.config.catch_up_near_boost
        } else {
            1.0
        }
    }

    /// Compute this agent's follow target and speed, reusing the cached
    /// target where allowed.
    ///
    /// The cached target is kept while the leader has not moved more than
    /// the threshold and either the agent is still on its way or the
    /// recompute bucket has not rolled over.
    pub fn compute_follow_target(
        &self,
        world: &dyn WorldQuery,
        agent: &mut Agent,
        agent_at: Vec3,
        leader_at: Vec3,
        tick: u64,
    ) -> FollowPlan {
        let bucket = seed::bucket_index(agent.seed, tick, self.config.recompute_bucket_ticks);
        let keep = agent.follow.filter(|state| {
            let leader_steady =
                state.leader_at.distance(leader_at) <= self.config.leader_moved_threshold;
            let arrived = agent_at.distance(state.target) <= self.config.arrival_tolerance;
            leader_steady && (!arrived || state.bucket == bucket)
        });

        let (state, recomputed) = match keep {
            Some(state) => (state, false),
            None => {
                let raw = self.raw_target(
                    agent.seed,
                    agent.follower_class,
                    leader_at,
                    agent.follow_radius,
                    bucket,
                );
                let state = FollowState {
                    target: self.snap_to_ground(world, raw, leader_at),
                    leader_at,
                    bucket,
                };
                agent.follow = Some(state);
                (state, true)
            }
        };

        let speed = self.config.base_speed
            * self.pace(agent.seed, tick)
            * self.boost(agent_at.distance(leader_at), agent.follow_radius);
        FollowPlan {
            target: state.target,
            speed,
            recomputed,
        }
    }

    /// Whether the agent is close enough to its target to stand still.
    pub fn has_arrived(&self, agent_at: Vec3, target: Vec3) -> bool {
        agent_at.distance(target) <= self.config.arrival_tolerance
    }
}
