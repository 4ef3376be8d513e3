//! Tunable parameters for agent decision logic.
//!
//! Three structs bundle every tunable used by the scheduler, the
//! positioning engine and the construction planner. Each has a [`Default`]
//! impl carrying the shipped values and derives [`Deserialize`] so the
//! `behavior`, `positioning` and `construction` sections of
//! `botfleet-config.yaml` can override any subset of fields.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Thresholds for behavior selection and combat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Health fraction below which an agent flees (default: 0.3).
    pub flee_health_fraction: f64,
    /// How far past the nearest threat a fleeing agent runs (default: 12).
    pub flee_distance: f64,
    /// Radius in which hostile entities are noticed (default: 16).
    ///
    /// A clear line of sight is also required.
    pub detection_range: f64,
    /// Radius around a static agent's anchor it will defend (default: 8).
    pub static_defend_range: f64,
    /// Distance at which a strike can be attempted (default: 3.0).
    pub melee_reach: f64,
    /// Minimum ticks between two strikes by the same agent (default: 20).
    pub strike_cooldown_ticks: u64,
    /// Distance from home beyond which a guard walks back (default: 8).
    pub guard_radius: f64,
    /// Re-evaluate the behavior table every Nth AI pass (default: 2).
    pub reevaluate_every_passes: u64,
    /// Speed factor used while closing on a target (default: 1.2).
    pub attack_speed: f64,
    /// Speed factor used while fleeing (default: 1.4).
    pub flee_speed: f64,
    /// How far out from the group a dispersing agent walks (default: 10).
    pub disperse_distance: f64,
    /// Distance at which a patrol waypoint counts as reached (default: 1.5).
    pub waypoint_tolerance: f64,
    /// Default follow radius for agents outside any group (default: 8).
    pub default_follow_radius: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            flee_health_fraction: 0.3,
            flee_distance: 12.0,
            detection_range: 16.0,
            static_defend_range: 8.0,
            melee_reach: 3.0,
            strike_cooldown_ticks: 20,
            guard_radius: 8.0,
            reevaluate_every_passes: 2,
            attack_speed: 1.2,
            flee_speed: 1.4,
            disperse_distance: 10.0,
            waypoint_tolerance: 1.5,
            default_follow_radius: 8.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

/// Parameters of the follow-target algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositioningConfig {
    /// Closest distance a close follower keeps from its leader (default: 2.0).
    pub close_min_distance: f64,
    /// Farthest distance a close follower keeps (default: 3.5).
    pub close_max_distance: f64,
    /// Inner edge of the radius band as a fraction of R (default: 0.7).
    pub radius_min_fraction: f64,
    /// Outer edge of the radius band as a fraction of R (default: 0.9).
    pub radius_max_fraction: f64,
    /// Vertical search window for ground snapping (default: 3).
    pub ground_snap_window: u32,
    /// Length of the follow-target recompute bucket in ticks (default: 40).
    pub recompute_bucket_ticks: u64,
    /// Distance at which a follow target counts as reached (default: 1.0).
    pub arrival_tolerance: f64,
    /// Leader movement that forces a recompute (default: 3.0).
    pub leader_moved_threshold: f64,
    /// Lower bound of the pace multiplier (default: 0.9).
    pub pace_jitter_min: f64,
    /// Upper bound of the pace multiplier (default: 1.1).
    pub pace_jitter_max: f64,
    /// Length of the pace redraw bucket in ticks (default: 100).
    pub pace_bucket_ticks: u64,
    /// Distance in multiples of R past which the first boost applies (default: 1.2).
    pub catch_up_near_factor: f64,
    /// Speed multiplier for the first boost tier (default: 1.3).
    pub catch_up_near_boost: f64,
    /// Distance in multiples of R past which the second boost applies (default: 1.5).
    pub catch_up_far_factor: f64,
    /// Speed multiplier for the second boost tier (default: 1.6).
    pub catch_up_far_boost: f64,
    /// Base speed factor for following (default: 1.0).
    pub base_speed: f64,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            close_min_distance: 2.0,
            close_max_distance: 3.5,
            radius_min_fraction: 0.7,
            radius_max_fraction: 0.9,
            ground_snap_window: 3,
            recompute_bucket_ticks: 40,
            arrival_tolerance: 1.0,
            leader_moved_threshold: 3.0,
            pace_jitter_min: 0.9,
            pace_jitter_max: 1.1,
            pace_bucket_ticks: 100,
            catch_up_near_factor: 1.2,
            catch_up_near_boost: 1.3,
            catch_up_far_factor: 1.5,
            catch_up_far_boost: 1.6,
            base_speed: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Triggers and limits for the obstacle traversal planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    /// Height difference above which a tower or stairs is considered (default: 2.0).
    pub height_trigger: f64,
    /// Horizontal distance within which a height gap triggers (default: 8.0).
    pub height_trigger_horizontal: f64,
    /// Horizontal distance up to which a straight tower is preferred (default: 2.0).
    pub tower_max_horizontal: f64,
    /// Solid lateral directions needed to count as enclosed (default: 6 of 8).
    pub enclosure_min_solid: usize,
    /// Depth probed below each column when looking for gaps (default: 3).
    pub gap_probe_depth: u32,
    /// Consecutive stuck reports before engaging (default: 3).
    pub stuck_checks: u32,
    /// Maximum distance to the target for engaging at all (default: 24).
    pub engagement_range: f64,
    /// Hard cap on placements in one plan (default: 32).
    pub max_placements: usize,
    /// Maximum distance from the agent's eyes to a placement (default: 4.5).
    pub placement_reach: f64,
    /// Plan lifetime in ticks before a forced refresh (default: 100).
    pub refresh_ticks: u64,
    /// Target movement away from the plan anchor that forces a refresh (default: 4.0).
    pub target_moved_threshold: f64,
    /// Building blocks each agent starts with (default: 64).
    pub starting_blocks: u32,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            height_trigger: 2.0,
            height_trigger_horizontal: 8.0,
            tower_max_horizontal: 2.0,
            enclosure_min_solid: 6,
            gap_probe_depth: 3,
            stuck_checks: 3,
            engagement_range: 24.0,
            max_placements: 32,
            placement_reach: 4.5,
            refresh_ticks: 100,
            target_moved_threshold: 4.0,
            starting_blocks: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// All agent tunables, shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentTuning {
    /// Behavior selection and combat.
    pub behavior: BehaviorConfig,
    /// Follow-target computation.
    pub positioning: PositioningConfig,
    /// Obstacle traversal.
    pub construction: ConstructionConfig,
}

impl AgentTuning {
    /// Check that ranges are ordered and periods are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), AgentError> {
        let p = &self.positioning;
        if p.close_min_distance > p.close_max_distance {
            return Err(invalid(
                "positioning.close_min_distance",
                p.close_min_distance,
                "must not exceed close_max_distance",
            ));
        }
        if p.radius_min_fraction > p.radius_max_fraction || p.radius_min_fraction < 0.0 {
            return Err(invalid(
                "positioning.radius_min_fraction",
                p.radius_min_fraction,
                "must be non-negative and not exceed radius_max_fraction",
            ));
        }
        if p.pace_jitter_min > p.pace_jitter_max || p.pace_jitter_min <= 0.0 {
            return Err(invalid(
                "positioning.pace_jitter_min",
                p.pace_jitter_min,
                "must be positive and not exceed pace_jitter_max",
            ));
        }
        if p.recompute_bucket_ticks == 0 {
            return Err(invalid("positioning.recompute_bucket_ticks", 0, "must be positive"));
        }
        if p.pace_bucket_ticks == 0 {
            return Err(invalid("positioning.pace_bucket_ticks", 0, "must be positive"));
        }
        let b = &self.behavior;
        if !(0.0..=1.0).contains(&b.flee_health_fraction) {
            return Err(invalid(
                "behavior.flee_health_fraction",
                b.flee_health_fraction,
                "must be within [0, 1]",
            ));
        }
        if b.reevaluate_every_passes == 0 {
            return Err(invalid("behavior.reevaluate_every_passes", 0, "must be positive"));
        }
        let c = &self.construction;
        if c.max_placements == 0 {
            return Err(invalid("construction.max_placements", 0, "must be positive"));
        }
        if c.enclosure_min_solid > 8 {
            return Err(invalid(
                "construction.enclosure_min_solid",
                c.enclosure_min_solid,
                "there are only 8 lateral directions",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> AgentError {
    AgentError::InvalidConfig {
        field,
        value: value.to_string(),
        reason,
    }
}
