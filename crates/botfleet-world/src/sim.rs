//! In-memory voxel world.
//!
//! [`SimWorld`] is a small stand-in for a real game server: a sparse set of
//! solid blocks, a table of entities with position and health, and one
//! straight-line navigation order per agent. It implements every
//! collaborator trait so the decision core can run end to end in tests and
//! in the engine binary.
//!
//! All state sits behind interior locks so a shared `&SimWorld` can be
//! queried from the worker pool while the tick loop owns the only writer.
//! Locks are always taken in the order blocks, entities, navigation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use botfleet_types::{AgentId, BlockPos, EntityRef, EntitySnapshot, NavigationStatus, Vec3};
use tracing::debug;

use crate::error::WorldError;
use crate::navigation::{AgentActions, NavigationPrimitive};
use crate::query::WorldQuery;

/// Maximum number of cells a single [`SimWorld::fill`] may touch.
pub const MAX_FILL_VOLUME: u64 = 262_144;

/// Blocks an agent walks per physics step at speed factor 1.0.
pub const BASE_WALK_STEP: f64 = 0.25;

/// Maximum distance from an agent's eyes to a block it places.
pub const PLACE_REACH: f64 = 4.5;

/// Maximum distance between attacker and target for a strike to land.
pub const STRIKE_REACH: f64 = 3.5;

/// Default health removed by one strike.
pub const DEFAULT_STRIKE_DAMAGE: f64 = 4.0;

/// Height of an entity's eyes above its feet.
const EYE_HEIGHT: f64 = 1.6;

/// Horizontal tolerance for reaching a destination.
const ARRIVAL_HORIZONTAL: f64 = 0.5;

/// Vertical tolerance for reaching a destination.
const ARRIVAL_VERTICAL: f64 = 1.5;

/// How far an entity may fall in one settle before it is left hanging.
const MAX_FALL: u32 = 64;

#[derive(Debug, Clone, Copy)]
struct EntityRecord {
    position: Vec3,
    health: f64,
    max_health: f64,
    alive: bool,
}

impl EntityRecord {
    const fn snapshot(&self, entity: EntityRef) -> EntitySnapshot {
        EntitySnapshot {
            entity,
            position: self.position,
            health: self.health,
            max_health: self.max_health,
            alive: self.alive,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NavOrder {
    destination: Vec3,
    speed: f64,
    status: NavigationStatus,
}

/// An in-memory block world with entities and simple walking physics.
#[derive(Debug)]
pub struct SimWorld {
    blocks: RwLock<BTreeSet<BlockPos>>,
    entities: RwLock<BTreeMap<EntityRef, EntityRecord>>,
    navigation: RwLock<BTreeMap<AgentId, NavOrder>>,
    strike_damage: f64,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Create an empty world.
    pub const fn new() -> Self {
        Self {
            blocks: RwLock::new(BTreeSet::new()),
            entities: RwLock::new(BTreeMap::new()),
            navigation: RwLock::new(BTreeMap::new()),
            strike_damage: DEFAULT_STRIKE_DAMAGE,
        }
    }

    /// Set the damage dealt by each successful strike.
    #[must_use]
    pub fn with_strike_damage(mut self, damage: f64) -> Self {
        self.strike_damage = damage;
        self
    }

    // -------------------------------------------------------------------
    // Terrain editing
    // -------------------------------------------------------------------

    /// Make a block cell solid.
    pub fn set_block(&self, pos: BlockPos) {
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pos);
    }

    /// Make a block cell air. Returns whether the cell was solid.
    pub fn remove_block(&self, pos: BlockPos) -> bool {
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pos)
    }

    /// Fill the axis-aligned box between two corners (inclusive) with solid
    /// blocks.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RegionTooLarge`] if the box covers more than
    /// [`MAX_FILL_VOLUME`] cells. Nothing is placed in that case.
    pub fn fill(&self, from: BlockPos, to: BlockPos) -> Result<u64, WorldError> {
        let (min_x, max_x) = (from.x.min(to.x), from.x.max(to.x));
        let (min_y, max_y) = (from.y.min(to.y), from.y.max(to.y));
        let (min_z, max_z) = (from.z.min(to.z), from.z.max(to.z));
        let span = |lo: i32, hi: i32| u64::from(hi.abs_diff(lo)).saturating_add(1);
        let volume = span(min_x, max_x)
            .saturating_mul(span(min_y, max_y))
            .saturating_mul(span(min_z, max_z));
        if volume > MAX_FILL_VOLUME {
            return Err(WorldError::RegionTooLarge {
                from,
                to,
                volume,
                max: MAX_FILL_VOLUME,
            });
        }
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                for z in min_z..=max_z {
                    blocks.insert(BlockPos::new(x, y, z));
                }
            }
        }
        Ok(volume)
    }

    /// Number of solid cells in the world.
    pub fn block_count(&self) -> usize {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // -------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------

    /// Add a living entity at `position` with full health.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if the entity already exists.
    pub fn spawn_entity(
        &self,
        entity: EntityRef,
        position: Vec3,
        max_health: f64,
    ) -> Result<(), WorldError> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        if entities.contains_key(&entity) {
            return Err(WorldError::DuplicateEntity(entity));
        }
        entities.insert(
            entity,
            EntityRecord {
                position,
                health: max_health,
                max_health,
                alive: true,
            },
        );
        debug!(%entity, %position, "entity spawned");
        Ok(())
    }

    /// Remove an entity entirely, along with any navigation order it had.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity does not exist.
    pub fn despawn(&self, entity: EntityRef) -> Result<(), WorldError> {
        let removed = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&entity);
        if removed.is_none() {
            return Err(WorldError::EntityNotFound(entity));
        }
        if let EntityRef::Agent(agent) = entity {
            self.clear_order(agent);
        }
        debug!(%entity, "entity despawned");
        Ok(())
    }

    /// Set an entity's health. Health at or below zero kills it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity does not exist.
    pub fn set_health(&self, entity: EntityRef, health: f64) -> Result<(), WorldError> {
        let died = {
            let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
            let record = entities
                .get_mut(&entity)
                .ok_or(WorldError::EntityNotFound(entity))?;
            record.health = health.min(record.max_health);
            if record.health <= 0.0 {
                record.health = 0.0;
                record.alive = false;
            }
            !record.alive
        };
        if died {
            if let EntityRef::Agent(agent) = entity {
                self.clear_order(agent);
            }
        }
        Ok(())
    }

    /// Kill an entity outright. It stays in the world, marked dead.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity does not exist.
    pub fn kill(&self, entity: EntityRef) -> Result<(), WorldError> {
        self.set_health(entity, 0.0)
    }

    /// Teleport an entity.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity does not exist.
    pub fn set_position(&self, entity: EntityRef, position: Vec3) -> Result<(), WorldError> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        let record = entities
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        record.position = position;
        Ok(())
    }

    /// Number of entities still marked alive.
    pub fn living_count(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.alive)
            .count()
    }

    fn clear_order(&self, agent: AgentId) {
        self.navigation
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent);
    }

    // -------------------------------------------------------------------
    // Physics
    // -------------------------------------------------------------------

    /// Advance walking physics by one step.
    ///
    /// Every agent with an active order walks straight toward its
    /// destination, climbing single-block steps and falling into holes.
    /// Blocked agents are reported as stuck. Afterwards every living entity
    /// settles onto the ground beneath it.
    pub fn step(&self) {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        let mut navigation = self
            .navigation
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for (agent, order) in navigation.iter_mut() {
            if matches!(order.status, NavigationStatus::Done | NavigationStatus::Idle) {
                continue;
            }
            let Some(record) = entities.get_mut(&EntityRef::Agent(*agent)) else {
                order.status = NavigationStatus::Idle;
                continue;
            };
            if !record.alive {
                order.status = NavigationStatus::Idle;
                continue;
            }
            order.status = walk(&blocks, record, order);
        }
        navigation.retain(|_, order| order.status != NavigationStatus::Idle);

        for record in entities.values_mut().filter(|r| r.alive) {
            settle(&blocks, record);
        }
    }
}

// ---------------------------------------------------------------------------
// Terrain helpers over a borrowed block set
// ---------------------------------------------------------------------------

fn solid(blocks: &BTreeSet<BlockPos>, pos: BlockPos) -> bool {
    blocks.contains(&pos)
}

fn passable(blocks: &BTreeSet<BlockPos>, feet: BlockPos) -> bool {
    !solid(blocks, feet) && !solid(blocks, feet.above())
}

fn arrived(position: Vec3, destination: Vec3) -> bool {
    position.horizontal_distance(destination) <= ARRIVAL_HORIZONTAL
        && (position.y - destination.y).abs() <= ARRIVAL_VERTICAL
}

/// Move one walking step. Returns the new navigation status.
fn walk(blocks: &BTreeSet<BlockPos>, record: &mut EntityRecord, order: &NavOrder) -> NavigationStatus {
    let position = record.position;
    if arrived(position, order.destination) {
        return NavigationStatus::Done;
    }
    let Some((dx, dz)) = position.horizontal_direction_to(order.destination) else {
        // Same column but wrong height; only terrain changes can fix that.
        return NavigationStatus::Stuck;
    };
    let step = (BASE_WALK_STEP * order.speed.max(0.0))
        .min(position.horizontal_distance(order.destination));
    let next = position.offset(dx * step, 0.0, dz * step);
    let feet = next.to_block();

    if passable(blocks, feet) {
        record.position = next;
    } else if passable(blocks, feet.above()) && !solid(blocks, position.to_block().offset(0, 2, 0)) {
        record.position = next.with_y(f64::from(feet.y) + 1.0);
    } else {
        return NavigationStatus::Stuck;
    }

    if arrived(record.position, order.destination) {
        NavigationStatus::Done
    } else {
        NavigationStatus::InProgress
    }
}

/// Drop an entity onto the first solid block beneath its feet.
fn settle(blocks: &BTreeSet<BlockPos>, record: &mut EntityRecord) {
    let feet = record.position.to_block();
    if solid(blocks, feet.below()) {
        return;
    }
    let ground = (1..=MAX_FALL)
        .map(|d| feet.offset(0, -i32::try_from(d).unwrap_or(i32::MAX), 0))
        .find(|pos| solid(blocks, *pos));
    if let Some(ground) = ground {
        record.position = record.position.with_y(f64::from(ground.y) + 1.0);
    }
}

// ---------------------------------------------------------------------------
// Collaborator trait implementations
// ---------------------------------------------------------------------------

impl WorldQuery for SimWorld {
    fn is_solid(&self, pos: BlockPos) -> bool {
        solid(
            &self.blocks.read().unwrap_or_else(PoisonError::into_inner),
            pos,
        )
    }

    fn entity(&self, entity: EntityRef) -> Option<EntitySnapshot> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity)
            .map(|record| record.snapshot(entity))
    }

    fn entities_near(&self, center: Vec3, radius: f64) -> Vec<EntitySnapshot> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, r)| r.alive && r.position.distance(center) <= radius)
            .map(|(entity, r)| r.snapshot(*entity))
            .collect()
    }
}

impl NavigationPrimitive for SimWorld {
    fn move_to(&self, agent: AgentId, destination: Vec3, speed: f64) -> bool {
        let alive = self
            .entity(EntityRef::Agent(agent))
            .is_some_and(|s| s.alive);
        if !alive || !speed.is_finite() || speed <= 0.0 {
            return false;
        }
        self.navigation
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                agent,
                NavOrder {
                    destination,
                    speed,
                    status: NavigationStatus::InProgress,
                },
            );
        true
    }

    fn stop(&self, agent: AgentId) {
        self.clear_order(agent);
    }

    fn status(&self, agent: AgentId) -> NavigationStatus {
        self.navigation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent)
            .map_or(NavigationStatus::Idle, |order| order.status)
    }

    fn current_path(&self, agent: AgentId) -> Option<Vec<Vec3>> {
        let destination = self.destination(agent)?;
        let here = self.entity(EntityRef::Agent(agent))?.position;
        Some(vec![here, destination])
    }

    fn destination(&self, agent: AgentId) -> Option<Vec3> {
        self.navigation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent)
            .filter(|order| order.status != NavigationStatus::Done)
            .map(|order| order.destination)
    }
}

impl AgentActions for SimWorld {
    fn place_block(&self, agent: AgentId, pos: BlockPos) -> bool {
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);

        let Some(builder) = entities.get(&EntityRef::Agent(agent)).filter(|r| r.alive) else {
            return false;
        };
        let eyes = builder.position.offset(0.0, EYE_HEIGHT, 0.0);
        if solid(&blocks, pos)
            || !pos.face_neighbors().any(|n| solid(&blocks, n))
            || eyes.distance(pos.center()) > PLACE_REACH
        {
            return false;
        }
        blocks.insert(pos);

        // Anyone standing in the new block is pushed up onto it.
        for record in entities.values_mut() {
            if record.position.to_block() == pos {
                record.position = record.position.with_y(f64::from(pos.y) + 1.0);
            }
        }
        true
    }

    fn strike(&self, agent: AgentId, target: EntityRef) -> bool {
        let killed = {
            let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
            let Some(attacker) = entities.get(&EntityRef::Agent(agent)).filter(|r| r.alive) else {
                return false;
            };
            let from = attacker.position;
            let Some(victim) = entities.get_mut(&target).filter(|r| r.alive) else {
                return false;
            };
            if victim.position.distance(from) > STRIKE_REACH {
                return false;
            }
            victim.health = (victim.health - self.strike_damage).max(0.0);
            if victim.health <= 0.0 {
                victim.alive = false;
                true
            } else {
                false
            }
        };
        if killed {
            debug!(%agent, %target, "strike was fatal");
            if let EntityRef::Agent(victim) = target {
                self.clear_order(victim);
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botfleet_types::PlayerId;

    use super::*;

    fn flat_world() -> SimWorld {
        let world = SimWorld::new();
        world
            .fill(BlockPos::new(-16, 0, -16), BlockPos::new(16, 0, 16))
            .unwrap();
        world
    }

    fn spawn_agent(world: &SimWorld, position: Vec3) -> AgentId {
        let id = AgentId::new();
        world
            .spawn_entity(EntityRef::Agent(id), position, 20.0)
            .unwrap();
        id
    }

    #[test]
    fn fill_rejects_oversized_regions() {
        let world = SimWorld::new();
        let result = world.fill(BlockPos::new(0, 0, 0), BlockPos::new(1000, 1000, 1000));
        assert!(matches!(result, Err(WorldError::RegionTooLarge { .. })));
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn duplicate_spawn_is_rejected() {
        let world = flat_world();
        let id = spawn_agent(&world, Vec3::new(0.5, 1.0, 0.5));
        let again = world.spawn_entity(EntityRef::Agent(id), Vec3::ZERO, 20.0);
        assert!(matches!(again, Err(WorldError::DuplicateEntity(_))));
    }

    #[test]
    fn walking_reaches_destination() {
        let world = flat_world();
        let id = spawn_agent(&world, Vec3::new(0.5, 1.0, 0.5));
        assert!(world.move_to(id, Vec3::new(4.5, 1.0, 0.5), 1.0));
        for _ in 0..40 {
            world.step();
        }
        assert!(world.is_done(id));
        let pos = world.entity(EntityRef::Agent(id)).unwrap().position;
        assert!(pos.horizontal_distance(Vec3::new(4.5, 1.0, 0.5)) <= ARRIVAL_HORIZONTAL);
    }

    #[test]
    fn walking_climbs_single_steps_but_not_walls() {
        let world = flat_world();
        world.set_block(BlockPos::new(2, 1, 0));
        let id = spawn_agent(&world, Vec3::new(0.5, 1.0, 0.5));
        world.move_to(id, Vec3::new(2.5, 2.0, 0.5), 1.0);
        for _ in 0..20 {
            world.step();
        }
        let pos = world.entity(EntityRef::Agent(id)).unwrap().position;
        assert!((pos.y - 2.0).abs() < 1e-9);

        world.fill(BlockPos::new(5, 1, -2), BlockPos::new(5, 3, 2)).unwrap();
        world.move_to(id, Vec3::new(8.5, 1.0, 0.5), 1.0);
        for _ in 0..40 {
            world.step();
        }
        assert!(world.is_stuck(id));
    }

    #[test]
    fn placing_under_own_feet_lifts_the_builder() {
        let world = flat_world();
        let id = spawn_agent(&world, Vec3::new(0.5, 1.0, 0.5));
        assert!(world.place_block(id, BlockPos::new(0, 1, 0)));
        let pos = world.entity(EntityRef::Agent(id)).unwrap().position;
        assert!((pos.y - 2.0).abs() < 1e-9);
        // Floating cells with no support are refused.
        assert!(!world.place_block(id, BlockPos::new(3, 5, 3)));
    }

    #[test]
    fn strikes_kill_and_clear_navigation() {
        let world = flat_world().with_strike_damage(10.0);
        let attacker = spawn_agent(&world, Vec3::new(0.5, 1.0, 0.5));
        let victim = spawn_agent(&world, Vec3::new(2.5, 1.0, 0.5));
        world.move_to(victim, Vec3::new(10.5, 1.0, 0.5), 1.0);
        assert!(world.strike(attacker, EntityRef::Agent(victim)));
        assert!(world.strike(attacker, EntityRef::Agent(victim)));
        let snapshot = world.entity(EntityRef::Agent(victim)).unwrap();
        assert!(!snapshot.alive);
        assert_eq!(world.status(victim), NavigationStatus::Idle);
        // Dead targets cannot be struck again.
        assert!(!world.strike(attacker, EntityRef::Agent(victim)));
    }

    #[test]
    fn entities_near_skips_dead_and_distant() {
        let world = flat_world();
        let near = spawn_agent(&world, Vec3::new(1.5, 1.0, 0.5));
        let far = spawn_agent(&world, Vec3::new(15.5, 1.0, 0.5));
        let player = EntityRef::Player(PlayerId::new());
        world
            .spawn_entity(player, Vec3::new(0.5, 1.0, 2.5), 20.0)
            .unwrap();
        world.kill(player).unwrap();

        let found: Vec<EntityRef> = world
            .entities_near(Vec3::new(0.5, 1.0, 0.5), 5.0)
            .into_iter()
            .map(|s| s.entity)
            .collect();
        assert_eq!(found, vec![EntityRef::Agent(near)]);
        assert!(!found.contains(&EntityRef::Agent(far)));
    }
}
