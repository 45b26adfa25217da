//! Per-player entity table.
//!
//! The store owns every entity of one player's instance together with the
//! instance's [`EventBus`]. Mutations that clients care about (spawn, state,
//! position, removal) go through store methods so the matching notification
//! is emitted exactly once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::{
    Archetype, Collider, Entity, EntityId, EntityState, InstanceId, PlayerId, Stats,
};
use crate::events::{DespawnReason, EventBus, SimEvent};
use crate::math::Vec2;

/// Minimum displacement that counts as a position change.
pub const DEFAULT_POSITION_EPSILON: f32 = 0.001;

/// Parameters for spawning a new entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnParams {
    /// Entity category.
    pub archetype: Archetype,
    /// Map to place the entity on.
    pub map_id: String,
    /// World copy on that map.
    pub instance_id: InstanceId,
    /// Initial position.
    pub position: Vec2,
    /// Initial statistics.
    pub stats: Stats,
    /// Collision shape.
    pub collider: Collider,
    /// Mob kind key for mobs.
    pub mob_kind: Option<String>,
}

impl SpawnParams {
    /// Spawn parameters with default stats and collider.
    #[must_use]
    pub fn new(archetype: Archetype, map_id: impl Into<String>, position: Vec2) -> Self {
        Self {
            archetype,
            map_id: map_id.into(),
            instance_id: 0,
            position,
            stats: Stats::default(),
            collider: Collider::default(),
            mob_kind: None,
        }
    }
}

/// Storage for all entities of one player's instance.
///
/// Uses a `HashMap` for O(1) lookup by id, with deterministic iteration via
/// sorted keys when systems process entities.
#[derive(Debug, Clone)]
pub struct WorldStore {
    owner: PlayerId,
    entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
    position_epsilon: f32,
    bus: EventBus,
}

impl WorldStore {
    /// Create an empty store for `owner`.
    #[must_use]
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            entities: HashMap::new(),
            next_id: 1,
            position_epsilon: DEFAULT_POSITION_EPSILON,
            bus: EventBus::new(),
        }
    }

    /// Override the minimum displacement that emits a position event.
    #[must_use]
    pub fn with_position_epsilon(mut self, epsilon: f32) -> Self {
        self.position_epsilon = epsilon.max(0.0);
        self
    }

    /// Player owning this store.
    #[must_use]
    pub const fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Insert a new entity, emit `EntitySpawned` and return its id.
    pub fn spawn(&mut self, params: SpawnParams) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;

        let position = params.position.sanitized();
        let entity = Entity {
            id,
            owner: self.owner,
            archetype: params.archetype,
            map_id: params.map_id,
            instance_id: params.instance_id,
            position,
            state: EntityState::Idle,
            stats: params.stats,
            collider: params.collider,
            mob_kind: params.mob_kind,
        };
        tracing::debug!(
            owner = self.owner,
            entity = id,
            archetype = %entity.archetype,
            "entity spawned"
        );
        self.entities.insert(id, entity);
        self.bus.emit(SimEvent::EntitySpawned {
            entity_id: id,
            archetype: params.archetype,
            pos: position,
        });
        id
    }

    /// Remove an entity and emit `EntityDespawned`.
    pub fn despawn(&mut self, id: EntityId, reason: DespawnReason) -> Option<Entity> {
        let removed = self.entities.remove(&id)?;
        self.bus.emit(SimEvent::EntityDespawned {
            entity_id: id,
            reason,
        });
        Some(removed)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access for combat bookkeeping. State changes must go through
    /// the FSM instead.
    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids in ascending order for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The owning player's avatar, if spawned.
    #[must_use]
    pub fn player_entity(&self) -> Option<&Entity> {
        self.sorted_ids()
            .into_iter()
            .filter_map(|id| self.entities.get(&id))
            .find(|e| e.archetype == Archetype::Player)
    }

    /// Set an entity's state, emitting `StateChanged` when it differs.
    ///
    /// Only the FSM calls this.
    pub(crate) fn set_state(&mut self, id: EntityId, state: EntityState) -> Option<EntityState> {
        let entity = self.entities.get_mut(&id)?;
        if entity.state != state {
            entity.state = state;
            self.bus.emit(SimEvent::StateChanged {
                entity_id: id,
                state,
            });
        }
        Some(state)
    }

    /// Commit a position. Emits `PositionChanged` only when the entity moved
    /// further than the position epsilon. Returns whether an event was sent.
    pub fn set_position(&mut self, id: EntityId, pos: Vec2) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        let pos = pos.sanitized_or(entity.position);
        if entity.position.distance(pos) <= self.position_epsilon {
            return false;
        }
        entity.position = pos;
        self.bus.emit(SimEvent::PositionChanged { entity_id: id, pos });
        true
    }

    /// Queue an event on this instance's bus.
    pub fn emit(&mut self, event: SimEvent) {
        self.bus.emit(event);
    }

    /// The instance's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Take every pending event.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.bus.drain()
    }
}
