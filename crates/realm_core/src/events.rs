//! Typed notifications emitted by an instance.
//!
//! Every mutation that a client needs to hear about pushes one [`SimEvent`]
//! onto the instance's [`EventBus`]. The host drains the bus after each
//! [`Instance::advance`](crate::instance::Instance::advance) or intent call
//! and forwards the events to the transport.

use serde::{Deserialize, Serialize};

use crate::components::{Archetype, EntityId, EntityState};
use crate::data::HitboxShape;
use crate::math::Vec2;

/// Why an entity left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DespawnReason {
    /// Killed in combat.
    Killed,
    /// The owning player disconnected.
    PlayerLeft,
    /// Removed by the host for any other reason.
    Removed,
}

/// A change notification for the owning client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SimEvent {
    /// An entity was added to the store.
    #[serde(rename_all = "camelCase")]
    EntitySpawned {
        /// New entity.
        entity_id: EntityId,
        /// Its archetype.
        archetype: Archetype,
        /// Spawn position.
        pos: Vec2,
    },
    /// FSM state changed.
    #[serde(rename_all = "camelCase")]
    StateChanged {
        /// Entity whose state changed.
        entity_id: EntityId,
        /// New state.
        state: EntityState,
    },
    /// Authoritative position moved.
    #[serde(rename_all = "camelCase")]
    PositionChanged {
        /// Entity that moved.
        entity_id: EntityId,
        /// New position.
        pos: Vec2,
    },
    /// A hitbox started; carries enough data to draw it client side.
    #[serde(rename_all = "camelCase")]
    HitboxSpawned {
        /// Attacking entity.
        entity_id: EntityId,
        /// Shape and dimensions.
        shape: HitboxShape,
        /// Simulation time the hitbox started.
        start_ms: u64,
        /// Lifetime.
        duration_ms: u64,
        /// Aim angle in radians.
        base_angle: f32,
    },
    /// A hitbox connected.
    #[serde(rename_all = "camelCase")]
    EntityHit {
        /// Hitbox owner.
        attacker_id: EntityId,
        /// Entity that was hit.
        target_id: EntityId,
    },
    /// Hit points changed.
    #[serde(rename_all = "camelCase")]
    StatsUpdated {
        /// Entity whose stats changed.
        entity_id: EntityId,
        /// Current hp.
        hp: i32,
        /// Maximum hp.
        max_hp: i32,
    },
    /// An entity left the store.
    #[serde(rename_all = "camelCase")]
    EntityDespawned {
        /// Removed entity.
        entity_id: EntityId,
        /// Why it was removed.
        reason: DespawnReason,
    },
    /// An attack intent was refused because the cooldown is running.
    #[serde(rename_all = "camelCase")]
    AttackDenied {
        /// Entity that tried to attack.
        entity_id: EntityId,
        /// Time until the next attack is allowed.
        remaining_ms: u64,
    },
    /// The post-attack cooldown started.
    #[serde(rename_all = "camelCase")]
    CooldownArmed {
        /// Entity on cooldown.
        entity_id: EntityId,
        /// Simulation time the cooldown ends.
        until_ms: u64,
    },
}

impl SimEvent {
    /// Entity the event is about.
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        match *self {
            Self::EntitySpawned { entity_id, .. }
            | Self::StateChanged { entity_id, .. }
            | Self::PositionChanged { entity_id, .. }
            | Self::HitboxSpawned { entity_id, .. }
            | Self::StatsUpdated { entity_id, .. }
            | Self::EntityDespawned { entity_id, .. }
            | Self::AttackDenied { entity_id, .. }
            | Self::CooldownArmed { entity_id, .. } => entity_id,
            Self::EntityHit { target_id, .. } => target_id,
        }
    }
}

/// Per-instance event queue.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    pending: Vec<SimEvent>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event.
    pub fn emit(&mut self, event: SimEvent) {
        self.pending.push(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Queued events, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[SimEvent] {
        &self.pending
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
