//! Entity data definitions.
//!
//! Components are pure data with no behavior. Systems read and mutate them
//! through [`WorldStore`](crate::store::WorldStore).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Unique identifier for entities within one instance.
pub type EntityId = u64;

/// Identifier of the connected player that owns an instance.
pub type PlayerId = u64;

/// Identifier of a world copy on a map.
pub type InstanceId = u32;

/// Entity category. Selects the FSM table and the movement/combat defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    /// The connected player's avatar.
    Player,
    /// Hostile creature.
    Mob,
    /// Stationary trader.
    Vendor,
    /// Companion following the player.
    Pet,
}

impl Archetype {
    /// All archetypes, in table order.
    pub const ALL: [Archetype; 4] = [Self::Player, Self::Mob, Self::Vendor, Self::Pet];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Mob => "mob",
            Self::Vendor => "vendor",
            Self::Pet => "pet",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity behavior state, driven only through the FSM.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// Standing still.
    #[default]
    Idle,
    /// Moving along a movement intent.
    Walk,
    /// Inside an attack window.
    Attack,
    /// Killed; waiting for despawn or an external death flow.
    Dead,
}

impl EntityState {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Attack => "attack",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collision shape of an entity, centred on its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    /// Circle with the given radius.
    Circle {
        /// Radius in pixels.
        radius: f32,
    },
    /// Axis-aligned box with half extents.
    Box {
        /// Half width.
        hx: f32,
        /// Half height.
        hy: f32,
    },
}

impl Collider {
    /// Half extents of the shape's bounding box.
    #[must_use]
    pub fn extents(&self) -> (f32, f32) {
        match *self {
            Self::Circle { radius } => (radius, radius),
            Self::Box { hx, hy } => (hx, hy),
        }
    }

    /// Radius used wherever a circle approximation is needed.
    #[must_use]
    pub fn radius(&self) -> f32 {
        let (hx, hy) = self.extents();
        hx.max(hy)
    }

    /// True for circle colliders.
    #[must_use]
    pub const fn is_circle(&self) -> bool {
        matches!(self, Self::Circle { .. })
    }

    /// True when every dimension is finite and positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let (hx, hy) = self.extents();
        hx.is_finite() && hy.is_finite() && hx > 0.0 && hy > 0.0
    }
}

impl Default for Collider {
    fn default() -> Self {
        Self::Circle { radius: 20.0 }
    }
}

/// Combat and progression statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Current hit points.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Attack power (damage per hit for players).
    pub atk: i32,
    /// Defense.
    pub def: i32,
    /// Accuracy.
    pub acc: i32,
    /// Movement speed in pixels per second.
    pub spd: f32,
    /// Mana.
    pub mp: i32,
    /// Level.
    pub lvl: u32,
    /// Experience.
    pub exp: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            hp: 10,
            max_hp: 10,
            atk: 1,
            def: 1,
            acc: 1,
            spd: 200.0,
            mp: 5,
            lvl: 1,
            exp: 0,
        }
    }
}

impl Stats {
    /// Subtract `amount` from hp, clamped to `[0, max_hp]`. Returns the new hp.
    pub fn apply_damage(&mut self, amount: i32) -> i32 {
        let max = self.max_hp.max(0);
        self.hp = self.hp.saturating_sub(amount).clamp(0, max);
        self.hp
    }
}

/// A simulated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within the instance.
    pub id: EntityId,
    /// Player whose instance holds this entity.
    pub owner: PlayerId,
    /// Entity category.
    pub archetype: Archetype,
    /// Map the entity lives on.
    pub map_id: String,
    /// World copy on that map.
    pub instance_id: InstanceId,
    /// World position.
    pub position: Vec2,
    /// FSM state.
    pub state: EntityState,
    /// Statistics.
    pub stats: Stats,
    /// Collision shape.
    pub collider: Collider,
    /// Mob kind key for mobs.
    pub mob_kind: Option<String>,
}

impl Entity {
    /// True while the entity can move, attack and be hit.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.stats.hp > 0 && self.state != EntityState::Dead
    }

    /// True when both entities are on the same map copy.
    #[must_use]
    pub fn shares_instance(&self, other: &Entity) -> bool {
        self.map_id == other.map_id && self.instance_id == other.instance_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_damage_clamps() {
        let mut stats = Stats {
            hp: 3,
            max_hp: 5,
            ..Stats::default()
        };
        assert_eq!(stats.apply_damage(1), 2);
        assert_eq!(stats.apply_damage(10), 0);
        // healing never overshoots max_hp
        assert_eq!(stats.apply_damage(-50), 5);
    }

    #[test]
    fn test_collider_radius() {
        assert_eq!(Collider::Circle { radius: 12.0 }.radius(), 12.0);
        assert_eq!(Collider::Box { hx: 25.0, hy: 51.0 }.radius(), 51.0);
        assert!(!Collider::Circle { radius: 0.0 }.is_valid());
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(EntityState::Attack.as_str(), "attack");
        assert_eq!(Archetype::Mob.to_string(), "mob");
    }
}
