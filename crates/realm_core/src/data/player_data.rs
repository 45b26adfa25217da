//! Player archetype defaults.

use serde::{Deserialize, Serialize};

use crate::components::{Collider, Stats};

/// Movement and combat profile shared by every player entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerData {
    /// Starting statistics.
    pub stats: Stats,
    /// Collision shape.
    pub collider: Collider,
    /// Walking speed in pixels per second.
    pub speed: f32,
    /// Hitbox definition key used by the basic attack.
    pub attack_hitbox: String,
    /// Length of the attack window.
    pub attack_window_ms: u64,
    /// Cooldown armed when an attack window finishes.
    pub attack_cooldown_ms: u64,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            stats: Stats::default(),
            collider: Collider::Circle { radius: 20.0 },
            speed: 200.0,
            attack_hitbox: "player_basic_swing".to_string(),
            attack_window_ms: 400,
            attack_cooldown_ms: 1000,
        }
    }
}
