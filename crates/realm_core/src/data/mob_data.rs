//! Mob kind definitions.

use serde::{Deserialize, Serialize};

use crate::components::{Collider, Stats};

/// Server-authoritative definition of one mob kind.
///
/// # Example RON
///
/// ```ron
/// MobData(
///     hp: 5,
///     atk: 1,
///     speed: 60.0,
///     collider: Circle(radius: 16.0),
///     attack_range: 64.0,
///     hitbox: "enemy_front_box_basic",
///     tags: ["bones", "basic"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobData {
    /// Starting and maximum hit points.
    pub hp: i32,
    /// Attack stat, used as damage when `damage` is unset.
    pub atk: i32,
    /// Damage per hit, overriding `atk`.
    pub damage: Option<i32>,
    /// Chase speed in pixels per second.
    pub speed: f32,
    /// Collision shape.
    pub collider: Collider,
    /// Distance at which the mob stops chasing and attacks.
    pub attack_range: f32,
    /// Length of the attack window.
    pub attack_window_ms: u64,
    /// Cooldown on top of the attack window before the next attack.
    pub extra_cooldown_ms: u64,
    /// Hitbox definition key spawned on attack.
    pub hitbox: String,
    /// Minimum spacing between spawned mobs of this kind.
    pub spawn_separation: f32,
    /// Free-form tags (drops, families).
    pub tags: Vec<String>,
}

impl Default for MobData {
    fn default() -> Self {
        Self {
            hp: 5,
            atk: 1,
            damage: None,
            speed: 60.0,
            collider: Collider::Circle { radius: 16.0 },
            attack_range: 64.0,
            attack_window_ms: 180,
            extra_cooldown_ms: 600,
            hitbox: "enemy_front_box_basic".to_string(),
            spawn_separation: 40.0,
            tags: Vec::new(),
        }
    }
}

impl MobData {
    /// Damage dealt by one hit.
    #[must_use]
    pub fn hit_damage(&self) -> i32 {
        self.damage.unwrap_or(self.atk)
    }

    /// Starting statistics for a freshly spawned mob.
    #[must_use]
    pub fn initial_stats(&self) -> Stats {
        Stats {
            hp: self.hp,
            max_hp: self.hp,
            atk: self.atk,
            spd: self.speed,
            ..Stats::default()
        }
    }

    /// Check if this mob has the specified tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
