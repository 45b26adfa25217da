//! Simulation configuration.
//!
//! [`SimConfig`] gathers everything the core needs to know about archetypes,
//! mob kinds, hitboxes, the FSM and loop timing. It deserializes from RON
//! with a default for every field, and [`SimConfig::validate`] checks it
//! once at load so the tick path can trust it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collision::CollisionTuning;
use crate::components::Archetype;
use crate::data::{HitboxDef, MobData, PlayerData};
use crate::error::{CoreError, Result};
use crate::fsm::TransitionTable;

/// Periods of the per-instance loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopRates {
    /// Movement ticks per second.
    pub movement_hz: u32,
    /// Hitbox tick period.
    pub hitbox_tick_ms: u64,
    /// AI tick period.
    pub ai_tick_ms: u64,
    /// Most ticks of one loop run by a single `advance` call.
    pub max_catch_up_ticks: u32,
}

impl Default for LoopRates {
    fn default() -> Self {
        Self {
            movement_hz: 20,
            hitbox_tick_ms: 16,
            ai_tick_ms: 80,
            max_catch_up_ticks: 4,
        }
    }
}

impl LoopRates {
    /// Movement tick period in milliseconds.
    #[must_use]
    pub fn movement_tick_ms(&self) -> u64 {
        1000 / u64::from(self.movement_hz.max(1))
    }

    /// Movement tick length in seconds.
    #[must_use]
    pub fn movement_dt(&self) -> f32 {
        1.0 / self.movement_hz.max(1) as f32
    }
}

/// Complete simulation configuration.
///
/// # Example RON
///
/// ```ron
/// (
///     player: (speed: 220.0),
///     mobs: {
///         "gablino": (hp: 5, atk: 1, speed: 60.0),
///     },
///     death_despawn_ms: 500,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Player archetype profile.
    pub player: PlayerData,
    /// Mob kinds by key.
    pub mobs: BTreeMap<String, MobData>,
    /// Hitbox definitions by key.
    pub hitboxes: BTreeMap<String, HitboxDef>,
    /// FSM transition rules.
    pub fsm: TransitionTable,
    /// Resolver constants.
    pub collision: CollisionTuning,
    /// Loop periods.
    pub loops: LoopRates,
    /// Speed for archetypes without their own profile.
    pub fallback_speed: f32,
    /// Delay between a mob's death and its removal.
    pub death_despawn_ms: u64,
    /// Minimum displacement that emits `PositionChanged`.
    pub position_epsilon: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            player: PlayerData::default(),
            mobs: BTreeMap::from([("gablino".to_string(), MobData::default())]),
            hitboxes: BTreeMap::from([
                (
                    "player_basic_swing".to_string(),
                    HitboxDef::player_basic_swing(),
                ),
                (
                    "enemy_front_box_basic".to_string(),
                    HitboxDef::enemy_front_box_basic(),
                ),
            ]),
            fsm: TransitionTable::default(),
            collision: CollisionTuning::default(),
            loops: LoopRates::default(),
            fallback_speed: 50.0,
            death_despawn_ms: 500,
            position_epsilon: 0.001,
        }
    }
}

impl SimConfig {
    /// Parse and validate a RON document. `source_name` labels errors.
    pub fn from_ron_str(text: &str, source_name: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| CoreError::ConfigParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross references and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        self.fsm.validate()?;

        if let Some(reason) = self.collision.validation_error() {
            return Err(CoreError::InvalidConfig(format!("collision: {reason}")));
        }
        if self.loops.movement_hz == 0 || self.loops.movement_hz > 1000 {
            return Err(CoreError::InvalidConfig(
                "loops.movement_hz must be in 1..=1000".to_string(),
            ));
        }
        if self.loops.hitbox_tick_ms == 0 || self.loops.ai_tick_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "loop periods must be positive".to_string(),
            ));
        }
        if self.loops.max_catch_up_ticks == 0 {
            return Err(CoreError::InvalidConfig(
                "loops.max_catch_up_ticks must be at least 1".to_string(),
            ));
        }
        if !self.fallback_speed.is_finite() || self.fallback_speed < 0.0 {
            return Err(CoreError::InvalidConfig(
                "fallback_speed must be non-negative".to_string(),
            ));
        }

        for (key, def) in &self.hitboxes {
            if let Some(reason) = def.shape.validation_error() {
                return Err(CoreError::InvalidConfig(format!("hitbox '{key}': {reason}")));
            }
            if def.duration_ms == 0 {
                return Err(CoreError::InvalidConfig(format!(
                    "hitbox '{key}': duration must be positive"
                )));
            }
        }

        self.validate_player()?;
        for (kind, mob) in &self.mobs {
            if !mob.collider.is_valid() {
                return Err(CoreError::InvalidConfig(format!(
                    "mob '{kind}': collider must be positive"
                )));
            }
            if mob.hp <= 0 {
                return Err(CoreError::InvalidConfig(format!("mob '{kind}': hp must be positive")));
            }
            if !mob.speed.is_finite() || mob.speed < 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "mob '{kind}': speed must be non-negative"
                )));
            }
            if !mob.attack_range.is_finite() || mob.attack_range < 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "mob '{kind}': attack_range must be non-negative"
                )));
            }
            if !self.hitboxes.contains_key(&mob.hitbox) {
                return Err(CoreError::UnknownHitboxDef(mob.hitbox.clone()));
            }
        }
        Ok(())
    }

    fn validate_player(&self) -> Result<()> {
        let player = &self.player;
        if !player.collider.is_valid() {
            return Err(CoreError::InvalidConfig(
                "player collider must be positive".to_string(),
            ));
        }
        if player.stats.max_hp <= 0 {
            return Err(CoreError::InvalidConfig(
                "player max_hp must be positive".to_string(),
            ));
        }
        if !player.speed.is_finite() || player.speed < 0.0 {
            return Err(CoreError::InvalidConfig(
                "player speed must be non-negative".to_string(),
            ));
        }
        if !self.hitboxes.contains_key(&player.attack_hitbox) {
            return Err(CoreError::UnknownHitboxDef(player.attack_hitbox.clone()));
        }
        Ok(())
    }

    /// Mob kind by key.
    pub fn mob(&self, kind: &str) -> Result<&MobData> {
        self.mobs
            .get(kind)
            .ok_or_else(|| CoreError::UnknownMobKind(kind.to_string()))
    }

    /// Hitbox definition by key.
    pub fn hitbox(&self, key: &str) -> Result<&HitboxDef> {
        self.hitboxes
            .get(key)
            .ok_or_else(|| CoreError::UnknownHitboxDef(key.to_string()))
    }

    /// Walking speed for an entity: the player profile, the mob kind's
    /// speed, or the archetype fallback.
    #[must_use]
    pub fn speed_for(&self, archetype: Archetype, mob_kind: Option<&str>) -> f32 {
        match archetype {
            Archetype::Player => self.player.speed,
            Archetype::Mob => mob_kind
                .and_then(|kind| self.mobs.get(kind))
                .map_or(self.fallback_speed, |mob| mob.speed),
            Archetype::Vendor | Archetype::Pet => self.fallback_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.loops.movement_tick_ms(), 50);
        assert!((config.loops.movement_dt() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let text = r#"(
            player: (speed: 220.0),
            mobs: { "bat": (hp: 2, speed: 90.0) },
            death_despawn_ms: 750,
        )"#;
        let config = SimConfig::from_ron_str(text, "test").unwrap();
        assert_eq!(config.player.speed, 220.0);
        assert_eq!(config.player.attack_cooldown_ms, 1000);
        assert_eq!(config.death_despawn_ms, 750);
        assert_eq!(config.mob("bat").unwrap().hp, 2);
        assert!(config.mob("gablino").is_err());
        assert_eq!(config.loops.ai_tick_ms, 80);
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = SimConfig::from_ron_str("(player: oops", "sim.ron").unwrap_err();
        assert!(err.to_string().contains("sim.ron"));
    }

    #[test]
    fn test_unknown_mob_hitbox_rejected() {
        let mut config = SimConfig::default();
        if let Some(mob) = config.mobs.get_mut("gablino") {
            mob.hitbox = "missing".to_string();
        }
        assert!(matches!(
            config.validate(),
            Err(CoreError::UnknownHitboxDef(key)) if key == "missing"
        ));
    }

    #[test]
    fn test_speed_lookup() {
        let config = SimConfig::default();
        assert_eq!(config.speed_for(Archetype::Player, None), 200.0);
        assert_eq!(config.speed_for(Archetype::Mob, Some("gablino")), 60.0);
        assert_eq!(config.speed_for(Archetype::Mob, Some("unknown")), 50.0);
        assert_eq!(config.speed_for(Archetype::Pet, None), 50.0);
    }
}
