//! Test fixtures and helpers.
//!
//! Pre-built configurations, maps and instances for consistent testing.
//! Larger set-ups can be described as a RON [`Scenario`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use realm_core::components::EntityId;
use realm_core::config::SimConfig;
use realm_core::data::MobData;
use realm_core::geometry::{MapGeometry, MapRegistry, Solid};
use realm_core::instance::Instance;
use realm_core::math::{Aabb, Vec2};

/// Map used by most fixtures: a 640x640 open arena.
pub const ARENA: &str = "area1/m1";

/// Arena split by a thin vertical wall at x = 320..324.
pub const WALLED: &str = "area1/walled";

/// Player id owning fixture instances.
pub const OWNER: u64 = 1;

/// A mob kind that never moves and soaks many hits.
pub const DUMMY: &str = "dummy";

/// Side length of the fixture maps.
pub const ARENA_SIZE: f32 = 640.0;

/// The default configuration plus a [`DUMMY`] mob kind.
#[must_use]
pub fn test_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.mobs.insert(
        DUMMY.to_string(),
        MobData {
            hp: 50,
            speed: 0.0,
            attack_range: 0.0,
            ..MobData::default()
        },
    );
    config
}

/// Open 640x640 arena.
#[must_use]
pub fn arena_map() -> MapGeometry {
    MapGeometry::new(Aabb::from_origin_size(0.0, 0.0, ARENA_SIZE, ARENA_SIZE))
}

/// Arena with a 4 px wall running its full height at x = 320.
#[must_use]
pub fn wall_map() -> MapGeometry {
    arena_map().with_solid(Solid::rect(320.0, 0.0, 4.0, ARENA_SIZE))
}

/// Registry holding [`ARENA`] and [`WALLED`].
///
/// # Panics
///
/// Panics if the fixture geometry is rejected.
#[must_use]
pub fn test_maps() -> Arc<MapRegistry> {
    let mut maps = MapRegistry::new();
    maps.register(ARENA, arena_map()).expect("arena geometry");
    maps.register(WALLED, wall_map()).expect("walled geometry");
    Arc::new(maps)
}

/// Empty instance over [`test_config`] and [`test_maps`].
#[must_use]
pub fn test_instance() -> Instance {
    Instance::new(OWNER, Arc::new(test_config()), test_maps())
}

/// Instance with a player at the arena centre and `mobs` gablinos on a
/// ring around it, events already drained.
///
/// # Panics
///
/// Panics if the default mob kind is missing from the config.
#[must_use]
pub fn populated_instance(mobs: usize) -> (Instance, EntityId, Vec<EntityId>) {
    let mut instance = test_instance();
    let center = Vec2::new(ARENA_SIZE / 2.0, ARENA_SIZE / 2.0);
    let player = instance.spawn_player(ARENA, 0, center);
    let ids = (0..mobs)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / mobs.max(1) as f32;
            let pos = center + Vec2::from_angle(angle) * 200.0;
            instance
                .spawn_mob("gablino", ARENA, 0, pos)
                .expect("gablino is configured")
        })
        .collect();
    instance.drain_events();
    (instance, player, ids)
}

/// Advance `instance` in `step_ms` increments until `until_ms`.
pub fn run_until(instance: &mut Instance, until_ms: u64, step_ms: u64) {
    let step = step_ms.max(1);
    let mut now = instance.now_ms();
    while now < until_ms {
        now = (now + step).min(until_ms);
        instance.advance(now);
    }
}

// ============================================================================
// RON scenarios
// ============================================================================

/// One mob placement in a [`Scenario`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobPlacement {
    /// Mob kind key.
    pub kind: String,
    /// Spawn position.
    pub position: (f32, f32),
}

/// A declarative starting state.
///
/// # Example RON
///
/// ```ron
/// (
///     map: "area1/walled",
///     player: Some((100.0, 320.0)),
///     mobs: [
///         (kind: "gablino", position: (500.0, 320.0)),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Map every entity spawns on.
    #[serde(default = "default_map")]
    pub map: String,
    /// Player position, if a player is wanted.
    #[serde(default)]
    pub player: Option<(f32, f32)>,
    /// Mobs to place.
    #[serde(default)]
    pub mobs: Vec<MobPlacement>,
}

fn default_map() -> String {
    ARENA.to_string()
}

impl Scenario {
    /// Parse a scenario from RON.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Build a fresh instance. Returns it with the player id (if any) and
    /// the mob ids in placement order; unknown mob kinds are skipped.
    pub fn build(&self) -> (Instance, Option<EntityId>, Vec<EntityId>) {
        let mut instance = test_instance();
        let player = self
            .player
            .map(|(x, y)| instance.spawn_player(&self.map, 0, Vec2::new(x, y)));
        let mut mobs = Vec::with_capacity(self.mobs.len());
        for placement in &self.mobs {
            let (x, y) = placement.position;
            match instance.spawn_mob(&placement.kind, &self.map, 0, Vec2::new(x, y)) {
                Ok(id) => mobs.push(id),
                Err(err) => tracing::warn!(%err, "scenario mob skipped"),
            }
        }
        instance.drain_events();
        tracing::debug!(map = %self.map, mobs = mobs.len(), "scenario built");
        (instance, player, mobs)
    }
}
