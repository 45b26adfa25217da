//! All player instances of one server process.
//!
//! The world maps each connected player to their private [`Instance`],
//! holds the shared configuration and map registry, and tags drained
//! events with the player they belong to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::PlayerId;
use crate::config::SimConfig;
use crate::error::Result;
use crate::events::SimEvent;
use crate::geometry::{MapGeometry, MapRegistry};
use crate::instance::Instance;

/// An event addressed to one player's client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient.
    pub player_id: PlayerId,
    /// Payload.
    pub event: SimEvent,
}

/// Every live instance plus shared read-only data.
#[derive(Debug, Clone)]
pub struct World {
    config: Arc<SimConfig>,
    maps: Arc<MapRegistry>,
    instances: BTreeMap<PlayerId, Instance>,
    now_ms: u64,
}

impl World {
    /// Create a world after validating `config`.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            maps: Arc::new(MapRegistry::new()),
            instances: BTreeMap::new(),
            now_ms: 0,
        })
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Time of the latest `advance`.
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Shared map registry.
    #[must_use]
    pub fn maps(&self) -> &MapRegistry {
        &self.maps
    }

    /// Register geometry for a map and hand the new registry to every
    /// instance. Returns the number of degenerate solids dropped.
    pub fn register_map(&mut self, map_id: &str, geometry: MapGeometry) -> Result<usize> {
        let dropped = Arc::make_mut(&mut self.maps).register(map_id, geometry)?;
        for instance in self.instances.values_mut() {
            instance.set_maps(Arc::clone(&self.maps));
        }
        Ok(dropped)
    }

    /// Create the instance of a newly connected player, its clock set to
    /// the world's current time. An existing instance for the same player is
    /// returned untouched.
    pub fn add_player(&mut self, player_id: PlayerId) -> &mut Instance {
        let config = &self.config;
        let maps = &self.maps;
        let now_ms = self.now_ms;
        self.instances.entry(player_id).or_insert_with(|| {
            tracing::info!(player = player_id, now_ms, "instance created");
            Instance::new(player_id, Arc::clone(config), Arc::clone(maps)).starting_at(now_ms)
        })
    }

    /// Tear down a player's instance, returning the `playerLeft` despawn
    /// events for delivery. Unknown players yield nothing.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Vec<Envelope> {
        let Some(mut instance) = self.instances.remove(&player_id) else {
            return Vec::new();
        };
        let removed = instance.clear_player();
        tracing::info!(player = player_id, removed, "instance dropped");
        wrap(player_id, instance.drain_events())
    }

    /// A player's instance.
    #[must_use]
    pub fn instance(&self, player_id: PlayerId) -> Option<&Instance> {
        self.instances.get(&player_id)
    }

    /// A player's instance, for routing intents.
    pub fn instance_mut(&mut self, player_id: PlayerId) -> Option<&mut Instance> {
        self.instances.get_mut(&player_id)
    }

    /// Connected players in id order.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.instances.keys().copied()
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// True when no player is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Advance every instance in player order and collect their events.
    pub fn advance(&mut self, now_ms: u64) -> Vec<Envelope> {
        self.now_ms = self.now_ms.max(now_ms);
        let mut out = Vec::new();
        for (&player_id, instance) in &mut self.instances {
            instance.advance(now_ms);
            out.extend(wrap(player_id, instance.drain_events()));
        }
        out
    }

    /// Collect events produced outside `advance` (intent handling).
    pub fn drain_events(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        for (&player_id, instance) in &mut self.instances {
            out.extend(wrap(player_id, instance.drain_events()));
        }
        out
    }
}

fn wrap(player_id: PlayerId, events: Vec<SimEvent>) -> Vec<Envelope> {
    events
        .into_iter()
        .map(|event| Envelope { player_id, event })
        .collect()
}
