//! Fixed-tick movement integrator.
//!
//! Each tick freezes a [`TickSnapshot`], computes a proposal for every
//! walking entity from that snapshot alone, and only then commits. Because
//! no proposal reads another's result, the order entities are processed in
//! never changes the outcome.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::collision::{CoastMemory, Resolver, TickSnapshot};
use crate::components::{EntityId, EntityState};
use crate::config::SimConfig;
use crate::geometry::MapRegistry;
use crate::math::Vec2;
use crate::store::WorldStore;

/// A standing movement request: unit direction scaled by `magnitude`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Unit direction, or zero for "no intent".
    pub dir: Vec2,
    /// Throttle in `[0, 1]`.
    pub magnitude: f32,
}

impl MoveIntent {
    /// No movement.
    pub const NONE: Self = Self {
        dir: Vec2::ZERO,
        magnitude: 0.0,
    };

    /// Intent from a raw client vector. Non-finite input becomes zero;
    /// vectors longer than one are capped at full throttle.
    #[must_use]
    pub fn from_vector(v: Vec2) -> Self {
        let v = v.sanitized();
        match v.try_normalize() {
            Some(dir) => Self {
                dir,
                magnitude: v.length().min(1.0),
            },
            None => Self::NONE,
        }
    }

    /// True when this intent moves nothing.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.magnitude <= 0.0 || self.dir.is_near_zero()
    }

    /// Direction scaled by magnitude.
    #[must_use]
    pub fn vector(&self) -> Vec2 {
        self.dir * self.magnitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Proposal {
    id: EntityId,
    position: Vec2,
    contact: Option<Vec2>,
}

/// Per-instance movement state.
#[derive(Debug, Clone, Default)]
pub struct MovementSystem {
    intents: BTreeMap<EntityId, MoveIntent>,
    last_positions: HashMap<EntityId, Vec2>,
    coast: HashMap<EntityId, CoastMemory>,
}

impl MovementSystem {
    /// Create an empty system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace an entity's intent. A zero intent clears it.
    pub fn set_intent(&mut self, id: EntityId, intent: MoveIntent) {
        if intent.is_zero() {
            self.intents.remove(&id);
        } else {
            self.intents.insert(id, intent);
        }
    }

    /// Remove an entity's intent, returning it.
    pub fn clear(&mut self, id: EntityId) -> Option<MoveIntent> {
        self.intents.remove(&id)
    }

    /// Current intent of an entity.
    #[must_use]
    pub fn intent(&self, id: EntityId) -> Option<MoveIntent> {
        self.intents.get(&id).copied()
    }

    /// Number of standing intents.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    /// Drop everything known about an entity.
    pub fn forget(&mut self, id: EntityId) {
        self.intents.remove(&id);
        self.last_positions.remove(&id);
        self.coast.remove(&id);
    }

    /// Run one movement tick. Returns how many entities changed position.
    pub fn step(
        &mut self,
        store: &mut WorldStore,
        config: &SimConfig,
        maps: &MapRegistry,
        now_ms: u64,
    ) -> usize {
        let snapshot = TickSnapshot::capture(store, &self.last_positions);

        self.intents.retain(|id, _| {
            store
                .get(*id)
                .is_some_and(|e| e.is_alive() && e.state == EntityState::Walk)
        });
        let order: Vec<EntityId> = self.intents.keys().copied().collect();
        let proposals = self.plan_in_order(&order, store, &snapshot, config, maps, now_ms);

        let mut moved = 0;
        for proposal in proposals {
            if store.set_position(proposal.id, proposal.position) {
                moved += 1;
            }
            if let Some(normal) = proposal.contact {
                self.coast.insert(
                    proposal.id,
                    CoastMemory {
                        normal,
                        until_ms: now_ms + config.collision.coast_window_ms,
                    },
                );
            }
        }
        self.coast.retain(|_, memory| memory.is_live(now_ms));

        self.last_positions = snapshot
            .bodies()
            .iter()
            .map(|body| (body.id, body.position))
            .collect();
        moved
    }

    fn plan_in_order(
        &self,
        order: &[EntityId],
        store: &WorldStore,
        snapshot: &TickSnapshot,
        config: &SimConfig,
        maps: &MapRegistry,
        now_ms: u64,
    ) -> Vec<Proposal> {
        let dt = config.loops.movement_dt();
        order
            .iter()
            .filter_map(|&id| {
                let intent = self.intents.get(&id)?;
                let entity = store.get(id)?;
                let body = snapshot.body(id)?;
                let speed = config.speed_for(entity.archetype, entity.mob_kind.as_deref());

                let geometry = maps.get(&entity.map_id).map(|g| &**g);
                let (hx, hy) = entity.collider.extents();
                let walkable = geometry.map(|g| g.walkable(hx, hy));
                let clamp = |p: Vec2| walkable.map_or(p, |area| area.clamp(p));

                let wish = clamp(body.position + intent.vector() * (speed * dt));
                let resolution = Resolver::new(&config.collision, geometry).resolve(
                    body,
                    wish,
                    snapshot,
                    self.coast.get(&id),
                    now_ms,
                );
                Some(Proposal {
                    id,
                    position: clamp(resolution.position),
                    contact: resolution.contact,
                })
            })
            .collect()
    }
}
