//! Per-player simulation context.
//!
//! An [`Instance`] owns everything one connected player's world needs: the
//! entity store and event bus, the scheduler, and the movement, attack,
//! hitbox and AI systems. Instances share nothing mutable, so the host can
//! drive them independently.
//!
//! # Loop Execution Order
//!
//! Each [`Instance::advance`] call:
//! 1. **Scheduler** - run every task due at `now_ms` (attack completion,
//!    delayed despawn)
//! 2. **Movement** - fixed-rate integrator ticks
//! 3. **Hitboxes** - hit detection and damage
//! 4. **AI** - mob chase and attack decisions
//!
//! Each loop runs as many ticks as its period allows since the last call,
//! capped by `max_catch_up_ticks`; older backlog is dropped.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ai::AiSystem;
use crate::attack::AttackWindows;
use crate::components::{Archetype, Entity, EntityId, EntityState, InstanceId, PlayerId, Stats};
use crate::config::SimConfig;
use crate::error::Result;
use crate::events::{DespawnReason, SimEvent};
use crate::fsm::{FsmOutcome, Intent};
use crate::geometry::MapRegistry;
use crate::hitbox::HitboxManager;
use crate::math::Vec2;
use crate::movement::{MoveIntent, MovementSystem};
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::store::{SpawnParams, WorldStore};

/// Mutable systems handed to the per-tick loops.
#[derive(Debug)]
pub struct TickContext<'a> {
    /// Entity table and event bus.
    pub store: &'a mut WorldStore,
    /// Movement intents.
    pub movement: &'a mut MovementSystem,
    /// Attack windows and cooldowns.
    pub attacks: &'a mut AttackWindows,
    /// Timer queue.
    pub scheduler: &'a mut Scheduler,
    /// Validated configuration.
    pub config: &'a SimConfig,
}

/// Result of a move intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum MoveOutcome {
    /// The entity is walking with the new intent.
    Moving,
    /// The entity is attacking; the move replays when the window closes.
    Queued,
    /// The intent was cleared.
    Stopped,
    /// The FSM has no rule for this intent in the current state.
    Blocked {
        /// Current state.
        from: EntityState,
    },
    /// No such entity.
    UnknownEntity,
}

/// Result of an attack intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AttackOutcome {
    /// An attack window opened.
    Started,
    /// The post-attack cooldown is still running.
    #[serde(rename_all = "camelCase")]
    Denied {
        /// Time until the next attack is allowed.
        remaining_ms: u64,
    },
    /// The FSM refused the transition (already attacking, dead, ...).
    Blocked {
        /// Current state.
        from: EntityState,
    },
    /// No such entity.
    UnknownEntity,
}

/// Work done by one [`Instance::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Scheduled tasks that ran.
    pub tasks_run: usize,
    /// Movement ticks run.
    pub movement_ticks: u32,
    /// Hitbox ticks run.
    pub hitbox_ticks: u32,
    /// AI ticks run.
    pub ai_ticks: u32,
    /// Hits applied.
    pub hits: usize,
}

/// Fixed-period loop clock with a catch-up cap.
#[derive(Debug, Clone, Copy)]
struct LoopClock {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl LoopClock {
    const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            next_due_ms: None,
        }
    }

    /// Timestamps of the ticks due by `now_ms`, oldest first. The first call
    /// ticks immediately.
    fn take_due(&mut self, now_ms: u64, cap: u32) -> Vec<u64> {
        let period = self.period_ms.max(1);
        let mut due = *self.next_due_ms.get_or_insert(now_ms);
        let mut ticks = Vec::new();
        while due <= now_ms && ticks.len() < cap as usize {
            ticks.push(due);
            due += period;
        }
        if due <= now_ms {
            let skipped = (now_ms - due) / period + 1;
            tracing::debug!(period_ms = period, skipped, "loop fell behind, dropping ticks");
            due += skipped * period;
        }
        self.next_due_ms = Some(due);
        ticks
    }
}

/// One player's private simulation.
#[derive(Debug, Clone)]
pub struct Instance {
    owner: PlayerId,
    config: Arc<SimConfig>,
    maps: Arc<MapRegistry>,
    store: WorldStore,
    scheduler: Scheduler,
    movement: MovementSystem,
    attacks: AttackWindows,
    hitboxes: HitboxManager,
    ai: AiSystem,
    movement_clock: LoopClock,
    hitbox_clock: LoopClock,
    ai_clock: LoopClock,
    now_ms: u64,
}

impl Instance {
    /// Create an empty instance for `owner`. The config must already be
    /// validated.
    #[must_use]
    pub fn new(owner: PlayerId, config: Arc<SimConfig>, maps: Arc<MapRegistry>) -> Self {
        let loops = config.loops.clone();
        Self {
            owner,
            store: WorldStore::new(owner).with_position_epsilon(config.position_epsilon),
            scheduler: Scheduler::new(),
            movement: MovementSystem::new(),
            attacks: AttackWindows::new(),
            hitboxes: HitboxManager::new(),
            ai: AiSystem::new(),
            movement_clock: LoopClock::new(loops.movement_tick_ms()),
            hitbox_clock: LoopClock::new(loops.hitbox_tick_ms),
            ai_clock: LoopClock::new(loops.ai_tick_ms),
            now_ms: 0,
            config,
            maps,
        }
    }

    /// Start the instance clock at `now_ms` instead of zero, for players
    /// joining a world that is already running.
    #[must_use]
    pub fn starting_at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Owning player.
    #[must_use]
    pub const fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Time of the latest `advance`.
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Entity table.
    #[must_use]
    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Attack windows and cooldowns.
    #[must_use]
    pub fn attacks(&self) -> &AttackWindows {
        &self.attacks
    }

    /// Movement intents.
    #[must_use]
    pub fn movement(&self) -> &MovementSystem {
        &self.movement
    }

    /// Live hitboxes.
    #[must_use]
    pub fn hitboxes(&self) -> &HitboxManager {
        &self.hitboxes
    }

    /// Pending timers.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// An entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    /// Statistics of an entity.
    #[must_use]
    pub fn stats_of(&self, id: EntityId) -> Option<Stats> {
        self.store.get(id).map(|e| e.stats)
    }

    /// Swap in a newer map registry.
    pub fn set_maps(&mut self, maps: Arc<MapRegistry>) {
        self.maps = maps;
    }

    /// Take every pending event.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.store.drain_events()
    }

    // ========================================================================
    // Spawning
    // ========================================================================

    /// Spawn an entity from explicit parameters. The position is pulled
    /// into the map's walkable area when the map is known.
    pub fn spawn(&mut self, mut params: SpawnParams) -> EntityId {
        match self.maps.get(&params.map_id) {
            Some(geometry) => {
                let (hx, hy) = params.collider.extents();
                params.position = geometry
                    .walkable(hx, hy)
                    .clamp(params.position.sanitized());
            }
            None => {
                tracing::warn!(map = %params.map_id, "spawning on a map with no registered geometry");
            }
        }
        let id = self.store.spawn(params);
        tracing::info!(owner = self.owner, entity = id, "spawned");
        id
    }

    /// Spawn the player's avatar with the configured profile.
    pub fn spawn_player(&mut self, map_id: &str, instance_id: InstanceId, pos: Vec2) -> EntityId {
        let player = &self.config.player;
        let params = SpawnParams {
            archetype: Archetype::Player,
            map_id: map_id.to_string(),
            instance_id,
            position: pos,
            stats: player.stats,
            collider: player.collider,
            mob_kind: None,
        };
        self.spawn(params)
    }

    /// Spawn a mob of a configured kind.
    pub fn spawn_mob(
        &mut self,
        kind: &str,
        map_id: &str,
        instance_id: InstanceId,
        pos: Vec2,
    ) -> Result<EntityId> {
        let mob = self.config.mob(kind)?;
        let params = SpawnParams {
            archetype: Archetype::Mob,
            map_id: map_id.to_string(),
            instance_id,
            position: pos,
            stats: mob.initial_stats(),
            collider: mob.collider,
            mob_kind: Some(kind.to_string()),
        };
        Ok(self.spawn(params))
    }

    /// Remove an entity now, dropping its intents, windows, hitboxes and
    /// timers. Returns false for unknown ids.
    pub fn despawn(&mut self, id: EntityId, reason: DespawnReason) -> bool {
        self.movement.forget(id);
        self.attacks.forget(&mut self.scheduler, id);
        self.scheduler.cancel_entity(id);
        self.hitboxes.remove_owned_by(id);
        let removed = self.store.despawn(id, reason).is_some();
        if removed {
            tracing::info!(owner = self.owner, entity = id, ?reason, "despawned");
        }
        removed
    }

    /// Remove an entity after `delay_ms`. Returns a handle for
    /// [`cancel_despawn`](Self::cancel_despawn), or `None` for unknown ids.
    pub fn schedule_despawn(
        &mut self,
        id: EntityId,
        delay_ms: u64,
        reason: DespawnReason,
    ) -> Option<TaskHandle> {
        if !self.store.contains(id) {
            return None;
        }
        Some(self.scheduler.schedule(
            self.now_ms + delay_ms,
            Task::Despawn { entity: id, reason },
        ))
    }

    /// Cancel a scheduled despawn.
    pub fn cancel_despawn(&mut self, handle: TaskHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    /// Despawn every entity with reason `playerLeft`. Returns how many were
    /// removed.
    pub fn clear_player(&mut self) -> usize {
        let ids = self.store.sorted_ids();
        let removed = ids
            .into_iter()
            .filter(|&id| self.despawn(id, DespawnReason::PlayerLeft))
            .count();
        self.scheduler.clear();
        removed
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Start or redirect movement. During an attack the move is queued.
    pub fn move_intent_start(&mut self, id: EntityId, dir: Vec2) -> MoveOutcome {
        if !self.store.contains(id) {
            return MoveOutcome::UnknownEntity;
        }
        let intent = MoveIntent::from_vector(dir);
        if intent.is_zero() {
            return self.move_intent_stop(id);
        }
        if self.attacks.queue_move(id, intent) {
            return MoveOutcome::Queued;
        }
        match self
            .config
            .fsm
            .apply(&mut self.store, id, Intent::MoveIntentStart)
        {
            FsmOutcome::Applied { .. } => {
                self.movement.set_intent(id, intent);
                MoveOutcome::Moving
            }
            FsmOutcome::Blocked { from } => MoveOutcome::Blocked { from },
            FsmOutcome::UnknownEntity => MoveOutcome::UnknownEntity,
        }
    }

    /// Stop moving. During an attack this drops the queued move and the
    /// resume direction.
    pub fn move_intent_stop(&mut self, id: EntityId) -> MoveOutcome {
        if !self.store.contains(id) {
            return MoveOutcome::UnknownEntity;
        }
        self.movement.clear(id);
        if self.attacks.is_attacking(id) {
            self.attacks.clear_queued(id);
            return MoveOutcome::Stopped;
        }
        match self
            .config
            .fsm
            .apply(&mut self.store, id, Intent::MoveIntentStop)
        {
            FsmOutcome::Applied { .. } => MoveOutcome::Stopped,
            FsmOutcome::Blocked { from } => MoveOutcome::Blocked { from },
            FsmOutcome::UnknownEntity => MoveOutcome::UnknownEntity,
        }
    }

    /// Attack toward the world point `aim`.
    ///
    /// Players on cooldown are denied with the remaining time. The current
    /// movement intent becomes the direction resumed after the window.
    pub fn attack_intent_start(&mut self, id: EntityId, aim: Vec2) -> AttackOutcome {
        let Some(entity) = self.store.get(id) else {
            return AttackOutcome::UnknownEntity;
        };
        let archetype = entity.archetype;
        let origin = entity.position;
        let mob_kind = entity.mob_kind.clone();
        let now = self.now_ms;

        if archetype == Archetype::Player {
            let remaining_ms = self.attacks.cooldown_remaining(id, now);
            if remaining_ms > 0 {
                self.store.emit(SimEvent::AttackDenied {
                    entity_id: id,
                    remaining_ms,
                });
                return AttackOutcome::Denied { remaining_ms };
            }
        }

        let resume = self.movement.intent(id);
        match self
            .config
            .fsm
            .apply(&mut self.store, id, Intent::AttackIntentStart)
        {
            FsmOutcome::Applied { .. } => {}
            FsmOutcome::Blocked { from } => return AttackOutcome::Blocked { from },
            FsmOutcome::UnknownEntity => return AttackOutcome::UnknownEntity,
        }
        self.movement.clear(id);

        let aim = aim.sanitized_or(origin);
        let (duration_ms, hitbox_key) = match archetype {
            Archetype::Mob => {
                let profile = mob_kind.as_deref().and_then(|k| self.config.mobs.get(k));
                profile.map_or((0, None), |m| (m.attack_window_ms, Some(m.hitbox.clone())))
            }
            _ => (
                self.config.player.attack_window_ms,
                Some(self.config.player.attack_hitbox.clone()),
            ),
        };
        self.attacks.start(
            &self.store,
            &mut self.scheduler,
            id,
            aim,
            duration_ms,
            resume,
            now,
        );

        let angle = (aim - origin).try_normalize().map_or(0.0, Vec2::angle);
        if let Some(def) = hitbox_key.and_then(|key| self.config.hitboxes.get(&key)) {
            self.hitboxes.spawn(&mut self.store, id, def, angle, now);
        }
        AttackOutcome::Started
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Run due timers, then every loop whose period has elapsed.
    pub fn advance(&mut self, now_ms: u64) -> AdvanceReport {
        let now = now_ms.max(self.now_ms);
        self.now_ms = now;
        let mut report = AdvanceReport::default();

        while let Some(due) = self.scheduler.pop_due(now) {
            report.tasks_run += 1;
            match due.task {
                Task::AttackFinish(id) => {
                    self.attacks.finish(
                        &mut self.store,
                        &mut self.movement,
                        &mut self.scheduler,
                        &self.config,
                        id,
                        due.due_ms,
                    );
                }
                Task::Despawn { entity, reason } => {
                    self.despawn(entity, reason);
                }
            }
        }

        let cap = self.config.loops.max_catch_up_ticks;
        for tick in self.movement_clock.take_due(now, cap) {
            self.movement
                .step(&mut self.store, &self.config, &self.maps, tick);
            report.movement_ticks += 1;
        }

        let mut ctx = TickContext {
            store: &mut self.store,
            movement: &mut self.movement,
            attacks: &mut self.attacks,
            scheduler: &mut self.scheduler,
            config: self.config.as_ref(),
        };
        for tick in self.hitbox_clock.take_due(now, cap) {
            report.hits += self.hitboxes.step(&mut ctx, tick);
            report.hitbox_ticks += 1;
        }
        for tick in self.ai_clock.take_due(now, cap) {
            self.ai.tick(&mut ctx, &mut self.hitboxes, tick);
            report.ai_ticks += 1;
        }
        report
    }

    /// Hash of every entity's observable state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let ids = self.store.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            let Some(entity) = self.store.get(id) else {
                continue;
            };
            id.hash(&mut hasher);
            entity.archetype.hash(&mut hasher);
            entity.state.hash(&mut hasher);
            entity.position.x.to_bits().hash(&mut hasher);
            entity.position.y.to_bits().hash(&mut hasher);
            entity.stats.hp.hash(&mut hasher);
            entity.stats.max_hp.hash(&mut hasher);
        }
        let hash = hasher.finish();
        tracing::debug!(owner = self.owner, hash, "state hash");
        hash
    }
}
