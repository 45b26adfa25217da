//! Time-boxed attack windows.
//!
//! An entity in `attack` owns exactly one [`AttackWindow`]. The window ends
//! through a scheduled [`Task::AttackFinish`]; movement requested while it
//! runs is queued and replayed when it closes. Players get a cooldown when
//! a window finishes, mobs when one starts (see the AI loop).

use std::collections::{BTreeMap, HashMap};

use crate::components::{Archetype, EntityId, EntityState};
use crate::config::SimConfig;
use crate::events::SimEvent;
use crate::fsm::Intent;
use crate::math::Vec2;
use crate::movement::{MoveIntent, MovementSystem};
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::store::WorldStore;

/// A running attack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackWindow {
    /// Attacking entity.
    pub entity_id: EntityId,
    /// Position the attack was aimed at.
    pub origin: Vec2,
    /// Simulation time the window opened.
    pub start_ms: u64,
    /// Window length.
    pub duration_ms: u64,
    /// Direction to resume walking in when the window closes.
    pub resume: Option<MoveIntent>,
    handle: TaskHandle,
}

impl AttackWindow {
    /// Simulation time the window closes.
    #[must_use]
    pub const fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// Attack windows, queued moves and cooldowns of one instance.
#[derive(Debug, Clone, Default)]
pub struct AttackWindows {
    windows: BTreeMap<EntityId, AttackWindow>,
    queued: HashMap<EntityId, MoveIntent>,
    cooldowns: HashMap<EntityId, u64>,
}

impl AttackWindows {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a window for an entity already in `attack`.
    ///
    /// Returns false (and does nothing) when the entity is missing, not in
    /// `attack`, or already has a window. No event is emitted; the FSM
    /// transition into `attack` has already reported the state.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        store: &WorldStore,
        scheduler: &mut Scheduler,
        id: EntityId,
        origin: Vec2,
        duration_ms: u64,
        resume: Option<MoveIntent>,
        now_ms: u64,
    ) -> bool {
        let in_attack = store
            .get(id)
            .is_some_and(|e| e.state == EntityState::Attack);
        if !in_attack || self.windows.contains_key(&id) {
            return false;
        }
        let handle = scheduler.schedule(now_ms + duration_ms, Task::AttackFinish(id));
        self.windows.insert(
            id,
            AttackWindow {
                entity_id: id,
                origin: origin.sanitized(),
                start_ms: now_ms,
                duration_ms,
                resume: resume.filter(|r| !r.is_zero()),
                handle,
            },
        );
        tracing::debug!(entity = id, duration_ms, "attack window opened");
        true
    }

    /// Close an entity's window: back to idle, then resume walking along the
    /// queued move or the direction captured at start. Players get their
    /// post-attack cooldown armed.
    pub fn finish(
        &mut self,
        store: &mut WorldStore,
        movement: &mut MovementSystem,
        scheduler: &mut Scheduler,
        config: &SimConfig,
        id: EntityId,
        now_ms: u64,
    ) -> bool {
        let Some(window) = self.windows.remove(&id) else {
            self.queued.remove(&id);
            return false;
        };
        scheduler.cancel(window.handle);
        let queued = self.queued.remove(&id);

        if !config.fsm.apply(store, id, Intent::AttackFinished).is_applied() {
            return false;
        }

        if let Some(resume) = queued.or(window.resume).filter(|r| !r.is_zero()) {
            if config.fsm.apply(store, id, Intent::MoveIntentStart).is_applied() {
                movement.set_intent(id, resume);
            }
        }

        let is_player = store
            .get(id)
            .is_some_and(|e| e.archetype == Archetype::Player);
        if is_player {
            self.arm_cooldown(store, id, now_ms + config.player.attack_cooldown_ms);
        }
        true
    }

    /// Drop a window without any state transition or cooldown.
    pub fn cancel(&mut self, scheduler: &mut Scheduler, id: EntityId) -> bool {
        self.queued.remove(&id);
        match self.windows.remove(&id) {
            Some(window) => {
                scheduler.cancel(window.handle);
                true
            }
            None => false,
        }
    }

    /// True while the entity has an open window.
    #[must_use]
    pub fn is_attacking(&self, id: EntityId) -> bool {
        self.windows.contains_key(&id)
    }

    /// The entity's open window.
    #[must_use]
    pub fn window(&self, id: EntityId) -> Option<&AttackWindow> {
        self.windows.get(&id)
    }

    /// Remember a move to replay when the window closes. The latest call
    /// wins; a zero intent clears the queue. Returns false when the entity
    /// is not attacking.
    pub fn queue_move(&mut self, id: EntityId, intent: MoveIntent) -> bool {
        if !self.windows.contains_key(&id) {
            return false;
        }
        if intent.is_zero() {
            self.queued.remove(&id);
        } else {
            self.queued.insert(id, intent);
        }
        true
    }

    /// Forget any queued move and the resume direction.
    pub fn clear_queued(&mut self, id: EntityId) {
        self.queued.remove(&id);
        if let Some(window) = self.windows.get_mut(&id) {
            window.resume = None;
        }
    }

    /// Queued move of an attacking entity.
    #[must_use]
    pub fn queued_move(&self, id: EntityId) -> Option<MoveIntent> {
        self.queued.get(&id).copied()
    }

    /// Position the open attack was aimed at.
    #[must_use]
    pub fn origin_of(&self, id: EntityId) -> Option<Vec2> {
        self.windows.get(&id).map(|w| w.origin)
    }

    /// Start a cooldown that ends at `until_ms` and announce it.
    pub fn arm_cooldown(&mut self, store: &mut WorldStore, id: EntityId, until_ms: u64) {
        self.cooldowns.insert(id, until_ms);
        store.emit(SimEvent::CooldownArmed {
            entity_id: id,
            until_ms,
        });
    }

    /// Time left on an entity's cooldown, zero when it may attack.
    #[must_use]
    pub fn cooldown_remaining(&self, id: EntityId, now_ms: u64) -> u64 {
        self.cooldowns
            .get(&id)
            .map_or(0, |&until| until.saturating_sub(now_ms))
    }

    /// Drop everything tracked for an entity.
    pub fn forget(&mut self, scheduler: &mut Scheduler, id: EntityId) {
        self.cancel(scheduler, id);
        self.cooldowns.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SpawnParams;

    struct Rig {
        store: WorldStore,
        movement: MovementSystem,
        scheduler: Scheduler,
        config: SimConfig,
        attacks: AttackWindows,
        id: EntityId,
    }

    fn rig(archetype: Archetype) -> Rig {
        let config = SimConfig::default();
        let mut store = WorldStore::new(1);
        let id = store.spawn(SpawnParams::new(archetype, "m", Vec2::new(100.0, 100.0)));
        config.fsm.apply(&mut store, id, Intent::AttackIntentStart);
        store.drain_events();
        Rig {
            store,
            movement: MovementSystem::new(),
            scheduler: Scheduler::new(),
            config,
            attacks: AttackWindows::new(),
            id,
        }
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut r = rig(Archetype::Player);
        assert!(r
            .attacks
            .start(&r.store, &mut r.scheduler, r.id, Vec2::ZERO, 400, None, 0));
        assert!(!r
            .attacks
            .start(&r.store, &mut r.scheduler, r.id, Vec2::ZERO, 400, None, 10));
        assert_eq!(r.scheduler.len(), 1);
        // the preceding fsm transition already announced `attack`
        assert!(r.store.events().pending().is_empty());
    }

    #[test]
    fn test_start_requires_attack_state() {
        let mut store = WorldStore::new(1);
        let id = store.spawn(SpawnParams::new(Archetype::Player, "m", Vec2::ZERO));
        let mut scheduler = Scheduler::new();
        let mut attacks = AttackWindows::new();
        assert!(!attacks.start(&store, &mut scheduler, id, Vec2::ZERO, 400, None, 0));
        assert!(!attacks.start(&store, &mut scheduler, 99, Vec2::ZERO, 400, None, 0));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_finish_resumes_queued_move_and_arms_cooldown() {
        let mut r = rig(Archetype::Player);
        let resume = MoveIntent::from_vector(Vec2::X);
        r.attacks
            .start(&r.store, &mut r.scheduler, r.id, Vec2::ZERO, 400, Some(resume), 0);
        let queued = MoveIntent::from_vector(Vec2::new(0.0, 1.0));
        assert!(r.attacks.queue_move(r.id, queued));

        assert!(r.attacks.finish(
            &mut r.store,
            &mut r.movement,
            &mut r.scheduler,
            &r.config,
            r.id,
            400
        ));
        assert_eq!(r.store.get(r.id).unwrap().state, EntityState::Walk);
        assert_eq!(r.movement.intent(r.id), Some(queued));
        assert_eq!(r.attacks.cooldown_remaining(r.id, 400), 1000);
        assert!(r.store.events().pending().contains(&SimEvent::CooldownArmed {
            entity_id: r.id,
            until_ms: 1400
        }));
        assert!(r.scheduler.is_empty());
    }

    #[test]
    fn test_finish_without_resume_goes_idle() {
        let mut r = rig(Archetype::Mob);
        r.attacks
            .start(&r.store, &mut r.scheduler, r.id, Vec2::ZERO, 180, None, 0);
        r.attacks.finish(
            &mut r.store,
            &mut r.movement,
            &mut r.scheduler,
            &r.config,
            r.id,
            180,
        );
        assert_eq!(r.store.get(r.id).unwrap().state, EntityState::Idle);
        assert!(r.movement.intent(r.id).is_none());
        // mob cooldowns are armed by the AI loop
        assert_eq!(r.attacks.cooldown_remaining(r.id, 180), 0);
    }

    #[test]
    fn test_cancel_leaves_state_alone() {
        let mut r = rig(Archetype::Player);
        r.attacks
            .start(&r.store, &mut r.scheduler, r.id, Vec2::ZERO, 400, None, 0);
        r.attacks
            .queue_move(r.id, MoveIntent::from_vector(Vec2::X));

        assert!(r.attacks.cancel(&mut r.scheduler, r.id));
        assert!(!r.attacks.is_attacking(r.id));
        assert!(r.attacks.queued_move(r.id).is_none());
        assert_eq!(r.store.get(r.id).unwrap().state, EntityState::Attack);
        assert_eq!(r.attacks.cooldown_remaining(r.id, 0), 0);
        assert!(r.scheduler.is_empty());
    }

    #[test]
    fn test_queue_requires_window() {
        let mut attacks = AttackWindows::new();
        assert!(!attacks.queue_move(1, MoveIntent::from_vector(Vec2::X)));
    }

    #[test]
    fn test_origin_of() {
        let mut r = rig(Archetype::Player);
        r.attacks.start(
            &r.store,
            &mut r.scheduler,
            r.id,
            Vec2::new(5.0, 6.0),
            400,
            None,
            0,
        );
        assert_eq!(r.attacks.origin_of(r.id), Some(Vec2::new(5.0, 6.0)));
        assert_eq!(r.attacks.window(r.id).unwrap().end_ms(), 400);
    }
}
