//! Mob follow/attack loop.
//!
//! Every AI tick each live mob on the player's map copy either chases the
//! player or, once within its attack range and off cooldown, stops and opens
//! an attack window with a hitbox aimed at the player.

use crate::components::{Archetype, EntityId, EntityState};
use crate::data::MobData;
use crate::fsm::Intent;
use crate::hitbox::HitboxManager;
use crate::instance::TickContext;
use crate::math::Vec2;
use crate::movement::MoveIntent;

/// Mob behavior driver. Holds no per-mob state: chase direction lives in
/// the movement intents and cooldowns in the attack ledger.
#[derive(Debug, Clone, Default)]
pub struct AiSystem {
    fallback: MobData,
}

impl AiSystem {
    /// Create the AI system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one AI tick. Returns how many attacks were started.
    pub fn tick(
        &mut self,
        ctx: &mut TickContext<'_>,
        hitboxes: &mut HitboxManager,
        now_ms: u64,
    ) -> usize {
        let Some(player) = ctx.store.player_entity().filter(|p| p.is_alive()) else {
            return 0;
        };
        let player_pos = player.position;
        let mobs: Vec<EntityId> = ctx
            .store
            .sorted_ids()
            .into_iter()
            .filter(|&id| {
                ctx.store
                    .get(id)
                    .is_some_and(|e| e.archetype == Archetype::Mob && e.shares_instance(player))
            })
            .collect();

        let config = ctx.config;
        let mut started = 0;
        for id in mobs {
            let Some(mob) = ctx.store.get(id) else {
                continue;
            };
            if !mob.is_alive() || mob.state == EntityState::Attack {
                ctx.movement.clear(id);
                continue;
            }
            let profile = mob
                .mob_kind
                .as_deref()
                .and_then(|kind| config.mobs.get(kind))
                .unwrap_or(&self.fallback);
            let to_player = player_pos - mob.position;

            if to_player.length() <= profile.attack_range
                && ctx.attacks.cooldown_remaining(id, now_ms) == 0
            {
                if begin_attack(ctx, hitboxes, id, profile, player_pos, now_ms) {
                    started += 1;
                }
                continue;
            }
            chase(ctx, id, to_player);
        }
        started
    }
}

/// Stop, enter `attack`, open the window, arm the cooldown and spawn the
/// mob's hitbox aimed at the player.
fn begin_attack(
    ctx: &mut TickContext<'_>,
    hitboxes: &mut HitboxManager,
    id: EntityId,
    profile: &MobData,
    target: Vec2,
    now_ms: u64,
) -> bool {
    let chase_dir = ctx.movement.clear(id);
    if !ctx
        .config
        .fsm
        .apply(ctx.store, id, Intent::AttackIntentStart)
        .is_applied()
    {
        return false;
    }
    ctx.attacks.start(
        ctx.store,
        ctx.scheduler,
        id,
        target,
        profile.attack_window_ms,
        chase_dir,
        now_ms,
    );
    ctx.attacks.arm_cooldown(
        ctx.store,
        id,
        now_ms + profile.attack_window_ms + profile.extra_cooldown_ms,
    );

    let aim = ctx
        .store
        .get(id)
        .map_or(0.0, |mob| (target - mob.position).angle());
    match ctx.config.hitbox(&profile.hitbox) {
        Ok(def) => {
            hitboxes.spawn(ctx.store, id, def, aim, now_ms);
        }
        Err(err) => tracing::warn!(entity = id, %err, "mob attack has no hitbox"),
    }
    tracing::debug!(entity = id, "mob attack started");
    true
}

/// Point the mob at the player and keep it walking.
fn chase(ctx: &mut TickContext<'_>, id: EntityId, to_player: Vec2) {
    let intent = MoveIntent::from_vector(to_player.normalize_or_zero());
    if intent.is_zero() {
        return;
    }
    if ctx
        .config
        .fsm
        .apply(ctx.store, id, Intent::MoveIntentStart)
        .is_applied()
    {
        ctx.movement.set_intent(id, intent);
    }
}
