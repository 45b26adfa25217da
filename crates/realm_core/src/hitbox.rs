//! Geometric hit volumes and damage.
//!
//! A hitbox is anchored to its owner and aim angle for its whole lifetime.
//! Every hitbox tick recomputes the current volume, tests candidate
//! targets, and applies damage at most once per target per hitbox.

use std::collections::{BTreeMap, BTreeSet};

use crate::components::{Archetype, Entity, EntityId};
use crate::data::{deg_to_rad, HitboxDef, HitboxShape, MobData};
use crate::events::{DespawnReason, SimEvent};
use crate::fsm::Intent;
use crate::instance::TickContext;
use crate::math::{wrap_angle, Vec2};
use crate::scheduler::Task;
use crate::store::WorldStore;

/// Identifier of a live hitbox.
pub type HitboxId = u64;

// ============================================================================
// Geometry
// ============================================================================

/// True when a circle touches a rectangle centred at `center`, rotated by
/// `rotation`, with `half_along` extent on the facing axis and
/// `half_across` across it.
#[must_use]
pub fn circle_vs_oriented_rect(
    center: Vec2,
    rotation: f32,
    half_along: f32,
    half_across: f32,
    target: Vec2,
    target_radius: f32,
) -> bool {
    let local = (target - center).rotate(-rotation);
    let clamped = Vec2::new(
        local.x.clamp(-half_along, half_along),
        local.y.clamp(-half_across, half_across),
    );
    local.distance_squared(clamped) <= target_radius * target_radius
}

/// True when a circle touches a sector with apex `apex`, reach `radius`,
/// centre direction `angle` and half opening `half_arc`.
///
/// The angular test is padded by `asin(r / d)` so a wide target grazing
/// the edge of the arc still counts.
#[must_use]
pub fn circle_vs_sector(
    apex: Vec2,
    radius: f32,
    angle: f32,
    half_arc: f32,
    target: Vec2,
    target_radius: f32,
) -> bool {
    let offset = target - apex;
    let dist = offset.length();
    if dist > radius + target_radius {
        return false;
    }
    if dist <= target_radius {
        return true;
    }
    let delta = wrap_angle(offset.angle() - angle).abs();
    let padding = (target_radius / dist).min(1.0).asin();
    delta <= half_arc + padding
}

/// Current world-space hit volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Volume {
    /// Oriented rectangle.
    Rect {
        /// Centre.
        center: Vec2,
        /// Facing angle.
        rotation: f32,
        /// Half extent along the facing.
        half_along: f32,
        /// Half extent across the facing.
        half_across: f32,
    },
    /// Angular sector.
    Sector {
        /// Apex.
        apex: Vec2,
        /// Reach.
        radius: f32,
        /// Current centre direction.
        angle: f32,
        /// Half the opening angle.
        half_arc: f32,
    },
}

impl Volume {
    /// True when a circle touches the volume.
    #[must_use]
    pub fn hits(&self, target: Vec2, target_radius: f32) -> bool {
        match *self {
            Self::Rect {
                center,
                rotation,
                half_along,
                half_across,
            } => circle_vs_oriented_rect(
                center,
                rotation,
                half_along,
                half_across,
                target,
                target_radius,
            ),
            Self::Sector {
                apex,
                radius,
                angle,
                half_arc,
            } => circle_vs_sector(apex, radius, angle, half_arc, target, target_radius),
        }
    }
}

// ============================================================================
// Hitboxes
// ============================================================================

/// A live hitbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Hitbox {
    /// Identifier.
    pub id: HitboxId,
    /// Attacking entity.
    pub owner: EntityId,
    /// Geometry.
    pub shape: HitboxShape,
    /// Simulation time the hitbox started.
    pub start_ms: u64,
    /// Lifetime.
    pub duration_ms: u64,
    /// Aim angle in radians.
    pub base_angle: f32,
    already_hit: BTreeSet<EntityId>,
}

impl Hitbox {
    /// True once the lifetime has elapsed.
    #[must_use]
    pub const fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.start_ms + self.duration_ms
    }

    /// True when `target` was already damaged by this hitbox.
    #[must_use]
    pub fn has_hit(&self, target: EntityId) -> bool {
        self.already_hit.contains(&target)
    }

    /// Fraction of the lifetime elapsed, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self, now_ms: u64) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms);
        (elapsed as f32 / self.duration_ms as f32).clamp(0.0, 1.0)
    }

    /// Volume at `now_ms` for an owner standing at `owner_pos`.
    #[must_use]
    pub fn volume(&self, owner_pos: Vec2, now_ms: u64) -> Volume {
        match self.shape {
            HitboxShape::Rect {
                width,
                height,
                offset,
            } => {
                let forward = Vec2::from_angle(self.base_angle);
                Volume::Rect {
                    center: owner_pos + forward * (offset + height * 0.5),
                    rotation: self.base_angle,
                    half_along: height * 0.5,
                    half_across: width * 0.5,
                }
            }
            HitboxShape::Sector {
                radius,
                arc_degrees,
                sweep_degrees,
            } => {
                let sweep = deg_to_rad(sweep_degrees);
                let angle = self.base_angle - sweep * 0.5 + sweep * self.progress(now_ms);
                Volume::Sector {
                    apex: owner_pos,
                    radius,
                    angle: wrap_angle(angle),
                    half_arc: deg_to_rad(arc_degrees) * 0.5,
                }
            }
        }
    }
}

/// Live hitboxes of one instance.
#[derive(Debug, Clone, Default)]
pub struct HitboxManager {
    hitboxes: BTreeMap<HitboxId, Hitbox>,
    next_id: HitboxId,
}

impl HitboxManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a hitbox of any shape for `owner`, aimed at `base_angle`, and
    /// announce it. Returns `None` when the owner does not exist.
    pub fn spawn(
        &mut self,
        store: &mut WorldStore,
        owner: EntityId,
        def: &HitboxDef,
        base_angle: f32,
        now_ms: u64,
    ) -> Option<HitboxId> {
        if !store.contains(owner) {
            return None;
        }
        let base_angle = if base_angle.is_finite() {
            wrap_angle(base_angle)
        } else {
            0.0
        };
        let id = self.next_id;
        self.next_id += 1;
        self.hitboxes.insert(
            id,
            Hitbox {
                id,
                owner,
                shape: def.shape,
                start_ms: now_ms,
                duration_ms: def.duration_ms,
                base_angle,
                already_hit: BTreeSet::new(),
            },
        );
        store.emit(SimEvent::HitboxSpawned {
            entity_id: owner,
            shape: def.shape,
            start_ms: now_ms,
            duration_ms: def.duration_ms,
            base_angle,
        });
        Some(id)
    }

    /// A live hitbox.
    #[must_use]
    pub fn get(&self, id: HitboxId) -> Option<&Hitbox> {
        self.hitboxes.get(&id)
    }

    /// Number of live hitboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hitboxes.len()
    }

    /// True when no hitbox is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hitboxes.is_empty()
    }

    /// Drop every hitbox owned by `owner`.
    pub fn remove_owned_by(&mut self, owner: EntityId) {
        self.hitboxes.retain(|_, hb| hb.owner != owner);
    }

    /// Run one hitbox tick. Returns the number of hits applied.
    pub fn step(&mut self, ctx: &mut TickContext<'_>, now_ms: u64) -> usize {
        let mut hits = 0;
        let ids: Vec<HitboxId> = self.hitboxes.keys().copied().collect();
        for id in ids {
            let Some(hitbox) = self.hitboxes.get(&id) else {
                continue;
            };
            let owner = match ctx.store.get(hitbox.owner) {
                Some(owner) if owner.is_alive() && !hitbox.is_expired(now_ms) => owner,
                _ => {
                    self.hitboxes.remove(&id);
                    continue;
                }
            };

            let volume = hitbox.volume(owner.position, now_ms);
            let damage = attack_damage(ctx, owner);
            let attacker = owner.id;
            let struck: Vec<EntityId> = candidates(ctx.store, owner)
                .into_iter()
                .filter(|t| !hitbox.has_hit(t.id))
                .filter(|t| volume.hits(t.position, t.collider.radius()))
                .map(|t| t.id)
                .collect();

            for target in struck {
                if let Some(hitbox) = self.hitboxes.get_mut(&id) {
                    hitbox.already_hit.insert(target);
                }
                apply_hit(ctx, attacker, target, damage, now_ms);
                hits += 1;
            }
        }
        hits
    }
}

/// Targets an attacker may hit: a mob hits its instance's player, a player
/// hits every mob on the same map copy.
fn candidates<'s>(store: &'s WorldStore, attacker: &Entity) -> Vec<&'s Entity> {
    match attacker.archetype {
        Archetype::Mob => store
            .player_entity()
            .filter(|p| p.is_alive() && p.shares_instance(attacker))
            .into_iter()
            .collect(),
        Archetype::Player => store
            .sorted_ids()
            .into_iter()
            .filter_map(|id| store.get(id))
            .filter(|e| {
                e.archetype == Archetype::Mob && e.is_alive() && e.shares_instance(attacker)
            })
            .collect(),
        Archetype::Vendor | Archetype::Pet => Vec::new(),
    }
}

fn attack_damage(ctx: &TickContext<'_>, attacker: &Entity) -> i32 {
    match attacker.archetype {
        Archetype::Mob => attacker
            .mob_kind
            .as_deref()
            .and_then(|kind| ctx.config.mobs.get(kind))
            .map_or(attacker.stats.atk, MobData::hit_damage),
        _ => attacker.stats.atk,
    }
}

/// Apply one hit: notify, subtract hp, and run the death flow at zero.
fn apply_hit(
    ctx: &mut TickContext<'_>,
    attacker: EntityId,
    target: EntityId,
    damage: i32,
    now_ms: u64,
) {
    ctx.store.emit(SimEvent::EntityHit {
        attacker_id: attacker,
        target_id: target,
    });
    let Some(entity) = ctx.store.get_mut(target) else {
        return;
    };
    let hp = entity.stats.apply_damage(damage);
    let max_hp = entity.stats.max_hp;
    let archetype = entity.archetype;
    ctx.store.emit(SimEvent::StatsUpdated {
        entity_id: target,
        hp,
        max_hp,
    });
    if hp > 0 {
        return;
    }

    ctx.config.fsm.apply(ctx.store, target, Intent::Died);
    ctx.movement.clear(target);
    ctx.attacks.cancel(ctx.scheduler, target);
    if archetype == Archetype::Mob {
        ctx.scheduler.schedule(
            now_ms + ctx.config.death_despawn_ms,
            Task::Despawn {
                entity: target,
                reason: DespawnReason::Killed,
            },
        );
    }
    tracing::info!(attacker, target, %archetype, "entity killed");
}
