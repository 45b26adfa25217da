//! Swept collision resolution for kinematic movers.
//!
//! A proposed move goes through two passes:
//!
//! 1. **Dynamic**: the mover is swept against every other live entity on the
//!    same map copy, in the obstacle's frame (its last-tick displacement is
//!    subtracted). The earliest contact stops the move; the rest of the
//!    displacement slides along the contact tangent.
//! 2. **Static**: the path is marched against map solids in steps no longer
//!    than half the collider radius, so a wall thinner than one tick's
//!    displacement is never skipped. The first overlapping step is pushed
//!    out and slides along the wall, then a short settle loop clears any
//!    remaining overlap.
//!
//! The resolver never fails. Anything it cannot make sense of resolves to
//! the pre-movement position.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::{Collider, EntityId, InstanceId};
use crate::geometry::MapGeometry;
use crate::math::{Aabb, Vec2, LENGTH_EPSILON};
use crate::store::WorldStore;

// ============================================================================
// Tuning
// ============================================================================

/// Constants for the slide, coast and settle policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionTuning {
    /// Distance within which two shapes count as already touching.
    pub skin: f32,
    /// Gap left between the mover and an obstacle after a contact.
    pub contact_epsilon: f32,
    /// Maximum tangential slide per tick.
    pub slide_budget: f32,
    /// How long a contact normal is remembered.
    pub coast_window_ms: u64,
    /// Slide budget multiplier while a similar contact is remembered.
    pub coast_bonus: f32,
    /// Minimum dot product between normals for the coast bonus to apply.
    pub coast_similarity: f32,
    /// Increment for re-sweeping slides against statics.
    pub slide_step: f32,
    /// Extra clearance kept from static solids when settling.
    pub static_bias: f32,
    /// Push-out iterations after the static march.
    pub settle_iterations: u32,
    /// Approach speed below which a start overlap may pass through.
    pub separating_slop: f32,
    /// Upper bound on static march samples per move.
    pub max_march_steps: u32,
}

impl Default for CollisionTuning {
    fn default() -> Self {
        Self {
            skin: 0.5,
            contact_epsilon: 0.75,
            slide_budget: 3.0,
            coast_window_ms: 180,
            coast_bonus: 1.5,
            coast_similarity: 0.7,
            slide_step: 0.5,
            static_bias: 0.5,
            settle_iterations: 3,
            separating_slop: 0.01,
            max_march_steps: 256,
        }
    }
}

impl CollisionTuning {
    /// Describe the first invalid constant, if any.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        let non_negative = [
            ("skin", self.skin),
            ("contact_epsilon", self.contact_epsilon),
            ("slide_budget", self.slide_budget),
            ("static_bias", self.static_bias),
            ("separating_slop", self.separating_slop),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Some(format!("{name} must be a finite non-negative number"));
            }
        }
        if !self.slide_step.is_finite() || self.slide_step <= 0.0 {
            return Some("slide_step must be positive".to_string());
        }
        if !self.coast_bonus.is_finite() || self.coast_bonus < 1.0 {
            return Some("coast_bonus must be >= 1".to_string());
        }
        if self.max_march_steps == 0 {
            return Some("max_march_steps must be at least 1".to_string());
        }
        None
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Frozen view of one entity at the start of a movement tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Entity id.
    pub id: EntityId,
    /// Position at tick start.
    pub position: Vec2,
    /// Collision shape.
    pub collider: Collider,
    /// Map the entity is on.
    pub map_id: String,
    /// Map copy.
    pub instance_id: InstanceId,
    /// Whether the entity blocks others.
    pub alive: bool,
}

impl Body {
    /// True when both bodies are on the same map copy.
    #[must_use]
    pub fn shares_instance(&self, other: &Body) -> bool {
        self.instance_id == other.instance_id && self.map_id == other.map_id
    }
}

/// Every body of an instance plus each one's last-tick displacement.
#[derive(Debug, Clone, Default)]
pub struct TickSnapshot {
    bodies: Vec<Body>,
    displacements: HashMap<EntityId, Vec2>,
}

impl TickSnapshot {
    /// Build a snapshot from explicit bodies and displacements.
    #[must_use]
    pub fn new(mut bodies: Vec<Body>, displacements: HashMap<EntityId, Vec2>) -> Self {
        bodies.sort_by_key(|b| b.id);
        Self {
            bodies,
            displacements,
        }
    }

    /// Freeze the store. Displacement is the distance from each entity's
    /// entry in `last_positions`, or zero for entities seen for the first
    /// time.
    #[must_use]
    pub fn capture(store: &WorldStore, last_positions: &HashMap<EntityId, Vec2>) -> Self {
        let mut bodies = Vec::with_capacity(store.len());
        let mut displacements = HashMap::with_capacity(store.len());
        for id in store.sorted_ids() {
            let Some(entity) = store.get(id) else {
                continue;
            };
            let displacement = last_positions
                .get(&id)
                .map_or(Vec2::ZERO, |&last| (entity.position - last).sanitized());
            displacements.insert(id, displacement);
            bodies.push(Body {
                id,
                position: entity.position,
                collider: entity.collider,
                map_id: entity.map_id.clone(),
                instance_id: entity.instance_id,
                alive: entity.is_alive(),
            });
        }
        Self {
            bodies,
            displacements,
        }
    }

    /// Bodies in id order.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Snapshot entry for an entity.
    #[must_use]
    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.bodies
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bodies[i])
    }

    /// Last-tick displacement of an entity.
    #[must_use]
    pub fn displacement(&self, id: EntityId) -> Vec2 {
        self.displacements.get(&id).copied().unwrap_or(Vec2::ZERO)
    }
}

/// A remembered contact normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoastMemory {
    /// Contact normal.
    pub normal: Vec2,
    /// Simulation time the memory expires.
    pub until_ms: u64,
}

impl CoastMemory {
    /// True while the memory is live.
    #[must_use]
    pub const fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.until_ms
    }
}

// ============================================================================
// Sweeps
// ============================================================================

/// Earliest time in `[0, 1]` at which a point starting at offset `s` and
/// moving by `v` reaches distance `reach` from the origin.
///
/// Solves `|s + v t|² = reach²`. Returns `None` when the path never gets
/// that close within the step or the start is already inside.
#[must_use]
pub fn sweep_circles(s: Vec2, v: Vec2, reach: f32) -> Option<f32> {
    let a = v.length_squared();
    if a <= LENGTH_EPSILON * LENGTH_EPSILON {
        return None;
    }
    let b = 2.0 * s.dot(v);
    let c = s.length_squared() - reach * reach;
    if c < 0.0 {
        return None;
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    (0.0..=1.0).contains(&t).then_some(t)
}

/// Slab test of the segment `origin .. origin + dir` against a box.
///
/// Returns the entry time in `[0, 1]` and the outward normal of the face
/// that was crossed. A segment starting inside the box returns `None`.
#[must_use]
pub fn ray_vs_aabb(origin: Vec2, dir: Vec2, aabb: &Aabb) -> Option<(f32, Vec2)> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut normal = Vec2::ZERO;

    let axes = [
        (origin.x, dir.x, aabb.min.x, aabb.max.x, Vec2::X),
        (origin.y, dir.y, aabb.min.y, aabb.max.y, Vec2::new(0.0, 1.0)),
    ];
    for (o, d, lo, hi, axis) in axes {
        if d.abs() <= LENGTH_EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (t1, t2) = if d > 0.0 {
            ((lo - o) * inv, (hi - o) * inv)
        } else {
            ((hi - o) * inv, (lo - o) * inv)
        };
        if t1 > t_min {
            t_min = t1;
            normal = if d > 0.0 { -axis } else { axis };
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    (t_min >= 0.0 && t_min <= 1.0).then_some((t_min, normal))
}

fn clamp_length(v: Vec2, max: f32) -> Vec2 {
    let len = v.length();
    if len > max && len > LENGTH_EPSILON {
        v * (max / len)
    } else {
        v
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Outcome of resolving one proposed move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Final position.
    pub position: Vec2,
    /// Normal of the contact that shaped the move, if any.
    pub contact: Option<Vec2>,
}

impl Resolution {
    fn stay(position: Vec2) -> Self {
        Self {
            position,
            contact: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    t: f32,
    normal: Vec2,
    obstacle: EntityId,
}

/// Resolves proposed moves against one snapshot and one map.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    tuning: &'a CollisionTuning,
    geometry: Option<&'a MapGeometry>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver. Without geometry only the dynamic pass runs.
    #[must_use]
    pub fn new(tuning: &'a CollisionTuning, geometry: Option<&'a MapGeometry>) -> Self {
        Self { tuning, geometry }
    }

    /// Resolve a move of `mover` from its snapshot position to `target`.
    #[must_use]
    pub fn resolve(
        &self,
        mover: &Body,
        target: Vec2,
        snapshot: &TickSnapshot,
        coast: Option<&CoastMemory>,
        now_ms: u64,
    ) -> Resolution {
        let prev = mover.position;
        if !prev.is_finite() || !target.is_finite() {
            return Resolution::stay(prev);
        }
        let motion = target - prev;
        if motion.is_near_zero() {
            return Resolution::stay(prev);
        }
        let radius = mover.collider.radius();
        if !radius.is_finite() || radius <= 0.0 {
            return Resolution::stay(prev);
        }

        let mut proposed = target;
        let mut contact = None;
        if let Some(hit) = self.dynamic_pass(mover, motion, snapshot) {
            let at = prev + motion * hit.t + hit.normal * self.tuning.contact_epsilon;
            let remaining = motion * (1.0 - hit.t);
            let tangent = remaining - hit.normal * remaining.dot(hit.normal);
            let budget = self.slide_budget(hit.normal, coast, now_ms);
            proposed = self.slide(at, clamp_length(tangent, budget), radius);
            contact = Some(hit.normal);
            tracing::debug!(
                entity = mover.id,
                obstacle = hit.obstacle,
                t = hit.t,
                "dynamic contact"
            );
        }

        let (position, wall) = self.static_pass(prev, proposed, radius, coast, now_ms);
        if !position.is_finite() {
            return Resolution::stay(prev);
        }
        Resolution {
            position,
            contact: wall.or(contact),
        }
    }

    fn slide_budget(&self, normal: Vec2, coast: Option<&CoastMemory>, now_ms: u64) -> f32 {
        let coasting = coast.is_some_and(|memory| {
            memory.is_live(now_ms) && memory.normal.dot(normal) >= self.tuning.coast_similarity
        });
        if coasting {
            self.tuning.slide_budget * self.tuning.coast_bonus
        } else {
            self.tuning.slide_budget
        }
    }

    fn dynamic_pass(&self, mover: &Body, motion: Vec2, snapshot: &TickSnapshot) -> Option<Contact> {
        let mut earliest: Option<Contact> = None;
        for body in snapshot.bodies() {
            if body.id == mover.id || !body.alive || !body.shares_instance(mover) {
                continue;
            }
            let relative = motion - snapshot.displacement(body.id);
            let hit = if mover.collider.is_circle() && body.collider.is_circle() {
                self.sweep_circle_pair(mover, body, relative)
            } else {
                self.sweep_box_pair(mover, body, relative)
            };
            if let Some((t, normal)) = hit {
                if earliest.map_or(true, |e| t < e.t) {
                    earliest = Some(Contact {
                        t,
                        normal,
                        obstacle: body.id,
                    });
                }
            }
        }
        earliest
    }

    fn sweep_circle_pair(&self, mover: &Body, body: &Body, relative: Vec2) -> Option<(f32, Vec2)> {
        let s = mover.position - body.position;
        let reach = mover.collider.radius() + body.collider.radius();
        if s.length() < reach + self.tuning.skin {
            let normal = s
                .try_normalize()
                .or_else(|| (-relative).try_normalize())
                .unwrap_or(Vec2::X);
            return self.start_overlap(relative, normal);
        }
        let t = sweep_circles(s, relative, reach)?;
        let normal = (s + relative * t).try_normalize().unwrap_or(Vec2::X);
        Some((t, normal))
    }

    fn sweep_box_pair(&self, mover: &Body, body: &Body, relative: Vec2) -> Option<(f32, Vec2)> {
        let (mhx, mhy) = mover.collider.extents();
        let (ohx, ohy) = body.collider.extents();
        let half = Vec2::new(mhx + ohx, mhy + ohy);
        let expanded = Aabb::new(body.position - half, body.position + half);
        let skinned = expanded.inflate(self.tuning.skin, self.tuning.skin);
        let p = mover.position;
        if skinned.contains(p) {
            let faces = [
                (p.x - expanded.min.x, Vec2::new(-1.0, 0.0)),
                (expanded.max.x - p.x, Vec2::X),
                (p.y - expanded.min.y, Vec2::new(0.0, -1.0)),
                (expanded.max.y - p.y, Vec2::new(0.0, 1.0)),
            ];
            let normal = faces
                .into_iter()
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map_or(Vec2::X, |(_, n)| n);
            return self.start_overlap(relative, normal);
        }
        ray_vs_aabb(p, relative, &expanded)
    }

    /// Touching at the start: moving apart (or along) passes, moving in
    /// blocks immediately.
    fn start_overlap(&self, relative: Vec2, normal: Vec2) -> Option<(f32, Vec2)> {
        if relative.dot(normal) >= -self.tuning.separating_slop {
            None
        } else {
            Some((0.0, normal))
        }
    }

    /// Walk along `offset` in slide-step increments until a static solid
    /// would be entered.
    fn slide(&self, from: Vec2, offset: Vec2, radius: f32) -> Vec2 {
        let len = offset.length();
        if len <= LENGTH_EPSILON {
            return from;
        }
        let Some(geometry) = self.geometry else {
            return from + offset;
        };
        let dir = offset * (1.0 / len);
        let mut pos = from;
        let mut travelled = 0.0;
        while travelled + LENGTH_EPSILON < len {
            let step = self.tuning.slide_step.min(len - travelled);
            let next = pos + dir * step;
            if geometry.overlaps(next, radius) {
                break;
            }
            pos = next;
            travelled += step;
        }
        pos
    }

    fn static_pass(
        &self,
        start: Vec2,
        target: Vec2,
        radius: f32,
        coast: Option<&CoastMemory>,
        now_ms: u64,
    ) -> (Vec2, Option<Vec2>) {
        let Some(geometry) = self.geometry else {
            return (target, None);
        };
        let clearance = radius + self.tuning.static_bias;
        let max_step = radius * 0.5;
        let dist = start.distance(target);
        let steps = ((dist / max_step).ceil() as u32).clamp(1, self.tuning.max_march_steps);

        let mut result = target;
        let mut contact = None;
        for i in 1..=steps {
            let p = start.lerp(target, i as f32 / steps as f32);
            let Some(pen) = geometry.deepest_penetration(p, radius) else {
                continue;
            };
            let pushed = self.push_out(geometry, p, clearance);
            let remaining = target - p;
            let tangent = remaining - pen.normal * remaining.dot(pen.normal);
            let budget = self.slide_budget(pen.normal, coast, now_ms);
            result = self.slide(pushed, clamp_length(tangent, budget), radius);
            contact = Some(pen.normal);
            break;
        }

        let settled = self.push_out(geometry, result, clearance);
        if geometry.overlaps(settled, radius) && !geometry.overlaps(start, radius) {
            return (start, contact);
        }
        (settled, contact)
    }

    fn push_out(&self, geometry: &MapGeometry, mut p: Vec2, clearance: f32) -> Vec2 {
        for _ in 0..self.tuning.settle_iterations {
            match geometry.deepest_penetration(p, clearance) {
                Some(pen) => p += pen.normal * pen.depth,
                None => break,
            }
        }
        p
    }
}
