//! # Realm Core
//!
//! Authoritative real-time simulation for the Realm action-survival server.
//!
//! This crate contains **only** simulation logic:
//! - No IO
//! - No transport
//! - No wall clock (time is an explicit `now_ms` supplied by the host)
//!
//! Clients send intents (move, attack); the core decides the resulting
//! positions, states and damage and reports them as [`events::SimEvent`]s.
//! Each connected player owns a private [`instance::Instance`].
//!
//! ## Crate Structure
//!
//! - [`store`] - Per-instance entity table
//! - [`events`] - Typed change notifications
//! - [`scheduler`] - Tick-polled timer queue
//! - [`fsm`] - Data-driven state machine
//! - [`geometry`] - Static map geometry and registry
//! - [`collision`] - Swept collision resolver
//! - [`movement`] - Fixed-tick integrator
//! - [`attack`] - Attack windows and cooldowns
//! - [`hitbox`] - Hit volumes and damage
//! - [`ai`] - Mob follow/attack loop
//! - [`instance`] - One player's simulation
//! - [`world`] - Every instance of a server process

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod attack;
pub mod collision;
pub mod components;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod fsm;
pub mod geometry;
pub mod hitbox;
pub mod instance;
pub mod math;
pub mod movement;
pub mod scheduler;
pub mod store;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collision::CollisionTuning;
    pub use crate::components::*;
    pub use crate::config::{LoopRates, SimConfig};
    pub use crate::data::{HitboxDef, HitboxShape, MobData, PlayerData};
    pub use crate::error::{CoreError, Result};
    pub use crate::events::{DespawnReason, SimEvent};
    pub use crate::fsm::{FsmOutcome, Intent, TransitionTable};
    pub use crate::geometry::{MapGeometry, MapRegistry, Polygon, Solid};
    pub use crate::instance::{AdvanceReport, AttackOutcome, Instance, MoveOutcome};
    pub use crate::math::{Aabb, Vec2};
    pub use crate::movement::MoveIntent;
    pub use crate::world::{Envelope, World};
}
