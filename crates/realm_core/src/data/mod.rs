//! Data structures for archetype and attack configuration.
//!
//! This module contains pure data structures that describe players, mob
//! kinds and hitboxes. All structs deserialize from RON and are resolved
//! once into a [`SimConfig`](crate::config::SimConfig).
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by the host.

mod hitbox_data;
mod mob_data;
mod player_data;

pub use hitbox_data::{deg_to_rad, HitboxDef, HitboxShape};
pub use mob_data::MobData;
pub use player_data::PlayerData;
