//! JSON-lines protocol between the transport layer and the host.
//!
//! **Input:** one [`Command`] per line, tagged by `cmd`.
//! **Output:** one [`Response`] per line, tagged by `type`.
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"0.1.0"}
//! -> {"cmd":"join","player_id":7}
//! <- {"type":"ack","cmd":"join"}
//! -> {"cmd":"spawn_player","player_id":7,"map_id":"area1/m1","x":100,"y":100}
//! <- {"type":"spawned","player_id":7,"entity_id":1}
//! -> {"cmd":"move","player_id":7,"entity_id":1,"dx":1,"dy":0}
//! <- {"type":"move_result","player_id":7,"entity_id":1,"outcome":"moving"}
//! <- {"type":"event","player_id":7,"event":{"event":"stateChanged","entityId":1,"state":"walk"}}
//! ```

use serde::{Deserialize, Serialize};

use realm_core::components::{EntityId, InstanceId, PlayerId, Stats};
use realm_core::instance::{AttackOutcome, MoveOutcome};
use realm_core::world::Envelope;

// ============================================================================
// Input Commands (transport -> host)
// ============================================================================

/// Commands accepted by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// A player connected; create their instance.
    Join { player_id: PlayerId },

    /// A player disconnected; despawn everything and drop the instance.
    Leave { player_id: PlayerId },

    /// Spawn the player's avatar.
    SpawnPlayer {
        player_id: PlayerId,
        map_id: String,
        #[serde(default)]
        instance_id: InstanceId,
        x: f32,
        y: f32,
    },

    /// Spawn a mob of a configured kind.
    SpawnMob {
        player_id: PlayerId,
        kind: String,
        map_id: String,
        #[serde(default)]
        instance_id: InstanceId,
        x: f32,
        y: f32,
    },

    /// Start or redirect movement.
    Move {
        player_id: PlayerId,
        entity_id: EntityId,
        dx: f32,
        dy: f32,
    },

    /// Stop moving.
    Stop {
        player_id: PlayerId,
        entity_id: EntityId,
    },

    /// Attack toward a world point.
    Attack {
        player_id: PlayerId,
        entity_id: EntityId,
        aim_x: f32,
        aim_y: f32,
    },

    /// Remove an entity, now or after a delay.
    Despawn {
        player_id: PlayerId,
        entity_id: EntityId,
        #[serde(default)]
        delay_ms: u64,
    },

    /// Read an entity's statistics.
    Stats {
        player_id: PlayerId,
        entity_id: EntityId,
    },

    /// Report an instance's state hash.
    Hash { player_id: PlayerId },
}

impl Command {
    /// Player the command is routed to.
    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        match *self {
            Self::Join { player_id }
            | Self::Leave { player_id }
            | Self::SpawnPlayer { player_id, .. }
            | Self::SpawnMob { player_id, .. }
            | Self::Move { player_id, .. }
            | Self::Stop { player_id, .. }
            | Self::Attack { player_id, .. }
            | Self::Despawn { player_id, .. }
            | Self::Stats { player_id, .. }
            | Self::Hash { player_id } => player_id,
        }
    }

    /// Short name for acknowledgements and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::SpawnPlayer { .. } => "spawn_player",
            Self::SpawnMob { .. } => "spawn_mob",
            Self::Move { .. } => "move",
            Self::Stop { .. } => "stop",
            Self::Attack { .. } => "attack",
            Self::Despawn { .. } => "despawn",
            Self::Stats { .. } => "stats",
            Self::Hash { .. } => "hash",
        }
    }
}

// ============================================================================
// Output Responses (host -> transport)
// ============================================================================

/// Messages emitted by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The host is ready to accept commands.
    Ready { version: String },

    /// Acknowledgment of a command.
    Ack { cmd: String },

    /// Error processing a command.
    Error {
        message: String,
        cmd: Option<String>,
    },

    /// An entity was created.
    Spawned {
        player_id: PlayerId,
        entity_id: EntityId,
    },

    /// Result of a move or stop.
    MoveResult {
        player_id: PlayerId,
        entity_id: EntityId,
        #[serde(flatten)]
        outcome: MoveOutcome,
    },

    /// Result of an attack.
    AttackResult {
        player_id: PlayerId,
        entity_id: EntityId,
        #[serde(flatten)]
        outcome: AttackOutcome,
    },

    /// Statistics of an entity.
    Stats {
        player_id: PlayerId,
        entity_id: EntityId,
        stats: Stats,
    },

    /// State hash of an instance.
    Hash { player_id: PlayerId, hash: u64 },

    /// A simulation event for one player's client.
    Event(Envelope),
}

impl Response {
    /// Error response for a command.
    #[must_use]
    pub fn error(cmd: Option<&Command>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(|c| c.name().to_string()),
        }
    }

    /// Encode as one JSON line (without the newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decode one input line.
pub fn parse_command(line: &str) -> serde_json::Result<Command> {
    serde_json::from_str(line.trim())
}
