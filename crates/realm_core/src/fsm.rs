//! Data-driven entity state machine.
//!
//! Each archetype has a table of `state -> intent -> target state` rules.
//! Every state change in the simulation goes through
//! [`TransitionTable::apply`], which is the only caller of
//! `WorldStore::set_state`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{Archetype, EntityId, EntityState};
use crate::error::{CoreError, Result};
use crate::store::WorldStore;

/// Inputs that can move an entity between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Intent {
    /// Start or change a movement intent.
    MoveIntentStart,
    /// Stop moving.
    MoveIntentStop,
    /// Begin an attack.
    AttackIntentStart,
    /// An attack window ran out.
    AttackFinished,
    /// Hit points reached zero.
    Died,
}

impl Intent {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MoveIntentStart => "moveIntentStart",
            Self::MoveIntentStop => "moveIntentStop",
            Self::AttackIntentStart => "attackIntentStart",
            Self::AttackFinished => "attackFinished",
            Self::Died => "died",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmOutcome {
    /// The rule existed and the entity is now in `to`.
    Applied {
        /// State before the transition.
        from: EntityState,
        /// State after the transition.
        to: EntityState,
    },
    /// No rule for this intent in the current state. Nothing changed.
    Blocked {
        /// Current state.
        from: EntityState,
    },
    /// The entity is not in the store.
    UnknownEntity,
}

impl FsmOutcome {
    /// True when the transition was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

type StateRow = BTreeMap<Intent, EntityState>;

/// Transition rules for every archetype.
///
/// # Example RON
///
/// ```ron
/// (
///     rows: {
///         pet: {
///             idle: { moveIntentStart: walk },
///             walk: { moveIntentStop: idle, moveIntentStart: walk },
///         },
///     },
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTable {
    rows: BTreeMap<Archetype, BTreeMap<EntityState, StateRow>>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use EntityState::{Attack, Dead, Idle, Walk};
        use Intent::{AttackFinished, AttackIntentStart, Died, MoveIntentStart, MoveIntentStop};

        let combatant = || {
            BTreeMap::from([
                (
                    Idle,
                    BTreeMap::from([
                        (MoveIntentStart, Walk),
                        (AttackIntentStart, Attack),
                        (Died, Dead),
                    ]),
                ),
                (
                    Walk,
                    BTreeMap::from([
                        (MoveIntentStop, Idle),
                        (MoveIntentStart, Walk),
                        (AttackIntentStart, Attack),
                        (Died, Dead),
                    ]),
                ),
                (
                    Attack,
                    BTreeMap::from([(AttackFinished, Idle), (Died, Dead)]),
                ),
                (Dead, BTreeMap::new()),
            ])
        };
        let pet = BTreeMap::from([
            (Idle, BTreeMap::from([(MoveIntentStart, Walk)])),
            (
                Walk,
                BTreeMap::from([(MoveIntentStop, Idle), (MoveIntentStart, Walk)]),
            ),
        ]);
        let vendor = BTreeMap::from([(Idle, BTreeMap::new()), (Walk, BTreeMap::new())]);

        Self {
            rows: BTreeMap::from([
                (Archetype::Player, combatant()),
                (Archetype::Mob, combatant()),
                (Archetype::Pet, pet),
                (Archetype::Vendor, vendor),
            ]),
        }
    }
}

impl TransitionTable {
    /// Target state for `intent` from `state`, if a rule exists.
    #[must_use]
    pub fn lookup(
        &self,
        archetype: Archetype,
        state: EntityState,
        intent: Intent,
    ) -> Option<EntityState> {
        self.rows.get(&archetype)?.get(&state)?.get(&intent).copied()
    }

    /// True when `state` is a row of the archetype's table.
    #[must_use]
    pub fn has_state(&self, archetype: Archetype, state: EntityState) -> bool {
        self.rows
            .get(&archetype)
            .is_some_and(|states| states.contains_key(&state))
    }

    /// Check that every archetype has an `idle` row and every target state
    /// is itself a row.
    pub fn validate(&self) -> Result<()> {
        for archetype in Archetype::ALL {
            let Some(states) = self.rows.get(&archetype) else {
                return Err(CoreError::InvalidConfig(format!(
                    "fsm table has no rows for archetype '{archetype}'"
                )));
            };
            if !self.has_state(archetype, EntityState::Idle) {
                return Err(CoreError::InvalidConfig(format!(
                    "fsm table for '{archetype}' has no idle row"
                )));
            }
            for (state, row) in states {
                for (intent, target) in row {
                    if !self.has_state(archetype, *target) {
                        return Err(CoreError::InvalidConfig(format!(
                            "fsm rule {archetype}/{state}/{intent} targets missing state '{target}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// True when `intent` would be accepted by the entity right now.
    #[must_use]
    pub fn allowed(&self, store: &WorldStore, id: EntityId, intent: Intent) -> bool {
        store
            .get(id)
            .and_then(|e| self.lookup(e.archetype, e.state, intent))
            .is_some()
    }

    /// Apply `intent` to an entity.
    ///
    /// Blocked transitions leave the store untouched. `StateChanged` is only
    /// emitted when the state actually changes, so `walk -> walk` on a new
    /// move direction is silent.
    pub fn apply(&self, store: &mut WorldStore, id: EntityId, intent: Intent) -> FsmOutcome {
        let Some(entity) = store.get(id) else {
            return FsmOutcome::UnknownEntity;
        };
        let from = entity.state;
        match self.lookup(entity.archetype, from, intent) {
            Some(to) => {
                store.set_state(id, to);
                if from != to {
                    tracing::debug!(entity = id, %from, %to, %intent, "state transition");
                }
                FsmOutcome::Applied { from, to }
            }
            None => FsmOutcome::Blocked { from },
        }
    }
}
