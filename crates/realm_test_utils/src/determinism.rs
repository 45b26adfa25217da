//! Determinism testing utilities.
//!
//! Provides a harness for verifying that an instance produces identical
//! results given identical intents and timestamps.
//!
//! # Testing Strategy
//!
//! The server is authoritative, so the same intent stream must always
//! produce the same positions, states and damage. Sources of divergence:
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Every system iterates entities in sorted id order.
//!
//! - **Wall-clock time**: The core never reads a clock; every call takes an
//!   explicit `now_ms`.
//!
//! - **Order-dependent movement**: Collision resolves against a snapshot
//!   taken at the start of the tick, so the order movers are planned in
//!   cannot change the outcome.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use realm_core::components::EntityId;
use realm_core::instance::Instance;
use realm_core::math::Vec2;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one step
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use realm_test_utils::determinism::{step_instance, verify_determinism};
/// use realm_test_utils::fixtures::populated_instance;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 steps each
///     || populated_instance(3).0,
///     |inst| step_instance(inst, 16),
///     |inst| inst.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Advance an instance by `step_ms` past its current time.
pub fn step_instance(instance: &mut Instance, step_ms: u64) {
    let next = instance.now_ms() + step_ms;
    instance.advance(next);
}

/// Run the same instance set-up on several threads and collect the final
/// hashes.
///
/// Uses scoped threads so the set-up closure needs no `'static` bound.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_instances<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
    step_ms: u64,
) -> DeterminismResult
where
    F: Fn() -> Instance + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut instance = setup_fn();
                    for _ in 0..num_ticks {
                        step_instance(&mut instance, step_ms);
                    }
                    instance.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two runs step by step, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs match throughout, `Some(step)` if they diverge at
/// that step (0 means the initial states already differ).
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64, step_ms: u64) -> Option<u64>
where
    F: Fn() -> Instance,
{
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step_instance(&mut a, step_ms);
        step_instance(&mut b, step_ms);

        if a.state_hash() != b.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Intent scripts
// ============================================================================

/// One scripted player action.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Start moving along a direction.
    Move(Vec2),
    /// Stop moving.
    Stop,
    /// Attack toward a world point.
    Attack(Vec2),
    /// Let time pass.
    Wait(u64),
}

/// Play `script` against `entity`, advancing `step_ms` after every action
/// and by the requested amount for waits.
pub fn play_script(instance: &mut Instance, entity: EntityId, script: &[ScriptStep], step_ms: u64) {
    for step in script {
        match *step {
            ScriptStep::Move(dir) => {
                instance.move_intent_start(entity, dir);
            }
            ScriptStep::Stop => {
                instance.move_intent_stop(entity);
            }
            ScriptStep::Attack(aim) => {
                instance.attack_intent_start(entity, aim);
            }
            ScriptStep::Wait(ms) => {
                let until = instance.now_ms() + ms;
                crate::fixtures::run_until(instance, until, step_ms);
                continue;
            }
        }
        step_instance(instance, step_ms);
    }
}

/// Proptest strategies for determinism and invariant testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use realm_core::math::Vec2;

    use super::ScriptStep;
    use crate::fixtures::ARENA_SIZE;

    /// A point anywhere on the fixture arena.
    pub fn arb_arena_point() -> impl Strategy<Value = Vec2> {
        (0.0f32..ARENA_SIZE, 0.0f32..ARENA_SIZE).prop_map(|(x, y)| Vec2::new(x, y))
    }

    /// A point possibly far outside the arena.
    pub fn arb_wild_point() -> impl Strategy<Value = Vec2> {
        (-5000.0f32..5000.0, -5000.0f32..5000.0).prop_map(|(x, y)| Vec2::new(x, y))
    }

    /// A unit direction.
    pub fn arb_direction() -> impl Strategy<Value = Vec2> {
        (0.0f32..std::f32::consts::TAU).prop_map(Vec2::from_angle)
    }

    /// Any single scripted action.
    pub fn arb_script_step() -> impl Strategy<Value = ScriptStep> {
        prop_oneof![
            3 => arb_direction().prop_map(ScriptStep::Move),
            1 => Just(ScriptStep::Stop),
            1 => arb_arena_point().prop_map(ScriptStep::Attack),
            2 => (0u64..600).prop_map(ScriptStep::Wait),
        ]
    }

    /// A sequence of scripted actions.
    pub fn arb_script(max_len: usize) -> impl Strategy<Value = Vec<ScriptStep>> {
        proptest::collection::vec(arb_script_step(), 0..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{populated_instance, test_instance, ARENA};
    use proptest::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u64, |s| *s += 1, |s| *s);
        assert!(result.is_deterministic);
        assert_eq!(result.unique_hashes(), vec![10]);
    }

    #[test]
    fn test_empty_instance_determinism() {
        let result = verify_determinism(
            2,
            50,
            test_instance,
            |inst| step_instance(inst, 16),
            Instance::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_chasing_mobs_determinism() {
        let result = verify_determinism(
            3,
            200,
            || populated_instance(6).0,
            |inst| step_instance(inst, 16),
            Instance::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_no_divergence_in_chase() {
        assert_eq!(find_first_divergence(|| populated_instance(4).0, 100, 20), None);
    }

    #[test]
    fn test_parallel_instances_match() {
        let result = run_parallel_instances(|| populated_instance(5).0, 4, 150, 16);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_hash_changes_when_state_changes() {
        let mut inst = test_instance();
        let before = inst.state_hash();
        inst.spawn_player(ARENA, 0, Vec2::new(100.0, 100.0));
        assert_ne!(before, inst.state_hash());
    }

    #[test]
    #[should_panic(expected = "non-deterministic")]
    fn test_assert_reports_divergence() {
        DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 2],
            ticks: 1,
        }
        .assert_deterministic();
    }

    // =========================================================================
    // Property-based tests
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Random intent scripts replay to the same state.
        #[test]
        fn prop_scripts_are_replayable(script in strategies::arb_script(12)) {
            let run = || {
                let (mut inst, player, _) = populated_instance(3);
                play_script(&mut inst, player, &script, 16);
                inst.state_hash()
            };
            prop_assert_eq!(run(), run());
        }
    }
}
