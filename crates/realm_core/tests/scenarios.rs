//! End-to-end scenarios driven through [`Instance`] with explicit time.

use std::sync::Arc;

use proptest::prelude::*;

use realm_core::prelude::*;
use realm_test_utils::determinism::{
    play_script, step_instance, strategies, verify_determinism, ScriptStep,
};
use realm_test_utils::fixtures::{
    populated_instance, test_config, test_instance, test_maps, ARENA, DUMMY, OWNER, WALLED,
};

const STEP_MS: u64 = 16;

type Fixture = (Instance, EntityId, Vec<EntityId>);

/// Advance in `STEP_MS` increments up to `until_ms`, collecting every event
/// with the time of the advance that produced it.
fn collect(instance: &mut Instance, until_ms: u64) -> Vec<(u64, SimEvent)> {
    let mut out = Vec::new();
    let mut now = instance.now_ms();
    while now < until_ms {
        now = (now + STEP_MS).min(until_ms);
        instance.advance(now);
        out.extend(instance.drain_events().into_iter().map(|e| (now, e)));
    }
    out
}

fn hits_by(events: &[(u64, SimEvent)], attacker: EntityId) -> Vec<(u64, EntityId)> {
    events
        .iter()
        .filter_map(|(t, e)| match *e {
            SimEvent::EntityHit {
                attacker_id,
                target_id,
            } if attacker_id == attacker => Some((*t, target_id)),
            _ => None,
        })
        .collect()
}

fn state_changes(events: &[(u64, SimEvent)], entity: EntityId) -> Vec<(u64, EntityState)> {
    events
        .iter()
        .filter_map(|(t, e)| match *e {
            SimEvent::StateChanged { entity_id, state } if entity_id == entity => Some((*t, state)),
            _ => None,
        })
        .collect()
}

/// Instance over the fixture config with one extra mob kind.
fn instance_with(kind: &str, mob: MobData, tweak: impl FnOnce(&mut SimConfig)) -> Instance {
    let mut config = test_config();
    config.mobs.insert(kind.to_string(), mob);
    tweak(&mut config);
    config.validate().unwrap();
    Instance::new(OWNER, Arc::new(config), test_maps())
}

fn fragile() -> MobData {
    MobData {
        hp: 1,
        speed: 0.0,
        attack_range: 0.0,
        ..MobData::default()
    }
}

// ============================================================================
// Hitboxes
// ============================================================================

#[test]
fn test_sweeping_swing_hits_once() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(200.0, 200.0));
    let mob = inst
        .spawn_mob(DUMMY, ARENA, 0, Vec2::new(290.0, 210.0))
        .unwrap();
    inst.drain_events();

    assert_eq!(
        inst.attack_intent_start(player, Vec2::new(300.0, 200.0)),
        AttackOutcome::Started
    );
    let events = collect(&mut inst, 25 * STEP_MS);

    let hits = hits_by(&events, player);
    assert_eq!(hits.len(), 1, "hits: {hits:?}");
    assert_eq!(hits[0].1, mob);
    // the swing starts 70 degrees off the aim and needs a few ticks to arrive
    assert!(hits[0].0 > 0);
    assert_eq!(inst.stats_of(mob).unwrap().hp, 49);
}

#[test]
fn test_swing_ignores_targets_behind() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(200.0, 200.0));
    let behind = inst
        .spawn_mob(DUMMY, ARENA, 0, Vec2::new(110.0, 200.0))
        .unwrap();
    inst.drain_events();

    inst.attack_intent_start(player, Vec2::new(300.0, 200.0));
    let events = collect(&mut inst, 400);
    assert!(hits_by(&events, player).is_empty());
    assert_eq!(inst.stats_of(behind).unwrap().hp, 50);
}

#[test]
fn test_front_box_reach() {
    // A mob's front box covers 16..48 px ahead; a 20 px player at 40 px is
    // inside, one at 80 px is not.
    for (distance, expected) in [(40.0, 1), (80.0, 0)] {
        let mut inst = test_instance();
        let mob = inst
            .spawn_mob("gablino", ARENA, 0, Vec2::new(300.0, 300.0))
            .unwrap();
        let player = inst.spawn_player(ARENA, 0, Vec2::new(300.0 + distance, 300.0));
        inst.drain_events();

        assert_eq!(
            inst.attack_intent_start(mob, Vec2::new(400.0, 300.0)),
            AttackOutcome::Started
        );
        let events = collect(&mut inst, 160);
        let hits = hits_by(&events, mob);
        assert_eq!(hits.len(), expected, "distance {distance}");
        if expected == 1 {
            assert_eq!(hits[0].1, player);
            assert_eq!(inst.stats_of(player).unwrap().hp, 9);
        }
    }
}

#[test]
fn test_mob_hit_uses_configured_damage() {
    let brute = MobData {
        atk: 1,
        damage: Some(3),
        ..MobData::default()
    };
    let mut inst = instance_with("brute", brute, |_| {});
    let mob = inst
        .spawn_mob("brute", ARENA, 0, Vec2::new(300.0, 300.0))
        .unwrap();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(340.0, 300.0));
    inst.drain_events();

    inst.attack_intent_start(mob, Vec2::new(400.0, 300.0));
    let events = collect(&mut inst, 160);
    let hits = hits_by(&events, mob);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, player);
    assert_eq!(inst.stats_of(player).unwrap().hp, 7);
}

// ============================================================================
// Attack windows
// ============================================================================

#[test]
fn test_attack_twice_is_blocked_until_window_closes() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(200.0, 200.0));

    assert_eq!(
        inst.attack_intent_start(player, Vec2::new(300.0, 200.0)),
        AttackOutcome::Started
    );
    assert_eq!(
        inst.attack_intent_start(player, Vec2::new(300.0, 200.0)),
        AttackOutcome::Blocked {
            from: EntityState::Attack
        }
    );
    assert_eq!(inst.hitboxes().len(), 1);

    collect(&mut inst, 384);
    assert_eq!(inst.entity(player).unwrap().state, EntityState::Attack);
    collect(&mut inst, 400);
    assert_eq!(inst.entity(player).unwrap().state, EntityState::Idle);
    assert!(!inst.attacks().is_attacking(player));
}

#[test]
fn test_walking_attack_resumes_direction_then_cools_down() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(100.0, 300.0));
    inst.move_intent_start(player, Vec2::X);
    collect(&mut inst, 96);
    let before = inst.entity(player).unwrap().position;

    inst.attack_intent_start(player, Vec2::new(400.0, 300.0));
    collect(&mut inst, 96 + 384);
    // no movement during the window
    assert_eq!(inst.entity(player).unwrap().position, before);

    collect(&mut inst, 96 + 400);
    assert_eq!(inst.entity(player).unwrap().state, EntityState::Walk);
    let resumed = inst.movement().intent(player).unwrap();
    assert!((resumed.dir.x - 1.0).abs() < 1e-6);

    // cooldown runs 1000 ms from the close at 496
    collect(&mut inst, 896);
    assert_eq!(
        inst.attack_intent_start(player, Vec2::new(600.0, 300.0)),
        AttackOutcome::Denied { remaining_ms: 600 }
    );
    collect(&mut inst, 1496);
    assert_eq!(
        inst.attack_intent_start(player, Vec2::new(600.0, 300.0)),
        AttackOutcome::Started
    );
}

#[test]
fn test_dead_entities_cannot_act() {
    let mut inst = instance_with("fragile", fragile(), |_| {});
    let player = inst.spawn_player(ARENA, 0, Vec2::new(200.0, 200.0));
    let mob = inst
        .spawn_mob("fragile", ARENA, 0, Vec2::new(290.0, 210.0))
        .unwrap();

    inst.attack_intent_start(player, Vec2::new(300.0, 200.0));
    collect(&mut inst, 400);
    assert_eq!(inst.entity(mob).unwrap().state, EntityState::Dead);

    let dead = AttackOutcome::Blocked {
        from: EntityState::Dead,
    };
    assert_eq!(inst.attack_intent_start(mob, Vec2::new(200.0, 200.0)), dead);
    assert_eq!(
        inst.move_intent_start(mob, Vec2::X),
        MoveOutcome::Blocked {
            from: EntityState::Dead
        }
    );
}

// ============================================================================
// Death and despawn
// ============================================================================

#[test]
fn test_killed_mob_despawns_after_delay() {
    let mut inst = instance_with("fragile", fragile(), |_| {});
    let player = inst.spawn_player(ARENA, 0, Vec2::new(200.0, 200.0));
    let mob = inst
        .spawn_mob("fragile", ARENA, 0, Vec2::new(290.0, 210.0))
        .unwrap();
    inst.drain_events();

    inst.attack_intent_start(player, Vec2::new(300.0, 200.0));
    let events = collect(&mut inst, 400);
    let hits = hits_by(&events, player);
    assert_eq!(hits.len(), 1);
    let killed_at = hits[0].0;

    assert!(events.iter().any(|(_, e)| matches!(
        *e,
        SimEvent::StatsUpdated { entity_id, hp: 0, .. } if entity_id == mob
    )));
    assert!(state_changes(&events, mob).contains(&(killed_at, EntityState::Dead)));

    let despawn_at = killed_at + inst.config().death_despawn_ms;
    collect(&mut inst, despawn_at - STEP_MS);
    assert!(inst.entity(mob).is_some(), "removed too early");

    let events = collect(&mut inst, despawn_at + STEP_MS);
    assert!(inst.entity(mob).is_none());
    assert!(events.iter().any(|(_, e)| matches!(
        *e,
        SimEvent::EntityDespawned {
            entity_id,
            reason: DespawnReason::Killed,
        } if entity_id == mob
    )));
    // the player is never despawned by death
    assert!(inst.entity(player).is_some());
}

// ============================================================================
// Mob AI
// ============================================================================

#[test]
fn test_mob_chases_attacks_and_resumes() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(320.0, 320.0));
    let mob = inst
        .spawn_mob("gablino", ARENA, 0, Vec2::new(520.0, 320.0))
        .unwrap();
    inst.drain_events();

    let mut attack_started = None;
    let mut events = Vec::new();
    while inst.now_ms() < 4000 {
        let now = inst.now_ms() + STEP_MS;
        inst.advance(now);
        for event in inst.drain_events() {
            if attack_started.is_none()
                && matches!(event, SimEvent::StateChanged { entity_id, state: EntityState::Attack } if entity_id == mob)
            {
                let pos = inst.entity(mob).unwrap().position;
                attack_started = Some((now, pos));
            }
            events.push((now, event));
        }
    }

    let (started_at, pos) = attack_started.expect("mob never attacked");
    let range = inst.config().mob("gablino").unwrap().attack_range;
    assert!(pos.distance(Vec2::new(320.0, 320.0)) <= range + 1e-3);

    // walk, attack, idle, walk again on the chase heading
    let changes = state_changes(&events, mob);
    assert_eq!(changes[0].1, EntityState::Walk);
    let after: Vec<EntityState> = changes
        .iter()
        .filter(|(t, _)| *t >= started_at)
        .map(|(_, s)| *s)
        .take(3)
        .collect();
    assert_eq!(
        after,
        vec![EntityState::Attack, EntityState::Idle, EntityState::Walk]
    );
    let (closed_at, _) = changes
        .iter()
        .find(|(t, s)| *t > started_at && *s == EntityState::Idle)
        .copied()
        .unwrap();
    assert!(closed_at - started_at >= 180);

    let hits = hits_by(&events, mob);
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|(_, target)| *target == player));
    assert!(inst.stats_of(player).unwrap().hp < 10);

    // the mob never overlaps the player it chases
    let mob_pos = inst.entity(mob).unwrap().position;
    assert!(mob_pos.distance(Vec2::new(320.0, 320.0)) >= 36.0 - 1e-3);
}

#[test]
fn test_mobs_ignore_other_map_copies() {
    let mut inst = test_instance();
    inst.spawn_player(ARENA, 0, Vec2::new(320.0, 320.0));
    let elsewhere = inst
        .spawn_mob("gablino", ARENA, 1, Vec2::new(360.0, 320.0))
        .unwrap();
    collect(&mut inst, 1000);
    let mob = inst.entity(elsewhere).unwrap();
    assert_eq!(mob.state, EntityState::Idle);
    assert_eq!(mob.position, Vec2::new(360.0, 320.0));
}

// ============================================================================
// Collision
// ============================================================================

#[test]
fn test_fast_player_cannot_tunnel_through_thin_wall() {
    let mut inst = instance_with("unused", MobData::default(), |config| {
        config.player.speed = 4000.0;
    });
    let player = inst.spawn_player(WALLED, 0, Vec2::new(200.0, 320.0));
    inst.move_intent_start(player, Vec2::X);

    for _ in 0..40 {
        step_instance(&mut inst, 50);
        let x = inst.entity(player).unwrap().position.x;
        assert!(x <= 300.0, "crossed the wall: x = {x}");
    }
    let x = inst.entity(player).unwrap().position.x;
    assert!(x > 290.0, "stopped short of the wall: x = {x}");
}

#[test]
fn test_player_stops_at_mob() {
    let mut inst = test_instance();
    let player = inst.spawn_player(ARENA, 0, Vec2::new(100.0, 300.0));
    let dummy = inst.spawn_mob(DUMMY, ARENA, 0, Vec2::new(300.0, 300.0)).unwrap();
    inst.move_intent_start(player, Vec2::X);
    collect(&mut inst, 3000);

    let p = inst.entity(player).unwrap().position;
    let d = inst.entity(dummy).unwrap().position;
    assert!(p.distance(d) >= 36.0 - 1e-3, "overlap: {}", p.distance(d));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_scripted_fight_is_deterministic() {
    let script = vec![
        ScriptStep::Move(Vec2::new(1.0, 0.5)),
        ScriptStep::Wait(300),
        ScriptStep::Attack(Vec2::new(500.0, 320.0)),
        ScriptStep::Wait(600),
        ScriptStep::Stop,
        ScriptStep::Wait(1500),
    ];
    let result = verify_determinism(
        4,
        1,
        || populated_instance(5),
        |state: &mut Fixture| play_script(&mut state.0, state.1, &script, STEP_MS),
        |state: &Fixture| state.0.state_hash(),
    );
    result.assert_deterministic();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Walking never leaves the map bounds shrunk by the collider.
    #[test]
    fn prop_player_stays_inside_bounds(
        start in (20.0f32..620.0, 20.0f32..620.0),
        dir in strategies::arb_direction(),
        ticks in 1u64..60,
    ) {
        let mut inst = test_instance();
        let player = inst.spawn_player(ARENA, 0, Vec2::new(start.0, start.1));
        inst.move_intent_start(player, dir);
        for _ in 0..ticks {
            step_instance(&mut inst, 50);
            let p = inst.entity(player).unwrap().position;
            prop_assert!(p.x >= 20.0 - 1e-3 && p.x <= 620.0 + 1e-3, "x = {}", p.x);
            prop_assert!(p.y >= 20.0 - 1e-3 && p.y <= 620.0 + 1e-3, "y = {}", p.y);
        }
    }

    /// Non-finite or absurd intents never corrupt positions.
    #[test]
    fn prop_wild_intents_keep_positions_finite(
        aim in strategies::arb_wild_point(),
        raw in (-1e6f32..1e6, -1e6f32..1e6),
    ) {
        let mut inst = test_instance();
        let player = inst.spawn_player(ARENA, 0, Vec2::new(320.0, 320.0));
        inst.move_intent_start(player, Vec2::new(raw.0, raw.1));
        inst.move_intent_start(player, Vec2::new(f32::NAN, f32::INFINITY));
        inst.attack_intent_start(player, aim);
        for _ in 0..20 {
            step_instance(&mut inst, 50);
            prop_assert!(inst.entity(player).unwrap().position.is_finite());
        }
    }
}
