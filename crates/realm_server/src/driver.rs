//! Tick driver: routes commands into the world and advances it on a fixed
//! period.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

use realm_core::config::SimConfig;
use realm_core::error::CoreError;
use realm_core::events::DespawnReason;
use realm_core::instance::Instance;
use realm_core::math::Vec2;
use realm_core::world::World;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::protocol::{Command, Response};

/// The world plus the host settings that drive it.
#[derive(Debug)]
pub struct Server {
    world: World,
    tick_ms: u64,
}

impl Server {
    /// Build the world and register every configured map.
    pub fn new(config: &ServerConfig, sim: SimConfig) -> Result<Self> {
        let mut world = World::new(sim)?;
        for (map_id, geometry) in &config.maps {
            let dropped = world.register_map(map_id, geometry.clone())?;
            tracing::info!(map = %map_id, dropped, "map registered");
        }
        Ok(Self {
            world,
            tick_ms: config.tick_ms.max(1),
        })
    }

    /// Load everything named by `config`.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let sim = config.load_sim_config()?;
        Self::new(config, sim)
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Driver period.
    #[must_use]
    pub const fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// Advance every instance to `now_ms` and wrap the produced events.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Response> {
        self.world
            .advance(now_ms)
            .into_iter()
            .map(Response::Event)
            .collect()
    }

    /// Apply one command. The reply comes first, followed by any events the
    /// command produced.
    pub fn handle(&mut self, command: Command) -> Vec<Response> {
        let mut out = match self.apply(&command) {
            Ok(replies) => replies,
            Err(err) => {
                tracing::warn!(cmd = command.name(), %err, "command rejected");
                vec![Response::error(Some(&command), err.to_string())]
            }
        };
        out.extend(self.world.drain_events().into_iter().map(Response::Event));
        out
    }

    fn apply(&mut self, command: &Command) -> Result<Vec<Response>> {
        let player_id = command.player_id();
        match command {
            Command::Join { .. } => {
                self.world.add_player(player_id);
                Ok(vec![ack(command)])
            }
            Command::Leave { .. } => {
                if self.world.instance(player_id).is_none() {
                    return Err(ServerError::UnknownPlayer(player_id));
                }
                let events = self.world.remove_player(player_id);
                let mut replies = vec![ack(command)];
                replies.extend(events.into_iter().map(Response::Event));
                Ok(replies)
            }
            Command::SpawnPlayer {
                map_id,
                instance_id,
                x,
                y,
                ..
            } => {
                let entity_id =
                    self.instance(player_id)?
                        .spawn_player(map_id, *instance_id, Vec2::new(*x, *y));
                Ok(vec![Response::Spawned {
                    player_id,
                    entity_id,
                }])
            }
            Command::SpawnMob {
                kind,
                map_id,
                instance_id,
                x,
                y,
                ..
            } => {
                let entity_id = self.instance(player_id)?.spawn_mob(
                    kind,
                    map_id,
                    *instance_id,
                    Vec2::new(*x, *y),
                )?;
                Ok(vec![Response::Spawned {
                    player_id,
                    entity_id,
                }])
            }
            Command::Move {
                entity_id, dx, dy, ..
            } => {
                let outcome = self
                    .instance(player_id)?
                    .move_intent_start(*entity_id, Vec2::new(*dx, *dy));
                Ok(vec![Response::MoveResult {
                    player_id,
                    entity_id: *entity_id,
                    outcome,
                }])
            }
            Command::Stop { entity_id, .. } => {
                let outcome = self.instance(player_id)?.move_intent_stop(*entity_id);
                Ok(vec![Response::MoveResult {
                    player_id,
                    entity_id: *entity_id,
                    outcome,
                }])
            }
            Command::Attack {
                entity_id,
                aim_x,
                aim_y,
                ..
            } => {
                let outcome = self
                    .instance(player_id)?
                    .attack_intent_start(*entity_id, Vec2::new(*aim_x, *aim_y));
                Ok(vec![Response::AttackResult {
                    player_id,
                    entity_id: *entity_id,
                    outcome,
                }])
            }
            Command::Despawn {
                entity_id,
                delay_ms,
                ..
            } => {
                let instance = self.instance(player_id)?;
                let found = if *delay_ms == 0 {
                    instance.despawn(*entity_id, DespawnReason::Removed)
                } else {
                    instance
                        .schedule_despawn(*entity_id, *delay_ms, DespawnReason::Removed)
                        .is_some()
                };
                if !found {
                    return Err(CoreError::EntityNotFound(*entity_id).into());
                }
                Ok(vec![ack(command)])
            }
            Command::Stats { entity_id, .. } => {
                let stats = self
                    .instance(player_id)?
                    .stats_of(*entity_id)
                    .ok_or(CoreError::EntityNotFound(*entity_id))?;
                Ok(vec![Response::Stats {
                    player_id,
                    entity_id: *entity_id,
                    stats,
                }])
            }
            Command::Hash { .. } => {
                let hash = self.instance(player_id)?.state_hash();
                Ok(vec![Response::Hash { player_id, hash }])
            }
        }
    }

    fn instance(&mut self, player_id: u64) -> Result<&mut Instance> {
        self.world
            .instance_mut(player_id)
            .ok_or(ServerError::UnknownPlayer(player_id))
    }
}

fn ack(command: &Command) -> Response {
    Response::Ack {
        cmd: command.name().to_string(),
    }
}

/// Drive `server` until `shutdown` resolves or the ingress closes.
///
/// Commands are applied as they arrive; every `tick_ms` the world advances
/// to the time elapsed since the loop started. Responses go to `egress`;
/// the loop stops early if nobody is listening.
pub async fn run<F>(
    mut server: Server,
    mut ingress: mpsc::Receiver<Command>,
    egress: mpsc::UnboundedSender<Response>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let mut ticker = interval(Duration::from_millis(server.tick_ms()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::info!(tick_ms = server.tick_ms(), "driver started");
    loop {
        let responses = tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                server.tick(now_ms)
            }
            command = ingress.recv() => match command {
                Some(command) => server.handle(command),
                None => {
                    tracing::info!("ingress closed");
                    break;
                }
            },
        };
        for response in responses {
            if egress.send(response).is_err() {
                tracing::warn!("egress closed, stopping driver");
                return Ok(());
            }
        }
    }
    tracing::info!(players = server.world().len(), "driver stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::events::SimEvent;
    use realm_core::instance::{AttackOutcome, MoveOutcome};
    use realm_core::world::Envelope;

    fn server() -> Server {
        Server::new(&ServerConfig::default(), SimConfig::default()).unwrap()
    }

    fn joined(server: &mut Server, player_id: u64) -> u64 {
        server.handle(Command::Join { player_id });
        let replies = server.handle(Command::SpawnPlayer {
            player_id,
            map_id: "area1/m1".to_string(),
            instance_id: 0,
            x: 100.0,
            y: 100.0,
        });
        match replies[0] {
            Response::Spawned { entity_id, .. } => entity_id,
            ref other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_spawn_reply_precedes_events() {
        let mut server = server();
        server.handle(Command::Join { player_id: 7 });
        let replies = server.handle(Command::SpawnPlayer {
            player_id: 7,
            map_id: "area1/m1".to_string(),
            instance_id: 0,
            x: 10.0,
            y: 20.0,
        });
        assert!(matches!(replies[0], Response::Spawned { player_id: 7, .. }));
        assert!(matches!(
            replies[1],
            Response::Event(Envelope {
                player_id: 7,
                event: SimEvent::EntitySpawned { .. },
            })
        ));
    }

    #[test]
    fn test_commands_for_unknown_player_are_errors() {
        let mut server = server();
        let replies = server.handle(Command::Hash { player_id: 99 });
        assert!(matches!(
            &replies[0],
            Response::Error { cmd: Some(cmd), .. } if cmd == "hash"
        ));
    }

    #[test]
    fn test_move_then_tick_reports_positions() {
        let mut server = server();
        let entity = joined(&mut server, 1);
        let replies = server.handle(Command::Move {
            player_id: 1,
            entity_id: entity,
            dx: 1.0,
            dy: 0.0,
        });
        assert_eq!(
            replies[0],
            Response::MoveResult {
                player_id: 1,
                entity_id: entity,
                outcome: MoveOutcome::Moving,
            }
        );
        server.tick(0);
        let events = server.tick(50);
        assert!(events.iter().any(|r| matches!(
            r,
            Response::Event(Envelope {
                event: SimEvent::PositionChanged { .. },
                ..
            })
        )));
    }

    #[test]
    fn test_attack_and_stats() {
        let mut server = server();
        let entity = joined(&mut server, 1);
        let replies = server.handle(Command::Attack {
            player_id: 1,
            entity_id: entity,
            aim_x: 200.0,
            aim_y: 100.0,
        });
        assert!(matches!(
            replies[0],
            Response::AttackResult {
                outcome: AttackOutcome::Started,
                ..
            }
        ));

        let replies = server.handle(Command::Stats {
            player_id: 1,
            entity_id: entity,
        });
        assert!(matches!(replies[0], Response::Stats { stats, .. } if stats.hp == 10));

        let replies = server.handle(Command::Stats {
            player_id: 1,
            entity_id: 999,
        });
        assert!(matches!(replies[0], Response::Error { .. }));
    }

    #[test]
    fn test_leave_reports_player_left() {
        let mut server = server();
        let entity = joined(&mut server, 3);
        let replies = server.handle(Command::Leave { player_id: 3 });
        assert!(matches!(&replies[0], Response::Ack { cmd } if cmd == "leave"));
        assert!(replies.iter().any(|r| matches!(
            r,
            Response::Event(Envelope {
                event: SimEvent::EntityDespawned {
                    entity_id,
                    reason: DespawnReason::PlayerLeft,
                },
                ..
            }) if *entity_id == entity
        )));
        assert!(server.world().is_empty());
    }

    #[test]
    fn test_swing_through_commands_hits_mob() {
        use realm_test_utils::fixtures::{test_config, ARENA, DUMMY};

        let mut server = Server::new(&ServerConfig::default(), test_config()).unwrap();
        server.handle(Command::Join { player_id: 1 });
        let player = match server.handle(Command::SpawnPlayer {
            player_id: 1,
            map_id: ARENA.to_string(),
            instance_id: 0,
            x: 200.0,
            y: 200.0,
        })[0]
        {
            Response::Spawned { entity_id, .. } => entity_id,
            ref other => panic!("unexpected reply {other:?}"),
        };
        let mob = match server.handle(Command::SpawnMob {
            player_id: 1,
            kind: DUMMY.to_string(),
            map_id: ARENA.to_string(),
            instance_id: 0,
            x: 290.0,
            y: 210.0,
        })[0]
        {
            Response::Spawned { entity_id, .. } => entity_id,
            ref other => panic!("unexpected reply {other:?}"),
        };
        server.handle(Command::Attack {
            player_id: 1,
            entity_id: player,
            aim_x: 300.0,
            aim_y: 200.0,
        });

        let mut hits = 0;
        for step in 1..=25 {
            hits += server
                .tick(step * 16)
                .iter()
                .filter(|r| {
                    matches!(
                        r,
                        Response::Event(Envelope {
                            event: SimEvent::EntityHit { target_id, .. },
                            ..
                        }) if *target_id == mob
                    )
                })
                .count();
        }
        assert_eq!(hits, 1);
        let replies = server.handle(Command::Stats {
            player_id: 1,
            entity_id: mob,
        });
        assert!(matches!(replies[0], Response::Stats { stats, .. } if stats.hp == 49));
    }

    #[test]
    fn test_delayed_despawn() {
        let mut server = server();
        let entity = joined(&mut server, 1);
        server.tick(0);
        let replies = server.handle(Command::Despawn {
            player_id: 1,
            entity_id: entity,
            delay_ms: 100,
        });
        assert!(matches!(replies[0], Response::Ack { .. }));
        assert!(server.tick(50).is_empty());
        let events = server.tick(120);
        assert!(events.iter().any(|r| matches!(
            r,
            Response::Event(Envelope {
                event: SimEvent::EntityDespawned { .. },
                ..
            })
        )));
    }

    #[tokio::test]
    async fn test_run_stops_when_ingress_closes() {
        let (tx, rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        tx.send(Command::Join { player_id: 5 }).await.unwrap();
        tx.send(Command::Hash { player_id: 5 }).await.unwrap();
        drop(tx);

        run(server(), rx, out_tx, std::future::pending()).await.unwrap();

        let mut replies = Vec::new();
        while let Ok(response) = out_rx.try_recv() {
            replies.push(response);
        }
        assert!(replies
            .iter()
            .any(|r| matches!(r, Response::Ack { cmd } if cmd == "join")));
        assert!(replies
            .iter()
            .any(|r| matches!(r, Response::Hash { player_id: 5, .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_tx, rx) = mpsc::channel::<Command>(1);
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let shutdown = tokio::time::sleep(Duration::from_millis(30));
        run(server(), rx, out_tx, shutdown).await.unwrap();
    }
}
