//! One running game: a single writer over the battle state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::event::{resolve_action, victory_check, GameEnd, GameEvent, PlayerAction};
use crate::game::phase::GamePhase;
use crate::game::state::GameState;
use crate::game::types::{PerSide, Side};
use crate::store::AdmiralLock;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What became of a packet
#[derive(Debug, Clone, PartialEq)]
pub enum PacketOutcome {
    Applied,
    Rejected(String),
    Ended,
    /// The game was already over
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    BothPresent,
    /// The opponent never showed up and the game was ended in our favour
    OpponentAbsent,
    AlreadyEnded,
}

/// Public view of a session for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub phase: GamePhase,
    pub ready: Option<Side>,
    pub ships: PerSide<usize>,
    pub entered: PerSide<bool>,
    /// Admiral locks still held by the game
    pub locks_held: usize,
    pub ended: bool,
    pub started_at: DateTime<Utc>,
}

struct SessionCore {
    state: GameState,
    rng: ChaCha8Rng,
    ended: bool,
}

pub struct GameSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    entry_timeout: Duration,
    core: Mutex<SessionCore>,
    events: broadcast::Sender<GameEvent>,
    error_tx: PerSide<mpsc::UnboundedSender<String>>,
    error_rx: PerSide<SyncMutex<Option<mpsc::UnboundedReceiver<String>>>>,
    entered: PerSide<watch::Sender<bool>>,
    end: watch::Sender<Option<GameEnd>>,
    connected: PerSide<AtomicBool>,
    locks: SyncMutex<Vec<Arc<AdmiralLock>>>,
}

impl GameSession {
    pub fn new(
        id: Uuid,
        state: GameState,
        seed: u64,
        entry_timeout: Duration,
        locks: Vec<Arc<AdmiralLock>>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (guest_tx, guest_rx) = mpsc::unbounded_channel();
        let (end, _) = watch::channel(None);

        Arc::new(Self {
            id,
            started_at: Utc::now(),
            entry_timeout,
            core: Mutex::new(SessionCore {
                state,
                rng: ChaCha8Rng::seed_from_u64(seed),
                ended: false,
            }),
            events,
            error_tx: PerSide::new(host_tx, guest_tx),
            error_rx: PerSide::new(
                SyncMutex::new(Some(host_rx)),
                SyncMutex::new(Some(guest_rx)),
            ),
            entered: PerSide::from_fn(|_| watch::channel(false).0),
            end,
            connected: PerSide::from_fn(|_| AtomicBool::new(false)),
            locks: SyncMutex::new(locks),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// State changes and the final game end, in order
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// The side's rejection queue. Only the first caller gets it.
    pub fn take_errors(&self, side: Side) -> Option<mpsc::UnboundedReceiver<String>> {
        self.error_rx.get(side).lock().take()
    }

    /// Claims a side for one connection; `false` if it is already taken
    pub fn claim_side(&self, side: Side) -> bool {
        !self.connected.get(side).swap(true, Ordering::AcqRel)
    }

    pub async fn current_state(&self) -> GameState {
        self.core.lock().await.state.clone()
    }

    pub fn end(&self) -> Option<GameEnd> {
        self.end.borrow().clone()
    }

    pub fn is_ended(&self) -> bool {
        self.end.borrow().is_some()
    }

    pub fn has_entered(&self, side: Side) -> bool {
        *self.entered.get(side).borrow()
    }

    pub fn held_locks(&self) -> usize {
        self.locks.lock().len()
    }

    pub async fn summary(&self) -> SessionSummary {
        let core = self.core.lock().await;
        SessionSummary {
            id: self.id,
            phase: core.state.phase,
            ready: core.state.ready,
            ships: PerSide::from_fn(|side| core.state.ships_of(side).count()),
            entered: PerSide::from_fn(|side| self.has_entered(side)),
            locks_held: self.held_locks(),
            ended: core.ended,
            started_at: self.started_at,
        }
    }

    /// Marks `side` present and waits for the opponent. If the opponent does
    /// not arrive in time the game ends in `side`'s favour.
    pub async fn enter(&self, side: Side) -> EntryOutcome {
        self.entered.get(side).send_replace(true);
        info!(session_id = %self.id, side = ?side, "Player entered game");

        let mut opponent = self.entered.get(side.other()).subscribe();
        let mut end = self.end.subscribe();
        let arrived = tokio::time::timeout(self.entry_timeout, async {
            tokio::select! {
                result = opponent.wait_for(|entered| *entered) => result.is_ok(),
                _ = end.wait_for(Option::is_some) => false,
            }
        })
        .await;

        match arrived {
            Ok(true) => EntryOutcome::BothPresent,
            Ok(false) => EntryOutcome::AlreadyEnded,
            Err(_) => {
                warn!(session_id = %self.id, absent = ?side.other(), "Opponent never entered");
                match self.on_packet(side.other(), PlayerAction::TimeOut).await {
                    PacketOutcome::Ended => EntryOutcome::OpponentAbsent,
                    _ => EntryOutcome::AlreadyEnded,
                }
            }
        }
    }

    /// Resolves one action under the session lock
    pub async fn on_packet(&self, side: Side, action: PlayerAction) -> PacketOutcome {
        let mut core = self.core.lock().await;
        if core.ended {
            return PacketOutcome::Ignored;
        }

        let SessionCore { state, rng, .. } = &mut *core;
        match resolve_action(state, side, &action, rng) {
            GameEvent::StateChange { state: next } => {
                core.state = *next;
                let _ = self.events.send(GameEvent::StateChange {
                    state: Box::new(core.state.clone()),
                });
                if let Some(end) = victory_check(&core.state) {
                    self.finish(&mut core, end);
                    return PacketOutcome::Ended;
                }
                PacketOutcome::Applied
            }
            GameEvent::InvalidAction { message } => {
                debug!(session_id = %self.id, side = ?side, reason = %message, "Action rejected");
                self.reject(side, message.clone());
                PacketOutcome::Rejected(message)
            }
            GameEvent::GameEnd(end) => {
                self.finish(&mut core, end);
                PacketOutcome::Ended
            }
        }
    }

    /// Sends `side` a rejection without touching the game
    pub fn reject(&self, side: Side, message: impl Into<String>) {
        let _ = self.error_tx.get(side).send(message.into());
    }

    /// Ends a game that nobody entered
    pub async fn abandon(&self) {
        let mut core = self.core.lock().await;
        if core.ended {
            return;
        }
        let end = GameEnd::new(&core.state, None, "Neither admiral arrived. The battle never began.");
        self.finish(&mut core, end);
    }

    fn finish(&self, core: &mut SessionCore, end: GameEnd) {
        core.ended = true;
        info!(
            session_id = %self.id,
            winner = ?end.winner,
            message = %end.message,
            "Game ended"
        );
        let _ = self.events.send(GameEvent::GameEnd(end.clone()));
        self.end.send_replace(Some(end));
        self.locks.lock().clear();
    }

    /// Waits until either side has entered
    pub async fn wait_any_entry(&self) {
        let mut host = self.entered.host.subscribe();
        let mut guest = self.entered.guest.subscribe();
        tokio::select! {
            _ = host.wait_for(|entered| *entered) => {}
            _ = guest.wait_for(|entered| *entered) => {}
        }
    }

    pub async fn wait_end(&self) -> Option<GameEnd> {
        let mut end = self.end.subscribe();
        let result = end.wait_for(Option::is_some).await.ok()?.clone();
        result
    }

    pub fn entry_timeout(&self) -> Duration {
        self.entry_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ability::{PlayerAbilityData, PlayerAbilityType};
    use crate::game::ship::ShipClass;
    use crate::game::start::new_game;
    use crate::game::start::BattleSize;
    use crate::game::state::tests::{battle, setup};
    use crate::store::{Admiral, MemoryStore};

    async fn locked_pair(store: &Arc<MemoryStore>) -> Vec<Arc<AdmiralLock>> {
        let mut locks = Vec::new();
        for name in ["Host", "Guest"] {
            let admiral = Admiral {
                id: Uuid::new_v4(),
                name: name.to_string(),
                rank: 0,
                currency: 0,
                experience: 0,
            };
            let id = admiral.id;
            store.insert_admiral(admiral, Vec::new());
            locks.push(Arc::new(AdmiralLock::acquire(store.clone(), id).await.unwrap()));
        }
        locks
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_timeout_credits_present_side_and_releases_locks() {
        let store = Arc::new(MemoryStore::new());
        let locks = locked_pair(&store).await;
        let ids: Vec<Uuid> = locks.iter().map(|lock| lock.admiral()).collect();

        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let state = new_game(
            BattleSize::Raid,
            setup("Host", &[ShipClass::Picket]),
            setup("Guest", &[ShipClass::Needle]),
            &mut rng,
        );
        let session = GameSession::new(Uuid::new_v4(), state, 4, Duration::from_secs(30), locks);
        assert_eq!(session.held_locks(), 2);

        let outcome = session.enter(Side::Host).await;
        assert_eq!(outcome, EntryOutcome::OpponentAbsent);

        let end = session.end().unwrap();
        assert_eq!(end.winner, Some(Side::Host));
        assert_eq!(session.held_locks(), 0);
        assert!(ids.iter().all(|id| !store.is_locked(*id)));

        // nothing is applied after the end
        let late = PlayerAction::SendChatMessage {
            message: "wait for me".to_string(),
        };
        assert_eq!(session.on_packet(Side::Guest, late).await, PacketOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_sides_entering_starts_the_game() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            1,
            Duration::from_secs(30),
            Vec::new(),
        );
        let host = {
            let session = session.clone();
            tokio::spawn(async move { session.enter(Side::Host).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.enter(Side::Guest).await, EntryOutcome::BothPresent);
        assert_eq!(host.await.unwrap(), EntryOutcome::BothPresent);
        assert!(!session.is_ended());
    }

    #[tokio::test]
    async fn test_rejections_go_to_the_acting_side_only() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            2,
            Duration::from_secs(30),
            Vec::new(),
        );
        let mut host_errors = session.take_errors(Side::Host).unwrap();
        let mut guest_errors = session.take_errors(Side::Guest).unwrap();
        assert!(session.take_errors(Side::Host).is_none());
        let mut events = session.subscribe();

        let wrong_phase = PlayerAction::UseAbility {
            ability: PlayerAbilityType::DonePhase {
                phase: GamePhase::Attack(3),
            },
            data: PlayerAbilityData::DonePhase,
        };
        let before = session.current_state().await;
        assert!(matches!(
            session.on_packet(Side::Host, wrong_phase).await,
            PacketOutcome::Rejected(_)
        ));
        assert!(host_errors.try_recv().is_ok());
        assert!(guest_errors.try_recv().is_err());
        assert!(events.try_recv().is_err());
        assert_eq!(session.current_state().await, before);

        let done = PlayerAction::UseAbility {
            ability: PlayerAbilityType::DonePhase {
                phase: GamePhase::Power(1),
            },
            data: PlayerAbilityData::DonePhase,
        };
        assert_eq!(session.on_packet(Side::Host, done).await, PacketOutcome::Applied);
        assert!(matches!(events.try_recv(), Ok(GameEvent::StateChange { .. })));
        assert_eq!(session.current_state().await.ready, Some(Side::Host));
    }

    #[tokio::test]
    async fn test_disconnect_ends_game_once() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            3,
            Duration::from_secs(30),
            Vec::new(),
        );
        assert_eq!(
            session.on_packet(Side::Host, PlayerAction::Disconnect).await,
            PacketOutcome::Ended
        );
        assert_eq!(session.wait_end().await.unwrap().winner, Some(Side::Guest));
        assert_eq!(
            session.on_packet(Side::Guest, PlayerAction::Disconnect).await,
            PacketOutcome::Ignored
        );
    }
}
