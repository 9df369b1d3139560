//! Room lifecycle, authoritative tick loop and broadcast fan-out

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::game::physics::{GameEvent, PhysicsEngine};
use crate::game::state::{GameState, GameStatus, Side};
use crate::game::WINNING_SCORE;
use crate::util::time::{tick_duration, GOAL_RESUME_DELAY};
use crate::ws::protocol::{ServerMsg, SoundKind};

/// Handle to one connected client and its outbound frame queue
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub side: Side,
    tx: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new(side: Side, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            side,
            tx,
        }
    }

    /// Queue one pre-serialized frame. A closed connection is skipped
    /// silently; its removal is the disconnect path's job.
    fn send_raw(&self, frame: String) {
        let _ = self.tx.send(frame);
    }
}

/// Mutable room state, guarded by the room's mutex. One tick and one message
/// effect are each a single critical section, and nothing awaits inside one.
pub struct RoomState {
    pub clients: Vec<ClientHandle>,
    pub game: GameState,
    /// Set once the room is being destroyed, so a racing join cannot revive it
    pub closed: bool,
    tick_task: Option<JoinHandle<()>>,
    resume_task: Option<JoinHandle<()>>,
}

impl RoomState {
    fn new() -> Self {
        Self {
            clients: Vec::new(),
            game: GameState::new(),
            closed: false,
            tick_task: None,
            resume_task: None,
        }
    }

    /// Serialize once, deliver to every live connection in the room.
    /// Called under the room lock, so per-room delivery order matches
    /// mutation order for all clients.
    pub fn broadcast(&self, msg: &ServerMsg) {
        let frame = match serde_json::to_string(msg) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast message");
                return;
            }
        };
        for client in &self.clients {
            client.send_raw(frame.clone());
        }
    }

    pub fn side_count(&self, side: Side) -> usize {
        self.clients.iter().filter(|c| c.side == side).count()
    }

    pub fn both_sides_occupied(&self) -> bool {
        self.side_count(Side::Left) >= 1 && self.side_count(Side::Right) >= 1
    }

    /// Side a new joiner gets: left unless left already outnumbers right
    pub fn balanced_side(&self) -> Side {
        if self.side_count(Side::Left) <= self.side_count(Side::Right) {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn stop_tick(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }

    fn stop_resume(&mut self) {
        if let Some(task) = self.resume_task.take() {
            task.abort();
        }
    }

    /// Cancel the tick loop and any pending goal-resume serve
    pub fn stop_tasks(&mut self) {
        self.stop_tick();
        self.stop_resume();
    }
}

/// An isolated two-sided match session, identified by a short code
pub struct Room {
    pub code: String,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(code: String) -> Self {
        Self {
            code,
            state: Mutex::new(RoomState::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock()
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Start a match: reset positions, flip to playing, spawn the tick task.
    /// Idempotent while a tick task is alive.
    pub fn start_game(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.tick_task.is_some() {
            return;
        }

        state.game.game_status = GameStatus::Playing;
        state.game.reset_puck(Side::Left);
        state.game.reset_paddles();
        state.tick_task = Some(spawn_tick_task(Arc::downgrade(self)));

        let game = state.game.clone();
        state.broadcast(&ServerMsg::GameStart { game });

        info!(room = %self.code, "Game started");
    }

    /// Reset the match; restarts immediately if both sides are occupied
    pub fn reset_game(self: &Arc<Self>) {
        let should_start = {
            let mut state = self.state.lock();
            state.stop_tasks();
            state.game = GameState::new();
            state.both_sides_occupied()
        };

        if should_start {
            self.start_game();
        }
    }

    /// Advance one tick: run physics, fan out the resulting events, and
    /// broadcast the snapshot unless a goal interrupted the step
    pub fn tick(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let events = PhysicsEngine::step(&mut state.game);

        let mut scored = false;
        for event in events {
            match event {
                GameEvent::Wall { intensity } => {
                    state.broadcast(&ServerMsg::Sound {
                        sound: SoundKind::Wall,
                        intensity,
                        side: None,
                    });
                }
                GameEvent::Paddle { side, intensity } => {
                    state.broadcast(&ServerMsg::Sound {
                        sound: SoundKind::Paddle,
                        intensity,
                        side: Some(side),
                    });
                }
                GameEvent::Goal { scorer } => {
                    scored = true;
                    self.handle_goal(&mut state, scorer);
                }
            }
        }

        if !scored && state.game.game_status == GameStatus::Playing {
            let game = state.game.clone();
            state.broadcast(&ServerMsg::GameState { game });
        }
    }

    /// Goal bookkeeping: pause play, announce, then either finish the match
    /// or schedule the serve toward the conceding side
    fn handle_goal(self: &Arc<Self>, state: &mut RoomState, scorer: Side) {
        state.game.game_status = GameStatus::Goal;

        if state.game.score.get(scorer) >= WINNING_SCORE {
            state.game.winner = Some(scorer);
            state.game.game_status = GameStatus::Finished;
        }

        state.broadcast(&ServerMsg::Goal {
            scorer,
            score: state.game.score,
            winner: state.game.winner,
        });

        info!(
            room = %self.code,
            scorer = ?scorer,
            left = state.game.score.left,
            right = state.game.score.right,
            "Goal scored"
        );

        if state.game.game_status == GameStatus::Finished {
            info!(room = %self.code, winner = ?state.game.winner, "Match finished");
            state.stop_tick();
            return;
        }

        state.resume_task = Some(spawn_resume_task(
            Arc::downgrade(self),
            scorer.opponent(),
        ));
    }

    /// Serve after the goal pause. The status guard covers the window where
    /// a reset or waiting transition lands between the sleep expiring and
    /// this running.
    fn resume_after_goal(&self, serving_side: Side) {
        let mut state = self.state.lock();
        state.resume_task = None;

        if state.game.game_status != GameStatus::Goal || state.clients.is_empty() {
            return;
        }

        state.game.reset_puck(serving_side);
        state.game.game_status = GameStatus::Playing;
    }
}

/// 60 Hz tick loop. Holds only a weak reference so a destroyed room cannot
/// be kept alive or mutated by a straggling task.
fn spawn_tick_task(room: Weak<Room>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(room) = room.upgrade() else {
                break;
            };
            room.tick();
        }
    })
}

/// One-shot serve scheduled after a goal
fn spawn_resume_task(room: Weak<Room>, serving_side: Side) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(GOAL_RESUME_DELAY).await;
        if let Some(room) = room.upgrade() {
            room.resume_after_goal(serving_side);
        }
    })
}
