//! Per-connection protocol dispatch
//!
//! A `Session` binds one connection to at most one room and one client at a
//! time. Every effect of an inbound message is applied under the owning
//! room's lock, so a message and a physics tick never interleave partially.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::game::registry::{RoomRegistry, CODE_LEN};
use crate::game::room::{ClientHandle, Room};
use crate::game::state::{GameState, GameStatus, Side};
use crate::game::{
    PADDLE_RADIUS, ROOM_CAPACITY, VIEWPORT_WIDTH, WORLD_HEIGHT, WORLD_WIDTH,
};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Room operation failures, reported to the offending connection only
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Invalid room code")]
    InvalidCode,
    #[error("Room not found")]
    NotFound,
    #[error("Room is full")]
    RoomFull,
}

pub struct Session {
    registry: Arc<RoomRegistry>,
    outbound: mpsc::UnboundedSender<String>,
    room: Option<Arc<Room>>,
    client_id: Option<Uuid>,
    side: Option<Side>,
}

impl Session {
    pub fn new(registry: Arc<RoomRegistry>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            registry,
            outbound,
            room: None,
            client_id: None,
            side: None,
        }
    }

    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    pub fn handle_message(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::CreateRoom => self.create_room(),
            ClientMsg::JoinRoom { room_id } => {
                if let Err(e) = self.join_room(&room_id) {
                    self.send_error(e);
                }
            }
            ClientMsg::LeaveRoom => self.leave_room(),
            ClientMsg::PaddleMove { x, y } => self.paddle_move(x, y),
            ClientMsg::RestartGame => self.restart_game(),
        }
    }

    /// Transport-level close has the same effect as an explicit leave
    pub fn handle_disconnect(&mut self) {
        self.leave_room();
    }

    fn create_room(&mut self) {
        // One room per connection: creating implies leaving the old one
        self.leave_room();

        let room = self.registry.create();
        let client = ClientHandle::new(Side::Left, self.outbound.clone());
        let client_id = client.id;

        {
            let mut state = room.lock();
            state.clients.push(client);
            // Reply under the lock so the welcome precedes any broadcast
            self.send(&welcome_msg(true, &room.code, client_id, Side::Left, &state.game));
        }

        info!(room = %room.code, client_id = %client_id, "Client created room");

        self.room = Some(room);
        self.client_id = Some(client_id);
        self.side = Some(Side::Left);
    }

    fn join_room(&mut self, code: &str) -> Result<(), RoomError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != CODE_LEN {
            return Err(RoomError::InvalidCode);
        }
        let room = self.registry.lookup(&code).ok_or(RoomError::NotFound)?;

        // Joining implies leaving any previous room first
        self.leave_room();

        let should_start;
        let side;
        let client_id;
        {
            let mut state = room.lock();
            if state.closed {
                return Err(RoomError::NotFound);
            }
            if state.clients.len() >= ROOM_CAPACITY {
                return Err(RoomError::RoomFull);
            }

            side = state.balanced_side();
            let client = ClientHandle::new(side, self.outbound.clone());
            client_id = client.id;
            state.clients.push(client);
            self.send(&welcome_msg(false, &room.code, client_id, side, &state.game));

            should_start = state.both_sides_occupied()
                && state.game.game_status == GameStatus::Waiting;
        }

        info!(room = %room.code, client_id = %client_id, side = ?side, "Client joined room");

        self.room = Some(room.clone());
        self.client_id = Some(client_id);
        self.side = Some(side);

        if should_start {
            room.start_game();
        }
        Ok(())
    }

    /// No-op when not in a room. Destroys the room if this was the last
    /// client, otherwise reverts it to waiting and notifies the peers.
    fn leave_room(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        let Some(client_id) = self.client_id.take() else {
            return;
        };
        self.side = None;

        let mut state = room.lock();
        state.clients.retain(|c| c.id != client_id);

        if state.clients.is_empty() {
            state.closed = true;
            state.stop_tasks();
            state.game.game_status = GameStatus::Waiting;
            drop(state);
            self.registry.remove(&room.code);
            info!(room = %room.code, client_id = %client_id, "Last client left, room destroyed");
        } else {
            state.stop_tasks();
            state.game.game_status = GameStatus::Waiting;
            state.broadcast(&ServerMsg::PlayerLeft);
            drop(state);
            info!(room = %room.code, client_id = %client_id, "Client left room");
        }
    }

    /// Clamp the target to the caller's half and the vertical bounds, record
    /// the displacement for momentum transfer, and echo the new position.
    /// Ignored when not in a room.
    fn paddle_move(&self, x: f32, y: f32) {
        let (Some(room), Some(side)) = (self.room.as_ref(), self.side) else {
            return;
        };

        let mut state = room.lock();
        let paddle = state.game.paddles.get_mut(side);
        let prev_x = paddle.x;
        let prev_y = paddle.y;

        let half_width = WORLD_WIDTH / 2.0;
        let new_x = match side {
            Side::Left => x.clamp(PADDLE_RADIUS, half_width - PADDLE_RADIUS),
            Side::Right => x.clamp(half_width + PADDLE_RADIUS, WORLD_WIDTH - PADDLE_RADIUS),
        };
        let new_y = y.clamp(PADDLE_RADIUS, WORLD_HEIGHT - PADDLE_RADIUS);

        paddle.x = new_x;
        paddle.y = new_y;
        paddle.last_vx = new_x - prev_x;
        paddle.last_vy = new_y - prev_y;

        let paddle = paddle.clone();
        state.broadcast(&ServerMsg::PaddleUpdate { side, paddle });
    }

    /// Ignored when not in a room
    fn restart_game(&self) {
        let Some(room) = self.room.as_ref() else {
            return;
        };
        room.reset_game();
        info!(room = %room.code, "Game restarted");
    }

    fn send(&self, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(frame) => {
                let _ = self.outbound.send(frame);
            }
            Err(e) => error!(error = %e, "Failed to serialize reply"),
        }
    }

    fn send_error(&self, err: RoomError) {
        warn!(error = %err, "Rejected room operation");
        self.send(&ServerMsg::RoomError {
            message: err.to_string(),
        });
    }
}

fn welcome_msg(
    created: bool,
    code: &str,
    client_id: Uuid,
    side: Side,
    game: &GameState,
) -> ServerMsg {
    let room_id = code.to_string();
    let viewport_offset = side.viewport_offset();
    let game = game.clone();
    if created {
        ServerMsg::RoomCreated {
            room_id,
            client_id,
            side,
            viewport_offset,
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            viewport_width: VIEWPORT_WIDTH,
            game,
        }
    } else {
        ServerMsg::RoomJoined {
            room_id,
            client_id,
            side,
            viewport_offset,
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            viewport_width: VIEWPORT_WIDTH,
            game,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    fn open_session(
        registry: &Arc<RoomRegistry>,
    ) -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(registry.clone(), tx), rx)
    }

    fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMsg {
        let frame = rx.try_recv().expect("expected a queued message");
        serde_json::from_str(&frame).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn create_room_assigns_left_side_and_world_dimensions() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut session, mut rx) = open_session(&registry);

        session.handle_message(ClientMsg::CreateRoom);

        match recv(&mut rx) {
            ServerMsg::RoomCreated {
                room_id,
                side,
                viewport_offset,
                world_width,
                world_height,
                viewport_width,
                game,
                ..
            } => {
                assert_eq!(room_id.len(), CODE_LEN);
                assert_eq!(side, Side::Left);
                assert_eq!(viewport_offset, 0.0);
                assert_eq!(world_width, 1200.0);
                assert_eq!(world_height, 600.0);
                assert_eq!(viewport_width, 600.0);
                assert_eq!(game.game_status, GameStatus::Waiting);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(registry.active_rooms(), 1);
    }

    #[tokio::test]
    async fn second_join_takes_right_side_and_starts_the_game() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        let (mut joiner, mut joiner_rx) = open_session(&registry);

        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };

        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.to_ascii_lowercase(),
        });

        match recv(&mut joiner_rx) {
            ServerMsg::RoomJoined {
                side,
                viewport_offset,
                ..
            } => {
                assert_eq!(side, Side::Right);
                assert_eq!(viewport_offset, 600.0);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        // Both clients observe the match start
        for rx in [&mut creator_rx, &mut joiner_rx] {
            assert!(drain(rx)
                .iter()
                .any(|m| matches!(m, ServerMsg::GameStart { .. })));
        }

        let room = registry.lookup(&code).unwrap();
        assert_eq!(room.lock().game.game_status, GameStatus::Playing);

        // Cleanup so the tick task dies with the room
        creator.handle_disconnect();
        joiner.handle_disconnect();
    }

    #[tokio::test]
    async fn malformed_and_unknown_codes_yield_room_errors() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut session, mut rx) = open_session(&registry);

        session.handle_message(ClientMsg::JoinRoom {
            room_id: "TOOLONG".to_string(),
        });
        match recv(&mut rx) {
            ServerMsg::RoomError { message } => assert_eq!(message, "Invalid room code"),
            other => panic!("unexpected reply: {:?}", other),
        }

        session.handle_message(ClientMsg::JoinRoom {
            room_id: "ZZZZ".to_string(),
        });
        match recv(&mut rx) {
            ServerMsg::RoomError { message } => assert_eq!(message, "Room not found"),
            other => panic!("unexpected reply: {:?}", other),
        }

        // Failed joins leave the session roomless: moves stay no-ops
        session.handle_message(ClientMsg::PaddleMove { x: 100.0, y: 100.0 });
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn third_join_is_rejected_without_mutating_the_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };

        let (mut second, _second_rx) = open_session(&registry);
        second.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });

        let (mut third, mut third_rx) = open_session(&registry);
        third.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });
        match recv(&mut third_rx) {
            ServerMsg::RoomError { message } => assert_eq!(message, "Room is full"),
            other => panic!("unexpected reply: {:?}", other),
        }

        let room = registry.lookup(&code).unwrap();
        assert_eq!(room.client_count(), 2);

        creator.handle_disconnect();
        second.handle_disconnect();
    }

    #[tokio::test]
    async fn paddle_moves_are_clamped_to_the_owning_half() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        let (mut joiner, mut joiner_rx) = open_session(&registry);

        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };
        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });
        drain(&mut creator_rx);
        drain(&mut joiner_rx);

        // Left paddle cannot cross the center line or the top bound
        creator.handle_message(ClientMsg::PaddleMove {
            x: 2000.0,
            y: -50.0,
        });
        let update = drain(&mut creator_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMsg::PaddleUpdate { side, paddle } => Some((side, paddle)),
                _ => None,
            })
            .expect("paddle update");
        assert_eq!(update.0, Side::Left);
        assert_eq!(update.1.x, WORLD_WIDTH / 2.0 - PADDLE_RADIUS);
        assert_eq!(update.1.y, PADDLE_RADIUS);

        // Right paddle is confined symmetrically to its own half
        joiner.handle_message(ClientMsg::PaddleMove { x: 0.0, y: 700.0 });
        let update = drain(&mut joiner_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMsg::PaddleUpdate { side, paddle } => Some((side, paddle)),
                _ => None,
            })
            .expect("paddle update");
        assert_eq!(update.0, Side::Right);
        assert_eq!(update.1.x, WORLD_WIDTH / 2.0 + PADDLE_RADIUS);
        assert_eq!(update.1.y, WORLD_HEIGHT - PADDLE_RADIUS);

        creator.handle_disconnect();
        joiner.handle_disconnect();
    }

    #[tokio::test]
    async fn paddle_move_records_displacement_for_momentum_transfer() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };

        creator.handle_message(ClientMsg::PaddleMove { x: 150.0, y: 320.0 });
        creator.handle_message(ClientMsg::PaddleMove { x: 180.0, y: 310.0 });

        let room = registry.lookup(&code).unwrap();
        {
            let state = room.lock();
            let paddle = &state.game.paddles.left;
            assert_eq!(paddle.x, 180.0);
            assert_eq!(paddle.y, 310.0);
            assert_eq!(paddle.last_vx, 30.0);
            assert_eq!(paddle.last_vy, -10.0);
        }

        creator.handle_disconnect();
    }

    #[tokio::test]
    async fn disconnect_of_last_client_destroys_the_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut session, mut rx) = open_session(&registry);
        session.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };

        session.handle_disconnect();

        assert!(registry.lookup(&code).is_none());
        assert_eq!(registry.active_rooms(), 0);
    }

    #[tokio::test]
    async fn peer_disconnect_reverts_room_to_waiting_and_stops_ticking() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        let (mut joiner, _joiner_rx) = open_session(&registry);

        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };
        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });

        let room = registry.lookup(&code).unwrap();
        assert_eq!(room.lock().game.game_status, GameStatus::Playing);

        joiner.handle_disconnect();

        {
            let state = room.lock();
            assert_eq!(state.game.game_status, GameStatus::Waiting);
            assert!(state.clients.len() == 1);
        }
        assert!(drain(&mut creator_rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerLeft)));

        // With the tick task cancelled, no further snapshots arrive
        sleep(Duration::from_millis(100)).await;
        drain(&mut creator_rx);
        sleep(Duration::from_millis(100)).await;
        assert!(drain(&mut creator_rx).is_empty());

        creator.handle_disconnect();
    }

    #[tokio::test]
    async fn rejoining_after_a_leave_restarts_the_game() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        let (mut joiner, mut joiner_rx) = open_session(&registry);

        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };
        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });
        joiner.handle_message(ClientMsg::LeaveRoom);

        let room = registry.lookup(&code).unwrap();
        assert_eq!(room.lock().game.game_status, GameStatus::Waiting);
        drain(&mut joiner_rx);

        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });
        assert_eq!(room.lock().game.game_status, GameStatus::Playing);
        assert!(drain(&mut joiner_rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::GameStart { .. })));

        creator.handle_disconnect();
        joiner.handle_disconnect();
    }

    #[tokio::test]
    async fn restart_resets_scores_for_an_occupied_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut creator, mut creator_rx) = open_session(&registry);
        let (mut joiner, _joiner_rx) = open_session(&registry);

        creator.handle_message(ClientMsg::CreateRoom);
        let code = match recv(&mut creator_rx) {
            ServerMsg::RoomCreated { room_id, .. } => room_id,
            other => panic!("unexpected reply: {:?}", other),
        };
        joiner.handle_message(ClientMsg::JoinRoom {
            room_id: code.clone(),
        });

        let room = registry.lookup(&code).unwrap();
        {
            let mut state = room.lock();
            state.game.score.left = 7;
            state.game.winner = Some(Side::Left);
            state.game.game_status = GameStatus::Finished;
        }

        creator.handle_message(ClientMsg::RestartGame);

        {
            let state = room.lock();
            assert_eq!(state.game.score.left, 0);
            assert_eq!(state.game.winner, None);
            assert_eq!(state.game.game_status, GameStatus::Playing);
        }

        creator.handle_disconnect();
        joiner.handle_disconnect();
    }
}
