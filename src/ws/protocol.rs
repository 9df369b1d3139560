//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::{GameState, Paddle, Score, Side};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new room; the creator always takes the left side
    CreateRoom,

    /// Join an existing room by its 4-character code
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Leave the current room
    LeaveRoom,

    /// Move the caller's paddle toward a target position. The server clamps
    /// the target to the caller's half of the field.
    PaddleMove { x: f32, y: f32 },

    /// Reset the match to a fresh state
    RestartGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Confirmation of room creation, sent to the creator only
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_id: String,
        client_id: Uuid,
        side: Side,
        viewport_offset: f32,
        world_width: f32,
        world_height: f32,
        viewport_width: f32,
        game: GameState,
    },

    /// Confirmation of joining, sent to the joiner only
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: String,
        client_id: Uuid,
        side: Side,
        viewport_offset: f32,
        world_width: f32,
        world_height: f32,
        viewport_width: f32,
        game: GameState,
    },

    /// A room operation failed; the connection stays open and may retry
    RoomError { message: String },

    /// Both sides are occupied and the match begins
    GameStart { game: GameState },

    /// Full per-tick state snapshot
    GameState { game: GameState },

    /// A paddle moved; echoed to everyone in the room
    PaddleUpdate { side: Side, paddle: Paddle },

    /// A goal was scored. `winner` is set when the match just ended.
    Goal {
        scorer: Side,
        score: Score,
        winner: Option<Side>,
    },

    /// A peer left; the room is back to waiting
    PlayerLeft,

    /// Sound-trigger hint for the client mixer
    Sound {
        sound: SoundKind,
        intensity: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        side: Option<Side>,
    },
}

/// Sound cue identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Wall,
    Paddle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_decode_by_type_tag() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"create_room"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::CreateRoom));

        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"join_room","roomId":"AB27"}"#).unwrap();
        match msg {
            ClientMsg::JoinRoom { room_id } => assert_eq!(room_id, "AB27"),
            other => panic!("unexpected message: {:?}", other),
        }

        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"paddle_move","x":120.5,"y":300.0}"#).unwrap();
        assert!(matches!(msg, ClientMsg::PaddleMove { .. }));
    }

    #[test]
    fn unknown_type_tag_fails_to_decode() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"cheat_mode"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>("not json").is_err());
    }

    #[test]
    fn outbound_messages_carry_camel_case_payloads() {
        let msg = ServerMsg::RoomCreated {
            room_id: "XY42".to_string(),
            client_id: Uuid::new_v4(),
            side: Side::Left,
            viewport_offset: 0.0,
            world_width: 1200.0,
            world_height: 600.0,
            viewport_width: 600.0,
            game: GameState::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "room_created");
        assert_eq!(json["roomId"], "XY42");
        assert_eq!(json["viewportOffset"], 0.0);
        assert_eq!(json["worldWidth"], 1200.0);
        assert_eq!(json["game"]["gameStatus"], "waiting");
    }

    #[test]
    fn wall_sound_omits_side_field() {
        let msg = ServerMsg::Sound {
            sound: SoundKind::Wall,
            intensity: 0.8,
            side: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sound"], "wall");
        assert!(json.get("side").is_none());

        let msg = ServerMsg::Sound {
            sound: SoundKind::Paddle,
            intensity: 1.2,
            side: Some(Side::Right),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["side"], "right");
    }
}
