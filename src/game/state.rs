//! Authoritative game state for a single room
//! These structs are also the wire shapes inside snapshot messages

use serde::{Deserialize, Serialize};

use super::{PADDLE_RADIUS, PUCK_RADIUS, VIEWPORT_WIDTH, WORLD_HEIGHT, WORLD_WIDTH};

/// The two symmetric halves of the playing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Horizontal world coordinate this side's client renders from.
    /// Presentation concern only, never used in physics.
    pub fn viewport_offset(self) -> f32 {
        match self {
            Side::Left => 0.0,
            Side::Right => VIEWPORT_WIDTH,
        }
    }
}

/// Match status state machine: waiting -> playing -> goal -> playing ... -> finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Playing,
    Goal,
    Finished,
}

/// Puck kinematics. Mutated only by the physics step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Puck {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
}

/// One paddle. Position is written by the owning side's session handler,
/// read by the physics step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Displacement of the last accepted move, transferred into the puck on
    /// contact. Persists until the next accepted move.
    #[serde(default)]
    pub last_vx: f32,
    #[serde(default)]
    pub last_vy: f32,
}

impl Paddle {
    fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            radius: PADDLE_RADIUS,
            last_vx: 0.0,
            last_vy: 0.0,
        }
    }
}

/// Both paddles, keyed by side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddles {
    pub left: Paddle,
    pub right: Paddle,
}

impl Paddles {
    pub fn get(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Per-side goal tally, monotonically non-decreasing within a match
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn get(self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn increment(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }
}

/// Full authoritative state of one match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub puck: Puck,
    pub paddles: Paddles,
    pub score: Score,
    pub game_status: GameStatus,
    pub last_goal_side: Option<Side>,
    pub winner: Option<Side>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            puck: Puck {
                x: WORLD_WIDTH / 2.0,
                y: WORLD_HEIGHT / 2.0,
                vx: 0.0,
                vy: 0.0,
                radius: PUCK_RADIUS,
            },
            paddles: Paddles {
                left: Paddle::at(100.0, WORLD_HEIGHT / 2.0),
                right: Paddle::at(WORLD_WIDTH - 100.0, WORLD_HEIGHT / 2.0),
            },
            score: Score { left: 0, right: 0 },
            game_status: GameStatus::Waiting,
            last_goal_side: None,
            winner: None,
        }
    }

    /// Respawn the puck at rest in the serving side's half
    pub fn reset_puck(&mut self, serving_side: Side) {
        self.puck.x = match serving_side {
            Side::Left => WORLD_WIDTH * 0.25,
            Side::Right => WORLD_WIDTH * 0.75,
        };
        self.puck.y = WORLD_HEIGHT / 2.0;
        self.puck.vx = 0.0;
        self.puck.vy = 0.0;
    }

    /// Return both paddles to their starting positions
    pub fn reset_paddles(&mut self) {
        self.paddles.left = Paddle::at(100.0, WORLD_HEIGHT / 2.0);
        self.paddles.right = Paddle::at(WORLD_WIDTH - 100.0, WORLD_HEIGHT / 2.0);
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
