//! Game simulation modules

pub mod physics;
pub mod registry;
pub mod room;
pub mod state;

pub use registry::RoomRegistry;
pub use room::Room;

/// World constants, shared verbatim with the client renderer
pub const WORLD_WIDTH: f32 = 1200.0;
pub const WORLD_HEIGHT: f32 = 600.0;
/// Each side renders one horizontal half of the world
pub const VIEWPORT_WIDTH: f32 = 600.0;

pub const PADDLE_RADIUS: f32 = 40.0;
pub const PUCK_RADIUS: f32 = 25.0;
/// Vertical extent of the goal mouth, centered on each end wall
pub const GOAL_WIDTH: f32 = 150.0;

/// Per-tick velocity damping on the puck
pub const FRICTION: f32 = 0.99;
/// Speed cap in world units per tick
pub const MAX_PUCK_SPEED: f32 = 25.0;

pub const WINNING_SCORE: u32 = 7;

/// A room holds at most one client per side
pub const ROOM_CAPACITY: usize = 2;
