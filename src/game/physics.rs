//! Puck physics - integration, collision resolution, goal detection

use super::state::{GameState, GameStatus, Side};
use super::{FRICTION, GOAL_WIDTH, MAX_PUCK_SPEED, WORLD_HEIGHT, WORLD_WIDTH};

/// Velocity retained by a wall bounce
const WALL_RESTITUTION: f32 = 0.9;
/// Fraction of the paddle's last displacement transferred into the puck
const MOMENTUM_TRANSFER: f32 = 0.5;
/// Post-contact velocity amplification; keeps rallies lively against friction
const PADDLE_BOOST: f32 = 1.1;
/// Below this center distance the contact normal is degenerate
const MIN_CONTACT_DIST: f32 = 0.001;

/// Events emitted by one physics step, in occurrence order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    /// Puck bounced off a wall; intensity is pre-collision speed over max
    Wall { intensity: f32 },
    /// Puck crossed a boundary inside the goal mouth; the named side scored
    Goal { scorer: Side },
    /// Puck bounced off a paddle; intensity is resulting speed over max
    Paddle { side: Side, intensity: f32 },
}

/// Fixed-timestep physics for one room. Velocities are expressed in world
/// units per tick, so the step carries no explicit delta time.
pub struct PhysicsEngine;

impl PhysicsEngine {
    /// Advance one tick. No-op unless the match is in `playing` status.
    /// On a goal the step ends immediately; remaining boundary and paddle
    /// checks are skipped for that tick.
    pub fn step(game: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();

        if game.game_status != GameStatus::Playing {
            return events;
        }

        let GameState {
            puck,
            paddles,
            score,
            last_goal_side,
            ..
        } = game;

        // Integrate, then damp
        puck.x += puck.vx;
        puck.y += puck.vy;
        puck.vx *= FRICTION;
        puck.vy *= FRICTION;

        // Clamp speed, preserving direction. The pre-clamp magnitude feeds
        // wall-hit intensity below.
        let speed = (puck.vx * puck.vx + puck.vy * puck.vy).sqrt();
        if speed > MAX_PUCK_SPEED {
            let scale = MAX_PUCK_SPEED / speed;
            puck.vx *= scale;
            puck.vy *= scale;
        }

        // Top and bottom walls
        let mut wall_hit = false;
        if puck.y - puck.radius < 0.0 {
            puck.y = puck.radius;
            puck.vy = -puck.vy * WALL_RESTITUTION;
            wall_hit = true;
        }
        if puck.y + puck.radius > WORLD_HEIGHT {
            puck.y = WORLD_HEIGHT - puck.radius;
            puck.vy = -puck.vy * WALL_RESTITUTION;
            wall_hit = true;
        }
        if wall_hit {
            events.push(GameEvent::Wall {
                intensity: speed / MAX_PUCK_SPEED,
            });
        }

        // End boundaries: inside the goal mouth scores, outside bounces
        let goal_top = (WORLD_HEIGHT - GOAL_WIDTH) / 2.0;
        let goal_bottom = (WORLD_HEIGHT + GOAL_WIDTH) / 2.0;

        // Left boundary (right side scores)
        if puck.x - puck.radius < 0.0 {
            if puck.y > goal_top && puck.y < goal_bottom {
                score.increment(Side::Right);
                *last_goal_side = Some(Side::Right);
                events.push(GameEvent::Goal {
                    scorer: Side::Right,
                });
                return events;
            }
            puck.x = puck.radius;
            puck.vx = -puck.vx * WALL_RESTITUTION;
            events.push(GameEvent::Wall {
                intensity: speed / MAX_PUCK_SPEED,
            });
        }

        // Right boundary (left side scores)
        if puck.x + puck.radius > WORLD_WIDTH {
            if puck.y > goal_top && puck.y < goal_bottom {
                score.increment(Side::Left);
                *last_goal_side = Some(Side::Left);
                events.push(GameEvent::Goal { scorer: Side::Left });
                return events;
            }
            puck.x = WORLD_WIDTH - puck.radius;
            puck.vx = -puck.vx * WALL_RESTITUTION;
            events.push(GameEvent::Wall {
                intensity: speed / MAX_PUCK_SPEED,
            });
        }

        // Paddle collisions, left then right. Closest-approach overlap only;
        // no swept test, so extreme closing speeds can tunnel.
        for side in [Side::Left, Side::Right] {
            let paddle = paddles.get(side);
            let dx = puck.x - paddle.x;
            let dy = puck.y - paddle.y;
            let dist = (dx * dx + dy * dy).sqrt();
            let min_dist = puck.radius + paddle.radius;

            if dist < min_dist && dist > MIN_CONTACT_DIST {
                // Push the puck out along the contact normal
                let overlap = min_dist - dist;
                let nx = dx / dist;
                let ny = dy / dist;
                puck.x += nx * overlap;
                puck.y += ny * overlap;

                // Reflect the normal velocity component: v' = v - 2(v.n)n
                let rel_vel = puck.vx * nx + puck.vy * ny;
                puck.vx -= 2.0 * rel_vel * nx;
                puck.vy -= 2.0 * rel_vel * ny;

                // Transfer paddle motion, then restore damped energy
                puck.vx += paddle.last_vx * MOMENTUM_TRANSFER;
                puck.vy += paddle.last_vy * MOMENTUM_TRANSFER;
                puck.vx *= PADDLE_BOOST;
                puck.vy *= PADDLE_BOOST;

                let hit_speed = (puck.vx * puck.vx + puck.vy * puck.vy).sqrt();
                events.push(GameEvent::Paddle {
                    side,
                    intensity: hit_speed / MAX_PUCK_SPEED,
                });
            }
        }

        events
    }
}
