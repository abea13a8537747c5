//! Shared protocol definitions for the Skyfire game server.
//!
//! Everything both sides of a pipe need to agree on lives here: the game
//! constants, the fixed-size wire records exchanged over the named-pipe
//! channels, the authentication token, and the simulation primitives
//! (`PhysicsBox`, `EntityInfo`) that appear inside level scripts and state
//! snapshots. This crate performs no I/O.

use serde::{Deserialize, Serialize};

pub mod messages;
pub mod token;
pub mod wire;

pub use token::Token;
pub use wire::Record;

/* -------------------- Timing -------------------- */

/// Simulation tick rate in frames per second.
pub const FPS: u32 = 30;
/// Duration of one tick in microseconds.
pub const TICK_MICROS: u64 = 1_000_000 / FPS as u64;
/// Frame budget of a single level.
pub const FRAMES_PER_LEVEL: u32 = FPS * 100;
/// Campaign progress gained per unlocked tick.
pub const PROGRESS_STEP: u32 = 1;
/// Seconds of client silence before a game is abandoned.
pub const CLIENT_TIMEOUT_SECS: u64 = 15;

pub const MAX_PLAYERS: usize = 2;

/* -------------------- Map geometry -------------------- */

pub const MAP_WIDTH: i32 = 100;
pub const MAP_HEIGHT: i32 = MAP_WIDTH * 9 / 16;

/* -------------------- Entity states -------------------- */

/// Frames an entity holds a transient state before reverting to `Move`.
pub const STATE_DURATION: u32 = FPS;
/// Frames of invincibility granted on respawn.
pub const RESPAWN_DURATION: u32 = FPS * 2;

/* -------------------- Combat tuning -------------------- */

pub const ENEMY_HP: f64 = 1.0;
pub const BULLET_HP: f64 = 0.1;
pub const OBSTACLE_HP: f64 = 1000.0;
pub const BOSS_HP: f64 = 3.0;
pub const HENCHMAN_HP: f64 = 3.0;

pub const ENEMY_DAMAGE: f64 = 1.0;
pub const PLAYER_DAMAGE: f64 = 1.0;
pub const ENEMY_MAX_FIRE_DAMAGE: f64 = 1.0;
pub const PLAYER_FIRE_DAMAGE: f64 = 0.7;
pub const OBSTACLE_DAMAGE: f64 = 1.0;

// Velocities are in map units per frame: MAP_SIZE / (seconds-to-cross * FPS).
pub const PLAYER_VELOCITY_Y: f64 = MAP_HEIGHT as f64 / (3.0 * FPS as f64);
pub const PLAYER_VELOCITY_X: f64 = MAP_WIDTH as f64 / (4.0 * FPS as f64);
pub const ENEMY_VELOCITY_Y: f64 = MAP_HEIGHT as f64 / (7.5 * FPS as f64);
pub const ENEMY_VELOCITY_X: f64 = MAP_WIDTH as f64 / (15.0 * FPS as f64);
pub const BULLET_VELOCITY: f64 = MAP_WIDTH as f64 / (2.0 * FPS as f64);
pub const OBSTACLE_VELOCITY: f64 = MAP_WIDTH as f64 / (10.0 * FPS as f64);

// Fire delays are in frames per shot: FPS / (shots per second).
pub const PLAYER_FIRE_DELAY: u32 = (FPS as f64 / 1.5) as u32;
pub const ENEMY_FIRE_DELAY: u32 = (FPS as f64 / 0.6) as u32;
pub const BOSS_FIRE_DELAY: u32 = (FPS as f64 / 0.75) as u32;
pub const HENCHMAN_FIRE_DELAY: u32 = (FPS as f64 / 0.8) as u32;

pub const SCORE_TOUCH_ENEMY: u32 = 50;
pub const SCORE_KILL_ENEMY: u32 = 250;

pub const POWERUP_DAMAGE_FACTOR: f64 = 2.0;
pub const POWERUP_FIRE_FACTOR: f64 = 0.75;

/* -------------------- Entity type tags -------------------- */

// The numeric type tag encodes category (high nibble) and variant (low
// nibble); `tag >> 4` recovers the category.
pub const TYPE_PLAYER: u32 = 0x1;
pub const TYPE_ENEMY: u32 = 0x2;
pub const TYPE_BOSS: u32 = 0x3;
pub const TYPE_HENCHMAN: u32 = 0x4;
pub const TYPE_BULLET: u32 = 0x5;
pub const TYPE_OBSTACLE: u32 = 0x6;
pub const TYPE_POWERUP: u32 = 0x7;

pub const PLAYER_1_ID: u32 = 0x10;
pub const PLAYER_2_ID: u32 = 0x11;
pub const ENEMY_1_ID: u32 = 0x20;
pub const ENEMY_2_ID: u32 = 0x21;
pub const ENEMY_3_ID: u32 = 0x22;
pub const BOSS_1_ID: u32 = 0x30;
pub const BOSS_2_ID: u32 = 0x31;
pub const BOSS_3_ID: u32 = 0x32;
pub const HENCHMAN_1_ID: u32 = 0x40;
pub const HENCHMAN_2_ID: u32 = 0x41;
pub const BULLET_ID: u32 = 0x50;
pub const OBSTACLE_ID: u32 = 0x60;
pub const POWERUP_DAMAGE_ID: u32 = 0x70;
pub const POWERUP_FIRE_ID: u32 = 0x71;

pub const BULLET_WIDTH: i32 = 1;
pub const BULLET_HEIGHT: i32 = 2;
pub const POWERUP_WIDTH: i32 = 3;
pub const POWERUP_HEIGHT: i32 = 3;
pub const HENCHMAN_WIDTH: i32 = 4;
pub const HENCHMAN_HEIGHT: i32 = 3;

/* -------------------- Input vocabulary -------------------- */

// A game input packs the player slot in the low bit and the command in the
// remaining bits, except for ESC and the cheat codes which are sent verbatim.
pub const GAME_KEY_ESC: i32 = -1;
pub const GAME_KEY_UP: i32 = 1;
pub const GAME_KEY_DOWN: i32 = 2;
pub const GAME_KEY_RIGHT: i32 = 4;
pub const GAME_KEY_UP_RIGHT: i32 = GAME_KEY_UP + GAME_KEY_RIGHT;
pub const GAME_KEY_DOWN_RIGHT: i32 = GAME_KEY_DOWN + GAME_KEY_RIGHT;
pub const GAME_KEY_LEFT: i32 = 8;
pub const GAME_KEY_UP_LEFT: i32 = GAME_KEY_UP + GAME_KEY_LEFT;
pub const GAME_KEY_DOWN_LEFT: i32 = GAME_KEY_DOWN + GAME_KEY_LEFT;
pub const GAME_KEY_SHOOT: i32 = 15;
pub const GAME_KEY_SHOOT_UP: i32 = GAME_KEY_SHOOT + GAME_KEY_UP;
pub const GAME_KEY_SHOOT_DOWN: i32 = GAME_KEY_SHOOT + GAME_KEY_DOWN;
pub const GAME_KEY_SHOOT_RIGHT: i32 = GAME_KEY_SHOOT + GAME_KEY_RIGHT;
pub const GAME_KEY_SHOOT_UP_RIGHT: i32 = GAME_KEY_SHOOT + GAME_KEY_UP_RIGHT;
pub const GAME_KEY_SHOOT_DOWN_RIGHT: i32 = GAME_KEY_SHOOT + GAME_KEY_DOWN_RIGHT;
pub const GAME_KEY_SHOOT_LEFT: i32 = GAME_KEY_SHOOT + GAME_KEY_LEFT;
pub const GAME_KEY_SHOOT_UP_LEFT: i32 = GAME_KEY_SHOOT + GAME_KEY_UP_LEFT;
pub const GAME_KEY_SHOOT_DOWN_LEFT: i32 = GAME_KEY_SHOOT + GAME_KEY_DOWN_LEFT;

pub const CHEAT_CODE_LIFE: i32 = 100;
pub const CHEAT_CODE_GHOST: i32 = 101;
pub const CHEAT_CODE_HULK: i32 = 102;
pub const CHEAT_CODE_SKIP_LEVEL: i32 = 103;

/* -------------------- Textual field limits -------------------- */

pub const ACTIVITY_ID_LENGTH: usize = 32;
pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 16;
pub const PASSWORD_MIN: usize = 5;
pub const PASSWORD_MAX: usize = 64;
pub const NAME_MAX: usize = 64;
pub const CHANNEL_MAX: usize = 64;
pub const SIGNATURE_LENGTH: usize = 64;
pub const TIMESTAMP_MAX: usize = 20;

pub const MAX_RATING: u32 = 5;

/* -------------------- Simulation primitives -------------------- */

/// Axis-aligned box with a velocity, the physical footprint of every entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBox {
    pub x: f64,
    pub y: f64,
    pub w: i32,
    pub h: i32,
    pub vx: f64,
    pub vy: f64,
}

impl PhysicsBox {
    pub fn new(x: f64, y: f64, w: i32, h: i32, vx: f64, vy: f64) -> Self {
        Self { x, y, w, h, vx, vy }
    }

    /// Strict AABB overlap test; boxes whose edges merely touch do not
    /// overlap.
    pub fn overlaps(&self, other: &PhysicsBox) -> bool {
        self.x < other.x + other.w as f64
            && self.x + self.w as f64 > other.x
            && self.y < other.y + other.h as f64
            && self.y + self.h as f64 > other.y
    }
}

/// A scripted spawn descriptor: which entity, and where.
///
/// Structural equality only considers the type tag and the spawn position,
/// which is what the level editor manipulates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntityInfo {
    pub type_id: u32,
    pub physics_box: PhysicsBox,
}

impl EntityInfo {
    pub fn new(type_id: u32, physics_box: PhysicsBox) -> Self {
        Self {
            type_id,
            physics_box,
        }
    }

    /// Category part of the type tag.
    pub fn main_type(&self) -> u32 {
        self.type_id >> 4
    }

    pub fn full_type(&self) -> u32 {
        self.type_id
    }
}

impl PartialEq for EntityInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.physics_box.x == other.physics_box.x
            && self.physics_box.y == other.physics_box.y
    }
}

impl Eq for EntityInfo {}
