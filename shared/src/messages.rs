//! Request and response records, and the envelopes that carry them.
//!
//! Each logical request type travels on its own well-known channel, so the
//! record layout per channel is unambiguous without any multiplexing
//! protocol. Two envelope flavors exist: a bare [`Handshake`] for first
//! contact, and [`Message`]`<T>` which prefixes the payload with a [`Token`]
//! for every authenticated request.

use serde::{Deserialize, Serialize};

use crate::token::Token;
use crate::wire::{check_field, Record, WireError};
use crate::{EntityInfo, CHANNEL_MAX, NAME_MAX, PASSWORD_MAX, USERNAME_MAX};

/* -------------------- Channel vocabulary -------------------- */

pub const CH_CONNECT_CLIENT: &str = "connectClient";
pub const CH_CONNECT_PLAYER: &str = "connectPlayer";
pub const CH_DISCONNECT_PLAYER: &str = "disconnectPlayer";
pub const CH_LEADERBOARD: &str = "leaderboardRequest";
pub const CH_PLAYER_INFO: &str = "playerInfoRequest";
pub const CH_FOLLOW: &str = "followRequest";
pub const CH_PACKS: &str = "packs";
pub const CH_PACK_KEY: &str = "packKey";
pub const CH_NEW_GAME: &str = "newGame";
pub const CH_GAME_INPUT: &str = "gameInput";
pub const CH_STOP_GAME: &str = "stopGame";
pub const CH_LEVEL_REQUEST: &str = "levelRequest";
pub const CH_RATE_LEVEL: &str = "rateLevel";
pub const CH_NEW_SANDBOX: &str = "newSandbox";
pub const CH_SANDBOX_EDITION: &str = "sandboxEdition";
pub const CH_LVL_PROGRESS: &str = "getLvlProgress";
pub const CH_STOP_SANDBOX: &str = "stopSandbox";

/// The channels the server listens on for its whole lifetime.
pub const REQUEST_CHANNELS: [&str; 17] = [
    CH_CONNECT_CLIENT,
    CH_CONNECT_PLAYER,
    CH_DISCONNECT_PLAYER,
    CH_LEADERBOARD,
    CH_PLAYER_INFO,
    CH_FOLLOW,
    CH_PACKS,
    CH_PACK_KEY,
    CH_NEW_GAME,
    CH_GAME_INPUT,
    CH_STOP_GAME,
    CH_LEVEL_REQUEST,
    CH_RATE_LEVEL,
    CH_NEW_SANDBOX,
    CH_SANDBOX_EDITION,
    CH_LVL_PROGRESS,
    CH_STOP_SANDBOX,
];

/* -------------------- Envelopes -------------------- */

/// Token-carrying envelope used for every authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    pub token: Token,
    pub data: T,
}

impl<T> Message<T> {
    pub fn new(token: Token, data: T) -> Self {
        Self { token, data }
    }
}

impl<T: Record> Record for Message<T> {
    const SIZE: usize = Token::SIZE + T::SIZE;

    fn validate(&self) -> Result<(), WireError> {
        self.token.validate()?;
        self.data.validate()
    }
}

/// First-contact payload: no token exists yet, so the client names the
/// channel (by its process id) on which it expects the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syn {
    pub username: String,
    pub password: String,
    pub response_channel: String,
    pub signup: bool,
}

impl Record for Syn {
    const SIZE: usize = 192;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)?;
        check_field("password", &self.password, PASSWORD_MAX)?;
        check_field("response_channel", &self.response_channel, CHANNEL_MAX)
    }
}

/// Bare handshake envelope, an alias kept for symmetry with [`Message`].
pub type Handshake = Syn;

/* -------------------- Requests -------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRequest {
    /// Empty for the global leaderboard; set to restrict to followed players.
    pub username: String,
    pub nb_entries: u32,
    pub offset: u32,
}

impl Record for LeaderboardRequest {
    const SIZE: usize = 64;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfoRequest {
    pub username: String,
}

impl Record for PlayerInfoRequest {
    const SIZE: usize = 64;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    pub username: String,
    /// `true` to follow, `false` to unfollow.
    pub add: bool,
}

impl Record for FollowRequest {
    const SIZE: usize = 64;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackKeyCommand {
    Use,
    List,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackKeyRequest {
    pub command: PackKeyCommand,
    pub key: String,
    pub pack: String,
    pub uses: u32,
    pub username: String,
}

impl Record for PackKeyRequest {
    const SIZE: usize = 256;

    fn validate(&self) -> Result<(), WireError> {
        check_field("key", &self.key, NAME_MAX)?;
        check_field("pack", &self.pack, NAME_MAX)?;
        check_field("username", &self.username, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRequest {
    /// Empty to list every level; set to list one creator's levels.
    pub user: String,
    pub nb_entries: u32,
    pub offset: u32,
}

impl Record for LevelRequest {
    const SIZE: usize = 64;

    fn validate(&self) -> Result<(), WireError> {
        check_field("user", &self.user, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRate {
    pub level_id: i32,
    /// Clamped server-side to `MAX_RATING`.
    pub rating: u32,
}

impl Record for LevelRate {
    const SIZE: usize = 16;
}

/// Per-match configuration, immutable once the game is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    pub second_player: bool,
    pub initial_lives: u32,
    /// In `[0, 1]`.
    pub difficulty: f64,
    /// In `[0, 1]`.
    pub bonus_probability: f64,
    pub friendly_fire: bool,
    /// `-1` selects the stock campaign.
    pub level_id: i32,
    pub skins: [u32; 2],
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            second_player: false,
            initial_lives: 5,
            difficulty: 0.5,
            bonus_probability: 0.1,
            friendly_fire: false,
            level_id: -1,
            skins: [0, 1],
        }
    }
}

impl Record for GameSettings {
    const SIZE: usize = 64;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// `-1` creates a fresh level named `level_name`.
    pub level_id: i32,
    pub level_name: String,
}

impl Record for SandboxSettings {
    const SIZE: usize = 96;

    fn validate(&self) -> Result<(), WireError> {
        check_field("level_name", &self.level_name, NAME_MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SandboxEdition {
    pub progress: u32,
    pub entity_info: EntityInfo,
    /// `true` to add, `false` to remove.
    pub add: bool,
}

impl Record for SandboxEdition {
    const SIZE: usize = 96;
}

/// Packed game input key, see the input vocabulary in the crate root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInput(pub i32);

impl Record for GameInput {
    const SIZE: usize = 16;
}

/// Sandbox progress bucket to fetch entities for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRequest(pub u32);

impl Record for ProgressRequest {
    const SIZE: usize = 16;
}

/// Names the channel a teardown response should be written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelName(pub String);

impl Record for ChannelName {
    const SIZE: usize = 80;

    fn validate(&self) -> Result<(), WireError> {
        check_field("channel", &self.0, CHANNEL_MAX)
    }
}

/* -------------------- Responses -------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub connected: bool,
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub username: String,
    pub best_score: i64,
    pub xp: i64,
    pub is_followed: bool,
    pub is_following_me: bool,
}

impl Record for ClientInfo {
    const SIZE: usize = 16;
}

impl Record for PlayerInfo {
    const SIZE: usize = 64;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub id: i32,
    pub name: String,
    pub owned: bool,
}

impl Record for Pack {
    const SIZE: usize = 96;

    fn validate(&self) -> Result<(), WireError> {
        check_field("name", &self.name, NAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackKey {
    pub key: String,
    pub uses: u32,
}

impl Record for PackKey {
    const SIZE: usize = 96;

    fn validate(&self) -> Result<(), WireError> {
        check_field("key", &self.key, NAME_MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub id: i32,
    pub creator: String,
    pub name: String,
    pub rate: i32,
    pub created_timestamp: i64,
}

impl Record for LevelInfo {
    const SIZE: usize = 128;

    fn validate(&self) -> Result<(), WireError> {
        check_field("creator", &self.creator, USERNAME_MAX)?;
        check_field("name", &self.name, NAME_MAX)
    }
}

/// Per-tick game summary pushed on the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshFrame {
    /// `-1` lost, `0` running, `1` won.
    pub game_state: i8,
    pub timestamp: i64,
    pub scores: [u32; 2],
    pub hp_players: [f64; 2],
    pub progress: u32,
    /// Number of `EntityFrame` records that follow.
    pub nb_entities: u64,
}

impl Record for RefreshFrame {
    const SIZE: usize = 64;
}

/// Per-entity state in a tick snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityFrame {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub state: u32,
    pub state_step: u32,
    /// Held power-up type tag, 0 when none.
    pub variant: u32,
}

impl Record for EntityFrame {
    const SIZE: usize = 48;
}
