//! Request dispatch: one listener per well-known channel, sessions for games
//! and sandboxes, and the per-game tick threads.
//!
//! Authenticated responses are written to a channel named by the signature
//! of the token that carried the request; first-contact responses go to the
//! channel the client named in its handshake. A request whose token fails
//! verification is logged and dropped without a response.

use log::{error, info, warn};
use shared::messages::{
    ChannelName, ClientInfo, EntityFrame, FollowRequest, GameInput, GameSettings, Handshake,
    LeaderboardRequest, LevelRate, LevelRequest, Message, PackKeyCommand, PackKeyRequest,
    PlayerInfoRequest, ProgressRequest, SandboxEdition, SandboxSettings, CH_CONNECT_CLIENT,
    CH_CONNECT_PLAYER, CH_DISCONNECT_PLAYER, CH_FOLLOW, CH_GAME_INPUT, CH_LEADERBOARD,
    CH_LEVEL_REQUEST, CH_LVL_PROGRESS, CH_NEW_GAME, CH_NEW_SANDBOX, CH_PACKS, CH_PACK_KEY,
    CH_PLAYER_INFO, CH_RATE_LEVEL, CH_SANDBOX_EDITION, CH_STOP_GAME, CH_STOP_SANDBOX,
};
use shared::wire::{Ack, Count};
use shared::{Record, Token, ACTIVITY_ID_LENGTH, MAX_RATING, TICK_MICROS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::auth::Authenticator;
use crate::db::DatabaseManager;
use crate::game::{Game, InputOutcome};
use crate::sandbox::Sandbox;
use crate::transport::{lock, MessageExchanger, TransportError};
use crate::utils::gen_random_str;

struct GameSession {
    game: Arc<Mutex<Game>>,
    thread: Option<JoinHandle<()>>,
    /// Host first, guest second; empty string when there is no guest.
    usernames: [String; 2],
}

struct SandboxSession {
    sandbox: Sandbox,
    owner: String,
}

struct ServerInner {
    transport: Arc<MessageExchanger>,
    auth: Authenticator,
    db: Arc<dyn DatabaseManager>,
    games: Mutex<HashMap<String, GameSession>>,
    sandboxes: Mutex<HashMap<String, SandboxSession>>,
}

/// The public server handle. [`Server::start`] wires every request listener;
/// dropping the underlying transport tears them down.
pub struct Server {
    inner: Arc<ServerInner>,
}

macro_rules! listen {
    ($inner:expr, $channel:expr, $ty:ty, $handler:ident) => {{
        let inner = Arc::clone($inner);
        inner
            .transport
            .clone()
            .start_listening::<$ty, _>($channel, move |msg| inner.$handler(msg))
    }};
}

impl Server {
    pub fn new(
        transport: Arc<MessageExchanger>,
        auth: Authenticator,
        db: Arc<dyn DatabaseManager>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                transport,
                auth,
                db,
                games: Mutex::new(HashMap::new()),
                sandboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a listener for every request channel. The server is fully
    /// operational when this returns.
    pub fn start(&self) -> Result<(), TransportError> {
        let inner = &self.inner;
        listen!(inner, CH_CONNECT_CLIENT, Handshake, handle_connect_client)?;
        listen!(inner, CH_CONNECT_PLAYER, Message<Handshake>, handle_connect_player)?;
        listen!(inner, CH_DISCONNECT_PLAYER, Message<ChannelName>, handle_disconnect_player)?;
        listen!(inner, CH_LEADERBOARD, Message<LeaderboardRequest>, handle_leaderboard)?;
        listen!(inner, CH_PLAYER_INFO, Message<PlayerInfoRequest>, handle_player_info)?;
        listen!(inner, CH_FOLLOW, Message<FollowRequest>, handle_follow)?;
        listen!(inner, CH_PACKS, Message<PlayerInfoRequest>, handle_packs)?;
        listen!(inner, CH_PACK_KEY, Message<PackKeyRequest>, handle_pack_key)?;
        listen!(inner, CH_NEW_GAME, Message<GameSettings>, handle_new_game)?;
        listen!(inner, CH_GAME_INPUT, Message<GameInput>, handle_game_input)?;
        listen!(inner, CH_STOP_GAME, Message<ChannelName>, handle_stop_game)?;
        listen!(inner, CH_LEVEL_REQUEST, Message<LevelRequest>, handle_level_request)?;
        listen!(inner, CH_RATE_LEVEL, Message<LevelRate>, handle_rate_level)?;
        listen!(inner, CH_NEW_SANDBOX, Message<SandboxSettings>, handle_new_sandbox)?;
        listen!(inner, CH_SANDBOX_EDITION, Message<SandboxEdition>, handle_sandbox_edition)?;
        listen!(inner, CH_LVL_PROGRESS, Message<ProgressRequest>, handle_lvl_progress)?;
        listen!(inner, CH_STOP_SANDBOX, Message<ChannelName>, handle_stop_sandbox)?;
        info!("Server listening on all request channels");
        Ok(())
    }

    pub fn shutdown(&self) {
        let games: Vec<String> = lock(&self.inner.games).keys().cloned().collect();
        for activity_id in games {
            self.inner.teardown_game(&activity_id);
        }
        self.inner.transport.shutdown();
    }
}

impl ServerInner {
    /// Recomputes the token signature; invalid requests are dropped.
    fn verified(&self, token: &Token) -> bool {
        if self.auth.verify(token) {
            true
        } else {
            warn!("Dropping request with invalid token for `{}`", token.username);
            false
        }
    }

    fn respond<T: Record>(&self, channel: &str, record: &T) {
        let result = self
            .transport
            .open_channel(channel)
            .and_then(|_| self.transport.write_message(channel, record));
        if let Err(e) = result {
            error!("Failed to respond on `{}`: {}", channel, e);
        }
    }

    /// Writes a counted result set: `Count(n)` then the `n` records.
    fn respond_records<T: Record>(&self, channel: &str, records: &[T]) {
        let result = self
            .transport
            .open_channel(channel)
            .and_then(|_| self.transport.write_message(channel, &Count(records.len() as u32)))
            .and_then(|_| self.transport.write_records(channel, records));
        if let Err(e) = result {
            error!("Failed to respond on `{}`: {}", channel, e);
        }
    }

    /* -------------------- Connection -------------------- */

    fn handle_connect_client(&self, syn: Handshake) {
        let connected = if syn.signup {
            match self.db.sign_up(&syn.username, &syn.password) {
                Ok(()) => true,
                Err(e) => {
                    info!("Sign-up rejected for `{}`: {}", syn.username, e);
                    false
                }
            }
        } else {
            self.db.sign_in(&syn.username, &syn.password).unwrap_or(false)
        };

        let (token, admin) = if connected {
            let admin = self.db.is_admin(&syn.username).unwrap_or(false);
            (self.auth.issue(&syn.username, "", ""), admin)
        } else {
            (Token::default(), false)
        };
        info!("Client `{}` connected: {}", syn.username, connected);
        self.respond(
            &syn.response_channel,
            &Message::new(token, ClientInfo { connected, admin }),
        );
    }

    fn handle_connect_player(&self, msg: Message<Handshake>) {
        if !self.verified(&msg.token) {
            return;
        }
        let syn = msg.data;
        let connected = syn.username != msg.token.username
            && self.db.sign_in(&syn.username, &syn.password).unwrap_or(false);
        let token = if connected {
            self.auth
                .issue(&msg.token.username, &msg.token.activity_id, &syn.username)
        } else {
            msg.token.clone()
        };
        info!(
            "Guest `{}` joining `{}`: {}",
            syn.username, msg.token.username, connected
        );
        self.respond(
            &syn.response_channel,
            &Message::new(
                token,
                ClientInfo {
                    connected,
                    admin: false,
                },
            ),
        );
    }

    fn handle_disconnect_player(&self, msg: Message<ChannelName>) {
        if !self.verified(&msg.token) {
            return;
        }
        let token = self
            .auth
            .issue(&msg.token.username, &msg.token.activity_id, "");
        self.respond(&msg.data.0, &Message::new(token, Ack(true)));
    }

    /* -------------------- Social -------------------- */

    fn handle_leaderboard(&self, msg: Message<LeaderboardRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        let req = &msg.data;
        let rows = if req.username.is_empty() {
            self.db.leaderboard(req.nb_entries, req.offset)
        } else {
            self.db.follows(&req.username)
        };
        match rows {
            Ok(rows) => self.respond_records(&msg.token.signature, &rows),
            Err(e) => {
                warn!("Leaderboard request failed: {}", e);
                self.respond_records::<shared::messages::PlayerInfo>(&msg.token.signature, &[]);
            }
        }
    }

    fn handle_player_info(&self, msg: Message<PlayerInfoRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        match self.db.get_stats(&msg.data.username, &msg.token.username) {
            Ok(info) => self.respond(&msg.token.signature, &info),
            Err(e) => warn!("Player info for `{}` failed: {}", msg.data.username, e),
        }
    }

    fn handle_follow(&self, msg: Message<FollowRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        let result = if msg.data.add {
            self.db.follow(&msg.token.username, &msg.data.username)
        } else {
            self.db.unfollow(&msg.token.username, &msg.data.username)
        };
        self.respond(&msg.token.signature, &Ack(result.unwrap_or(false)));
    }

    /* -------------------- Packs -------------------- */

    fn handle_packs(&self, msg: Message<PlayerInfoRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        match self.db.packs(&msg.token.username) {
            Ok(packs) => self.respond_records(&msg.token.signature, &packs),
            Err(e) => {
                warn!("Pack listing failed: {}", e);
                self.respond_records::<shared::messages::Pack>(&msg.token.signature, &[]);
            }
        }
    }

    fn handle_pack_key(&self, msg: Message<PackKeyRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        let req = &msg.data;
        if req.command != PackKeyCommand::Use
            && !self.db.is_admin(&msg.token.username).unwrap_or(false)
        {
            warn!(
                "Rejecting pack-key administration from `{}`",
                msg.token.username
            );
            self.respond(&msg.token.signature, &Ack(false));
            return;
        }
        match req.command {
            PackKeyCommand::Use => {
                let redeemed = self
                    .db
                    .use_pack_key(&req.key, &msg.token.username)
                    .unwrap_or(false);
                self.respond(&msg.token.signature, &Ack(redeemed));
            }
            PackKeyCommand::List => match self.db.pack_keys() {
                Ok(keys) => self.respond_records(&msg.token.signature, &keys),
                Err(e) => {
                    warn!("Pack-key listing failed: {}", e);
                    self.respond_records::<shared::messages::PackKey>(&msg.token.signature, &[]);
                }
            },
            PackKeyCommand::Add => match self.db.add_pack_key(&req.pack, &req.key, req.uses) {
                Ok(key) => self.respond(&msg.token.signature, &key),
                Err(e) => {
                    warn!("Pack-key creation failed: {}", e);
                    self.respond(&msg.token.signature, &Ack(false));
                }
            },
            PackKeyCommand::Remove => {
                let removed = self.db.remove_pack_key(&req.key).is_ok();
                self.respond(&msg.token.signature, &Ack(removed));
            }
        }
    }

    /* -------------------- Games -------------------- */

    /// Random activity id not currently in use by a game or sandbox.
    fn alloc_activity_id(&self) -> String {
        loop {
            let id = gen_random_str(ACTIVITY_ID_LENGTH);
            if !lock(&self.games).contains_key(&id) && !lock(&self.sandboxes).contains_key(&id) {
                return id;
            }
        }
    }

    fn handle_new_game(self: &Arc<Self>, msg: Message<GameSettings>) {
        if !self.verified(&msg.token) {
            return;
        }
        if !msg.token.activity_id.is_empty() {
            warn!("`{}` is already in an activity", msg.token.username);
            self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
            return;
        }
        let game = match Game::new(Arc::clone(&self.db), &msg.data) {
            Ok(game) => Arc::new(Mutex::new(game)),
            Err(e) => {
                warn!("Game creation failed: {}", e);
                self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
                return;
            }
        };

        let activity_id = self.alloc_activity_id();
        let thread = self.spawn_tick_thread(&activity_id, Arc::clone(&game));
        let token = self.auth.issue(
            &msg.token.username,
            &activity_id,
            &msg.token.guest_username,
        );
        lock(&self.games).insert(
            activity_id.clone(),
            GameSession {
                game,
                thread,
                usernames: [msg.token.username.clone(), msg.token.guest_username.clone()],
            },
        );
        info!("Game {} created for `{}`", activity_id, msg.token.username);
        self.respond(&msg.token.signature, &Message::new(token, Ack(true)));
        // The pre-game response channel is superseded by the new signature
        self.transport.close_channel(&msg.token.signature);
    }

    /// Fixed-timestep loop pushing one snapshot per tick on the activity
    /// channel; exits once the game has ended, after a final snapshot.
    fn spawn_tick_thread(
        self: &Arc<Self>,
        activity_id: &str,
        game: Arc<Mutex<Game>>,
    ) -> Option<JoinHandle<()>> {
        let transport = Arc::clone(&self.transport);
        let channel = activity_id.to_string();
        let budget = Duration::from_micros(TICK_MICROS);

        let spawned = std::thread::Builder::new()
            .name(format!("game-{}", &channel[..8.min(channel.len())]))
            .spawn(move || {
                if let Err(e) = transport.open_channel(&channel) {
                    error!("Cannot open game channel `{}`: {}", channel, e);
                    return;
                }
                loop {
                    let started = Instant::now();
                    let (frame, entities, ended) = {
                        let mut game = lock(&game);
                        game.refresh();
                        (game.refresh_frame(), game.entity_frames(), game.has_ended())
                    };
                    if transport.write_message(&channel, &frame).is_err() {
                        break;
                    }
                    let _ = transport.write_records::<EntityFrame>(&channel, &entities);
                    if ended {
                        info!("Game `{}` ended", channel);
                        break;
                    }
                    let elapsed = started.elapsed();
                    if elapsed < budget {
                        std::thread::sleep(budget - elapsed);
                    }
                }
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Cannot spawn tick thread: {}", e);
                None
            }
        }
    }

    fn handle_game_input(&self, msg: Message<GameInput>) {
        if !self.verified(&msg.token) {
            return;
        }
        let games = lock(&self.games);
        let Some(session) = games.get(&msg.token.activity_id) else {
            warn!("Input for unknown game `{}`", msg.token.activity_id);
            return;
        };
        let outcome = lock(&session.game).apply_input(msg.data.0);
        if outcome == InputOutcome::Exit {
            info!("Client left game `{}`", msg.token.activity_id);
        }
    }

    /// Stops the tick thread, persists scores, and hands back an
    /// activity-free token on the channel the client named.
    fn handle_stop_game(&self, msg: Message<ChannelName>) {
        if !self.verified(&msg.token) {
            return;
        }
        let scores = self.teardown_game(&msg.token.activity_id);
        let stopped = scores.is_some();
        match scores {
            Some(scores) => {
                let games_usernames =
                    [msg.token.username.clone(), msg.token.guest_username.clone()];
                for (username, score) in games_usernames.iter().zip(scores) {
                    if username.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.db.new_score(username, score as i64) {
                        warn!("Score persistence for `{}` failed: {}", username, e);
                    }
                }
            }
            None => warn!("Stop request for unknown game `{}`", msg.token.activity_id),
        }
        let token = self.auth.issue(&msg.token.username, "", &msg.token.guest_username);
        self.respond(&msg.data.0, &Message::new(token, Ack(stopped)));
    }

    /// Removes a game session and joins its tick thread. Returns the final
    /// player scores, or `None` for an unknown activity.
    fn teardown_game(&self, activity_id: &str) -> Option<[u32; 2]> {
        let mut session = lock(&self.games).remove(activity_id)?;
        let scores = {
            let mut game = lock(&session.game);
            game.stop();
            game.refresh_frame().scores
        };
        if let Some(thread) = session.thread.take() {
            if thread.join().is_err() {
                error!("Tick thread for `{}` panicked", activity_id);
            }
        }
        self.transport.close_channel(activity_id);
        info!(
            "Game `{}` torn down (scores {:?}, players {:?})",
            activity_id, scores, session.usernames
        );
        Some(scores)
    }

    /* -------------------- Levels -------------------- */

    fn handle_level_request(&self, msg: Message<LevelRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        let req = &msg.data;
        match self
            .db
            .get_levels(req.nb_entries as i32, req.offset, &req.user)
        {
            Ok(levels) => self.respond_records(&msg.token.signature, &levels),
            Err(e) => {
                warn!("Level listing failed: {}", e);
                self.respond_records::<shared::messages::LevelInfo>(&msg.token.signature, &[]);
            }
        }
    }

    fn handle_rate_level(&self, msg: Message<LevelRate>) {
        if !self.verified(&msg.token) {
            return;
        }
        let rating = msg.data.rating.min(MAX_RATING);
        let rated = self
            .db
            .set_rate(msg.data.level_id, &msg.token.username, rating)
            .is_ok();
        self.respond(&msg.token.signature, &Ack(rated));
    }

    /* -------------------- Sandboxes -------------------- */

    fn handle_new_sandbox(&self, msg: Message<SandboxSettings>) {
        if !self.verified(&msg.token) {
            return;
        }
        if !msg.token.activity_id.is_empty() {
            warn!("`{}` is already in an activity", msg.token.username);
            self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
            return;
        }
        let level_id = if msg.data.level_id < 0 {
            match self.db.add_level(&msg.token.username, &msg.data.level_name) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Level creation failed: {}", e);
                    self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
                    return;
                }
            }
        } else {
            match self.db.get_level_info(msg.data.level_id) {
                Ok(info) if info.creator == msg.token.username => info.id,
                Ok(_) => {
                    warn!(
                        "`{}` cannot edit a level they did not create",
                        msg.token.username
                    );
                    self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
                    return;
                }
                Err(e) => {
                    warn!("Sandbox creation failed: {}", e);
                    self.respond(&msg.token.signature, &Message::new(msg.token.clone(), Ack(false)));
                    return;
                }
            }
        };
        let script = self.db.level_script(level_id).unwrap_or_default();

        let activity_id = self.alloc_activity_id();
        lock(&self.sandboxes).insert(
            activity_id.clone(),
            SandboxSession {
                sandbox: Sandbox::new(level_id, script),
                owner: msg.token.username.clone(),
            },
        );
        let token = self
            .auth
            .issue(&msg.token.username, &activity_id, &msg.token.guest_username);
        info!(
            "Sandbox {} on level {} opened by `{}`",
            activity_id, level_id, msg.token.username
        );
        self.respond(&msg.token.signature, &Message::new(token, Ack(true)));
        self.transport.close_channel(&msg.token.signature);
    }

    /// Applies one editor mutation to the sandbox and mirrors it to the
    /// store.
    fn handle_sandbox_edition(&self, msg: Message<SandboxEdition>) {
        if !self.verified(&msg.token) {
            return;
        }
        let edition = msg.data;
        let mut sandboxes = lock(&self.sandboxes);
        let Some(session) = sandboxes.get_mut(&msg.token.activity_id) else {
            warn!("Edition for unknown sandbox `{}`", msg.token.activity_id);
            return;
        };
        if session.owner != msg.token.username {
            warn!("`{}` does not own this sandbox", msg.token.username);
            self.respond(&msg.token.signature, &Ack(false));
            return;
        }
        let level_id = session.sandbox.level_id();
        let applied = if edition.add {
            session
                .sandbox
                .add_entity(edition.progress, edition.entity_info);
            self.db
                .add_level_entity(level_id, edition.progress, &edition.entity_info)
                .is_ok()
        } else if session.sandbox.del_entity(edition.progress, &edition.entity_info) {
            self.db
                .remove_level_entity(level_id, edition.progress, &edition.entity_info)
                .is_ok()
        } else {
            false
        };
        self.respond(&msg.token.signature, &Ack(applied));
    }

    fn handle_lvl_progress(&self, msg: Message<ProgressRequest>) {
        if !self.verified(&msg.token) {
            return;
        }
        let sandboxes = lock(&self.sandboxes);
        let Some(session) = sandboxes.get(&msg.token.activity_id) else {
            warn!("Progress query for unknown sandbox `{}`", msg.token.activity_id);
            return;
        };
        let records: Vec<SandboxEdition> = session
            .sandbox
            .entities_at(msg.data.0)
            .iter()
            .map(|info| SandboxEdition {
                progress: msg.data.0,
                entity_info: *info,
                add: true,
            })
            .collect();
        self.respond_records(&msg.token.signature, &records);
    }

    fn handle_stop_sandbox(&self, msg: Message<ChannelName>) {
        if !self.verified(&msg.token) {
            return;
        }
        let removed = lock(&self.sandboxes).remove(&msg.token.activity_id);
        let stopped = removed.is_some();
        match removed {
            Some(mut session) => {
                session.sandbox.stop();
                info!(
                    "Sandbox `{}` closed by `{}`",
                    msg.token.activity_id, session.owner
                );
            }
            None => warn!(
                "Stop request for unknown sandbox `{}`",
                msg.token.activity_id
            ),
        }
        let token = self
            .auth
            .issue(&msg.token.username, "", &msg.token.guest_username);
        self.respond(&msg.data.0, &Message::new(token, Ack(stopped)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use shared::messages::PlayerInfo;

    const KEY: &[u8] = b"server-test-key";

    struct Harness {
        _dir: tempfile::TempDir,
        server: Server,
        client: MessageExchanger,
        auth: Authenticator,
        db: Arc<MemoryDb>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MemoryDb::with_stock_campaign().unwrap());
        let transport = Arc::new(MessageExchanger::new(dir.path()));
        transport.init().unwrap();
        let server = Server::new(
            Arc::clone(&transport),
            Authenticator::new(KEY.to_vec()),
            db.clone() as Arc<dyn DatabaseManager>,
        );
        server.start().unwrap();
        let client = MessageExchanger::new(dir.path());
        client.init().unwrap();
        Harness {
            _dir: dir,
            server,
            client,
            auth: Authenticator::new(KEY.to_vec()),
            db,
        }
    }

    #[test]
    fn test_signup_handshake_issues_token() {
        let h = harness();
        h.client.open_channel(CH_CONNECT_CLIENT).unwrap();
        h.client.open_channel("pid-100").unwrap();
        h.client
            .write_message(
                CH_CONNECT_CLIENT,
                &Handshake {
                    username: "alice".to_string(),
                    password: "secret99".to_string(),
                    response_channel: "pid-100".to_string(),
                    signup: true,
                },
            )
            .unwrap();

        let reply: Vec<Message<ClientInfo>> = h.client.read_message("pid-100", 1).unwrap();
        assert_eq!(reply.len(), 1);
        assert!(reply[0].data.connected);
        assert!(!reply[0].token.is_empty());
        assert_eq!(reply[0].token.username, "alice");
        h.server.shutdown();
    }

    #[test]
    fn test_bad_credentials_yield_empty_token() {
        let h = harness();
        h.client.open_channel(CH_CONNECT_CLIENT).unwrap();
        h.client.open_channel("pid-101").unwrap();
        h.client
            .write_message(
                CH_CONNECT_CLIENT,
                &Handshake {
                    username: "nobody".to_string(),
                    password: "whatever".to_string(),
                    response_channel: "pid-101".to_string(),
                    signup: false,
                },
            )
            .unwrap();

        let reply: Vec<Message<ClientInfo>> = h.client.read_message("pid-101", 1).unwrap();
        assert!(!reply[0].data.connected);
        assert!(reply[0].token.is_empty());
        h.server.shutdown();
    }

    #[test]
    fn test_leaderboard_roundtrip_counted() {
        let h = harness();
        h.db.sign_up("alice", "secret99").unwrap();
        h.db.new_score("alice", 900).unwrap();
        let token = h.auth.issue("alice", "", "");
        let reply_channel = token.signature.clone();

        h.client.open_channel(CH_LEADERBOARD).unwrap();
        h.client.open_channel(&reply_channel).unwrap();
        h.client
            .write_message(
                CH_LEADERBOARD,
                &Message::new(
                    token,
                    LeaderboardRequest {
                        username: String::new(),
                        nb_entries: 10,
                        offset: 0,
                    },
                ),
            )
            .unwrap();

        let count: Vec<Count> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(count, vec![Count(1)]);
        let rows: Vec<PlayerInfo> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(rows[0].username, "alice");
        assert_eq!(rows[0].best_score, 900);
        h.server.shutdown();
    }

    #[test]
    fn test_forged_token_is_dropped_silently() {
        let h = harness();
        let forged = Authenticator::new(b"other-key".to_vec()).issue("mallory", "", "");

        h.client.open_channel(CH_FOLLOW).unwrap();
        h.client
            .write_message(
                CH_FOLLOW,
                &Message::new(
                    forged,
                    FollowRequest {
                        username: "alice".to_string(),
                        add: true,
                    },
                ),
            )
            .unwrap();

        // No response is ever written; a valid request afterwards still works
        h.db.sign_up("alice", "secret99").unwrap();
        h.db.sign_up("bob", "secret99").unwrap();
        let token = h.auth.issue("alice", "", "");
        let reply_channel = token.signature.clone();
        h.client.open_channel(&reply_channel).unwrap();
        h.client
            .write_message(
                CH_FOLLOW,
                &Message::new(
                    token,
                    FollowRequest {
                        username: "bob".to_string(),
                        add: true,
                    },
                ),
            )
            .unwrap();
        let acks: Vec<Ack> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(acks, vec![Ack(true)]);
        h.server.shutdown();
    }

    #[test]
    fn test_new_game_reissues_activity_token() {
        let h = harness();
        h.db.sign_up("alice", "secret99").unwrap();
        let token = h.auth.issue("alice", "", "");
        let reply_channel = token.signature.clone();

        h.client.open_channel(CH_NEW_GAME).unwrap();
        h.client.open_channel(&reply_channel).unwrap();
        h.client
            .write_message(CH_NEW_GAME, &Message::new(token, GameSettings::default()))
            .unwrap();

        let reply: Vec<Message<Ack>> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(reply[0].data, Ack(true));
        let game_token = reply[0].token.clone();
        assert_eq!(game_token.activity_id.len(), ACTIVITY_ID_LENGTH);
        assert!(h.auth.verify(&game_token));

        // The activity channel streams snapshots
        h.client.open_channel(&game_token.activity_id).unwrap();
        let frames: Vec<shared::messages::RefreshFrame> =
            h.client.read_message(&game_token.activity_id, 1).unwrap();
        assert_eq!(frames[0].game_state, 0);

        // Teardown returns an activity-free token on the named channel
        h.client.open_channel(CH_STOP_GAME).unwrap();
        h.client.open_channel("pid-stop").unwrap();
        h.client
            .write_message(
                CH_STOP_GAME,
                &Message::new(game_token, ChannelName("pid-stop".to_string())),
            )
            .unwrap();
        let stopped: Vec<Message<Ack>> = h.client.read_message("pid-stop", 1).unwrap();
        assert_eq!(stopped[0].data, Ack(true));
        assert!(stopped[0].token.activity_id.is_empty());
        h.server.shutdown();
    }

    #[test]
    fn test_stop_unknown_activity_acks_false() {
        let h = harness();
        h.db.sign_up("alice", "secret99").unwrap();
        let token = h.auth.issue("alice", "gone-game-00000000000000000000xx", "");

        h.client.open_channel(CH_STOP_GAME).unwrap();
        h.client.open_channel("pid-200").unwrap();
        h.client
            .write_message(
                CH_STOP_GAME,
                &Message::new(token.clone(), ChannelName("pid-200".to_string())),
            )
            .unwrap();
        let reply: Vec<Message<Ack>> = h.client.read_message("pid-200", 1).unwrap();
        assert_eq!(reply[0].data, Ack(false));

        h.client.open_channel(CH_STOP_SANDBOX).unwrap();
        h.client
            .write_message(
                CH_STOP_SANDBOX,
                &Message::new(token, ChannelName("pid-200".to_string())),
            )
            .unwrap();
        let reply: Vec<Message<Ack>> = h.client.read_message("pid-200", 1).unwrap();
        assert_eq!(reply[0].data, Ack(false));
        h.server.shutdown();
    }

    #[test]
    fn test_pack_key_admin_gate() {
        let h = harness();
        h.db.sign_up("alice", "secret99").unwrap();
        let token = h.auth.issue("alice", "", "");
        let reply_channel = token.signature.clone();

        h.client.open_channel(CH_PACK_KEY).unwrap();
        h.client.open_channel(&reply_channel).unwrap();
        h.client
            .write_message(
                CH_PACK_KEY,
                &Message::new(
                    token,
                    PackKeyRequest {
                        command: PackKeyCommand::Add,
                        key: "KEY-1".to_string(),
                        pack: "neon".to_string(),
                        uses: 3,
                        username: String::new(),
                    },
                ),
            )
            .unwrap();
        let acks: Vec<Ack> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(acks, vec![Ack(false)]);
        h.server.shutdown();
    }

    #[test]
    fn test_sandbox_edition_flow() {
        let h = harness();
        h.db.sign_up("alice", "secret99").unwrap();
        let token = h.auth.issue("alice", "", "");
        let reply_channel = token.signature.clone();

        h.client.open_channel(CH_NEW_SANDBOX).unwrap();
        h.client.open_channel(&reply_channel).unwrap();
        h.client
            .write_message(
                CH_NEW_SANDBOX,
                &Message::new(
                    token,
                    SandboxSettings {
                        level_id: -1,
                        level_name: "workbench".to_string(),
                    },
                ),
            )
            .unwrap();
        let reply: Vec<Message<Ack>> = h.client.read_message(&reply_channel, 1).unwrap();
        assert_eq!(reply[0].data, Ack(true));
        let sandbox_token = reply[0].token.clone();
        let sandbox_reply = sandbox_token.signature.clone();

        let info = shared::EntityInfo::new(
            shared::ENEMY_1_ID,
            shared::PhysicsBox::new(90.0, 20.0, 4, 4, 0.0, 0.0),
        );
        h.client.open_channel(CH_SANDBOX_EDITION).unwrap();
        h.client.open_channel(&sandbox_reply).unwrap();
        h.client
            .write_message(
                CH_SANDBOX_EDITION,
                &Message::new(
                    sandbox_token.clone(),
                    SandboxEdition {
                        progress: 4,
                        entity_info: info,
                        add: true,
                    },
                ),
            )
            .unwrap();
        let acks: Vec<Ack> = h.client.read_message(&sandbox_reply, 1).unwrap();
        assert_eq!(acks, vec![Ack(true)]);

        // The mutation is visible through the progress query and the store
        h.client.open_channel(CH_LVL_PROGRESS).unwrap();
        h.client
            .write_message(
                CH_LVL_PROGRESS,
                &Message::new(sandbox_token, ProgressRequest(4)),
            )
            .unwrap();
        let count: Vec<Count> = h.client.read_message(&sandbox_reply, 1).unwrap();
        assert_eq!(count, vec![Count(1)]);
        let entries: Vec<SandboxEdition> = h.client.read_message(&sandbox_reply, 1).unwrap();
        assert_eq!(entries[0].entity_info, info);

        let level = h.db.get_levels(-1, 0, "alice").unwrap();
        assert_eq!(h.db.level_bucket(level[0].id, 4).unwrap(), vec![info]);
        h.server.shutdown();
    }
}
