//! Narrow database collaborator interface and its in-memory implementation.
//!
//! The simulation core only sees [`DatabaseManager`]: credentials, scores,
//! the follow graph, level metadata with scripted-entity tables, and pack
//! bookkeeping. Persistence failures propagate as failures of the enclosing
//! request; the in-memory simulation is never rolled back, so the server and
//! the store may diverge on a persistence failure (accepted limitation).

use shared::messages::{LevelInfo, Pack, PackKey, PlayerInfo};
use shared::{EntityInfo, PhysicsBox, PASSWORD_MIN, USERNAME_MAX, USERNAME_MIN};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

use crate::transport::lock;
use crate::utils::timestamp_micros;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("unknown user `{0}`")]
    UnknownUser(String),
    #[error("username `{0}` already exists")]
    UsernameExists(String),
    #[error("invalid username `{0}`")]
    InvalidUsername(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("unknown level {0}")]
    UnknownLevel(i32),
    #[error("unknown pack key")]
    UnknownPackKey,
}

/// Everything the server core asks of the persistence layer.
pub trait DatabaseManager: Send + Sync {
    fn sign_up(&self, username: &str, password: &str) -> Result<(), DbError>;
    fn sign_in(&self, username: &str, password: &str) -> Result<bool, DbError>;
    fn is_admin(&self, username: &str) -> Result<bool, DbError>;

    /// Upserts a finished game's score, keeping the best one, and grants xp.
    fn new_score(&self, username: &str, score: i64) -> Result<(), DbError>;
    fn get_stats(&self, username: &str, viewer: &str) -> Result<PlayerInfo, DbError>;
    fn leaderboard(&self, nb_entries: u32, offset: u32) -> Result<Vec<PlayerInfo>, DbError>;

    fn follows(&self, username: &str) -> Result<Vec<PlayerInfo>, DbError>;
    fn follow(&self, follower: &str, followed: &str) -> Result<bool, DbError>;
    fn unfollow(&self, follower: &str, followed: &str) -> Result<bool, DbError>;

    /// Level listing; `nb_entries < 0` means "all", `user` non-empty filters
    /// by creator.
    fn get_levels(&self, nb_entries: i32, offset: u32, user: &str)
        -> Result<Vec<LevelInfo>, DbError>;
    fn get_level_info(&self, level_id: i32) -> Result<LevelInfo, DbError>;
    /// The whole scripted-entity table of one level, keyed by elapsed-second
    /// bucket.
    fn level_script(&self, level_id: i32) -> Result<BTreeMap<u32, Vec<EntityInfo>>, DbError>;
    fn level_bucket(&self, level_id: i32, progress: u32) -> Result<Vec<EntityInfo>, DbError>;
    fn add_level(&self, creator: &str, name: &str) -> Result<i32, DbError>;
    fn add_level_entity(
        &self,
        level_id: i32,
        progress: u32,
        entity: &EntityInfo,
    ) -> Result<(), DbError>;
    fn remove_level_entity(
        &self,
        level_id: i32,
        progress: u32,
        entity: &EntityInfo,
    ) -> Result<(), DbError>;
    fn set_rate(&self, level_id: i32, username: &str, rating: u32) -> Result<(), DbError>;

    fn packs(&self, username: &str) -> Result<Vec<Pack>, DbError>;
    fn use_pack_key(&self, key: &str, username: &str) -> Result<bool, DbError>;
    fn add_pack_key(&self, pack: &str, key: &str, uses: u32) -> Result<PackKey, DbError>;
    fn remove_pack_key(&self, key: &str) -> Result<(), DbError>;
    fn pack_keys(&self) -> Result<Vec<PackKey>, DbError>;
}

#[derive(Debug, Clone)]
struct UserRow {
    password: String,
    admin: bool,
    best_score: i64,
    xp: i64,
}

#[derive(Debug, Clone)]
struct LevelRow {
    info: LevelInfo,
    script: BTreeMap<u32, Vec<EntityInfo>>,
    ratings: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
struct PackKeyRow {
    pack: String,
    uses: u32,
}

#[derive(Default)]
struct State {
    users: HashMap<String, UserRow>,
    follow_edges: HashSet<(String, String)>,
    levels: BTreeMap<i32, LevelRow>,
    next_level_id: i32,
    packs: Vec<(i32, String)>,
    owned_packs: HashSet<(String, i32)>,
    pack_keys: HashMap<String, PackKeyRow>,
}

/// In-memory [`DatabaseManager`], backing the binary and the tests.
pub struct MemoryDb {
    state: Mutex<State>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MemoryDb {
    pub fn new() -> Self {
        let mut state = State::default();
        state.next_level_id = 1;
        Self {
            state: Mutex::new(state),
        }
    }

    /// Fresh store pre-seeded with the three stock campaign levels, used by
    /// the server binary when no external store is wired up.
    pub fn with_stock_campaign() -> Result<Self, DbError> {
        use shared::{
            BOSS_1_ID, BOSS_2_ID, BOSS_3_ID, ENEMY_1_ID, ENEMY_2_ID, ENEMY_3_ID, MAP_HEIGHT,
            MAP_WIDTH, OBSTACLE_ID,
        };

        let db = Self::new();
        let enemy_rows: [(u32, &[u32]); 3] = [
            (ENEMY_1_ID, &[5, 12, 20, 33, 47, 62, 78]),
            (ENEMY_2_ID, &[8, 18, 30, 44, 58, 74, 82]),
            (ENEMY_3_ID, &[15, 28, 42, 56, 70, 80]),
        ];
        for (index, (name, boss)) in [
            ("First Contact", BOSS_1_ID),
            ("Deep Raid", BOSS_2_ID),
            ("Last Stand", BOSS_3_ID),
        ]
        .iter()
        .enumerate()
        {
            let id = db.add_level("skyfire", name)?;
            for (row, (type_id, seconds)) in enemy_rows.iter().enumerate() {
                for &second in seconds.iter() {
                    // Later levels front-load the same waves
                    let second = second.saturating_sub(index as u32 * 2).max(1);
                    let y = 8.0 + row as f64 * ((MAP_HEIGHT as f64 - 20.0) / 2.0);
                    let boxx = PhysicsBox::new(MAP_WIDTH as f64 - 1.0, y, 4, 4, 0.0, 0.0);
                    db.add_level_entity(id, second, &EntityInfo::new(*type_id, boxx))?;
                }
            }
            for &second in &[25u32, 50, 75] {
                let boxx = PhysicsBox::new(
                    MAP_WIDTH as f64 - 1.0,
                    MAP_HEIGHT as f64 / 2.0 - 2.0,
                    5,
                    5,
                    0.0,
                    0.0,
                );
                db.add_level_entity(id, second, &EntityInfo::new(OBSTACLE_ID, boxx))?;
            }
            let boss_box = PhysicsBox::new(
                MAP_WIDTH as f64 - 10.0,
                MAP_HEIGHT as f64 / 2.0 - 4.0,
                8,
                8,
                0.0,
                0.0,
            );
            // The boss must appear before the level-end lock stalls spawning
            db.add_level_entity(id, 85, &EntityInfo::new(*boss, boss_box))?;
        }
        Ok(db)
    }

    /// Registers an administrator account directly, bypassing sign-up
    /// validation. Operator tooling only.
    pub fn add_admin(&self, username: &str, password: &str) {
        lock(&self.state).users.insert(
            username.to_string(),
            UserRow {
                password: password.to_string(),
                admin: true,
                best_score: 0,
                xp: 0,
            },
        );
    }

    fn stats_row(state: &State, username: &str, viewer: &str) -> Option<PlayerInfo> {
        state.users.get(username).map(|row| PlayerInfo {
            username: username.to_string(),
            best_score: row.best_score,
            xp: row.xp,
            is_followed: state
                .follow_edges
                .contains(&(viewer.to_string(), username.to_string())),
            is_following_me: state
                .follow_edges
                .contains(&(username.to_string(), viewer.to_string())),
        })
    }
}

impl DatabaseManager for MemoryDb {
    fn sign_up(&self, username: &str, password: &str) -> Result<(), DbError> {
        if !valid_username(username) {
            return Err(DbError::InvalidUsername(username.to_string()));
        }
        if password.len() < PASSWORD_MIN {
            return Err(DbError::InvalidPassword);
        }
        let mut state = lock(&self.state);
        if state.users.contains_key(username) {
            return Err(DbError::UsernameExists(username.to_string()));
        }
        state.users.insert(
            username.to_string(),
            UserRow {
                password: password.to_string(),
                admin: false,
                best_score: 0,
                xp: 0,
            },
        );
        Ok(())
    }

    fn sign_in(&self, username: &str, password: &str) -> Result<bool, DbError> {
        let state = lock(&self.state);
        Ok(state
            .users
            .get(username)
            .map(|row| row.password == password)
            .unwrap_or(false))
    }

    fn is_admin(&self, username: &str) -> Result<bool, DbError> {
        let state = lock(&self.state);
        Ok(state.users.get(username).map(|row| row.admin).unwrap_or(false))
    }

    fn new_score(&self, username: &str, score: i64) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        let row = state
            .users
            .get_mut(username)
            .ok_or_else(|| DbError::UnknownUser(username.to_string()))?;
        row.best_score = row.best_score.max(score);
        row.xp += score;
        Ok(())
    }

    fn get_stats(&self, username: &str, viewer: &str) -> Result<PlayerInfo, DbError> {
        let state = lock(&self.state);
        Self::stats_row(&state, username, viewer)
            .ok_or_else(|| DbError::UnknownUser(username.to_string()))
    }

    fn leaderboard(&self, nb_entries: u32, offset: u32) -> Result<Vec<PlayerInfo>, DbError> {
        let state = lock(&self.state);
        let mut rows: Vec<PlayerInfo> = state
            .users
            .iter()
            .map(|(name, row)| PlayerInfo {
                username: name.clone(),
                best_score: row.best_score,
                xp: row.xp,
                is_followed: false,
                is_following_me: false,
            })
            .collect();
        rows.sort_by(|a, b| b.best_score.cmp(&a.best_score).then(a.username.cmp(&b.username)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(nb_entries as usize)
            .collect())
    }

    fn follows(&self, username: &str) -> Result<Vec<PlayerInfo>, DbError> {
        let state = lock(&self.state);
        let mut rows: Vec<PlayerInfo> = state
            .follow_edges
            .iter()
            .filter(|(follower, _)| follower == username)
            .filter_map(|(_, followed)| Self::stats_row(&state, followed, username))
            .collect();
        rows.sort_by(|a, b| b.best_score.cmp(&a.best_score).then(a.username.cmp(&b.username)));
        Ok(rows)
    }

    fn follow(&self, follower: &str, followed: &str) -> Result<bool, DbError> {
        let mut state = lock(&self.state);
        if follower == followed || !state.users.contains_key(followed) {
            return Ok(false);
        }
        Ok(state
            .follow_edges
            .insert((follower.to_string(), followed.to_string())))
    }

    fn unfollow(&self, follower: &str, followed: &str) -> Result<bool, DbError> {
        let mut state = lock(&self.state);
        Ok(state
            .follow_edges
            .remove(&(follower.to_string(), followed.to_string())))
    }

    fn get_levels(
        &self,
        nb_entries: i32,
        offset: u32,
        user: &str,
    ) -> Result<Vec<LevelInfo>, DbError> {
        let state = lock(&self.state);
        let filtered = state
            .levels
            .values()
            .filter(|row| user.is_empty() || row.info.creator == user)
            .map(|row| row.info.clone())
            .skip(offset as usize);
        Ok(if nb_entries < 0 {
            filtered.collect()
        } else {
            filtered.take(nb_entries as usize).collect()
        })
    }

    fn get_level_info(&self, level_id: i32) -> Result<LevelInfo, DbError> {
        let state = lock(&self.state);
        state
            .levels
            .get(&level_id)
            .map(|row| row.info.clone())
            .ok_or(DbError::UnknownLevel(level_id))
    }

    fn level_script(&self, level_id: i32) -> Result<BTreeMap<u32, Vec<EntityInfo>>, DbError> {
        let state = lock(&self.state);
        state
            .levels
            .get(&level_id)
            .map(|row| row.script.clone())
            .ok_or(DbError::UnknownLevel(level_id))
    }

    fn level_bucket(&self, level_id: i32, progress: u32) -> Result<Vec<EntityInfo>, DbError> {
        let state = lock(&self.state);
        let row = state
            .levels
            .get(&level_id)
            .ok_or(DbError::UnknownLevel(level_id))?;
        Ok(row.script.get(&progress).cloned().unwrap_or_default())
    }

    fn add_level(&self, creator: &str, name: &str) -> Result<i32, DbError> {
        let mut state = lock(&self.state);
        let id = state.next_level_id;
        state.next_level_id += 1;
        state.levels.insert(
            id,
            LevelRow {
                info: LevelInfo {
                    id,
                    creator: creator.to_string(),
                    name: name.to_string(),
                    rate: 0,
                    created_timestamp: timestamp_micros(),
                },
                script: BTreeMap::new(),
                ratings: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn add_level_entity(
        &self,
        level_id: i32,
        progress: u32,
        entity: &EntityInfo,
    ) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        let row = state
            .levels
            .get_mut(&level_id)
            .ok_or(DbError::UnknownLevel(level_id))?;
        row.script.entry(progress).or_default().push(*entity);
        Ok(())
    }

    fn remove_level_entity(
        &self,
        level_id: i32,
        progress: u32,
        entity: &EntityInfo,
    ) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        let row = state
            .levels
            .get_mut(&level_id)
            .ok_or(DbError::UnknownLevel(level_id))?;
        if let Some(bucket) = row.script.get_mut(&progress) {
            if let Some(pos) = bucket.iter().position(|e| e == entity) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                row.script.remove(&progress);
            }
        }
        Ok(())
    }

    fn set_rate(&self, level_id: i32, username: &str, rating: u32) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        let row = state
            .levels
            .get_mut(&level_id)
            .ok_or(DbError::UnknownLevel(level_id))?;
        row.ratings.insert(username.to_string(), rating);
        let sum: u32 = row.ratings.values().sum();
        row.info.rate = (sum / row.ratings.len() as u32) as i32;
        Ok(())
    }

    fn packs(&self, username: &str) -> Result<Vec<Pack>, DbError> {
        let state = lock(&self.state);
        Ok(state
            .packs
            .iter()
            .map(|(id, name)| Pack {
                id: *id,
                name: name.clone(),
                owned: state.owned_packs.contains(&(username.to_string(), *id)),
            })
            .collect())
    }

    fn use_pack_key(&self, key: &str, username: &str) -> Result<bool, DbError> {
        let mut state = lock(&self.state);
        let (pack_name, exhausted) = match state.pack_keys.get_mut(key) {
            Some(row) if row.uses > 0 => {
                row.uses -= 1;
                (row.pack.clone(), row.uses == 0)
            }
            _ => return Ok(false),
        };
        if exhausted {
            state.pack_keys.remove(key);
        }
        let pack_id = state
            .packs
            .iter()
            .find(|(_, name)| *name == pack_name)
            .map(|(id, _)| *id);
        if let Some(id) = pack_id {
            state.owned_packs.insert((username.to_string(), id));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn add_pack_key(&self, pack: &str, key: &str, uses: u32) -> Result<PackKey, DbError> {
        let mut state = lock(&self.state);
        if !state.packs.iter().any(|(_, name)| name == pack) {
            let id = state.packs.len() as i32 + 1;
            state.packs.push((id, pack.to_string()));
        }
        state.pack_keys.insert(
            key.to_string(),
            PackKeyRow {
                pack: pack.to_string(),
                uses,
            },
        );
        Ok(PackKey {
            key: key.to_string(),
            uses,
        })
    }

    fn remove_pack_key(&self, key: &str) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        if state.pack_keys.remove(key).is_none() {
            return Err(DbError::UnknownPackKey);
        }
        Ok(())
    }

    fn pack_keys(&self) -> Result<Vec<PackKey>, DbError> {
        let state = lock(&self.state);
        let mut keys: Vec<PackKey> = state
            .pack_keys
            .iter()
            .map(|(key, row)| PackKey {
                key: key.clone(),
                uses: row.uses,
            })
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PhysicsBox, ENEMY_1_ID};

    #[test]
    fn test_sign_up_and_sign_in() {
        let db = MemoryDb::new();
        db.sign_up("alice", "secret99").unwrap();
        assert!(db.sign_in("alice", "secret99").unwrap());
        assert!(!db.sign_in("alice", "wrong").unwrap());
        assert!(!db.sign_in("nobody", "secret99").unwrap());
    }

    #[test]
    fn test_sign_up_validation() {
        let db = MemoryDb::new();
        assert!(matches!(
            db.sign_up("ab", "secret99"),
            Err(DbError::InvalidUsername(_))
        ));
        assert!(matches!(
            db.sign_up("alice", "abc"),
            Err(DbError::InvalidPassword)
        ));
        db.sign_up("alice", "secret99").unwrap();
        assert!(matches!(
            db.sign_up("alice", "secret99"),
            Err(DbError::UsernameExists(_))
        ));
    }

    #[test]
    fn test_score_upsert_keeps_best() {
        let db = MemoryDb::new();
        db.sign_up("alice", "secret99").unwrap();
        db.new_score("alice", 100).unwrap();
        db.new_score("alice", 50).unwrap();
        let stats = db.get_stats("alice", "").unwrap();
        assert_eq!(stats.best_score, 100);
        assert_eq!(stats.xp, 150);
    }

    #[test]
    fn test_leaderboard_empty_db() {
        let db = MemoryDb::new();
        assert!(db.leaderboard(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_leaderboard_order_and_paging() {
        let db = MemoryDb::new();
        for (name, score) in [("alice", 300), ("bob", 100), ("carol", 200)] {
            db.sign_up(name, "secret99").unwrap();
            db.new_score(name, score).unwrap();
        }
        let top = db.leaderboard(2, 0).unwrap();
        assert_eq!(top[0].username, "alice");
        assert_eq!(top[1].username, "carol");
        let rest = db.leaderboard(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].username, "bob");
    }

    #[test]
    fn test_follow_graph() {
        let db = MemoryDb::new();
        db.sign_up("alice", "secret99").unwrap();
        db.sign_up("bob", "secret99").unwrap();
        assert!(db.follow("alice", "bob").unwrap());
        assert!(!db.follow("alice", "bob").unwrap()); // double-follow
        assert!(!db.follow("alice", "alice").unwrap()); // self-follow
        assert!(!db.follow("alice", "ghost").unwrap()); // unknown target

        let follows = db.follows("alice").unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].username, "bob");
        assert!(follows[0].is_followed);

        assert!(db.unfollow("alice", "bob").unwrap());
        assert!(!db.unfollow("alice", "bob").unwrap());
    }

    #[test]
    fn test_level_script_roundtrip() {
        let db = MemoryDb::new();
        let level = db.add_level("alice", "canyon").unwrap();
        let info = EntityInfo::new(ENEMY_1_ID, PhysicsBox::new(12.0, 0.0, 4, 4, 0.0, 0.0));
        db.add_level_entity(level, 3, &info).unwrap();

        // The descriptor read back is structurally equal: same type + position
        let bucket = db.level_bucket(level, 3).unwrap();
        assert_eq!(bucket, vec![info]);
        let script = db.level_script(level).unwrap();
        assert_eq!(script.get(&3).map(Vec::len), Some(1));

        db.remove_level_entity(level, 3, &info).unwrap();
        assert!(db.level_bucket(level, 3).unwrap().is_empty());
    }

    #[test]
    fn test_level_listing_filters_by_creator() {
        let db = MemoryDb::new();
        db.add_level("alice", "one").unwrap();
        db.add_level("bob", "two").unwrap();
        db.add_level("alice", "three").unwrap();

        assert_eq!(db.get_levels(-1, 0, "").unwrap().len(), 3);
        assert_eq!(db.get_levels(-1, 0, "alice").unwrap().len(), 2);
        assert_eq!(db.get_levels(1, 1, "").unwrap().len(), 1);
    }

    #[test]
    fn test_rating_average() {
        let db = MemoryDb::new();
        let level = db.add_level("alice", "one").unwrap();
        db.set_rate(level, "bob", 5).unwrap();
        db.set_rate(level, "carol", 3).unwrap();
        assert_eq!(db.get_level_info(level).unwrap().rate, 4);
    }

    #[test]
    fn test_stock_campaign_shape() {
        let db = MemoryDb::with_stock_campaign().unwrap();
        let levels = db.get_levels(-1, 0, "").unwrap();
        assert_eq!(levels.len(), 3);
        for level in &levels {
            let script = db.level_script(level.id).unwrap();
            assert!(!script.is_empty());
            // Every level ends on a boss
            let last = script.values().last().unwrap();
            assert!(last.iter().any(|e| e.main_type() == shared::TYPE_BOSS));
        }
    }

    #[test]
    fn test_pack_key_lifecycle() {
        let db = MemoryDb::new();
        db.sign_up("alice", "secret99").unwrap();
        db.add_pack_key("neon", "KEY-1", 2).unwrap();

        assert!(db.use_pack_key("KEY-1", "alice").unwrap());
        assert!(db.packs("alice").unwrap().iter().any(|p| p.owned));
        assert!(db.use_pack_key("KEY-1", "alice").unwrap());
        // Exhausted after two uses
        assert!(!db.use_pack_key("KEY-1", "alice").unwrap());

        db.add_pack_key("neon", "KEY-2", 1).unwrap();
        assert_eq!(db.pack_keys().unwrap().len(), 1);
        db.remove_pack_key("KEY-2").unwrap();
        assert!(matches!(db.remove_pack_key("KEY-2"), Err(DbError::UnknownPackKey)));
    }
}
