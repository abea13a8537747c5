//! Campaign progression: scripted spawns, the level-end lock, and level
//! transitions.

use log::{info, warn};
use shared::messages::LevelInfo;
use shared::{EntityInfo, FPS, FRAMES_PER_LEVEL, PROGRESS_STEP};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{DatabaseManager, DbError};
use crate::game::physics::PhysicsEngine;

/// Fraction of a level's frame budget after which spawning stalls until the
/// map is cleared of hostiles.
const LOCK_THRESHOLD: u32 = FRAMES_PER_LEVEL * 9 / 10;

pub struct LevelManager {
    db: Arc<dyn DatabaseManager>,
    /// The playlist: the whole stock campaign, or one custom level.
    levels: Vec<LevelInfo>,
    current_script: BTreeMap<u32, Vec<EntityInfo>>,
    /// Total elapsed frames across the playlist.
    progress: u32,
    /// While locked, progress is frozen and no further buckets spawn.
    locked: bool,
    /// Absolute second of the most recent spawn; a bucket fires once even
    /// while the clock is frozen on it.
    last_spawned: Option<u32>,
}

impl LevelManager {
    /// `level_id < 0` selects the stock campaign; otherwise the playlist is
    /// that single level.
    pub fn new(db: Arc<dyn DatabaseManager>, level_id: i32) -> Result<Self, DbError> {
        let levels = if level_id < 0 {
            db.get_levels(-1, 0, "skyfire")?
        } else {
            vec![db.get_level_info(level_id)?]
        };
        let current_script = match levels.first() {
            Some(level) => db.level_script(level.id)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            db,
            levels,
            current_script,
            progress: 0,
            locked: false,
            last_spawned: None,
        })
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Index into the playlist.
    pub fn current_level(&self) -> usize {
        (self.progress / FRAMES_PER_LEVEL) as usize
    }

    /// Frames elapsed within the current level.
    pub fn level_progress(&self) -> u32 {
        self.progress % FRAMES_PER_LEVEL
    }

    /// The whole playlist has been played through.
    pub fn is_ended(&self) -> bool {
        self.current_level() >= self.levels.len()
    }

    /// One tick of scripted spawning. Buckets are keyed by elapsed second;
    /// near the end of a level the clock locks until every hostile is gone.
    pub fn load_level(&mut self, engine: &mut PhysicsEngine) {
        if self.is_ended() {
            return;
        }
        let level_progress = self.level_progress();
        if level_progress % FPS == 0 && self.last_spawned != Some(self.progress / FPS) {
            self.last_spawned = Some(self.progress / FPS);
            let bucket = level_progress / FPS;
            if let Some(spawns) = self.current_script.get(&bucket) {
                for info in spawns.clone() {
                    engine.new_entity(&info);
                }
            }
        }
        if level_progress >= LOCK_THRESHOLD {
            self.locked = true;
        }
        if self.locked && engine.enemy_count() == 0 {
            self.locked = false;
        }
        if !self.locked {
            self.progress += PROGRESS_STEP;
        }
    }

    /// Crossed into the next playlist entry this tick.
    pub fn at_level_boundary(&self) -> bool {
        self.progress != 0 && self.level_progress() == 0
    }

    /// Clears the battlefield, heals the survivors, and loads the next
    /// script.
    pub fn next_level(&mut self, engine: &mut PhysicsEngine) {
        engine.clear_map();
        engine.reset_states();
        self.locked = false;
        self.current_script = match self.levels.get(self.current_level()) {
            Some(level) => {
                info!("Loading level {} ({})", level.id, level.name);
                match self.db.level_script(level.id) {
                    Ok(script) => script,
                    Err(err) => {
                        warn!("Failed to load level {}: {}", level.id, err);
                        BTreeMap::new()
                    }
                }
            }
            None => BTreeMap::new(),
        };
    }

    /// Jumps to the start of the next level. Cheat.
    pub fn skip_level(&mut self) {
        self.progress = (self.current_level() as u32 + 1) * FRAMES_PER_LEVEL;
        self.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use shared::{PhysicsBox, ENEMY_1_ID};

    fn single_level_db() -> (Arc<MemoryDb>, i32) {
        let db = Arc::new(MemoryDb::new());
        let id = db.add_level("alice", "solo").unwrap();
        let info = EntityInfo::new(ENEMY_1_ID, PhysicsBox::new(90.0, 20.0, 4, 4, 0.0, 0.0));
        db.add_level_entity(id, 0, &info).unwrap();
        db.add_level_entity(id, 2, &info).unwrap();
        (db, id)
    }

    fn engine() -> PhysicsEngine {
        PhysicsEngine::new(5, 0.5, 0.0, false)
    }

    #[test]
    fn test_unknown_level_is_an_error() {
        let db = Arc::new(MemoryDb::new());
        assert!(LevelManager::new(db, 999).is_err());
    }

    #[test]
    fn test_buckets_spawn_on_second_boundaries() {
        let (db, id) = single_level_db();
        let mut manager = LevelManager::new(db, id).unwrap();
        let mut engine = engine();

        manager.load_level(&mut engine);
        assert_eq!(engine.enemy_count(), 1);

        // Nothing new until the bucket-2 boundary
        for _ in 0..FPS * 2 - 1 {
            manager.load_level(&mut engine);
        }
        assert_eq!(engine.enemy_count(), 1);
        manager.load_level(&mut engine);
        assert_eq!(engine.enemy_count(), 2);
    }

    #[test]
    fn test_lock_freezes_progress_until_cleared() {
        let (db, id) = single_level_db();
        let mut manager = LevelManager::new(db, id).unwrap();
        let mut engine = engine();
        manager.progress = LOCK_THRESHOLD;
        engine.new_entity(&EntityInfo::new(
            ENEMY_1_ID,
            PhysicsBox::new(50.0, 20.0, 4, 4, 0.0, 0.0),
        ));

        for _ in 0..10 {
            manager.load_level(&mut engine);
        }
        assert_eq!(manager.progress(), LOCK_THRESHOLD);

        engine.clear_map();
        manager.load_level(&mut engine);
        assert_eq!(manager.progress(), LOCK_THRESHOLD + PROGRESS_STEP);
    }

    #[test]
    fn test_bucket_on_locked_frame_spawns_once() {
        // A spawn scripted in the last 10% of the level sits exactly where
        // the clock freezes; it must still fire exactly once.
        let db = Arc::new(MemoryDb::new());
        let id = db.add_level("alice", "late-wave").unwrap();
        let info = EntityInfo::new(ENEMY_1_ID, PhysicsBox::new(90.0, 20.0, 4, 4, 0.0, 0.0));
        db.add_level_entity(id, LOCK_THRESHOLD / FPS, &info).unwrap();

        let mut manager = LevelManager::new(db, id).unwrap();
        let mut engine = engine();
        manager.progress = LOCK_THRESHOLD;
        for _ in 0..5 {
            manager.load_level(&mut engine);
        }
        assert_eq!(engine.enemy_count(), 1);
        assert_eq!(manager.progress(), LOCK_THRESHOLD);

        // And the lock can actually release once the wave is dealt with
        engine.clear_map();
        manager.load_level(&mut engine);
        assert_eq!(manager.progress(), LOCK_THRESHOLD + PROGRESS_STEP);
    }

    #[test]
    fn test_boundary_and_end_detection() {
        let (db, id) = single_level_db();
        let mut manager = LevelManager::new(db, id).unwrap();
        assert!(!manager.at_level_boundary());
        assert!(!manager.is_ended());

        manager.skip_level();
        assert!(manager.at_level_boundary());
        assert!(manager.is_ended());
    }

    #[test]
    fn test_stock_campaign_playlist() {
        let db = Arc::new(MemoryDb::with_stock_campaign().unwrap());
        let manager = LevelManager::new(db, -1).unwrap();
        assert_eq!(manager.levels.len(), 3);
        assert!(!manager.current_script.is_empty());
    }

    #[test]
    fn test_next_level_clears_and_reloads() {
        let db = Arc::new(MemoryDb::with_stock_campaign().unwrap());
        let mut manager = LevelManager::new(db, -1).unwrap();
        let mut engine = engine();
        engine.new_player(0);
        engine.new_entity(&EntityInfo::new(
            ENEMY_1_ID,
            PhysicsBox::new(50.0, 20.0, 4, 4, 0.0, 0.0),
        ));

        manager.skip_level();
        manager.next_level(&mut engine);
        assert_eq!(engine.enemy_count(), 0);
        assert_eq!(engine.entity_count(), 1); // the player survives
        assert!(!manager.is_ended()); // two levels left
        assert!(!manager.current_script.is_empty());
    }
}
