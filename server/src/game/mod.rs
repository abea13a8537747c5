//! One running match: the physics engine, the campaign clock, and the
//! input/snapshot surface the server exposes to clients.

pub mod entity;
pub mod level;
pub mod map;
pub mod physics;

use log::info;
use shared::messages::{EntityFrame, GameSettings, RefreshFrame};
use shared::{
    CHEAT_CODE_GHOST, CHEAT_CODE_HULK, CHEAT_CODE_LIFE, CHEAT_CODE_SKIP_LEVEL, CLIENT_TIMEOUT_SECS,
    GAME_KEY_DOWN, GAME_KEY_DOWN_LEFT, GAME_KEY_DOWN_RIGHT, GAME_KEY_ESC, GAME_KEY_LEFT,
    GAME_KEY_RIGHT, GAME_KEY_SHOOT, GAME_KEY_SHOOT_DOWN, GAME_KEY_SHOOT_DOWN_LEFT,
    GAME_KEY_SHOOT_DOWN_RIGHT, GAME_KEY_SHOOT_LEFT, GAME_KEY_SHOOT_RIGHT, GAME_KEY_SHOOT_UP,
    GAME_KEY_SHOOT_UP_LEFT, GAME_KEY_SHOOT_UP_RIGHT, GAME_KEY_UP, GAME_KEY_UP_LEFT,
    GAME_KEY_UP_RIGHT, MAX_PLAYERS,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::{DatabaseManager, DbError};
use crate::game::level::LevelManager;
use crate::game::physics::PhysicsEngine;
use crate::utils::timestamp_micros;

/// What the input dispatcher should do after a key is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Continue,
    /// The client asked to leave the game.
    Exit,
}

pub struct Game {
    engine: PhysicsEngine,
    level_manager: LevelManager,
    stopped: bool,
    last_interaction: Instant,
}

impl Game {
    pub fn new(db: Arc<dyn DatabaseManager>, settings: &GameSettings) -> Result<Self, DbError> {
        let mut engine = PhysicsEngine::new(
            settings.initial_lives,
            settings.difficulty,
            settings.bonus_probability,
            settings.friendly_fire,
        );
        engine.new_player(0);
        if settings.second_player {
            engine.new_player(1);
        }
        let level_manager = LevelManager::new(db, settings.level_id)?;
        Ok(Self {
            engine,
            level_manager,
            stopped: false,
            last_interaction: Instant::now(),
        })
    }

    /* -------------------- Lifecycle -------------------- */

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn won(&self) -> bool {
        self.level_manager.is_ended() && !self.lost()
    }

    /// Explicitly stopped, all lives spent, or the client went silent for
    /// too long.
    pub fn lost(&self) -> bool {
        self.stopped
            || self.engine.all_players_dead()
            || self.last_interaction.elapsed() >= Duration::from_secs(CLIENT_TIMEOUT_SECS)
    }

    pub fn has_ended(&self) -> bool {
        self.won() || self.lost()
    }

    /* -------------------- Simulation -------------------- */

    /// Advances the simulation by one fixed tick.
    pub fn refresh(&mut self) {
        if self.has_ended() {
            return;
        }
        if self.level_manager.at_level_boundary() {
            self.level_manager.next_level(&mut self.engine);
        }
        self.engine.make_moves();
        self.engine.clean_off_screen();
        self.level_manager.load_level(&mut self.engine);
        self.engine.make_attacks();
        self.engine.check_collisions();
        self.engine.refresh_states();
    }

    /// Applies one packed input key. Cheats and ESC arrive verbatim; every
    /// other key carries the player slot in its low bit.
    pub fn apply_input(&mut self, key: i32) -> InputOutcome {
        self.last_interaction = Instant::now();
        match key {
            GAME_KEY_ESC => {
                info!("Game stopped by client input");
                self.stop();
                return InputOutcome::Exit;
            }
            CHEAT_CODE_LIFE => {
                self.engine.players_new_life();
                return InputOutcome::Continue;
            }
            CHEAT_CODE_GHOST => {
                self.engine.players_toggle_ghost();
                return InputOutcome::Continue;
            }
            CHEAT_CODE_HULK => {
                self.engine.players_toggle_hulk();
                return InputOutcome::Continue;
            }
            CHEAT_CODE_SKIP_LEVEL => {
                self.level_manager.skip_level();
                return InputOutcome::Continue;
            }
            _ => {}
        }

        let slot = (key & 1) as usize;
        let command = key >> 1;
        let mut shoot = false;
        let mut vx = 0.0;
        let mut vy = 0.0;
        match command {
            c if c == GAME_KEY_UP => vy = -1.0,
            c if c == GAME_KEY_DOWN => vy = 1.0,
            c if c == GAME_KEY_RIGHT => vx = 1.0,
            c if c == GAME_KEY_LEFT => vx = -1.0,
            c if c == GAME_KEY_UP_RIGHT => {
                vy = -1.0;
                vx = 1.0;
            }
            c if c == GAME_KEY_UP_LEFT => {
                vy = -1.0;
                vx = -1.0;
            }
            c if c == GAME_KEY_DOWN_RIGHT => {
                vy = 1.0;
                vx = 1.0;
            }
            c if c == GAME_KEY_DOWN_LEFT => {
                vy = 1.0;
                vx = -1.0;
            }
            c if c == GAME_KEY_SHOOT => shoot = true,
            c if c == GAME_KEY_SHOOT_UP => {
                shoot = true;
                vy = -1.0;
            }
            c if c == GAME_KEY_SHOOT_DOWN => {
                shoot = true;
                vy = 1.0;
            }
            c if c == GAME_KEY_SHOOT_RIGHT => {
                shoot = true;
                vx = 1.0;
            }
            c if c == GAME_KEY_SHOOT_LEFT => {
                shoot = true;
                vx = -1.0;
            }
            c if c == GAME_KEY_SHOOT_UP_RIGHT => {
                shoot = true;
                vy = -1.0;
                vx = 1.0;
            }
            c if c == GAME_KEY_SHOOT_UP_LEFT => {
                shoot = true;
                vy = -1.0;
                vx = -1.0;
            }
            c if c == GAME_KEY_SHOOT_DOWN_RIGHT => {
                shoot = true;
                vy = 1.0;
                vx = 1.0;
            }
            c if c == GAME_KEY_SHOOT_DOWN_LEFT => {
                shoot = true;
                vy = 1.0;
                vx = -1.0;
            }
            _ => return InputOutcome::Continue,
        }
        if vx != 0.0 {
            self.engine.set_player_velocity_x(slot, vx);
        }
        if vy != 0.0 {
            self.engine.set_player_velocity_y(slot, vy);
        }
        if shoot {
            self.engine.player_shoot(slot);
        }
        InputOutcome::Continue
    }

    /* -------------------- Snapshots -------------------- */

    pub fn refresh_frame(&self) -> RefreshFrame {
        let game_state = if self.won() {
            1
        } else if self.lost() {
            -1
        } else {
            0
        };
        let mut scores = [0u32; MAX_PLAYERS];
        let mut hp_players = [0f64; MAX_PLAYERS];
        for slot in 0..MAX_PLAYERS {
            scores[slot] = self.engine.player_score(slot);
            hp_players[slot] = self.engine.player_hp(slot);
        }
        RefreshFrame {
            game_state,
            timestamp: timestamp_micros(),
            scores,
            hp_players,
            progress: self.level_manager.progress(),
            nb_entities: self.engine.entity_count() as u64,
        }
    }

    pub fn entity_frames(&self) -> Vec<EntityFrame> {
        self.engine
            .entities()
            .map(|e| EntityFrame {
                id: e.type_id,
                x: e.boxx.x,
                y: e.boxx.y,
                hp: e.hp(),
                state: e.state_for_frame(),
                state_step: e.state_step,
                variant: e.held_variant(),
            })
            .collect()
    }

    pub fn total_score(&self) -> i64 {
        (0..MAX_PLAYERS)
            .map(|slot| self.engine.player_score(slot) as i64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use assert_approx_eq::assert_approx_eq;

    fn new_game() -> Game {
        let db = Arc::new(MemoryDb::with_stock_campaign().unwrap());
        Game::new(db, &GameSettings::default()).unwrap()
    }

    #[test]
    fn test_new_game_running_state() {
        let game = new_game();
        assert!(!game.has_ended());
        let frame = game.refresh_frame();
        assert_eq!(frame.game_state, 0);
        assert_eq!(frame.nb_entities, 1); // one player
        assert_approx_eq!(frame.hp_players[0], 5.0);
    }

    #[test]
    fn test_second_player_setting() {
        let db = Arc::new(MemoryDb::with_stock_campaign().unwrap());
        let settings = GameSettings {
            second_player: true,
            ..GameSettings::default()
        };
        let game = Game::new(db, &settings).unwrap();
        assert_eq!(game.refresh_frame().nb_entities, 2);
    }

    #[test]
    fn test_escape_stops_the_game() {
        let mut game = new_game();
        assert_eq!(game.apply_input(GAME_KEY_ESC), InputOutcome::Exit);
        assert!(game.has_ended());
        // The final snapshot reports the stop as a loss, not a running game
        assert!(game.lost());
        assert_eq!(game.refresh_frame().game_state, -1);
        // A stopped game no longer advances
        let progress = game.refresh_frame().progress;
        game.refresh();
        assert_eq!(game.refresh_frame().progress, progress);
    }

    #[test]
    fn test_refresh_advances_progress() {
        let mut game = new_game();
        for _ in 0..10 {
            game.refresh();
        }
        assert_eq!(game.refresh_frame().progress, 10);
    }

    #[test]
    fn test_movement_input_routes_to_slot() {
        let mut game = new_game();
        let x_before = game.entity_frames()[0].x;
        game.apply_input(GAME_KEY_RIGHT << 1); // slot 0, right
        game.refresh();
        assert!(game.entity_frames()[0].x > x_before);
    }

    #[test]
    fn test_shoot_input_spawns_bullet() {
        let mut game = new_game();
        game.apply_input(GAME_KEY_SHOOT << 1);
        assert_eq!(game.refresh_frame().nb_entities, 2);
    }

    #[test]
    fn test_skip_level_cheat_crosses_boundary() {
        let mut game = new_game();
        game.apply_input(CHEAT_CODE_SKIP_LEVEL);
        game.refresh();
        assert!(game.refresh_frame().progress > shared::FRAMES_PER_LEVEL);
        assert!(!game.has_ended());
    }

    #[test]
    fn test_campaign_completion_wins() {
        let mut game = new_game();
        for _ in 0..3 {
            game.apply_input(CHEAT_CODE_SKIP_LEVEL);
            game.refresh();
        }
        assert!(game.won());
        assert_eq!(game.refresh_frame().game_state, 1);
    }

    #[test]
    fn test_life_cheat_heals() {
        let mut game = new_game();
        game.apply_input(CHEAT_CODE_LIFE);
        assert_approx_eq!(game.refresh_frame().hp_players[0], 6.0);
    }
}
