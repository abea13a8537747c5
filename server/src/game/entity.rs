//! Entities and their state machines.
//!
//! Every object in the simulation is an [`Entity`]: a physics box, a state
//! machine, and optional combat, weapon and movement components. What an
//! entity *is* lives in the [`EntityKind`] tag, and behavior differences are
//! matched on that tag rather than spread across a type hierarchy.

use shared::{
    PhysicsBox, BOSS_FIRE_DELAY, BOSS_HP, BULLET_HEIGHT, BULLET_HP, BULLET_WIDTH, ENEMY_DAMAGE,
    ENEMY_FIRE_DELAY, ENEMY_HP, HENCHMAN_FIRE_DELAY, HENCHMAN_HP, OBSTACLE_DAMAGE, OBSTACLE_HP,
    OBSTACLE_VELOCITY, PLAYER_DAMAGE, PLAYER_FIRE_DAMAGE, PLAYER_FIRE_DELAY,
    POWERUP_DAMAGE_FACTOR, POWERUP_FIRE_FACTOR, POWERUP_FIRE_ID, POWERUP_HEIGHT, POWERUP_WIDTH,
    RESPAWN_DURATION, STATE_DURATION,
};

/* -------------------- States -------------------- */

/// Animation/logic state. `Respawn` never persists in an entity; it is only
/// reported in snapshots while a player's invincibility runs down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Idle,
    Move,
    Shoot,
    Hurt,
    Die,
    Respawn,
    PickPowerUp,
}

impl EntityState {
    pub fn as_u32(self) -> u32 {
        match self {
            EntityState::Idle => 0,
            EntityState::Move => 1,
            EntityState::Shoot => 2,
            EntityState::Hurt => 3,
            EntityState::Die => 4,
            EntityState::Respawn => 5,
            EntityState::PickPowerUp => 6,
        }
    }
}

/// Where an entity is in its two-phase death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathPhase {
    Alive,
    /// Death animation still playing; the entity stays on the map but no
    /// longer interacts.
    Dying,
    /// Animation over, the entity can be swept from the map.
    Died,
}

/* -------------------- Components -------------------- */

#[derive(Debug, Clone, Copy)]
pub struct Combat {
    pub hp: f64,
    /// Damage dealt on contact.
    pub touch_damage: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Weapon {
    pub fire_damage: f64,
    /// Frames between shots.
    pub fire_delay: u32,
    /// Frames until the next shot is allowed.
    pub cooldown: u32,
}

/// Periodic movement pattern, one `(vx, vy)` multiplier pair per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Enemy1,
    Enemy2,
    Enemy3,
    Henchman,
    BossIdle,
    BossSweep,
}

const ENEMY_1_WAVE: [(f64, f64); 24] = [
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
];

const ENEMY_2_WAVE: [(f64, f64); 1] = [(-1.0, 0.0)];

const ENEMY_3_WAVE: [(f64, f64); 16] = [
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
];

const HENCHMAN_WAVE: [(f64, f64); 12] = [
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (0.0, -1.0),
    (0.0, -1.0),
    (0.0, -1.0),
    (0.0, -1.0),
    (0.0, -1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
];

const BOSS_IDLE_WAVE: [(f64, f64); 1] = [(0.0, 0.0)];

const BOSS_SWEEP_WAVE: [(f64, f64); 48] = {
    let mut wave = [(0.0, -1.0); 48];
    let mut i = 0;
    while i < 12 {
        wave[i] = (0.0, 1.0);
        i += 1;
    }
    let mut i = 36;
    while i < 48 {
        wave[i] = (0.0, 1.0);
        i += 1;
    }
    wave
};

impl Waveform {
    pub fn steps(self) -> &'static [(f64, f64)] {
        match self {
            Waveform::Enemy1 => &ENEMY_1_WAVE,
            Waveform::Enemy2 => &ENEMY_2_WAVE,
            Waveform::Enemy3 => &ENEMY_3_WAVE,
            Waveform::Henchman => &HENCHMAN_WAVE,
            Waveform::BossIdle => &BOSS_IDLE_WAVE,
            Waveform::BossSweep => &BOSS_SWEEP_WAVE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Movement {
    pub waveform: Waveform,
    step: usize,
}

impl Movement {
    pub fn new(waveform: Waveform) -> Self {
        Self { waveform, step: 0 }
    }

    /// Switches pattern and restarts it from the beginning.
    pub fn switch(&mut self, waveform: Waveform) {
        if self.waveform != waveform {
            self.waveform = waveform;
            self.step = 0;
        }
    }

    /// Multipliers for this frame; the pattern loops.
    pub fn advance(&mut self) -> (f64, f64) {
        let steps = self.waveform.steps();
        let out = steps[self.step % steps.len()];
        self.step = (self.step + 1) % steps.len();
        out
    }
}

/// Power-up effect carried by a player until it dies or respawns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldPowerUp {
    pub type_id: u32,
    pub damage_factor: f64,
    pub fire_rate_factor: f64,
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub slot: usize,
    pub spawn_x: f64,
    pub spawn_y: f64,
    /// Frames of post-respawn invincibility left.
    pub invincibility: u32,
    pub ghost: bool,
    pub hulk: bool,
    pub score: u32,
    pub power_up: Option<HeldPowerUp>,
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Obstacle,
    Bullet {
        /// Player slot the bullet belongs to, `None` for hostile bullets.
        shooter: Option<usize>,
    },
    PowerUp {
        damage_factor: f64,
        fire_rate_factor: f64,
    },
    Enemy,
    Boss {
        /// Set once the boss has been hurt in its final phase; quadruples
        /// its fire rate.
        gatling: bool,
    },
    Henchman {
        /// Uid of the boss that spawned it.
        creator: u64,
    },
    Player(PlayerState),
}

/* -------------------- Entity -------------------- */

#[derive(Debug, Clone)]
pub struct Entity {
    pub uid: u64,
    pub type_id: u32,
    pub kind: EntityKind,
    pub boxx: PhysicsBox,
    pub state: EntityState,
    pub state_step: u32,
    pub combat: Option<Combat>,
    pub weapon: Option<Weapon>,
    pub movement: Option<Movement>,
}

impl Entity {
    fn base(uid: u64, type_id: u32, kind: EntityKind, boxx: PhysicsBox) -> Self {
        Self {
            uid,
            type_id,
            kind,
            boxx,
            state: EntityState::Move,
            state_step: 0,
            combat: None,
            weapon: None,
            movement: None,
        }
    }

    pub fn obstacle(uid: u64, type_id: u32, mut boxx: PhysicsBox) -> Self {
        boxx.vx = -OBSTACLE_VELOCITY;
        boxx.vy = 0.0;
        let mut e = Self::base(uid, type_id, EntityKind::Obstacle, boxx);
        e.combat = Some(Combat {
            hp: OBSTACLE_HP,
            touch_damage: OBSTACLE_DAMAGE,
        });
        e
    }

    pub fn bullet(
        uid: u64,
        type_id: u32,
        x: f64,
        y: f64,
        vx: f64,
        damage: f64,
        shooter: Option<usize>,
    ) -> Self {
        let boxx = PhysicsBox::new(x, y, BULLET_WIDTH, BULLET_HEIGHT, vx, 0.0);
        let mut e = Self::base(uid, type_id, EntityKind::Bullet { shooter }, boxx);
        e.combat = Some(Combat {
            hp: BULLET_HP,
            touch_damage: damage,
        });
        e
    }

    pub fn power_up(uid: u64, type_id: u32, x: f64, y: f64) -> Self {
        let (damage_factor, fire_rate_factor) = if type_id == POWERUP_FIRE_ID {
            (1.0, POWERUP_FIRE_FACTOR)
        } else {
            (POWERUP_DAMAGE_FACTOR, 1.0)
        };
        let boxx = PhysicsBox::new(x, y, POWERUP_WIDTH, POWERUP_HEIGHT, 0.0, 0.0);
        Self::base(
            uid,
            type_id,
            EntityKind::PowerUp {
                damage_factor,
                fire_rate_factor,
            },
            boxx,
        )
    }

    pub fn enemy(uid: u64, type_id: u32, boxx: PhysicsBox, fire_damage: f64) -> Self {
        let waveform = match type_id & 0xf {
            1 => Waveform::Enemy2,
            2 => Waveform::Enemy3,
            _ => Waveform::Enemy1,
        };
        let mut e = Self::base(uid, type_id, EntityKind::Enemy, boxx);
        e.combat = Some(Combat {
            hp: ENEMY_HP,
            touch_damage: ENEMY_DAMAGE,
        });
        e.weapon = Some(Weapon {
            fire_damage,
            fire_delay: ENEMY_FIRE_DELAY,
            cooldown: ENEMY_FIRE_DELAY,
        });
        e.movement = Some(Movement::new(waveform));
        e
    }

    pub fn boss(uid: u64, type_id: u32, boxx: PhysicsBox, fire_damage: f64) -> Self {
        let mut e = Self::base(uid, type_id, EntityKind::Boss { gatling: false }, boxx);
        e.combat = Some(Combat {
            hp: BOSS_HP,
            touch_damage: ENEMY_DAMAGE,
        });
        e.weapon = Some(Weapon {
            fire_damage,
            fire_delay: BOSS_FIRE_DELAY,
            cooldown: BOSS_FIRE_DELAY,
        });
        e.movement = Some(Movement::new(Waveform::BossIdle));
        e
    }

    pub fn henchman(
        uid: u64,
        type_id: u32,
        boxx: PhysicsBox,
        fire_damage: f64,
        creator: u64,
    ) -> Self {
        let mut e = Self::base(uid, type_id, EntityKind::Henchman { creator }, boxx);
        e.combat = Some(Combat {
            hp: HENCHMAN_HP,
            touch_damage: ENEMY_DAMAGE,
        });
        e.weapon = Some(Weapon {
            fire_damage,
            fire_delay: HENCHMAN_FIRE_DELAY,
            cooldown: HENCHMAN_FIRE_DELAY,
        });
        e.movement = Some(Movement::new(Waveform::Henchman));
        e
    }

    pub fn player(uid: u64, type_id: u32, slot: usize, boxx: PhysicsBox, lives: u32) -> Self {
        let state = PlayerState {
            slot,
            spawn_x: boxx.x,
            spawn_y: boxx.y,
            invincibility: 0,
            ghost: false,
            hulk: false,
            score: 0,
            power_up: None,
        };
        let mut e = Self::base(uid, type_id, EntityKind::Player(state), boxx);
        e.combat = Some(Combat {
            hp: lives as f64,
            touch_damage: PLAYER_DAMAGE,
        });
        e.weapon = Some(Weapon {
            fire_damage: PLAYER_FIRE_DAMAGE,
            fire_delay: PLAYER_FIRE_DELAY,
            cooldown: 0,
        });
        e
    }

    /* -------------------- Accessors -------------------- */

    pub fn hp(&self) -> f64 {
        self.combat.map(|c| c.hp).unwrap_or(0.0)
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    pub fn player_state(&self) -> Option<&PlayerState> {
        match &self.kind {
            EntityKind::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn player_state_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.kind {
            EntityKind::Player(p) => Some(p),
            _ => None,
        }
    }

    /// State as reported in snapshots; invincible players show as respawning.
    pub fn state_for_frame(&self) -> u32 {
        if let Some(p) = self.player_state() {
            if p.invincibility > 0 && self.state != EntityState::Die {
                return EntityState::Respawn.as_u32();
            }
        }
        self.state.as_u32()
    }

    /// Held power-up type tag, 0 when none. Snapshot metadata.
    pub fn held_variant(&self) -> u32 {
        self.player_state()
            .and_then(|p| p.power_up)
            .map(|p| p.type_id)
            .unwrap_or(0)
    }

    /* -------------------- State machine -------------------- */

    /// Enters a transient state; death is never overridden.
    pub fn set_state(&mut self, state: EntityState) {
        if self.state != EntityState::Die {
            self.state = state;
            self.state_step = 0;
        }
    }

    pub fn check_death(&self) -> DeathPhase {
        if self.state != EntityState::Die {
            DeathPhase::Alive
        } else if self.state_step >= STATE_DURATION - 1 {
            DeathPhase::Died
        } else {
            DeathPhase::Dying
        }
    }

    /// Per-frame state bookkeeping: weapon cooldown, transient-state expiry,
    /// player invincibility, and velocity reset for input-driven entities.
    pub fn refresh_state(&mut self) {
        if let Some(weapon) = &mut self.weapon {
            weapon.cooldown = weapon.cooldown.saturating_sub(1);
        }
        match self.state {
            EntityState::Die => {
                self.state_step = self.state_step.saturating_add(1);
            }
            EntityState::Move | EntityState::Idle => {
                self.state_step = self.state_step.wrapping_add(1);
            }
            _ => {
                self.state_step += 1;
                if self.state_step >= STATE_DURATION {
                    self.state = EntityState::Move;
                    self.state_step = 0;
                }
            }
        }
        if let EntityKind::Player(p) = &mut self.kind {
            p.invincibility = p.invincibility.saturating_sub(1);
            // Inputs re-apply velocity every tick
            self.boxx.vx = 0.0;
            self.boxx.vy = 0.0;
        }
    }

    /// Applies damage, clamped so a single hit never crosses a whole-life
    /// boundary. Dead entities ignore further damage. Returns the damage
    /// actually applied.
    pub fn hurt(&mut self, damage: f64) -> f64 {
        let Some(combat) = &mut self.combat else {
            return 0.0;
        };
        if combat.hp <= 0.0 || self.state == EntityState::Die {
            return 0.0;
        }
        let floor = if combat.hp.fract() == 0.0 {
            combat.hp - 1.0
        } else {
            combat.hp.floor()
        };
        let applied = damage.min(combat.hp - floor);
        combat.hp -= applied;
        if combat.hp <= 0.0 {
            combat.hp = 0.0;
            self.state = EntityState::Die;
            self.state_step = 0;
        } else {
            self.set_state(EntityState::Hurt);
        }
        applied
    }

    /// Whether both entities are interactable and overlap this frame.
    pub fn is_touching(&self, other: &Entity) -> bool {
        self.state != EntityState::Die
            && other.state != EntityState::Die
            && self.boxx.overlaps(&other.boxx)
    }

    /// Puts a player back at its spawn point with temporary invincibility,
    /// dropping any held power-up.
    pub fn respawn(&mut self) {
        let (spawn_x, spawn_y) = match self.player_state_mut() {
            Some(p) => {
                p.invincibility = RESPAWN_DURATION;
                p.power_up = None;
                (p.spawn_x, p.spawn_y)
            }
            None => return,
        };
        self.boxx.x = spawn_x;
        self.boxx.y = spawn_y;
        self.boxx.vx = 0.0;
        self.boxx.vy = 0.0;
        if self.state != EntityState::Die {
            self.state = EntityState::Hurt;
            self.state_step = 0;
        }
    }

    /// Heals partial damage and re-places the player. Between levels; dead
    /// players stay dead.
    pub fn reset_state(&mut self) {
        if let Some(combat) = &mut self.combat {
            if combat.hp > 0.0 {
                combat.hp = combat.hp.ceil();
                self.state = EntityState::Move;
                self.state_step = 0;
                self.respawn();
            }
        }
    }

    /// Grants one full life, reviving a dead player.
    pub fn add_life(&mut self) {
        if let Some(combat) = &mut self.combat {
            combat.hp = combat.hp.floor() + 1.0;
            self.state = EntityState::Move;
            self.state_step = 0;
            self.respawn();
        }
    }

    pub fn pick(&mut self, power_up: HeldPowerUp) {
        if let Some(p) = self.player_state_mut() {
            p.power_up = Some(power_up);
        }
        self.set_state(EntityState::PickPowerUp);
    }

    /* -------------------- Weapon -------------------- */

    pub fn can_fire(&self) -> bool {
        self.state != EntityState::Die
            && self
                .weapon
                .map(|w| w.cooldown == 0)
                .unwrap_or(false)
    }

    /// Outgoing bullet damage, scaled by a held power-up and the hulk cheat.
    pub fn fire_damage(&self) -> f64 {
        let base = self.weapon.map(|w| w.fire_damage).unwrap_or(0.0);
        match self.player_state() {
            Some(p) => {
                let factor = p.power_up.map(|pu| pu.damage_factor).unwrap_or(1.0);
                let hulk = if p.hulk { 2.0 } else { 1.0 };
                base * factor * hulk
            }
            None => base,
        }
    }

    /// Frames until the weapon may fire again after a shot.
    pub fn fire_delay(&self) -> u32 {
        let base = self.weapon.map(|w| w.fire_delay).unwrap_or(0);
        let factor = self
            .player_state()
            .and_then(|p| p.power_up)
            .map(|pu| pu.fire_rate_factor)
            .unwrap_or(1.0);
        (base as f64 * factor) as u32
    }

    /// Marks a shot as taken and arms the cooldown.
    pub fn fired(&mut self) {
        let delay = self.fire_delay();
        if let Some(weapon) = &mut self.weapon {
            weapon.cooldown = delay;
        }
        self.set_state(EntityState::Shoot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{
        ENEMY_1_ID, OBSTACLE_ID, PLAYER_1_ID, POWERUP_DAMAGE_ID, POWERUP_FIRE_ID,
    };

    fn test_player(lives: u32) -> Entity {
        Entity::player(
            1,
            PLAYER_1_ID,
            0,
            PhysicsBox::new(2.0, 20.0, 4, 4, 0.0, 0.0),
            lives,
        )
    }

    #[test]
    fn test_hurt_clamps_at_life_boundary() {
        let mut player = test_player(3);
        player.hurt(0.6);
        assert_approx_eq!(player.hp(), 2.4);
        assert_eq!(player.state, EntityState::Hurt);

        // A 0.7 hit from 2.4 stops at the whole-life floor of 2.0
        player.hurt(0.7);
        assert_approx_eq!(player.hp(), 2.0);
    }

    #[test]
    fn test_hurt_whole_hp_loses_at_most_one_life() {
        let mut player = test_player(3);
        player.hurt(5.0);
        assert_approx_eq!(player.hp(), 2.0);
    }

    #[test]
    fn test_hurt_dead_entity_is_noop() {
        let mut enemy = Entity::enemy(
            2,
            ENEMY_1_ID,
            PhysicsBox::new(50.0, 20.0, 4, 4, 0.0, 0.0),
            0.5,
        );
        enemy.hurt(1.0);
        assert_eq!(enemy.state, EntityState::Die);
        assert_eq!(enemy.hurt(1.0), 0.0);
        assert_approx_eq!(enemy.hp(), 0.0);
    }

    #[test]
    fn test_two_phase_death() {
        let mut enemy = Entity::enemy(
            2,
            ENEMY_1_ID,
            PhysicsBox::new(50.0, 20.0, 4, 4, 0.0, 0.0),
            0.5,
        );
        enemy.hurt(1.0);
        assert_eq!(enemy.check_death(), DeathPhase::Dying);
        for _ in 0..STATE_DURATION - 1 {
            enemy.refresh_state();
        }
        assert_eq!(enemy.check_death(), DeathPhase::Died);
        // Death is never reverted to Move by the state machine
        assert_eq!(enemy.state, EntityState::Die);
    }

    #[test]
    fn test_transient_state_expires_to_move() {
        let mut player = test_player(3);
        player.set_state(EntityState::Shoot);
        for _ in 0..STATE_DURATION {
            player.refresh_state();
        }
        assert_eq!(player.state, EntityState::Move);
        assert_eq!(player.state_step, 0);
    }

    #[test]
    fn test_enemy1_waveform_is_a_24_frame_loop() {
        let mut movement = Movement::new(Waveform::Enemy1);
        assert_eq!(Waveform::Enemy1.steps().len(), 24);

        let mut net_y = 0.0;
        let first_cycle: Vec<(f64, f64)> = (0..24).map(|_| movement.advance()).collect();
        for (mx, my) in &first_cycle {
            assert_approx_eq!(*mx, -1.0); // always drifting left
            net_y += my;
        }
        // The zig-zag returns to its starting row
        assert_approx_eq!(net_y, 0.0);

        let second_cycle: Vec<(f64, f64)> = (0..24).map(|_| movement.advance()).collect();
        assert_eq!(first_cycle, second_cycle);
    }

    #[test]
    fn test_waveform_switch_restarts_pattern() {
        let mut movement = Movement::new(Waveform::BossIdle);
        movement.advance();
        movement.switch(Waveform::BossSweep);
        assert_eq!(movement.waveform, Waveform::BossSweep);
        assert_eq!(movement.advance(), BOSS_SWEEP_WAVE[0]);
        // Switching to the current pattern must not restart it
        movement.switch(Waveform::BossSweep);
        assert_eq!(movement.advance(), BOSS_SWEEP_WAVE[1]);
    }

    #[test]
    fn test_respawn_resets_and_protects() {
        let mut player = test_player(3);
        player.pick(HeldPowerUp {
            type_id: POWERUP_DAMAGE_ID,
            damage_factor: POWERUP_DAMAGE_FACTOR,
            fire_rate_factor: 1.0,
        });
        player.boxx.x = 40.0;
        player.boxx.y = 10.0;
        player.respawn();

        assert_approx_eq!(player.boxx.x, 2.0);
        assert_approx_eq!(player.boxx.y, 20.0);
        let p = player.player_state().unwrap();
        assert_eq!(p.invincibility, RESPAWN_DURATION);
        assert!(p.power_up.is_none());
        assert_eq!(player.state_for_frame(), EntityState::Respawn.as_u32());
    }

    #[test]
    fn test_fire_damage_scaling() {
        let mut player = test_player(3);
        assert_approx_eq!(player.fire_damage(), PLAYER_FIRE_DAMAGE);

        player.pick(HeldPowerUp {
            type_id: POWERUP_DAMAGE_ID,
            damage_factor: POWERUP_DAMAGE_FACTOR,
            fire_rate_factor: 1.0,
        });
        assert_approx_eq!(player.fire_damage(), PLAYER_FIRE_DAMAGE * 2.0);

        player.player_state_mut().unwrap().hulk = true;
        assert_approx_eq!(player.fire_damage(), PLAYER_FIRE_DAMAGE * 4.0);
    }

    #[test]
    fn test_fire_delay_scaling() {
        let mut player = test_player(3);
        assert_eq!(player.fire_delay(), PLAYER_FIRE_DELAY);
        player.pick(HeldPowerUp {
            type_id: POWERUP_FIRE_ID,
            damage_factor: 1.0,
            fire_rate_factor: POWERUP_FIRE_FACTOR,
        });
        assert_eq!(
            player.fire_delay(),
            (PLAYER_FIRE_DELAY as f64 * POWERUP_FIRE_FACTOR) as u32
        );
    }

    #[test]
    fn test_fired_arms_cooldown() {
        let mut player = test_player(3);
        assert!(player.can_fire());
        player.fired();
        assert!(!player.can_fire());
        assert_eq!(player.state, EntityState::Shoot);
        for _ in 0..PLAYER_FIRE_DELAY {
            player.refresh_state();
        }
        assert!(player.can_fire());
    }

    #[test]
    fn test_add_life_revives() {
        let mut player = test_player(1);
        player.hurt(1.0);
        assert_eq!(player.state, EntityState::Die);
        player.add_life();
        assert_approx_eq!(player.hp(), 1.0);
        assert_eq!(player.state, EntityState::Move);
    }

    #[test]
    fn test_obstacle_soaks_damage() {
        let mut obstacle = Entity::obstacle(
            3,
            OBSTACLE_ID,
            PhysicsBox::new(60.0, 20.0, 5, 5, 0.0, 0.0),
        );
        for _ in 0..100 {
            obstacle.hurt(1.0);
        }
        assert!(obstacle.hp() > 0.0);
        assert!(obstacle.boxx.vx < 0.0);
    }
}
