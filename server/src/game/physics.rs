//! The physics engine: movement, attacks, and collision resolution.
//!
//! Every mutation funnels through one tick pipeline. Entities flagged for
//! removal during collision resolution are collected and swept once the
//! whole pass is over, so group iteration never invalidates itself.

use log::debug;
use rand::Rng;
use shared::{
    EntityInfo, PhysicsBox, BULLET_ID, BULLET_VELOCITY, ENEMY_MAX_FIRE_DAMAGE, ENEMY_VELOCITY_X,
    ENEMY_VELOCITY_Y, HENCHMAN_1_ID, HENCHMAN_HEIGHT, HENCHMAN_WIDTH, MAP_HEIGHT, MAP_WIDTH,
    MAX_PLAYERS, PLAYER_1_ID, PLAYER_2_ID, PLAYER_VELOCITY_X, PLAYER_VELOCITY_Y,
    POWERUP_DAMAGE_ID, POWERUP_FIRE_ID, SCORE_KILL_ENEMY, SCORE_TOUCH_ENEMY, TYPE_BOSS,
    TYPE_BULLET, TYPE_ENEMY, TYPE_HENCHMAN, TYPE_OBSTACLE, TYPE_POWERUP,
};

use crate::game::entity::{
    DeathPhase, Entity, EntityKind, EntityState, HeldPowerUp, Waveform,
};
use crate::game::map::{
    is_off_map, Map, COLLISION_PAIRS, GROUP_BULLET, GROUP_ENEMY, GROUP_OBSTACLE, GROUP_PLAYER,
    GROUP_POWERUP,
};

/// Per-pass context shared by every touch resolution.
struct TouchContext {
    friendly_fire: bool,
    /// Hostile entities alive when the pass started; gates boss vulnerability.
    enemy_count: usize,
    scores: [u32; MAX_PLAYERS],
    /// Power-ups consumed this pass, swept afterwards.
    picked: Vec<u64>,
}

pub struct PhysicsEngine {
    map: Map,
    players: [Option<u64>; MAX_PLAYERS],
    friendly_fire: bool,
    initial_lives: u32,
    difficulty: f64,
    bonus_probability: f64,
    next_uid: u64,
}

impl PhysicsEngine {
    pub fn new(
        initial_lives: u32,
        difficulty: f64,
        bonus_probability: f64,
        friendly_fire: bool,
    ) -> Self {
        Self {
            map: Map::new(),
            players: [None; MAX_PLAYERS],
            friendly_fire,
            initial_lives,
            difficulty: difficulty.clamp(0.0, 1.0),
            bonus_probability: bonus_probability.clamp(0.0, 1.0),
            next_uid: 1,
        }
    }

    fn alloc_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    fn enemy_fire_damage(&self) -> f64 {
        ENEMY_MAX_FIRE_DAMAGE * self.difficulty
    }

    /* -------------------- Spawning -------------------- */

    /// Adds one player at its fixed spawn column.
    pub fn new_player(&mut self, slot: usize) {
        let uid = self.alloc_uid();
        let type_id = if slot == 0 { PLAYER_1_ID } else { PLAYER_2_ID };
        let spawn_y = MAP_HEIGHT as f64 * (slot as f64 + 1.0) / 3.0;
        let boxx = PhysicsBox::new(2.0, spawn_y, 4, 4, 0.0, 0.0);
        self.map
            .add(Entity::player(uid, type_id, slot, boxx, self.initial_lives));
        self.players[slot] = Some(uid);
    }

    /// Materializes one scripted spawn descriptor. Bosses bring their
    /// henchman escort along.
    pub fn new_entity(&mut self, info: &EntityInfo) {
        let fire_damage = self.enemy_fire_damage();
        match info.main_type() {
            TYPE_ENEMY => {
                let uid = self.alloc_uid();
                self.map
                    .add(Entity::enemy(uid, info.type_id, info.physics_box, fire_damage));
            }
            TYPE_BOSS => {
                let uid = self.alloc_uid();
                let boss_box = info.physics_box;
                self.map
                    .add(Entity::boss(uid, info.type_id, boss_box, fire_damage));
                for offset in [-1.0, 1.0] {
                    let henchman_uid = self.alloc_uid();
                    let y = boss_box.y + offset * (boss_box.h as f64 + 2.0);
                    let boxx = PhysicsBox::new(
                        boss_box.x - 2.0,
                        y,
                        HENCHMAN_WIDTH,
                        HENCHMAN_HEIGHT,
                        0.0,
                        0.0,
                    );
                    self.map.add(Entity::henchman(
                        henchman_uid,
                        HENCHMAN_1_ID,
                        boxx,
                        fire_damage,
                        uid,
                    ));
                }
                debug!("Boss {} spawned with escort", uid);
            }
            TYPE_HENCHMAN => {
                let uid = self.alloc_uid();
                self.map.add(Entity::henchman(
                    uid,
                    info.type_id,
                    info.physics_box,
                    fire_damage,
                    0,
                ));
            }
            TYPE_OBSTACLE => {
                let uid = self.alloc_uid();
                self.map
                    .add(Entity::obstacle(uid, info.type_id, info.physics_box));
            }
            TYPE_POWERUP => {
                let uid = self.alloc_uid();
                self.map.add(Entity::power_up(
                    uid,
                    info.type_id,
                    info.physics_box.x,
                    info.physics_box.y,
                ));
            }
            TYPE_BULLET => {
                let uid = self.alloc_uid();
                self.map.add(Entity::bullet(
                    uid,
                    info.type_id,
                    info.physics_box.x,
                    info.physics_box.y,
                    -BULLET_VELOCITY,
                    fire_damage,
                    None,
                ));
            }
            other => debug!("Ignoring scripted spawn with category {}", other),
        }
    }

    /* -------------------- Tick phases -------------------- */

    /// Advances waveforms and integrates positions. Players are clamped to
    /// the play field; everything else may drift off and be cleaned later.
    pub fn make_moves(&mut self) {
        let one_enemy_left = self.enemy_count() == 1;
        for entity in self.map.iter_mut() {
            if let Some(movement) = &mut entity.movement {
                if matches!(entity.kind, EntityKind::Boss { .. }) && one_enemy_left {
                    movement.switch(Waveform::BossSweep);
                }
                let (mx, my) = movement.advance();
                entity.boxx.vx = mx * ENEMY_VELOCITY_X;
                entity.boxx.vy = my * ENEMY_VELOCITY_Y;
            }
            entity.boxx.x += entity.boxx.vx;
            entity.boxx.y += entity.boxx.vy;
            if entity.is_player() {
                entity.boxx.x = entity
                    .boxx
                    .x
                    .clamp(0.0, (MAP_WIDTH - entity.boxx.w) as f64);
                entity.boxx.y = entity
                    .boxx
                    .y
                    .clamp(0.0, (MAP_HEIGHT - entity.boxx.h) as f64);
            }
        }
    }

    /// Removes non-player entities that left the play field entirely.
    pub fn clean_off_screen(&mut self) {
        let gone: Vec<u64> = self
            .map
            .iter()
            .filter(|e| !e.is_player() && is_off_map(e))
            .map(|e| e.uid)
            .collect();
        self.map.remove_uids(&gone);
    }

    /// Hostile fire. Player shots are input-driven and go through
    /// [`PhysicsEngine::player_shoot`] instead.
    pub fn make_attacks(&mut self) {
        struct Shot {
            x: f64,
            y: f64,
            vx: f64,
            damage: f64,
        }
        let mut shots = Vec::new();
        for entity in self.map.group_mut(GROUP_ENEMY).iter_mut() {
            if !entity.can_fire() {
                continue;
            }
            let damage = entity.fire_damage();
            let b = entity.boxx;
            match entity.kind {
                EntityKind::Boss { gatling } => {
                    // Double barrel, one shot per mouth
                    for dy in [0.25, 0.75] {
                        shots.push(Shot {
                            x: b.x - 1.0,
                            y: b.y + b.h as f64 * dy,
                            vx: -BULLET_VELOCITY,
                            damage,
                        });
                    }
                    entity.fired();
                    if gatling {
                        if let Some(weapon) = &mut entity.weapon {
                            weapon.cooldown /= 4;
                        }
                    }
                }
                EntityKind::Henchman { .. } => {
                    shots.push(Shot {
                        x: b.x - 1.0,
                        y: b.y + b.h as f64 / 2.0,
                        vx: -BULLET_VELOCITY * 0.5,
                        damage,
                    });
                    entity.fired();
                }
                _ => {
                    shots.push(Shot {
                        x: b.x - 1.0,
                        y: b.y + b.h as f64 / 2.0,
                        vx: -BULLET_VELOCITY,
                        damage,
                    });
                    entity.fired();
                }
            }
        }
        for shot in shots {
            let uid = self.alloc_uid();
            self.map.add(Entity::bullet(
                uid, BULLET_ID, shot.x, shot.y, shot.vx, shot.damage, None,
            ));
        }
    }

    /// Runs every collision pair, then sweeps the dead and the consumed.
    pub fn check_collisions(&mut self) {
        let mut ctx = TouchContext {
            friendly_fire: self.friendly_fire,
            enemy_count: self.enemy_count(),
            scores: [0; MAX_PLAYERS],
            picked: Vec::new(),
        };

        for (ga, gb) in COLLISION_PAIRS {
            if ga == gb {
                let group = self.map.group_mut(ga);
                for i in 0..group.len() {
                    let (left, right) = group.split_at_mut(i + 1);
                    let ea = &mut left[i];
                    for eb in right.iter_mut() {
                        if ea.is_touching(eb) {
                            resolve_touch(ga, gb, ea, eb, &mut ctx);
                        }
                    }
                }
            } else {
                let (group_a, group_b) = self.map.pair_mut(ga, gb);
                for ea in group_a.iter_mut() {
                    for eb in group_b.iter_mut() {
                        if ea.is_touching(eb) {
                            resolve_touch(ga, gb, ea, eb, &mut ctx);
                        }
                    }
                }
            }
        }

        self.sweep_deaths(&mut ctx);

        for (slot, score) in ctx.scores.iter().enumerate() {
            if *score > 0 {
                if let Some(player) = self.player_mut(slot) {
                    if let Some(p) = player.player_state_mut() {
                        p.score += score;
                    }
                }
            }
        }
    }

    /// Removes consumed power-ups and entities whose death animation ended,
    /// rolling power-up drops at hostile corpses. A dying boss takes its
    /// escort with it.
    fn sweep_deaths(&mut self, ctx: &mut TouchContext) {
        let mut dead_bosses = Vec::new();
        let mut drops = Vec::new();
        let mut remove = std::mem::take(&mut ctx.picked);

        for entity in self.map.iter() {
            if entity.is_player() || entity.check_death() != DeathPhase::Died {
                continue;
            }
            remove.push(entity.uid);
            match entity.kind {
                EntityKind::Enemy | EntityKind::Henchman { .. } | EntityKind::Boss { .. } => {
                    if rand::thread_rng().gen_bool(self.bonus_probability) {
                        drops.push((entity.boxx.x, entity.boxx.y));
                    }
                }
                _ => {}
            }
            if matches!(entity.kind, EntityKind::Boss { .. }) {
                dead_bosses.push(entity.uid);
            }
        }

        if !dead_bosses.is_empty() {
            for entity in self.map.group_mut(GROUP_ENEMY).iter_mut() {
                if let EntityKind::Henchman { creator } = entity.kind {
                    if dead_bosses.contains(&creator) {
                        if let Some(combat) = &mut entity.combat {
                            combat.hp = 0.0;
                        }
                        entity.set_state(EntityState::Die);
                    }
                }
            }
        }

        self.map.remove_uids(&remove);

        for (x, y) in drops {
            let type_id = if rand::thread_rng().gen_bool(0.5) {
                POWERUP_DAMAGE_ID
            } else {
                POWERUP_FIRE_ID
            };
            let uid = self.alloc_uid();
            self.map.add(Entity::power_up(uid, type_id, x, y));
        }
    }

    pub fn refresh_states(&mut self) {
        for entity in self.map.iter_mut() {
            entity.refresh_state();
        }
    }

    /// Heals partial damage and re-places surviving players. Level
    /// transitions.
    pub fn reset_states(&mut self) {
        for entity in self.map.group_mut(GROUP_PLAYER).iter_mut() {
            entity.reset_state();
        }
    }

    pub fn clear_map(&mut self) {
        self.map.clear_except_players();
    }

    /* -------------------- Inputs -------------------- */

    fn player_mut(&mut self, slot: usize) -> Option<&mut Entity> {
        let uid = self.players.get(slot).copied().flatten()?;
        self.map.find_uid_mut(uid)
    }

    fn player(&self, slot: usize) -> Option<&Entity> {
        let uid = self.players.get(slot).copied().flatten()?;
        self.map.find_uid(uid)
    }

    pub fn set_player_velocity_x(&mut self, slot: usize, direction: f64) {
        if let Some(player) = self.player_mut(slot) {
            if player.state != EntityState::Die {
                player.boxx.vx = direction.signum() * PLAYER_VELOCITY_X;
            }
        }
    }

    pub fn set_player_velocity_y(&mut self, slot: usize, direction: f64) {
        if let Some(player) = self.player_mut(slot) {
            if player.state != EntityState::Die {
                player.boxx.vy = direction.signum() * PLAYER_VELOCITY_Y;
            }
        }
    }

    /// Fires one player bullet if the cooldown allows it.
    pub fn player_shoot(&mut self, slot: usize) {
        let shot = match self.player_mut(slot) {
            Some(player) if player.can_fire() && player.hp() > 0.0 => {
                let b = player.boxx;
                let damage = player.fire_damage();
                player.fired();
                Some((b.x + b.w as f64 + 1.0, b.y + b.h as f64 / 2.0, damage))
            }
            _ => None,
        };
        if let Some((x, y, damage)) = shot {
            let uid = self.alloc_uid();
            self.map.add(Entity::bullet(
                uid,
                BULLET_ID,
                x,
                y,
                BULLET_VELOCITY,
                damage,
                Some(slot),
            ));
        }
    }

    /* -------------------- Cheats -------------------- */

    pub fn players_new_life(&mut self) {
        for entity in self.map.group_mut(GROUP_PLAYER).iter_mut() {
            entity.add_life();
        }
    }

    pub fn players_toggle_ghost(&mut self) {
        for entity in self.map.group_mut(GROUP_PLAYER).iter_mut() {
            if let Some(p) = entity.player_state_mut() {
                p.ghost = !p.ghost;
            }
        }
    }

    pub fn players_toggle_hulk(&mut self) {
        for entity in self.map.group_mut(GROUP_PLAYER).iter_mut() {
            if let Some(p) = entity.player_state_mut() {
                p.hulk = !p.hulk;
            }
        }
    }

    /* -------------------- Queries -------------------- */

    /// Hostile entities still on the map.
    pub fn enemy_count(&self) -> usize {
        self.map.group(GROUP_ENEMY).len()
    }

    pub fn entity_count(&self) -> usize {
        self.map.nb_entities()
    }

    pub fn player_hp(&self, slot: usize) -> f64 {
        self.player(slot).map(|p| p.hp()).unwrap_or(0.0)
    }

    pub fn player_score(&self, slot: usize) -> u32 {
        self.player(slot)
            .and_then(|p| p.player_state())
            .map(|p| p.score)
            .unwrap_or(0)
    }

    /// Every player present has run out of lives.
    pub fn all_players_dead(&self) -> bool {
        let players = self.map.group(GROUP_PLAYER);
        !players.is_empty() && players.iter().all(|p| p.hp() <= 0.0)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.map.iter()
    }

    #[cfg(test)]
    pub(crate) fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }
}

/* -------------------- Touch resolution -------------------- */

/// Damages an entity, routing players through their protection gates and
/// whole-life respawn.
fn apply_damage(target: &mut Entity, damage: f64, enemy_count: usize) {
    match &mut target.kind {
        EntityKind::Player(p) => {
            if p.ghost || p.invincibility > 0 {
                return;
            }
            let before = target.hp();
            target.hurt(damage);
            let after = target.hp();
            // Losing a whole life sends the player back to spawn
            if after > 0.0 && after < before && after.fract() == 0.0 {
                target.respawn();
            }
        }
        EntityKind::Boss { gatling } => {
            // Invulnerable behind its escort; first wound flips it to rage
            if enemy_count == 1 {
                *gatling = true;
                target.hurt(damage);
            }
        }
        _ => {
            target.hurt(damage);
        }
    }
}

/// Reaction of one overlapping pair, dispatched on the driving group.
fn resolve_touch(ga: usize, gb: usize, ea: &mut Entity, eb: &mut Entity, ctx: &mut TouchContext) {
    match (ga, gb) {
        (GROUP_PLAYER, GROUP_PLAYER) => {
            if ctx.friendly_fire {
                let da = ea.combat.map(|c| c.touch_damage).unwrap_or(0.0);
                let db = eb.combat.map(|c| c.touch_damage).unwrap_or(0.0);
                apply_damage(ea, db, ctx.enemy_count);
                apply_damage(eb, da, ctx.enemy_count);
            }
        }
        (GROUP_PLAYER, GROUP_ENEMY) => {
            let enemy_damage = eb.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            let player_damage = ea.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            apply_damage(ea, enemy_damage, ctx.enemy_count);
            apply_damage(eb, player_damage, ctx.enemy_count);
            if let Some(p) = ea.player_state() {
                ctx.scores[p.slot] += SCORE_TOUCH_ENEMY;
            }
        }
        (GROUP_PLAYER, GROUP_BULLET) => {
            let shooter = match eb.kind {
                EntityKind::Bullet { shooter } => shooter,
                _ => return,
            };
            let own = ea.player_state().map(|p| Some(p.slot) == shooter).unwrap_or(false);
            if own || (shooter.is_some() && !ctx.friendly_fire) {
                return;
            }
            let damage = eb.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            apply_damage(ea, damage, ctx.enemy_count);
            eb.hurt(f64::MAX);
        }
        (GROUP_PLAYER, GROUP_OBSTACLE) => {
            let obstacle_damage = eb.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            let player_damage = ea.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            apply_damage(ea, obstacle_damage, ctx.enemy_count);
            eb.hurt(player_damage);
        }
        (GROUP_PLAYER, GROUP_POWERUP) => {
            if let EntityKind::PowerUp {
                damage_factor,
                fire_rate_factor,
            } = eb.kind
            {
                ea.pick(HeldPowerUp {
                    type_id: eb.type_id,
                    damage_factor,
                    fire_rate_factor,
                });
                ctx.picked.push(eb.uid);
            }
        }
        (GROUP_ENEMY, GROUP_BULLET) => {
            let shooter = match eb.kind {
                EntityKind::Bullet { shooter } => shooter,
                _ => return,
            };
            // Hostile bullets fly through their own side
            let Some(slot) = shooter else { return };
            let damage = eb.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            apply_damage(ea, damage, ctx.enemy_count);
            if ea.state == EntityState::Die {
                ctx.scores[slot] += SCORE_KILL_ENEMY;
            }
            eb.hurt(f64::MAX);
        }
        (GROUP_BULLET, GROUP_BULLET) => {
            let (sa, sb) = match (&ea.kind, &eb.kind) {
                (EntityKind::Bullet { shooter: sa }, EntityKind::Bullet { shooter: sb }) => {
                    (*sa, *sb)
                }
                _ => return,
            };
            // Opposing bullets cancel each other out
            if sa.is_some() != sb.is_some() {
                ea.hurt(f64::MAX);
                eb.hurt(f64::MAX);
            }
        }
        (GROUP_BULLET, GROUP_OBSTACLE) => {
            let damage = ea.combat.map(|c| c.touch_damage).unwrap_or(0.0);
            eb.hurt(damage);
            ea.hurt(f64::MAX);
        }
        _ => {}
    }
}
