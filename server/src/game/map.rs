//! The map: five entity groups and the collision pairs checked between them.

use shared::{MAP_HEIGHT, MAP_WIDTH};

use crate::game::entity::Entity;
use crate::game::entity::EntityKind;

pub const GROUP_PLAYER: usize = 0;
pub const GROUP_ENEMY: usize = 1;
pub const GROUP_BULLET: usize = 2;
pub const GROUP_OBSTACLE: usize = 3;
pub const GROUP_POWERUP: usize = 4;
pub const NB_GROUPS: usize = 5;

/// Ordered group pairs whose members are tested against each other every
/// tick. The first group of a pair drives the reaction.
pub const COLLISION_PAIRS: [(usize, usize); 8] = [
    (GROUP_PLAYER, GROUP_PLAYER),
    (GROUP_PLAYER, GROUP_ENEMY),
    (GROUP_PLAYER, GROUP_BULLET),
    (GROUP_PLAYER, GROUP_OBSTACLE),
    (GROUP_PLAYER, GROUP_POWERUP),
    (GROUP_ENEMY, GROUP_BULLET),
    (GROUP_BULLET, GROUP_BULLET),
    (GROUP_BULLET, GROUP_OBSTACLE),
];

pub fn group_of(kind: &EntityKind) -> usize {
    match kind {
        EntityKind::Player(_) => GROUP_PLAYER,
        EntityKind::Enemy | EntityKind::Boss { .. } | EntityKind::Henchman { .. } => GROUP_ENEMY,
        EntityKind::Bullet { .. } => GROUP_BULLET,
        EntityKind::Obstacle => GROUP_OBSTACLE,
        EntityKind::PowerUp { .. } => GROUP_POWERUP,
    }
}

/// Whether no part of the box remains inside the play field.
pub fn is_off_map(entity: &Entity) -> bool {
    let b = &entity.boxx;
    !(b.x + b.w as f64 > 0.0
        && b.x < MAP_WIDTH as f64
        && b.y + b.h as f64 > 0.0
        && b.y < MAP_HEIGHT as f64)
}

#[derive(Default)]
pub struct Map {
    groups: [Vec<Entity>; NB_GROUPS],
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) {
        self.groups[group_of(&entity.kind)].push(entity);
    }

    pub fn group(&self, index: usize) -> &[Entity] {
        &self.groups[index]
    }

    pub fn group_mut(&mut self, index: usize) -> &mut Vec<Entity> {
        &mut self.groups[index]
    }

    /// Mutable access to two distinct groups at once, for pairwise collision
    /// resolution.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Vec<Entity>, &mut Vec<Entity>) {
        assert_ne!(a, b);
        if a < b {
            let (left, right) = self.groups.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.groups.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.groups.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.groups.iter_mut().flatten()
    }

    pub fn nb_entities(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn find_uid(&self, uid: u64) -> Option<&Entity> {
        self.iter().find(|e| e.uid == uid)
    }

    pub fn find_uid_mut(&mut self, uid: u64) -> Option<&mut Entity> {
        self.iter_mut().find(|e| e.uid == uid)
    }

    /// Drops the listed entities wherever they live.
    pub fn remove_uids(&mut self, uids: &[u64]) {
        if uids.is_empty() {
            return;
        }
        for group in &mut self.groups {
            group.retain(|e| !uids.contains(&e.uid));
        }
    }

    /// Empties every group except the players'. Level transitions.
    pub fn clear_except_players(&mut self) {
        for (index, group) in self.groups.iter_mut().enumerate() {
            if index != GROUP_PLAYER {
                group.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PhysicsBox, BULLET_ID, ENEMY_1_ID, OBSTACLE_ID, PLAYER_1_ID};

    fn enemy_at(uid: u64, x: f64, y: f64) -> Entity {
        Entity::enemy(uid, ENEMY_1_ID, PhysicsBox::new(x, y, 4, 4, 0.0, 0.0), 0.5)
    }

    #[test]
    fn test_entities_land_in_their_group() {
        let mut map = Map::new();
        map.add(Entity::player(
            1,
            PLAYER_1_ID,
            0,
            PhysicsBox::new(2.0, 20.0, 4, 4, 0.0, 0.0),
            5,
        ));
        map.add(enemy_at(2, 50.0, 20.0));
        map.add(Entity::bullet(3, BULLET_ID, 10.0, 20.0, 1.0, 0.7, Some(0)));
        map.add(Entity::obstacle(
            4,
            OBSTACLE_ID,
            PhysicsBox::new(60.0, 20.0, 5, 5, 0.0, 0.0),
        ));

        assert_eq!(map.group(GROUP_PLAYER).len(), 1);
        assert_eq!(map.group(GROUP_ENEMY).len(), 1);
        assert_eq!(map.group(GROUP_BULLET).len(), 1);
        assert_eq!(map.group(GROUP_OBSTACLE).len(), 1);
        assert_eq!(map.nb_entities(), 4);
    }

    #[test]
    fn test_pair_mut_both_orders() {
        let mut map = Map::new();
        map.add(enemy_at(1, 50.0, 20.0));
        map.add(Entity::bullet(2, BULLET_ID, 10.0, 20.0, 1.0, 0.7, Some(0)));

        let (enemies, bullets) = map.pair_mut(GROUP_ENEMY, GROUP_BULLET);
        assert_eq!(enemies.len(), 1);
        assert_eq!(bullets.len(), 1);

        let (bullets, enemies) = map.pair_mut(GROUP_BULLET, GROUP_ENEMY);
        assert_eq!(bullets.len(), 1);
        assert_eq!(enemies.len(), 1);
    }

    #[test]
    fn test_off_map_detection() {
        // Straddling the left edge still counts as on-map
        let partial = enemy_at(1, -2.0, 20.0);
        assert!(!is_off_map(&partial));

        let gone_left = enemy_at(2, -4.0, 20.0);
        assert!(is_off_map(&gone_left));

        let gone_right = enemy_at(3, MAP_WIDTH as f64, 20.0);
        assert!(is_off_map(&gone_right));

        let gone_up = enemy_at(4, 50.0, -4.0);
        assert!(is_off_map(&gone_up));

        let gone_down = enemy_at(5, 50.0, MAP_HEIGHT as f64);
        assert!(is_off_map(&gone_down));
    }

    #[test]
    fn test_remove_uids_and_clear() {
        let mut map = Map::new();
        map.add(Entity::player(
            1,
            PLAYER_1_ID,
            0,
            PhysicsBox::new(2.0, 20.0, 4, 4, 0.0, 0.0),
            5,
        ));
        map.add(enemy_at(2, 50.0, 20.0));
        map.add(enemy_at(3, 60.0, 20.0));

        map.remove_uids(&[3]);
        assert_eq!(map.group(GROUP_ENEMY).len(), 1);
        assert!(map.find_uid(3).is_none());
        assert!(map.find_uid(2).is_some());

        map.clear_except_players();
        assert_eq!(map.group(GROUP_ENEMY).len(), 0);
        assert_eq!(map.group(GROUP_PLAYER).len(), 1);
    }
}
