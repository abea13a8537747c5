//! Level-editing session state.
//!
//! A sandbox is the in-memory working copy of one level's scripted-entity
//! table while its creator edits it. Mutations are mirrored to the store by
//! the request handlers; the sandbox itself performs no I/O.

use shared::EntityInfo;
use std::collections::BTreeMap;

pub struct Sandbox {
    level_id: i32,
    /// Scripted spawns keyed by elapsed-second bucket.
    entities: BTreeMap<u32, Vec<EntityInfo>>,
    stopped: bool,
}

impl Sandbox {
    pub fn new(level_id: i32, entities: BTreeMap<u32, Vec<EntityInfo>>) -> Self {
        Self {
            level_id,
            entities,
            stopped: false,
        }
    }

    pub fn level_id(&self) -> i32 {
        self.level_id
    }

    pub fn add_entity(&mut self, progress: u32, info: EntityInfo) {
        self.entities.entry(progress).or_default().push(info);
    }

    /// Removes the first structurally equal entity in the bucket, pruning
    /// the bucket when it empties. Returns whether anything was removed.
    pub fn del_entity(&mut self, progress: u32, info: &EntityInfo) -> bool {
        let Some(bucket) = self.entities.get_mut(&progress) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|e| e == info) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.entities.remove(&progress);
        }
        true
    }

    pub fn entities_at(&self, progress: u32) -> &[EntityInfo] {
        self.entities
            .get(&progress)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PhysicsBox, ENEMY_1_ID, ENEMY_2_ID};

    fn info(type_id: u32, x: f64, y: f64) -> EntityInfo {
        EntityInfo::new(type_id, PhysicsBox::new(x, y, 4, 4, 0.0, 0.0))
    }

    #[test]
    fn test_add_and_list() {
        let mut sandbox = Sandbox::new(7, BTreeMap::new());
        sandbox.add_entity(3, info(ENEMY_1_ID, 10.0, 10.0));
        sandbox.add_entity(3, info(ENEMY_2_ID, 20.0, 10.0));
        assert_eq!(sandbox.entities_at(3).len(), 2);
        assert!(sandbox.entities_at(4).is_empty());
    }

    #[test]
    fn test_del_entity_matches_structurally() {
        let mut sandbox = Sandbox::new(7, BTreeMap::new());
        sandbox.add_entity(3, info(ENEMY_1_ID, 10.0, 10.0));

        // Size and velocity differences do not matter, position does
        let same_place = EntityInfo::new(
            ENEMY_1_ID,
            PhysicsBox::new(10.0, 10.0, 8, 8, 1.0, 1.0),
        );
        assert!(!sandbox.del_entity(3, &info(ENEMY_1_ID, 11.0, 10.0)));
        assert!(!sandbox.del_entity(3, &info(ENEMY_2_ID, 10.0, 10.0)));
        assert!(sandbox.del_entity(3, &same_place));
        // The emptied bucket is gone, so a second delete finds nothing
        assert!(!sandbox.del_entity(3, &same_place));
    }

    #[test]
    fn test_del_entity_removes_one_of_duplicates() {
        let mut sandbox = Sandbox::new(7, BTreeMap::new());
        sandbox.add_entity(3, info(ENEMY_1_ID, 10.0, 10.0));
        sandbox.add_entity(3, info(ENEMY_1_ID, 10.0, 10.0));
        assert!(sandbox.del_entity(3, &info(ENEMY_1_ID, 10.0, 10.0)));
        assert_eq!(sandbox.entities_at(3).len(), 1);
    }

    #[test]
    fn test_stop_flag() {
        let mut sandbox = Sandbox::new(7, BTreeMap::new());
        assert!(!sandbox.stopped());
        sandbox.stop();
        assert!(sandbox.stopped());
    }
}
