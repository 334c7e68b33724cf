use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{EntryError, Result};
use crate::metadata::MetadataRegistry;
use crate::model::ObjectRef;
use crate::tracker::{EntityKey, EntityState, SharedStateEntry, StateEntry};

#[derive(Default)]
struct Entries {
    next: u64,
    by_object: HashMap<usize, u64>,
    ordered: BTreeMap<u64, SharedStateEntry>,
}

fn object_id(object: &ObjectRef) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Tracking records of one context, keyed by object identity and kept in
/// the order entities started being tracked.
pub struct StateManager {
    registry: Arc<MetadataRegistry>,
    entries: RwLock<Entries>,
}

impl StateManager {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn get_state_entry(&self, object: &ObjectRef) -> Option<SharedStateEntry> {
        let entries = self.entries.read();
        entries
            .by_object
            .get(&object_id(object))
            .and_then(|id| entries.ordered.get(id))
            .cloned()
    }

    pub fn entries(&self) -> Vec<SharedStateEntry> {
        self.entries.read().ordered.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start tracking `object` as Added. An already tracked object is moved
    /// to Added.
    pub fn add(&self, object: &ObjectRef) -> Result<SharedStateEntry> {
        self.check_entity(object)?;
        if let Some(existing) = self.get_state_entry(object) {
            existing.write().mark_added();
            return Ok(existing);
        }
        let entry = StateEntry::new(Arc::clone(&self.registry), Arc::clone(object), EntityState::Added)?;
        info!("Tracking new {} as Added", entry.class());
        Ok(self.insert(object, entry))
    }

    /// Start tracking `object` as Unchanged. Fails when another tracked
    /// entity of the same entity set has the same key.
    pub fn attach(&self, object: &ObjectRef) -> Result<SharedStateEntry> {
        self.check_entity(object)?;
        if let Some(existing) = self.get_state_entry(object) {
            return Ok(existing);
        }
        let entry = StateEntry::new(Arc::clone(&self.registry), Arc::clone(object), EntityState::Unchanged)?;
        let entity_set = self.registry.entity_set(entry.class())?;
        if !entry.key().is_temporary() && self.find_by_key(&entity_set, entry.key()).is_some() {
            return Err(EntryError::KeyConflict {
                class: entry.class().to_string(),
                key: entry.key().to_string(),
            });
        }
        info!("Attached {} {} as Unchanged", entry.class(), entry.key());
        Ok(self.insert(object, entry))
    }

    /// Move a tracked entry to `target`. Detaching, or deleting an Added
    /// entity, stops tracking it.
    pub fn change_state(&self, entry: &SharedStateEntry, target: EntityState) -> Result<()> {
        let current = entry.read().state();
        if current == target {
            return Ok(());
        }
        match target {
            EntityState::Detached => self.remove(entry),
            EntityState::Deleted if current == EntityState::Added => self.remove(entry),
            EntityState::Deleted => entry.write().set_state(EntityState::Deleted),
            EntityState::Unchanged => entry.write().accept_changes()?,
            EntityState::Modified => {
                let mut guard = entry.write();
                if current == EntityState::Added {
                    guard.accept_changes()?;
                }
                guard.set_all_modified();
            }
            EntityState::Added => entry.write().mark_added(),
        }
        debug!("State change {current} -> {target}");
        Ok(())
    }

    /// Run change detection over every tracked entity. Returns how many
    /// properties were newly marked modified.
    pub fn detect_changes(&self) -> usize {
        self.entries()
            .iter()
            .map(|entry| entry.write().detect_changes().len())
            .sum()
    }

    /// Accept every pending change: Deleted entities stop being tracked,
    /// Added and Modified ones become Unchanged.
    pub fn accept_all_changes(&self) -> Result<()> {
        for entry in self.entries() {
            let state = entry.read().state();
            match state {
                EntityState::Deleted => self.remove(&entry),
                EntityState::Added | EntityState::Modified => entry.write().accept_changes()?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn find_by_key(&self, entity_set: &str, key: &EntityKey) -> Option<SharedStateEntry> {
        self.entries().into_iter().find(|entry| {
            let guard = entry.read();
            guard.key() == key
                && self
                    .registry
                    .entity_set(guard.class())
                    .is_ok_and(|set| set == entity_set)
        })
    }

    fn check_entity(&self, object: &ObjectRef) -> Result<()> {
        let class = object.read().class.clone();
        if self.registry.is_entity(&class) {
            Ok(())
        } else {
            Err(EntryError::NotAnEntityType { class })
        }
    }

    fn insert(&self, object: &ObjectRef, entry: StateEntry) -> SharedStateEntry {
        let shared = Arc::new(RwLock::new(entry));
        let mut entries = self.entries.write();
        let id = entries.next;
        entries.next += 1;
        entries.by_object.insert(object_id(object), id);
        entries.ordered.insert(id, Arc::clone(&shared));
        shared
    }

    fn remove(&self, entry: &SharedStateEntry) {
        let object = Arc::clone(entry.read().entity());
        {
            let mut entries = self.entries.write();
            if let Some(id) = entries.by_object.remove(&object_id(&object)) {
                entries.ordered.remove(&id);
            }
        }
        let mut guard = entry.write();
        info!("Stopped tracking {} {}", guard.class(), guard.key());
        guard.set_state(EntityState::Detached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Instance, Value};
    use crate::test_support::{person, registry};

    #[test]
    fn test_entries_are_found_by_object_identity() {
        let manager = StateManager::new(registry());
        let alice = person(1, "Alice", 30).into_ref();
        let twin = person(1, "Alice", 30).into_ref();

        manager.attach(&alice).unwrap();

        assert!(manager.get_state_entry(&alice).is_some());
        assert!(manager.get_state_entry(&twin).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_duplicate_keys_conflict() {
        let manager = StateManager::new(registry());
        manager.attach(&person(1, "Alice", 30).into_ref()).unwrap();

        let err = manager.attach(&person(1, "Other", 50).into_ref()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(manager.attach(&person(2, "Bob", 41).into_ref()).is_ok());
    }

    #[test]
    fn test_complex_values_cannot_be_tracked() {
        let manager = StateManager::new(registry());
        let address = Instance::new("Address").into_ref();

        let err = manager.add(&address).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_deleting_an_added_entity_detaches_it() {
        let manager = StateManager::new(registry());
        let alice = person(1, "Alice", 30).into_ref();
        let entry = manager.add(&alice).unwrap();

        manager.change_state(&entry, EntityState::Deleted).unwrap();

        assert_eq!(entry.read().state(), EntityState::Detached);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_modified_marks_every_mapped_property() {
        let manager = StateManager::new(registry());
        let entry = manager.attach(&person(1, "Alice", 30).into_ref()).unwrap();

        manager.change_state(&entry, EntityState::Modified).unwrap();

        let guard = entry.read();
        assert!(guard.is_property_modified("Name"));
        assert!(guard.is_property_modified("Home"));
        assert!(!guard.is_property_modified("Nickname"));
    }

    #[test]
    fn test_accept_all_changes_settles_every_entry() {
        let manager = StateManager::new(registry());
        let added = manager.add(&person(1, "Alice", 30).into_ref()).unwrap();
        let deleted = manager.attach(&person(2, "Bob", 41).into_ref()).unwrap();
        let changed = manager.attach(&person(3, "Carol", 25).into_ref()).unwrap();
        manager.change_state(&deleted, EntityState::Deleted).unwrap();
        changed.read().entity().write().set("Age", Value::from(26));

        assert_eq!(manager.detect_changes(), 1);
        manager.accept_all_changes().unwrap();

        assert_eq!(added.read().state(), EntityState::Unchanged);
        assert_eq!(changed.read().state(), EntityState::Unchanged);
        assert_eq!(deleted.read().state(), EntityState::Detached);
        assert_eq!(manager.len(), 2);
    }
}
