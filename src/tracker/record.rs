use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::slice;
use std::sync::Arc;

use crate::error::{EntryError, Result};
use crate::metadata::MetadataRegistry;
use crate::model::{generate_id, Access, DataType, Instance, ObjectRef, Value};
use crate::tracker::{EntityKey, EntityState};
use crate::values::{DataRecord, RecordField};

pub type SharedStateEntry = Arc<RwLock<StateEntry>>;

/// Which of the two tracked value sets a record handle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Current,
    Original,
}

/// Tracking record of one entity: state, key, original snapshot, shadow
/// values and the set of modified top-level properties.
#[derive(Debug)]
pub struct StateEntry {
    registry: Arc<MetadataRegistry>,
    entity: ObjectRef,
    class: String,
    state: EntityState,
    key: EntityKey,
    original: Instance,
    shadow: Instance,
    modified: BTreeSet<String>,
    loaded: BTreeSet<String>,
}

impl StateEntry {
    pub(crate) fn new(registry: Arc<MetadataRegistry>, entity: ObjectRef, state: EntityState) -> Result<Self> {
        let class = entity.read().class.clone();
        let mut entry = Self {
            registry,
            entity,
            original: Instance::new(&class),
            shadow: Instance::new(&class),
            class,
            state,
            key: EntityKey::Temporary(generate_id()),
            modified: BTreeSet::new(),
            loaded: BTreeSet::new(),
        };
        entry.original = entry.capture_instance();
        if state != EntityState::Added {
            entry.key = entry.current_key()?;
        }
        Ok(entry)
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn entity(&self) -> &ObjectRef {
        &self.entity
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Snapshot of the mapped values as they were when last accepted
    pub fn original(&self) -> &Instance {
        &self.original
    }

    pub fn modified_properties(&self) -> Vec<String> {
        self.modified.iter().cloned().collect()
    }

    pub fn is_property_modified(&self, name: &str) -> bool {
        self.modified.contains(name)
    }

    pub fn is_loaded(&self, navigation: &str) -> bool {
        self.loaded.contains(navigation)
    }

    pub(crate) fn set_loaded(&mut self, navigation: &str, loaded: bool) {
        if loaded {
            self.loaded.insert(navigation.to_string());
        } else {
            self.loaded.remove(navigation);
        }
    }

    pub(crate) fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    /// Current value along `path`: through the object accessors when they
    /// allow it, from shadow storage otherwise.
    pub fn current_value(&self, path: &[String]) -> Value {
        match self.registry.access_path(&self.class, path) {
            Some(access) if access.can_read() => access.get(&self.entity.read()).unwrap_or(Value::Null),
            _ => self.shadow.get_path(path),
        }
    }

    /// Write a current value without touching the modified set.
    pub(crate) fn write_current(&mut self, path: &[String], value: Value) -> Result<()> {
        let access = self.registry.access_path(&self.class, path);
        let (readable, writable) = access
            .as_ref()
            .map_or((false, false), |a| (a.can_read(), a.can_write()));
        if writable {
            if let Some(access) = &access {
                access.set(&mut self.entity.write(), value.clone())?;
            }
        } else if readable {
            return Err(EntryError::CannotSetCurrentValue {
                property: path.join("."),
                class: self.class.clone(),
            });
        }
        if !readable {
            write_path(&self.registry, &self.class, &mut self.shadow, path, value);
        }
        Ok(())
    }

    /// Store a top-level value read from the data source. Object fields are
    /// written directly, bypassing setters; values the object cannot expose
    /// go to shadow storage.
    pub(crate) fn hydrate(&mut self, name: &str, value: Value) {
        let access = self
            .registry
            .property(&self.class, name)
            .map_or(Access::None, |p| p.access);
        if access != Access::None {
            self.entity.write().set(name, value.clone());
        }
        if !access.can_read() {
            write_path(&self.registry, &self.class, &mut self.shadow, slice::from_ref(&name.to_string()), value);
        }
    }

    pub fn record_value(&self, kind: RecordKind, path: &[String]) -> Value {
        match kind {
            RecordKind::Current => self.current_value(path),
            RecordKind::Original => self.original.get_path(path),
        }
    }

    /// Write through the record. The top-level property is marked modified.
    pub(crate) fn set_record_value(&mut self, kind: RecordKind, path: &[String], value: Value) -> Result<()> {
        match kind {
            RecordKind::Current => self.write_current(path, value)?,
            RecordKind::Original => write_path(&self.registry, &self.class, &mut self.original, path, value),
        }
        if let Some(top) = path.first() {
            self.mark_modified(top);
        }
        Ok(())
    }

    pub(crate) fn mark_modified(&mut self, name: &str) {
        if !self.state.tracks_changes() || !self.is_mapped(name) {
            return;
        }
        self.modified.insert(name.to_string());
        if self.state == EntityState::Unchanged {
            debug!("{} {} became Modified through '{name}'", self.class, self.key);
            self.state = EntityState::Modified;
        }
    }

    pub(crate) fn set_all_modified(&mut self) {
        self.modified = self.mapped_names().into_iter().collect();
        self.state = EntityState::Modified;
    }

    pub(crate) fn mark_added(&mut self) {
        self.state = EntityState::Added;
        self.modified.clear();
        self.key = EntityKey::Temporary(generate_id());
    }

    /// Compare one top-level property with its original value and mark it
    /// modified if it differs. Returns whether it differs.
    pub(crate) fn detect_property_change(&mut self, name: &str) -> bool {
        if !self.state.tracks_changes() {
            return false;
        }
        let current = self.capture_path(&self.class, slice::from_ref(&name.to_string()));
        let original = self.original.get(name).cloned().unwrap_or(Value::Null);
        if current.same_as(&original) {
            return false;
        }
        self.mark_modified(name);
        true
    }

    /// Mark every mapped property whose value moved away from the original.
    /// Returns the newly marked names.
    pub(crate) fn detect_changes(&mut self) -> Vec<String> {
        let mut changed = Vec::new();
        for name in self.mapped_names() {
            if !self.modified.contains(&name) && self.detect_property_change(&name) {
                changed.push(name);
            }
        }
        if !changed.is_empty() {
            debug!("Detected changes on {} {}: {:?}", self.class, self.key, changed);
        }
        changed
    }

    /// Current values become the original values and the entity is Unchanged.
    pub(crate) fn accept_changes(&mut self) -> Result<()> {
        self.original = self.capture_instance();
        self.modified.clear();
        self.state = EntityState::Unchanged;
        if self.key.is_temporary() {
            self.key = self.current_key()?;
        }
        Ok(())
    }

    /// Restore one top-level property from the original snapshot. The entity
    /// goes back to Unchanged when nothing else is modified.
    pub(crate) fn reject_property(&mut self, name: &str) -> Result<()> {
        let original = self.original.get(name).cloned().unwrap_or(Value::Null);
        self.write_current(slice::from_ref(&name.to_string()), original)?;
        self.modified.remove(name);
        if self.modified.is_empty() && self.state == EntityState::Modified {
            self.state = EntityState::Unchanged;
        }
        Ok(())
    }

    /// Overwrite current values from a queried row and accept them.
    pub(crate) fn apply_record(&mut self, record: &DataRecord) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        for name in self.mapped_names() {
            let value = match record.get_by_name(&name) {
                Some(RecordField::Value(value)) => value.clone(),
                Some(RecordField::Record(row)) => {
                    let class = registry
                        .property(&self.class, &name)
                        .map(|p| p.data_type.type_name().to_string())
                        .unwrap_or_default();
                    Value::Object(Box::new(row.to_instance(&registry, &class)))
                }
                None => continue,
            };
            self.hydrate(&name, value);
        }
        self.accept_changes()
    }

    pub(crate) fn current_key(&self) -> Result<EntityKey> {
        let mut pairs = Vec::new();
        for name in self.registry.key_properties(&self.class)? {
            match self.current_value(slice::from_ref(name)) {
                Value::Scalar(value) => pairs.push((name.clone(), value)),
                _ => return Ok(EntityKey::Temporary(generate_id())),
            }
        }
        Ok(EntityKey::Permanent(pairs))
    }

    fn is_mapped(&self, name: &str) -> bool {
        self.registry
            .mapped_properties(&self.class)
            .is_ok_and(|names| names.iter().any(|n| n == name))
    }

    fn mapped_names(&self) -> Vec<String> {
        self.registry
            .mapped_properties(&self.class)
            .map(|names| names.to_vec())
            .unwrap_or_default()
    }

    fn capture_instance(&self) -> Instance {
        self.capture(&self.class, &[])
    }

    fn capture(&self, class: &str, prefix: &[String]) -> Instance {
        let mut instance = Instance::new(class);
        let Ok(names) = self.registry.mapped_properties(class) else {
            return instance;
        };
        for name in names {
            let mut path = prefix.to_vec();
            path.push(name.clone());
            instance.set(name.clone(), self.capture_path(class, &path));
        }
        instance
    }

    /// Deep copy of the current value at `path`, where the last segment is
    /// declared on `declaring`.
    fn capture_path(&self, declaring: &str, path: &[String]) -> Value {
        let Some(last) = path.last() else {
            return Value::Null;
        };
        match self.registry.property(declaring, last).map(|p| &p.data_type) {
            Some(DataType::Complex(nested)) => match self.current_value(path) {
                Value::Null => Value::Null,
                _ => Value::Object(Box::new(self.capture(nested, path))),
            },
            _ => self.current_value(path),
        }
    }
}

/// Write into a plain instance tree, creating missing complex parents.
fn write_path(registry: &MetadataRegistry, class: &str, root: &mut Instance, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    let mut current_class = class.to_string();
    for name in parents {
        let child_class = registry
            .property(&current_class, name)
            .map(|p| p.data_type.type_name().to_string())
            .unwrap_or_default();
        let slot = current.values.entry(name.clone()).or_insert(Value::Null);
        if !matches!(slot, Value::Object(_)) {
            *slot = Value::Object(Box::new(Instance::new(&child_class)));
        }
        let Value::Object(inner) = slot else {
            return;
        };
        current = &mut **inner;
        current_class = child_class;
    }
    current.set(last.clone(), value);
}

/// Live view of one level of a tracking record, used by record-backed
/// property value containers.
#[derive(Clone)]
pub struct RecordHandle {
    entry: SharedStateEntry,
    kind: RecordKind,
    path: Vec<String>,
}

impl RecordHandle {
    pub(crate) fn new(entry: SharedStateEntry, kind: RecordKind) -> Self {
        Self {
            entry,
            kind,
            path: Vec::new(),
        }
    }

    pub(crate) fn child(&self, name: &str) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            kind: self.kind,
            path: self.path_to(name),
        }
    }

    pub(crate) fn read(&self, name: &str) -> Value {
        self.entry.read().record_value(self.kind, &self.path_to(name))
    }

    pub(crate) fn write(&self, name: &str, value: Value) -> Result<()> {
        self.entry.write().set_record_value(self.kind, &self.path_to(name), value)
    }

    fn path_to(&self, name: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(name.to_string());
        path
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHandle")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish()
    }
}
