use log::{debug, info};
use std::fmt;
use std::slice;
use std::sync::{Arc, OnceLock};

use crate::entry::{EntityEntry, ValidationError, ValidationErrorType};
use crate::error::{EntryError, Result};
use crate::metadata::MemberEntryMetadata;
use crate::model::{same_object, Access, JoinColumn, Multiplicity, ObjectRef, Value};
use crate::query::{EntityQuery, QuerySource};
use crate::tracker::EntityKey;
use crate::values::DataRecord;

/// The far end of a navigation: where related entities are stored and how
/// they join to this entity.
#[derive(Debug, Clone)]
pub struct RelatedEnd {
    pub target_class: String,
    pub target_set: String,
    pub entity_types: Vec<String>,
    pub join: Vec<JoinColumn>,
}

#[derive(Clone)]
struct NavigationEntry {
    entity: EntityEntry,
    metadata: Arc<MemberEntryMetadata>,
    related_end: Arc<OnceLock<RelatedEnd>>,
}

impl NavigationEntry {
    fn new(entity: EntityEntry, metadata: Arc<MemberEntryMetadata>) -> Self {
        Self {
            entity,
            metadata,
            related_end: Arc::new(OnceLock::new()),
        }
    }

    fn name(&self) -> &str {
        self.metadata.name()
    }

    fn related_end(&self, operation: &'static str) -> Result<RelatedEnd> {
        self.entity.require_tracked(operation)?;
        if let Some(end) = self.related_end.get() {
            return Ok(end.clone());
        }
        let relationship = self
            .metadata
            .relationship()
            .ok_or_else(|| EntryError::NotANavigationProperty {
                property: self.name().to_string(),
                class: self.entity.class().to_string(),
            })?;
        let registry = self.entity.registry();
        let end = RelatedEnd {
            target_class: relationship.target.clone(),
            target_set: registry.entity_set(&relationship.target)?,
            entity_types: registry.types_assignable_to(&relationship.target),
            join: relationship.join.clone(),
        };
        debug!(
            "Resolved related end {}.{} -> {}",
            self.entity.class(),
            self.name(),
            end.target_set
        );
        Ok(self.related_end.get_or_init(|| end).clone())
    }

    fn current_value(&self) -> Result<Value> {
        match self.metadata.accessors().getter {
            Some(getter) => Ok(getter(&self.entity.entity().read(), self.name())),
            None => Err(EntryError::CannotGetCurrentValue {
                property: self.name().to_string(),
                class: self.entity.class().to_string(),
            }),
        }
    }

    fn set_current_value(&self, value: Value) -> Result<()> {
        match self.metadata.accessors().setter {
            Some(setter) => {
                setter(&mut self.entity.entity().write(), self.name(), value);
                Ok(())
            }
            None => Err(EntryError::CannotSetCurrentValue {
                property: self.name().to_string(),
                class: self.entity.class().to_string(),
            }),
        }
    }

    fn is_loaded(&self) -> Result<bool> {
        let entry = self.entity.require_tracked("is_loaded")?;
        let loaded = entry.read().is_loaded(self.name());
        Ok(loaded)
    }

    fn set_is_loaded(&self, loaded: bool) -> Result<()> {
        let entry = self.entity.require_tracked("set_is_loaded")?;
        entry.write().set_loaded(self.name(), loaded);
        Ok(())
    }

    /// Query for the related entities, filtered on the join columns
    fn query(&self) -> Result<EntityQuery> {
        let entry = self.entity.require_tracked("query")?;
        let end = self.related_end("query")?;
        let filter: Vec<(String, serde_json::Value)> = {
            let guard = entry.read();
            end.join
                .iter()
                .map(|column| {
                    let value = match guard.current_value(slice::from_ref(&column.source)) {
                        Value::Scalar(value) => value,
                        _ => serde_json::Value::Null,
                    };
                    (column.target.clone(), value)
                })
                .collect()
        };
        let context = self.entity.context();
        let source = QuerySource {
            container: context.container_name(),
            entity_set: &end.target_set,
            namespace: context.registry().namespace(),
            entity_type: &end.target_class,
        };
        Ok(EntityQuery::related(source, end.entity_types.clone(), &filter))
    }

    /// Run the query and return the related objects, reusing tracked objects
    /// with the same key and attaching the others as Unchanged.
    fn load_related(&self) -> Result<Vec<ObjectRef>> {
        let end = self.related_end("load")?;
        let query = self.query()?;
        let rows = self.entity.context().execute(&query)?;
        let mut related = Vec::with_capacity(rows.len());
        for row in &rows {
            related.push(self.materialize(&end, row)?);
        }
        Ok(related)
    }

    fn materialize(&self, end: &RelatedEnd, row: &DataRecord) -> Result<ObjectRef> {
        let context = self.entity.context();
        let registry = context.registry();
        let class = row.class().unwrap_or(end.target_class.as_str()).to_string();

        let mut key = Vec::new();
        for name in registry.key_properties(&class)? {
            if let Value::Scalar(value) = row.value(name) {
                key.push((name.clone(), value));
            }
        }
        let key = EntityKey::Permanent(key);
        if let Some(existing) = context.state_manager().find_by_key(&end.target_set, &key) {
            return Ok(Arc::clone(existing.read().entity()));
        }

        let values = row.to_instance(registry, &class);
        let mut object = registry.new_instance(&class)?;
        let mut shadow = Vec::new();
        for property in registry.properties(&class)? {
            let Some(value) = values.get(&property.name) else {
                continue;
            };
            // fields are filled directly, read-only ones included
            if property.access != Access::None {
                object.set(property.name.clone(), value.clone());
            }
            if !property.access.can_read() {
                shadow.push((property.name.clone(), value.clone()));
            }
        }

        let object = object.into_ref();
        let entry = context.state_manager().attach(&object)?;
        if !shadow.is_empty() {
            let mut guard = entry.write();
            for (name, value) in shadow {
                guard.hydrate(&name, value);
            }
            guard.accept_changes()?;
        }
        Ok(object)
    }
}

/// Entry for a single-valued navigation.
#[derive(Clone)]
pub struct ReferenceEntry {
    inner: NavigationEntry,
}

impl ReferenceEntry {
    pub(crate) fn new(entity: EntityEntry, metadata: Arc<MemberEntryMetadata>) -> Self {
        Self {
            inner: NavigationEntry::new(entity, metadata),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn metadata(&self) -> &Arc<MemberEntryMetadata> {
        &self.inner.metadata
    }

    pub fn entity_entry(&self) -> &EntityEntry {
        &self.inner.entity
    }

    pub fn related_end(&self) -> Result<RelatedEnd> {
        self.inner.related_end("related_end")
    }

    /// The referenced object, or `Null`
    pub fn current_value(&self) -> Result<Value> {
        self.inner.current_value()
    }

    pub fn set_current_value(&self, target: Option<ObjectRef>) -> Result<()> {
        self.inner
            .set_current_value(target.map_or(Value::Null, Value::Reference))
    }

    pub fn is_loaded(&self) -> Result<bool> {
        self.inner.is_loaded()
    }

    pub fn set_is_loaded(&self, loaded: bool) -> Result<()> {
        self.inner.set_is_loaded(loaded)
    }

    pub fn query(&self) -> Result<EntityQuery> {
        self.inner.query()
    }

    /// Load the referenced entity and assign it to the navigation
    pub fn load(&self) -> Result<()> {
        let related = self.inner.load_related()?;
        let value = related.into_iter().next().map_or(Value::Null, Value::Reference);
        self.inner.set_current_value(value)?;
        self.inner.set_is_loaded(true)?;
        info!("Loaded reference {}.{}", self.inner.entity.class(), self.name());
        Ok(())
    }

    /// Required references must not be null
    pub fn validate(&self) -> Vec<ValidationError> {
        let required = self
            .metadata()
            .relationship()
            .is_some_and(|r| r.multiplicity == Multiplicity::One);
        match self.current_value() {
            Ok(Value::Null) if required => vec![ValidationError {
                property: self.name().to_string(),
                error_type: ValidationErrorType::MissingRequiredReference,
                message: format!("The {} reference is required.", self.name()),
            }],
            _ => Vec::new(),
        }
    }
}

/// Entry for a collection-valued navigation.
#[derive(Clone)]
pub struct CollectionEntry {
    inner: NavigationEntry,
}

impl CollectionEntry {
    pub(crate) fn new(entity: EntityEntry, metadata: Arc<MemberEntryMetadata>) -> Self {
        Self {
            inner: NavigationEntry::new(entity, metadata),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn metadata(&self) -> &Arc<MemberEntryMetadata> {
        &self.inner.metadata
    }

    pub fn entity_entry(&self) -> &EntityEntry {
        &self.inner.entity
    }

    pub fn related_end(&self) -> Result<RelatedEnd> {
        self.inner.related_end("related_end")
    }

    pub fn current_value(&self) -> Result<Value> {
        self.inner.current_value()
    }

    /// Objects currently in the collection
    pub fn entities(&self) -> Result<Vec<ObjectRef>> {
        Ok(match self.current_value()? {
            Value::Collection(objects) => objects,
            _ => Vec::new(),
        })
    }

    pub fn set_current_value(&self, objects: Vec<ObjectRef>) -> Result<()> {
        self.inner.set_current_value(Value::Collection(objects))
    }

    pub fn is_loaded(&self) -> Result<bool> {
        self.inner.is_loaded()
    }

    pub fn set_is_loaded(&self, loaded: bool) -> Result<()> {
        self.inner.set_is_loaded(loaded)
    }

    pub fn query(&self) -> Result<EntityQuery> {
        self.inner.query()
    }

    /// Load the related entities and add the ones not yet in the collection
    pub fn load(&self) -> Result<()> {
        let mut objects = self.entities()?;
        let before = objects.len();
        for object in self.inner.load_related()? {
            if !objects.iter().any(|o| same_object(o, &object)) {
                objects.push(object);
            }
        }
        let added = objects.len() - before;
        self.set_current_value(objects)?;
        self.inner.set_is_loaded(true)?;
        info!(
            "Loaded collection {}.{} ({added} new)",
            self.inner.entity.class(),
            self.name()
        );
        Ok(())
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        Vec::new()
    }
}

impl fmt::Debug for ReferenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceEntry").field("name", &self.name()).finish()
    }
}

impl fmt::Debug for CollectionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionEntry").field("name", &self.name()).finish()
    }
}
