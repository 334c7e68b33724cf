use log::{debug, info, warn};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::context::TrackingContext;
use crate::entry::{CollectionEntry, MemberEntry, PropertyEntry, ReferenceEntry, ValidationError};
use crate::error::{EntryError, Result};
use crate::metadata::{MemberEntryMetadata, MemberKind, MetadataRegistry};
use crate::model::{same_object, ObjectRef};
use crate::query::{EntityQuery, QuerySource};
use crate::tracker::{EntityKey, EntityState, RecordHandle, RecordKind, SharedStateEntry};
use crate::values::{DataRecord, PropertyValues};

/// Change-tracking view of one entity object.
///
/// The tracking record is looked up lazily and looked up again whenever the
/// entry appears detached, so an entry created before the object was added
/// to the context sees it once it is.
#[derive(Clone)]
pub struct EntityEntry {
    context: Arc<TrackingContext>,
    entity: ObjectRef,
    class: String,
    state_entry: Arc<RwLock<Option<SharedStateEntry>>>,
}

impl EntityEntry {
    pub(crate) fn new(context: Arc<TrackingContext>, entity: ObjectRef) -> Result<Self> {
        let class = entity.read().class.clone();
        if !context.registry().is_entity(&class) {
            return Err(EntryError::NotAnEntityType { class });
        }
        let state_entry = context.state_manager().get_state_entry(&entity);
        Ok(Self {
            context,
            entity,
            class,
            state_entry: Arc::new(RwLock::new(state_entry)),
        })
    }

    pub fn entity(&self) -> &ObjectRef {
        &self.entity
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn context(&self) -> &Arc<TrackingContext> {
        &self.context
    }

    pub(crate) fn registry(&self) -> &Arc<MetadataRegistry> {
        self.context.registry()
    }

    pub(crate) fn state_entry(&self) -> Option<SharedStateEntry> {
        if let Some(entry) = self.state_entry.read().clone() {
            if entry.read().state() != EntityState::Detached {
                return Some(entry);
            }
        }
        let fresh = self.context.state_manager().get_state_entry(&self.entity);
        if fresh.is_some() {
            debug!("Resolved tracking record for {}", self.class);
        }
        *self.state_entry.write() = fresh.clone();
        fresh
    }

    pub(crate) fn require_tracked(&self, operation: &'static str) -> Result<SharedStateEntry> {
        self.state_entry().ok_or_else(|| EntryError::NotSupportedForDetached {
            operation,
            class: self.class.clone(),
        })
    }

    pub fn is_detached(&self) -> bool {
        self.state_entry().is_none()
    }

    pub fn state(&self) -> EntityState {
        self.state_entry()
            .map_or(EntityState::Detached, |entry| entry.read().state())
    }

    /// Key of the tracked entity; `None` while detached
    pub fn key(&self) -> Option<EntityKey> {
        self.state_entry().map(|entry| entry.read().key().clone())
    }

    /// Move the entity to `state`.
    ///
    /// Leaving Detached attaches (or adds) the object first. Going from
    /// Modified to Unchanged copies the original values over the current
    /// values before the state changes.
    pub fn set_state(&self, state: EntityState) -> Result<()> {
        let old = self.state();
        if old == state {
            return Ok(());
        }
        let manager = self.context.state_manager();
        match self.state_entry() {
            None => match state {
                EntityState::Added => {
                    manager.add(&self.entity)?;
                }
                EntityState::Unchanged => {
                    manager.attach(&self.entity)?;
                }
                _ => {
                    let entry = manager.attach(&self.entity)?;
                    manager.change_state(&entry, state)?;
                }
            },
            Some(entry) => {
                if old == EntityState::Modified && state == EntityState::Unchanged {
                    self.current_values()?.set_values(&self.original_values()?)?;
                }
                manager.change_state(&entry, state)?;
            }
        }
        self.state_entry();
        info!("{} entry changed state {old} -> {state}", self.class);
        Ok(())
    }

    /// Live current values; writes go straight to the entity
    pub fn current_values(&self) -> Result<PropertyValues> {
        let entry = self.require_tracked("current_values")?;
        let state = entry.read().state();
        if state == EntityState::Deleted {
            return Err(EntryError::InvalidForState {
                operation: "current_values",
                state,
            });
        }
        PropertyValues::for_record(
            Arc::clone(self.registry()),
            &self.class,
            RecordHandle::new(entry, RecordKind::Current),
        )
    }

    /// Live original values
    pub fn original_values(&self) -> Result<PropertyValues> {
        let entry = self.require_tracked("original_values")?;
        let state = entry.read().state();
        if state == EntityState::Added {
            return Err(EntryError::InvalidForState {
                operation: "original_values",
                state,
            });
        }
        PropertyValues::for_record(
            Arc::clone(self.registry()),
            &self.class,
            RecordHandle::new(entry, RecordKind::Original),
        )
    }

    /// Values currently stored for this entity, or `None` when its row no
    /// longer exists.
    pub fn get_database_values(&self) -> Result<Option<PropertyValues>> {
        Ok(self
            .fetch_database_row("get_database_values")?
            .map(|(template, row)| PropertyValues::from_database_record(&template, &row)))
    }

    /// Overwrite current and original values with the stored values. The
    /// entity is detached when its row no longer exists.
    pub fn reload(&self) -> Result<()> {
        let entry = self.require_tracked("reload")?;
        match self.fetch_database_row("reload")? {
            Some((_, row)) => {
                entry.write().apply_record(&row)?;
                info!("Reloaded {} from the data source", self.class);
            }
            None => {
                warn!("{} no longer exists in the data source, detaching it", self.class);
                self.context
                    .state_manager()
                    .change_state(&entry, EntityState::Detached)?;
                self.state_entry();
            }
        }
        Ok(())
    }

    fn fetch_database_row(&self, operation: &'static str) -> Result<Option<(PropertyValues, DataRecord)>> {
        let entry = self.require_tracked(operation)?;
        let (state, key) = {
            let guard = entry.read();
            (guard.state(), guard.key().clone())
        };
        let key = match (state, key) {
            (EntityState::Added, _) | (_, EntityKey::Temporary(_)) => {
                return Err(EntryError::InvalidForState { operation, state })
            }
            (_, EntityKey::Permanent(pairs)) => pairs,
        };

        let template = self.original_values()?;
        let registry = self.registry();
        let entity_set = registry.entity_set(&self.class)?;
        let source = QuerySource {
            container: self.context.container_name(),
            entity_set: &entity_set,
            namespace: registry.namespace(),
            entity_type: &self.class,
        };
        let query = EntityQuery::database_values(
            source,
            registry.types_assignable_to(&self.class),
            &template,
            &key,
        )?;

        let mut rows = self.context.execute(&query)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(|row| (template, row))),
            count => Err(EntryError::MultipleRows { count }),
        }
    }

    /// Member by name or dotted property path
    pub fn member(&self, path: &str) -> Result<MemberEntry> {
        self.resolve_member(path, None)
    }

    /// Member whose type must be assignable to `requested`
    pub fn member_as(&self, path: &str, requested: &str) -> Result<MemberEntry> {
        self.resolve_member(path, Some(requested))
    }

    fn resolve_member(&self, path: &str, requested: Option<&str>) -> Result<MemberEntry> {
        if path.contains('.') {
            return self
                .resolve_property(path, requested, false)
                .map(MemberEntry::Property);
        }
        let registry = self.registry();
        if let Some(metadata) = registry.navigation_member(&self.class, path) {
            // a collection's element type is never what is requested
            if metadata.kind() == MemberKind::ReferenceNavigation {
                self.check_requested(metadata, requested)?;
            }
            return Ok(metadata.create_member_entry(self, None));
        }
        if let Some(metadata) = registry.property_member(&self.class, path) {
            self.check_requested(metadata, requested)?;
            return Ok(metadata.create_member_entry(self, None));
        }
        Err(EntryError::NotAProperty {
            member: path.to_string(),
            class: self.class.clone(),
        })
    }

    /// Scalar or complex property, possibly a dotted path through complex
    /// properties
    pub fn property(&self, path: &str) -> Result<PropertyEntry> {
        self.resolve_property(path, None, false)
    }

    pub fn property_as(&self, path: &str, requested: &str) -> Result<PropertyEntry> {
        self.resolve_property(path, Some(requested), false)
    }

    pub fn complex_property(&self, path: &str) -> Result<PropertyEntry> {
        self.resolve_property(path, None, true)
    }

    fn resolve_property(&self, path: &str, requested: Option<&str>, require_complex: bool) -> Result<PropertyEntry> {
        let registry = Arc::clone(self.registry());
        let parts: Vec<&str> = path.split('.').collect();
        let mut declaring = self.class.clone();
        let mut parent: Option<PropertyEntry> = None;

        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            let metadata = match registry.member(&declaring, part) {
                Some(m) if m.kind().is_property() => Arc::clone(m),
                Some(_) => {
                    return Err(EntryError::NotAScalarProperty {
                        property: part.to_string(),
                        class: declaring,
                    })
                }
                None => {
                    return Err(EntryError::PropertyNotFound {
                        property: part.to_string(),
                        class: declaring,
                    })
                }
            };
            if !last && !metadata.is_complex() {
                return Err(EntryError::DottedPartNotComplex {
                    part: part.to_string(),
                    path: path.to_string(),
                    class: declaring,
                });
            }
            if last {
                if require_complex && !metadata.is_complex() {
                    return Err(EntryError::NotAComplexProperty {
                        property: part.to_string(),
                        class: declaring,
                    });
                }
                self.check_requested(&metadata, requested)?;
            }
            declaring = metadata.element_type().to_string();
            parent = Some(PropertyEntry::new(self.clone(), metadata, parent.take()));
        }

        parent.ok_or_else(|| EntryError::PropertyNotFound {
            property: path.to_string(),
            class: self.class.clone(),
        })
    }

    pub fn reference(&self, name: &str) -> Result<ReferenceEntry> {
        let metadata = self.navigation_metadata(name, None, Some(MemberKind::ReferenceNavigation))?;
        Ok(ReferenceEntry::new(self.clone(), metadata))
    }

    pub fn reference_as(&self, name: &str, requested: &str) -> Result<ReferenceEntry> {
        let metadata = self.navigation_metadata(name, Some(requested), Some(MemberKind::ReferenceNavigation))?;
        Ok(ReferenceEntry::new(self.clone(), metadata))
    }

    pub fn collection(&self, name: &str) -> Result<CollectionEntry> {
        let metadata = self.navigation_metadata(name, None, Some(MemberKind::CollectionNavigation))?;
        Ok(CollectionEntry::new(self.clone(), metadata))
    }

    /// Collection whose element type must be assignable to `element`
    pub fn collection_as(&self, name: &str, element: &str) -> Result<CollectionEntry> {
        let metadata = self.navigation_metadata(name, Some(element), Some(MemberKind::CollectionNavigation))?;
        Ok(CollectionEntry::new(self.clone(), metadata))
    }

    /// Reference or collection navigation by name
    pub fn navigation(&self, name: &str) -> Result<MemberEntry> {
        let metadata = self.navigation_metadata(name, None, None)?;
        Ok(metadata.create_member_entry(self, None))
    }

    fn navigation_metadata(
        &self,
        name: &str,
        requested: Option<&str>,
        kind: Option<MemberKind>,
    ) -> Result<Arc<MemberEntryMetadata>> {
        if name.contains('.') {
            return Err(EntryError::DottedPathMustBeProperty {
                path: name.to_string(),
            });
        }
        let metadata = self
            .registry()
            .navigation_member(&self.class, name)
            .cloned()
            .ok_or_else(|| EntryError::NotANavigationProperty {
                property: name.to_string(),
                class: self.class.clone(),
            })?;
        match (kind, metadata.kind()) {
            (Some(MemberKind::CollectionNavigation), MemberKind::ReferenceNavigation) => {
                return Err(EntryError::UsedCollectionForReference {
                    property: name.to_string(),
                    class: self.class.clone(),
                })
            }
            (Some(MemberKind::ReferenceNavigation), MemberKind::CollectionNavigation) => {
                return Err(EntryError::UsedReferenceForCollection {
                    property: name.to_string(),
                    class: self.class.clone(),
                })
            }
            _ => {}
        }
        self.check_requested(&metadata, requested)?;
        Ok(metadata)
    }

    fn check_requested(&self, metadata: &MemberEntryMetadata, requested: Option<&str>) -> Result<()> {
        if self.registry().is_requested_type(requested, metadata.element_type()) {
            return Ok(());
        }
        Err(EntryError::WrongTypeRequested {
            member: metadata.name().to_string(),
            class: self.class.clone(),
            requested: requested.unwrap_or_default().to_string(),
            actual: metadata.element_type().to_string(),
        })
    }

    /// Validation errors of every property and navigation of the entity
    pub fn validate(&self) -> Result<Vec<ValidationError>> {
        let registry = Arc::clone(self.registry());
        let mut errors = Vec::new();
        for property in registry.properties(&self.class)? {
            errors.extend(self.property(&property.name)?.validate());
        }
        for relationship in registry.relationships(&self.class)? {
            errors.extend(self.navigation(&relationship.name)?.validate());
        }
        Ok(errors)
    }
}

impl PartialEq for EntityEntry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.context, &other.context) && same_object(&self.entity, &other.entity)
    }
}

impl fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("class", &self.class)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Instance, Value};
    use crate::test_support::{address, context, person};

    #[test]
    fn test_detached_entry_sees_later_tracking() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.entry(&alice).unwrap();
        assert!(entry.is_detached());

        context.attach(&alice).unwrap();

        assert!(!entry.is_detached());
        assert_eq!(entry.state(), EntityState::Unchanged);
    }

    #[test]
    fn test_leaving_detached_attaches_first() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let bob = person(2, "Bob", 41).into_ref();

        context.entry(&alice).unwrap().set_state(EntityState::Deleted).unwrap();
        context.entry(&bob).unwrap().set_state(EntityState::Added).unwrap();

        assert_eq!(context.entry(&alice).unwrap().state(), EntityState::Deleted);
        assert_eq!(context.entry(&bob).unwrap().state(), EntityState::Added);
    }

    #[test]
    fn test_modified_to_unchanged_rejects_changes() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();
        entry.current_values().unwrap().set("Name", "Alicia").unwrap();
        assert_eq!(entry.state(), EntityState::Modified);

        entry.set_state(EntityState::Unchanged).unwrap();

        assert_eq!(entry.state(), EntityState::Unchanged);
        assert_eq!(alice.read().get("Name"), Some(&Value::from("Alice")));
        let current = entry.current_values().unwrap();
        let original = entry.original_values().unwrap();
        for name in current.property_names() {
            assert_eq!(current.get_value(name).unwrap(), original.get_value(name).unwrap());
        }
    }

    #[test]
    fn test_unchanged_restores_a_null_complex_original() {
        let (context, _store) = context();
        let carol = person(3, "Carol", 25).with("Home", Value::Null).into_ref();
        let entry = context.attach(&carol).unwrap();
        entry
            .property("Home")
            .unwrap()
            .set_current_value(address("Bergen", "5003"))
            .unwrap();
        assert_eq!(entry.state(), EntityState::Modified);

        entry.set_state(EntityState::Unchanged).unwrap();

        assert_eq!(entry.state(), EntityState::Unchanged);
        assert!(carol.read().get("Home").is_some_and(Value::is_null));
        assert!(entry.property("Home").unwrap().current_value().unwrap().is_null());
    }

    #[test]
    fn test_value_sets_are_guarded_by_state() {
        let (context, _store) = context();
        let added = context.add(&person(1, "Alice", 30).into_ref()).unwrap();
        let err = added.original_values().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(added.get_database_values().is_err());

        let deleted = context.attach(&person(2, "Bob", 41).into_ref()).unwrap();
        deleted.set_state(EntityState::Deleted).unwrap();
        assert!(matches!(
            deleted.current_values().unwrap_err(),
            EntryError::InvalidForState { state: EntityState::Deleted, .. }
        ));

        let detached = context.entry(&person(3, "Carol", 25).into_ref()).unwrap();
        assert!(matches!(
            detached.current_values().unwrap_err(),
            EntryError::NotSupportedForDetached { .. }
        ));
    }

    #[test]
    fn test_members_resolve_by_kind() {
        let (context, _store) = context();
        let entry = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();

        assert!(matches!(entry.member("Name").unwrap(), MemberEntry::Property(_)));
        assert!(matches!(entry.member("Home.City").unwrap(), MemberEntry::Property(_)));
        assert!(matches!(entry.member("Orders").unwrap(), MemberEntry::Collection(_)));
        assert_eq!(entry.member("NoSuchField").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            entry.member_as("Name", "Number").unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert!(entry.member_as("Orders", "Anything").is_ok());
    }

    #[test]
    fn test_property_lookup_errors() {
        let (context, _store) = context();
        let entry = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();

        assert!(matches!(
            entry.property("NoSuchField").unwrap_err(),
            EntryError::PropertyNotFound { .. }
        ));
        assert!(matches!(
            entry.property("Name.First").unwrap_err(),
            EntryError::DottedPartNotComplex { .. }
        ));
        assert!(matches!(
            entry.complex_property("Name").unwrap_err(),
            EntryError::NotAComplexProperty { .. }
        ));
        assert!(matches!(
            entry.property("Orders").unwrap_err(),
            EntryError::NotAScalarProperty { .. }
        ));
        assert!(entry.property_as("Home", "Address").is_ok());
    }

    #[test]
    fn test_navigation_lookup_errors() {
        let (context, _store) = context();
        let entry = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();

        assert!(matches!(
            entry.navigation("NoSuchField").unwrap_err(),
            EntryError::NotANavigationProperty { .. }
        ));
        assert!(matches!(
            entry.navigation("Orders.Total").unwrap_err(),
            EntryError::DottedPathMustBeProperty { .. }
        ));
        assert!(matches!(
            entry.reference("Orders").unwrap_err(),
            EntryError::UsedReferenceForCollection { .. }
        ));
        assert!(entry.navigation("Name").is_err());
        assert_eq!(
            entry.collection_as("Orders", "Person").unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_entries_are_equal_for_the_same_object_and_context() {
        let (context, _store) = context();
        let (other_context, _other_store) = crate::test_support::context();
        let alice = person(1, "Alice", 30).into_ref();

        assert_eq!(context.entry(&alice).unwrap(), context.entry(&alice).unwrap());
        assert_ne!(context.entry(&alice).unwrap(), other_context.entry(&alice).unwrap());
    }

    #[test]
    fn test_only_entity_objects_get_entries() {
        let (context, _store) = context();
        let address = Instance::new("Address").into_ref();

        assert!(matches!(
            context.entry(&address).unwrap_err(),
            EntryError::NotAnEntityType { .. }
        ));
    }
}
