use std::fmt;
use std::sync::Arc;

use crate::entry::{EntityEntry, ValidationError, ValidationErrorType};
use crate::error::{EntryError, Result};
use crate::metadata::{AccessPath, MemberEntryMetadata};
use crate::model::Value;
use crate::tracker::{EntityState, SharedStateEntry};
use crate::values::PropertyValues;

/// Entry for one scalar or complex property, either directly on the entity
/// or nested inside a complex property.
#[derive(Clone)]
pub struct PropertyEntry {
    entity: EntityEntry,
    metadata: Arc<MemberEntryMetadata>,
    parent: Option<Box<PropertyEntry>>,
    access: AccessPath,
}

impl PropertyEntry {
    pub(crate) fn new(
        entity: EntityEntry,
        metadata: Arc<MemberEntryMetadata>,
        parent: Option<PropertyEntry>,
    ) -> Self {
        let access = match &parent {
            Some(parent) => parent.access.child(metadata.name(), metadata.accessors()),
            None => AccessPath::root(metadata.name(), metadata.accessors()),
        };
        Self {
            entity,
            metadata,
            parent: parent.map(Box::new),
            access,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &Arc<MemberEntryMetadata> {
        &self.metadata
    }

    pub fn entity_entry(&self) -> &EntityEntry {
        &self.entity
    }

    /// The complex property this one is nested in
    pub fn parent(&self) -> Option<&PropertyEntry> {
        self.parent.as_deref()
    }

    /// Property names from the entity down to this property
    pub fn path(&self) -> Vec<String> {
        self.access.names()
    }

    pub fn is_complex(&self) -> bool {
        self.metadata.is_complex()
    }

    fn display_path(&self) -> String {
        self.path().join(".")
    }

    fn top_level_name(&self) -> String {
        match &self.parent {
            Some(parent) => parent.top_level_name(),
            None => self.name().to_string(),
        }
    }

    /// Whether the tracking record knows this property
    fn in_model(&self) -> bool {
        self.metadata.is_mapped() && self.parent.as_ref().map_or(true, |p| p.in_model())
    }

    fn tracked_state(&self) -> Option<EntityState> {
        self.entity.state_entry().map(|entry| entry.read().state())
    }

    /// Read through the object accessors when the path allows it, through the
    /// tracking record otherwise.
    pub fn current_value(&self) -> Result<Value> {
        if self.access.can_read() {
            if let Some(value) = self.access.get(&self.entity.entity().read()) {
                return Ok(value);
            }
        }
        if self.in_model() && self.tracked_state().is_some() {
            return match self.parent_current_values()? {
                Some(values) => values.get_value(self.name()),
                None => Ok(Value::Null),
            };
        }
        Err(EntryError::CannotGetCurrentValue {
            property: self.display_path(),
            class: self.entity.class().to_string(),
        })
    }

    /// Write the current value. Tracked properties go through the current
    /// values, which records the modification; complex values are also set
    /// on the object itself.
    pub fn set_current_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.is_complex() && value.is_null() {
            return Err(EntryError::ComplexObjectCannotBeNull {
                property: self.display_path(),
                class: self.entity.class().to_string(),
            });
        }

        let tracked = matches!(
            self.tracked_state(),
            Some(EntityState::Added | EntityState::Unchanged | EntityState::Modified)
        );
        if !self.in_model() || !tracked {
            if self.set_on_object(value)? {
                return Ok(());
            }
            return Err(EntryError::CannotSetCurrentValue {
                property: self.display_path(),
                class: self.entity.class().to_string(),
            });
        }

        let values = self.parent_current_values()?.ok_or_else(|| self.null_parent())?;
        values.set_value(self.name(), value.clone())?;
        if self.is_complex() {
            self.set_on_object(value)?;
        }
        Ok(())
    }

    /// Set through the object setter, skipping the write when the value is
    /// unchanged. `false` when there is no setter.
    fn set_on_object(&self, value: Value) -> Result<bool> {
        if !self.access.can_write() {
            return Ok(false);
        }
        let mut object = self.entity.entity().write();
        if self.access.can_read() && self.access.get(&object).is_some_and(|current| current.same_as(&value)) {
            return Ok(true);
        }
        self.access.set(&mut object, value)
    }

    pub fn original_value(&self) -> Result<Value> {
        self.validate_not_detached_and_in_model("original_value")?;
        match self.parent_original_values()? {
            Some(values) => values.get_value(self.name()),
            None => Ok(Value::Null),
        }
    }

    pub fn set_original_value(&self, value: impl Into<Value>) -> Result<()> {
        self.validate_not_detached_and_in_model("set_original_value")?;
        let values = self.parent_original_values()?.ok_or_else(|| self.null_parent())?;
        values.set_value(self.name(), value.into())
    }

    /// Scalar properties report the recorded flag. Complex and nested
    /// properties first compare their top-level complex value with its
    /// original value.
    pub fn is_modified(&self) -> Result<bool> {
        let entry = self.validate_not_detached_and_in_model("is_modified")?;
        let top = self.top_level_name();
        let mut guard = entry.write();
        match guard.state() {
            EntityState::Added => Ok(true),
            _ => {
                if self.parent.is_some() || self.is_complex() {
                    guard.detect_property_change(&top);
                }
                Ok(guard.is_property_modified(&top))
            }
        }
    }

    /// `true` marks the top-level property modified; `false` restores its
    /// original value.
    pub fn set_is_modified(&self, modified: bool) -> Result<()> {
        let entry = self.validate_not_detached_and_in_model("set_is_modified")?;
        let top = self.top_level_name();
        let mut guard = entry.write();
        if !guard.state().tracks_changes() {
            return Ok(());
        }
        if modified {
            guard.mark_modified(&top);
        } else {
            guard.reject_property(&top)?;
            guard.detect_property_change(&top);
        }
        Ok(())
    }

    /// Current values of the object or complex value declaring this property;
    /// `None` when a complex parent is null.
    pub fn parent_current_values(&self) -> Result<Option<PropertyValues>> {
        match &self.parent {
            None => self.entity.current_values().map(Some),
            Some(parent) => Ok(match parent.parent_current_values()? {
                Some(values) => values.get(parent.name())?.into_nested(),
                None => None,
            }),
        }
    }

    pub fn parent_original_values(&self) -> Result<Option<PropertyValues>> {
        match &self.parent {
            None => self.entity.original_values().map(Some),
            Some(parent) => Ok(match parent.parent_original_values()? {
                Some(values) => values.get(parent.name())?.into_nested(),
                None => None,
            }),
        }
    }

    /// Nested property of this complex property
    pub fn property(&self, name: &str) -> Result<PropertyEntry> {
        if !self.is_complex() {
            return Err(EntryError::NotAComplexProperty {
                property: self.name().to_string(),
                class: self.metadata.declaring_type().to_string(),
            });
        }
        let declaring = self.metadata.element_type();
        let metadata = self
            .entity
            .registry()
            .property_member(declaring, name)
            .cloned()
            .ok_or_else(|| EntryError::PropertyNotFound {
                property: name.to_string(),
                class: declaring.to_string(),
            })?;
        Ok(PropertyEntry::new(self.entity.clone(), metadata, Some(self.clone())))
    }

    /// Non-nullable scalars holding null; complex properties validate their
    /// nested properties.
    pub fn validate(&self) -> Vec<ValidationError> {
        let Ok(value) = self.current_value() else {
            return Vec::new();
        };
        if !self.is_complex() {
            if !self.metadata.is_nullable() && value.is_null() {
                return vec![ValidationError {
                    property: self.display_path(),
                    error_type: ValidationErrorType::MissingRequiredProperty,
                    message: format!("The {} field is required.", self.display_path()),
                }];
            }
            return Vec::new();
        }
        if value.is_null() {
            return Vec::new();
        }
        let registry = Arc::clone(self.entity.registry());
        let Ok(properties) = registry.properties(self.metadata.element_type()) else {
            return Vec::new();
        };
        properties
            .iter()
            .filter_map(|p| self.property(&p.name).ok())
            .flat_map(|nested| nested.validate())
            .collect()
    }

    fn validate_not_detached_and_in_model(
        &self,
        operation: &'static str,
    ) -> Result<SharedStateEntry> {
        if !self.in_model() {
            return Err(EntryError::NotInModel {
                property: self.display_path(),
                class: self.entity.class().to_string(),
            });
        }
        self.entity.require_tracked(operation)
    }

    fn null_parent(&self) -> EntryError {
        EntryError::CannotSetOnNullParent {
            property: self.name().to_string(),
            parent: self
                .parent
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("path", &self.path())
            .field("kind", &self.metadata.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Instance;
    use crate::test_support::{address, context, person};

    #[test]
    fn test_same_value_write_does_not_mark_modified() {
        let (context, _store) = context();
        let entry = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();
        let age = entry.property("Age").unwrap();

        age.set_current_value(31).unwrap();
        assert_eq!(age.current_value().unwrap(), Value::from(31));
        assert!(age.is_modified().unwrap());

        let name = entry.property("Name").unwrap();
        name.set_current_value("Alice").unwrap();
        assert!(!name.is_modified().unwrap());
    }

    #[test]
    fn test_nested_write_marks_the_top_level_complex_property() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();
        let city = entry.property("Home.City").unwrap();

        city.set_current_value("Bergen").unwrap();

        assert_eq!(city.current_value().unwrap(), Value::from("Bergen"));
        assert_eq!(city.original_value().unwrap(), Value::from("Oslo"));
        assert!(city.is_modified().unwrap());
        assert!(entry.property("Home").unwrap().is_modified().unwrap());
        assert!(!entry.property("Name").unwrap().is_modified().unwrap());
        assert_eq!(entry.state(), EntityState::Modified);
    }

    #[test]
    fn test_nested_changes_made_on_the_object_are_detected() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();
        let path = ["Home".to_string(), "Zip".to_string()];
        let zip = entry.property("Home.Zip").unwrap();
        assert!(!zip.is_modified().unwrap());

        let mut object = alice.write();
        if let Some(Value::Object(address)) = object.get_mut("Home") {
            address.set("Zip", "5003");
        }
        drop(object);

        assert!(zip.is_modified().unwrap());
        assert_eq!(alice.read().get_path(&path), Value::from("5003"));
    }

    #[test]
    fn test_setting_is_modified_false_restores_the_original_value() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();
        entry.property("Home.City").unwrap().set_current_value("Bergen").unwrap();
        entry.property("Age").unwrap().set_current_value(31).unwrap();

        entry.property("Home.City").unwrap().set_is_modified(false).unwrap();

        assert_eq!(entry.property("Home.City").unwrap().current_value().unwrap(), Value::from("Oslo"));
        assert!(!entry.property("Home").unwrap().is_modified().unwrap());
        assert_eq!(entry.state(), EntityState::Modified);

        entry.property("Age").unwrap().set_is_modified(false).unwrap();
        assert_eq!(entry.state(), EntityState::Unchanged);
        assert_eq!(alice.read().get("Age"), Some(&Value::from(30)));
    }

    #[test]
    fn test_complex_property_cannot_be_set_to_null() {
        let (context, _store) = context();
        let attached = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();
        let detached = context.entry(&person(2, "Bob", 41).into_ref()).unwrap();

        for entry in [attached, detached] {
            let err = entry.property("Home").unwrap().set_current_value(Value::Null).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        }
    }

    #[test]
    fn test_complex_value_is_copied_and_mirrored_onto_the_object() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();

        entry
            .property("Home")
            .unwrap()
            .set_current_value(address("Tromso", "9008"))
            .unwrap();

        let city = ["Home".to_string(), "City".to_string()];
        assert_eq!(alice.read().get_path(&city), Value::from("Tromso"));
        assert!(entry.property("Home").unwrap().is_modified().unwrap());
    }

    #[test]
    fn test_detached_entities_use_object_accessors_only() {
        let (context, _store) = context();
        let bob = person(2, "Bob", 41).into_ref();
        let entry = context.entry(&bob).unwrap();

        entry.property("Name").unwrap().set_current_value("Robert").unwrap();
        assert_eq!(bob.read().get("Name"), Some(&Value::from("Robert")));

        let notes = entry.property("Notes").unwrap();
        assert_eq!(notes.current_value().unwrap_err().kind(), ErrorKind::NoAccessor);
        assert_eq!(notes.set_current_value("x").unwrap_err().kind(), ErrorKind::NoAccessor);
        assert!(matches!(
            entry.property("Name").unwrap().original_value().unwrap_err(),
            EntryError::NotSupportedForDetached { .. }
        ));
    }

    #[test]
    fn test_shadow_properties_go_through_the_record() {
        let (context, _store) = context();
        let bob = person(2, "Bob", 41).into_ref();
        let entry = context.attach(&bob).unwrap();
        let notes = entry.property("Notes").unwrap();

        notes.set_current_value("prefers email").unwrap();

        assert_eq!(notes.current_value().unwrap(), Value::from("prefers email"));
        assert!(notes.is_modified().unwrap());
        assert!(!bob.read().has("Notes"));
    }

    #[test]
    fn test_unmapped_properties_are_object_only() {
        let (context, _store) = context();
        let bob = person(2, "Bob", 41).into_ref();
        let entry = context.attach(&bob).unwrap();
        let nickname = entry.property("Nickname").unwrap();

        nickname.set_current_value("Bobby").unwrap();

        assert_eq!(nickname.current_value().unwrap(), Value::from("Bobby"));
        assert_eq!(entry.state(), EntityState::Unchanged);
        assert!(matches!(
            nickname.is_modified().unwrap_err(),
            EntryError::NotInModel { .. }
        ));
    }

    #[test]
    fn test_null_complex_parent_reads_as_null() {
        let (context, _store) = context();
        let carol = person(3, "Carol", 25).with("Home", Value::Null).into_ref();
        let entry = context.attach(&carol).unwrap();
        let city = entry.property("Home.City").unwrap();

        assert!(city.current_value().unwrap().is_null());
        assert!(city.original_value().unwrap().is_null());
        assert!(matches!(
            city.set_original_value("Oslo").unwrap_err(),
            EntryError::CannotSetOnNullParent { .. }
        ));
    }

    #[test]
    fn test_nested_entries_walk_through_their_parent() {
        let (context, _store) = context();
        let entry = context.attach(&person(1, "Alice", 30).into_ref()).unwrap();
        let home = entry.complex_property("Home").unwrap();

        let lat = home.property("Location").unwrap().property("Lat").unwrap();

        assert_eq!(lat.path(), vec!["Home", "Location", "Lat"]);
        assert_eq!(lat.parent().map(|p| p.name().to_string()), Some("Location".to_string()));
        assert!(lat.parent_current_values().unwrap().is_some());
        assert!(matches!(
            lat.property("Anything").unwrap_err(),
            EntryError::NotAComplexProperty { .. }
        ));
    }

    #[test]
    fn test_required_scalars_are_validated() {
        let (context, _store) = context();
        let nameless = Instance::new("Person").with("Id", 4).with("Home", address("Oslo", "0150"));
        let entry = context.entry(&nameless.into_ref()).unwrap();

        let errors = entry.property("Id").unwrap().validate();
        assert!(errors.is_empty());
        let errors = entry.property("Name").unwrap().validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ValidationErrorType::MissingRequiredProperty);
    }
}
