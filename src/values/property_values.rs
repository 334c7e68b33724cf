use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EntryError, Result};
use crate::metadata::MetadataRegistry;
use crate::model::{DataType, Instance, Value};
use crate::tracker::RecordHandle;
use crate::values::{DataRecord, RecordField};

/// Value of one container item: a plain value, or the nested container of a
/// complex property.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Value(Value),
    Nested(PropertyValues),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropertyValue::Value(value) => Some(value),
            PropertyValue::Nested(_) => None,
        }
    }

    pub fn as_nested(&self) -> Option<&PropertyValues> {
        match self {
            PropertyValue::Nested(values) => Some(values),
            PropertyValue::Value(_) => None,
        }
    }

    pub fn into_nested(self) -> Option<PropertyValues> {
        match self {
            PropertyValue::Nested(values) => Some(values),
            PropertyValue::Value(_) => None,
        }
    }

    fn share(&self) -> PropertyValue {
        match self {
            PropertyValue::Value(value) => PropertyValue::Value(value.clone()),
            PropertyValue::Nested(values) => PropertyValue::Nested(values.share()),
        }
    }
}

macro_rules! property_value_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PropertyValue {
            fn from(value: $ty) -> Self {
                PropertyValue::Value(value.into())
            }
        })*
    };
}

property_value_from!(Value, &str, String, i64, i32, f64, bool, Instance);

impl From<PropertyValues> for PropertyValue {
    fn from(values: PropertyValues) -> Self {
        PropertyValue::Nested(values)
    }
}

/// One named item of a container, with its declared type.
#[derive(Debug, Clone)]
pub struct PropertyValueItem {
    pub name: String,
    pub value: PropertyValue,
    pub data_type: DataType,
}

impl PropertyValueItem {
    pub fn is_complex(&self) -> bool {
        self.data_type.is_complex()
    }
}

enum Backing {
    /// Reads and writes go straight to the tracking record
    Record(RecordHandle),
    /// Independent in-memory values
    Cloned(Arc<RwLock<BTreeMap<String, PropertyValue>>>),
}

/// Named property values of one entity or complex value.
///
/// The name set is fixed when the container is built; only item values
/// change. Containers handed out for complex items share storage with their
/// parent, so writing through a nested container writes into the parent.
/// `clone()` is the exception: it produces a deep, fully independent
/// snapshot.
pub struct PropertyValues {
    registry: Arc<MetadataRegistry>,
    class: String,
    is_entity: bool,
    names: Arc<[String]>,
    backing: Backing,
}

impl PropertyValues {
    /// Empty detached container: scalars are null, complex items get empty
    /// nested containers.
    pub fn new(registry: Arc<MetadataRegistry>, class: &str) -> Result<Self> {
        let names: Vec<String> = registry.mapped_properties(class)?.to_vec();
        let mut values = BTreeMap::new();
        for name in &names {
            let value = match registry.property(class, name).map(|p| &p.data_type) {
                Some(DataType::Complex(nested)) => {
                    PropertyValue::Nested(PropertyValues::new(Arc::clone(&registry), nested)?)
                }
                _ => PropertyValue::Value(Value::Null),
            };
            values.insert(name.clone(), value);
        }
        Ok(Self {
            is_entity: registry.is_entity(class),
            class: class.to_string(),
            names: Arc::from(names),
            backing: Backing::Cloned(Arc::new(RwLock::new(values))),
            registry,
        })
    }

    /// Detached container holding the mapped values of `object`
    pub fn from_object(registry: Arc<MetadataRegistry>, object: &Instance) -> Result<Self> {
        let values = Self::new(registry, &object.class)?;
        values.set_values_from_object(object)?;
        Ok(values)
    }

    pub(crate) fn for_record(
        registry: Arc<MetadataRegistry>,
        class: &str,
        handle: RecordHandle,
    ) -> Result<Self> {
        let names: Vec<String> = registry.mapped_properties(class)?.to_vec();
        Ok(Self {
            is_entity: registry.is_entity(class),
            class: class.to_string(),
            names: Arc::from(names),
            backing: Backing::Record(handle),
            registry,
        })
    }

    /// Cloned container shaped like `template` and seeded from a queried row.
    /// Fields missing from the row are null.
    pub(crate) fn from_database_record(template: &PropertyValues, record: &DataRecord) -> Self {
        let mut values = BTreeMap::new();
        for name in template.names.iter() {
            let value = match (template.read(name), record.get_by_name(name)) {
                (PropertyValue::Nested(nested), Some(RecordField::Record(row))) => {
                    PropertyValue::Nested(Self::from_database_record(&nested, row))
                }
                (PropertyValue::Nested(_), _) => PropertyValue::Value(Value::Null),
                (_, Some(RecordField::Value(value))) => PropertyValue::Value(value.clone()),
                _ => PropertyValue::Value(Value::Null),
            };
            values.insert(name.clone(), value);
        }
        Self {
            registry: Arc::clone(&template.registry),
            class: template.class.clone(),
            is_entity: template.is_entity,
            names: Arc::clone(&template.names),
            backing: Backing::Cloned(Arc::new(RwLock::new(values))),
        }
    }

    /// Owning class
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Whether the container holds an entity rather than a complex value
    pub fn is_entity(&self) -> bool {
        self.is_entity
    }

    pub fn property_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn get_item(&self, name: &str) -> Result<PropertyValueItem> {
        self.check_name(name)?;
        Ok(PropertyValueItem {
            name: name.to_string(),
            value: self.read(name),
            data_type: self.data_type(name),
        })
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue> {
        self.check_name(name)?;
        Ok(self.read(name))
    }

    /// Item value as a plain value; nested containers are materialised into
    /// complex objects.
    pub fn get_value(&self, name: &str) -> Result<Value> {
        match self.get(name)? {
            PropertyValue::Value(value) => Ok(value),
            PropertyValue::Nested(nested) => Ok(Value::Object(Box::new(nested.to_object()?))),
        }
    }

    /// Set one item. Complex items take a nested container whose values are
    /// copied in; scalar items are only written when the value differs.
    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.check_name(name)?;
        let complex = self.data_type(name).is_complex();
        match (complex, value.into()) {
            (true, PropertyValue::Nested(source)) => match self.read(name) {
                PropertyValue::Nested(target) => target.set_values(&source),
                PropertyValue::Value(_) => match &self.backing {
                    Backing::Record(handle) => {
                        handle.write(name, Value::Object(Box::new(source.to_object()?)))
                    }
                    Backing::Cloned(_) => Err(self.nested_values_null(name)),
                },
            },
            (true, PropertyValue::Value(_)) => Err(EntryError::NestedValuesRequired {
                property: name.to_string(),
                class: self.class.clone(),
            }),
            (false, PropertyValue::Nested(_)) => Err(EntryError::ScalarValueRequired {
                property: name.to_string(),
                class: self.class.clone(),
            }),
            (false, PropertyValue::Value(value)) => {
                if self.read_value(name).same_as(&value) {
                    return Ok(());
                }
                self.write_value(name, value)
            }
        }
    }

    /// Set one item from a plain value; complex objects are copied into the
    /// nested container.
    pub fn set_value(&self, name: &str, value: Value) -> Result<()> {
        self.check_name(name)?;
        if !self.data_type(name).is_complex() {
            return self.set(name, value);
        }
        match value {
            Value::Object(object) => {
                let source = PropertyValues::from_object(Arc::clone(&self.registry), &object)?;
                self.set(name, source)
            }
            Value::Null => Err(EntryError::ComplexObjectCannotBeNull {
                property: name.to_string(),
                class: self.class.clone(),
            }),
            other => Err(EntryError::TypeMismatch {
                expected: self.data_type(name).type_name().to_string(),
                actual: other.type_label(),
            }),
        }
    }

    /// Build a new object of the owning class from these values. Properties
    /// the object has no setter for are skipped, as are null nested values.
    pub fn to_object(&self) -> Result<Instance> {
        let mut object = self.registry.new_instance(&self.class)?;
        for name in self.names.iter() {
            let Some(setter) = self
                .registry
                .property_member(&self.class, name)
                .and_then(|member| member.accessors().setter)
            else {
                continue;
            };
            match self.read(name) {
                PropertyValue::Value(Value::Null) if self.data_type(name).is_complex() => {}
                PropertyValue::Value(value) => setter(&mut object, name, value),
                PropertyValue::Nested(nested) => {
                    setter(&mut object, name, Value::Object(Box::new(nested.to_object()?)))
                }
            }
        }
        Ok(object)
    }

    /// Copy every readable property of `object` into this container.
    pub fn set_values_from_object(&self, object: &Instance) -> Result<()> {
        for name in self.names.iter() {
            let Some(getter) = self
                .registry
                .property_member(&self.class, name)
                .and_then(|member| member.accessors().getter)
            else {
                continue;
            };
            if !object.has(name) {
                continue;
            }
            let value = getter(object, name);
            if !self.data_type(name).is_complex() {
                self.set(name, value)?;
                continue;
            }
            match value {
                Value::Object(inner) => match self.read(name) {
                    PropertyValue::Nested(nested) => nested.set_values_from_object(&inner)?,
                    PropertyValue::Value(_) => {
                        let source = PropertyValues::from_object(Arc::clone(&self.registry), &inner)?;
                        self.set(name, source)?;
                    }
                },
                Value::Null => {
                    return Err(EntryError::ComplexObjectCannotBeNull {
                        property: name.clone(),
                        class: self.class.clone(),
                    })
                }
                other => {
                    return Err(EntryError::TypeMismatch {
                        expected: self.data_type(name).type_name().to_string(),
                        actual: other.type_label(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Copy every value from `other`, whose class must be this class or
    /// derive from it.
    pub fn set_values(&self, other: &PropertyValues) -> Result<()> {
        if !self.registry.is_assignable(&self.class, &other.class) {
            return Err(EntryError::TypeMismatch {
                expected: self.class.clone(),
                actual: other.class.clone(),
            });
        }
        for name in self.names.iter() {
            let value = other.get(name)?;
            if self.data_type(name).is_complex() && value.is_null() {
                // a live record can hold a null complex value; a snapshot cannot
                match &self.backing {
                    Backing::Record(_) => {
                        self.write_value(name, Value::Null)?;
                        continue;
                    }
                    Backing::Cloned(_) => return Err(self.nested_values_null(name)),
                }
            }
            self.set(name, value)?;
        }
        Ok(())
    }

    fn share(&self) -> Self {
        let backing = match &self.backing {
            Backing::Record(handle) => Backing::Record(handle.clone()),
            Backing::Cloned(values) => Backing::Cloned(Arc::clone(values)),
        };
        Self {
            registry: Arc::clone(&self.registry),
            class: self.class.clone(),
            is_entity: self.is_entity,
            names: Arc::clone(&self.names),
            backing,
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(EntryError::PropertyNotFound {
                property: name.to_string(),
                class: self.class.clone(),
            })
        }
    }

    fn data_type(&self, name: &str) -> DataType {
        self.registry
            .property(&self.class, name)
            .map(|p| p.data_type.clone())
            .unwrap_or(DataType::Json)
    }

    fn nested_values_null(&self, name: &str) -> EntryError {
        EntryError::NestedValuesNull {
            property: name.to_string(),
            class: self.class.clone(),
        }
    }

    fn read(&self, name: &str) -> PropertyValue {
        match &self.backing {
            Backing::Cloned(values) => values
                .read()
                .get(name)
                .map(PropertyValue::share)
                .unwrap_or(PropertyValue::Value(Value::Null)),
            Backing::Record(handle) => {
                let value = handle.read(name);
                match self.data_type(name) {
                    DataType::Complex(nested) if !value.is_null() => {
                        // only fails for an unknown class, which registry build rejects
                        match Self::for_record(Arc::clone(&self.registry), &nested, handle.child(name)) {
                            Ok(values) => PropertyValue::Nested(values),
                            Err(_) => PropertyValue::Value(value),
                        }
                    }
                    _ => PropertyValue::Value(value),
                }
            }
        }
    }

    fn read_value(&self, name: &str) -> Value {
        match &self.backing {
            Backing::Cloned(values) => values
                .read()
                .get(name)
                .and_then(|v| v.as_value().cloned())
                .unwrap_or(Value::Null),
            Backing::Record(handle) => handle.read(name),
        }
    }

    fn write_value(&self, name: &str, value: Value) -> Result<()> {
        match &self.backing {
            Backing::Cloned(values) => {
                values.write().insert(name.to_string(), PropertyValue::Value(value));
                Ok(())
            }
            Backing::Record(handle) => handle.write(name, value),
        }
    }
}

impl Clone for PropertyValues {
    /// Deep snapshot, independent of this container and of any tracking record
    fn clone(&self) -> Self {
        let mut values = BTreeMap::new();
        for name in self.names.iter() {
            let value = match self.read(name) {
                PropertyValue::Nested(nested) => PropertyValue::Nested(nested.clone()),
                plain => plain,
            };
            values.insert(name.clone(), value);
        }
        Self {
            registry: Arc::clone(&self.registry),
            class: self.class.clone(),
            is_entity: self.is_entity,
            names: Arc::clone(&self.names),
            backing: Backing::Cloned(Arc::new(RwLock::new(values))),
        }
    }
}

impl fmt::Debug for PropertyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entry(&"class", &self.class);
        for name in self.names.iter() {
            map.entry(name, &self.read(name));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{address, person, registry};

    #[test]
    fn test_get_then_set_round_trips_scalars() {
        let values = PropertyValues::from_object(registry(), &person(1, "Alice", 30)).unwrap();

        values.set("Age", 31).unwrap();
        assert_eq!(values.get_value("Age").unwrap(), Value::from(31));
        assert_eq!(values.get_value("Name").unwrap(), Value::from("Alice"));
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let values = PropertyValues::new(registry(), "Person").unwrap();

        let err = values.get("NoSuchField").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(values.set("NoSuchField", 1).is_err());
        assert!(!values.contains("Nickname"));
    }

    #[test]
    fn test_items_report_declared_types() {
        let values = PropertyValues::new(registry(), "Person").unwrap();

        let home = values.get_item("Home").unwrap();
        assert!(home.is_complex());
        assert_eq!(home.data_type, DataType::Complex("Address".to_string()));
        assert!(home.value.as_nested().is_some());
        assert!(!values.get_item("Name").unwrap().is_complex());
    }

    #[test]
    fn test_writes_through_nested_containers_reach_the_parent() {
        let values = PropertyValues::from_object(registry(), &person(1, "Alice", 30)).unwrap();

        let home = values.get("Home").unwrap().into_nested().unwrap();
        home.set("City", "Bergen").unwrap();

        let object = values.to_object().unwrap();
        let path = ["Home".to_string(), "City".to_string()];
        assert_eq!(object.get_path(&path), Value::from("Bergen"));
    }

    #[test]
    fn test_clone_is_independent_in_both_directions() {
        let values = PropertyValues::from_object(registry(), &person(1, "Alice", 30)).unwrap();
        let copy = values.clone();

        copy.set("Name", "Bob").unwrap();
        copy.get("Home").unwrap().into_nested().unwrap().set("City", "Bergen").unwrap();
        values.set("Age", 40).unwrap();

        assert_eq!(values.get_value("Name").unwrap(), Value::from("Alice"));
        let home = values.get("Home").unwrap().into_nested().unwrap();
        assert_eq!(home.get_value("City").unwrap(), Value::from("Oslo"));
        assert_eq!(copy.get_value("Age").unwrap(), Value::from(30));
    }

    #[test]
    fn test_to_object_then_set_values_reconstructs_values() {
        let registry = registry();
        let values = PropertyValues::from_object(Arc::clone(&registry), &person(1, "Alice", 30)).unwrap();

        let object = values.to_object().unwrap();
        let rebuilt = PropertyValues::new(registry, "Person").unwrap();
        rebuilt.set_values_from_object(&object).unwrap();

        for name in values.property_names() {
            assert_eq!(rebuilt.get_value(name).unwrap(), values.get_value(name).unwrap());
        }
    }

    #[test]
    fn test_complex_items_cannot_be_null_or_scalar() {
        let values = PropertyValues::new(registry(), "Person").unwrap();

        let err = values.set("Home", Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        let err = values.set_value("Home", Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);

        let nested = PropertyValues::new(registry(), "Address").unwrap();
        let err = values.set("Name", nested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_null_complex_source_object_is_rejected() {
        let values = PropertyValues::new(registry(), "Person").unwrap();
        let object = person(1, "Alice", 30).with("Home", Value::Null);

        let err = values.set_values_from_object(&object).unwrap_err();
        assert!(matches!(err, EntryError::ComplexObjectCannotBeNull { .. }));
    }

    #[test]
    fn test_set_values_requires_assignable_source() {
        let registry = registry();
        let person_values = PropertyValues::new(Arc::clone(&registry), "Person").unwrap();
        let employee_values = PropertyValues::new(Arc::clone(&registry), "Employee").unwrap();
        employee_values.set("Name", "Eve").unwrap();
        employee_values.set("Salary", 1000).unwrap();

        person_values.set_values(&employee_values).unwrap();
        assert_eq!(person_values.get_value("Name").unwrap(), Value::from("Eve"));

        let err = employee_values.set_values(&person_values).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let address_values = PropertyValues::new(registry, "Address").unwrap();
        assert!(person_values.set_values(&address_values).is_err());
    }

    #[test]
    fn test_database_record_seeds_a_cloned_container() {
        let template = PropertyValues::from_object(registry(), &person(1, "Alice", 30)).unwrap();
        let record = DataRecord::new()
            .with_value("Id", 1)
            .with_value("Name", "Alicia")
            .with_record("Home", DataRecord::from_instance(&address("Tromso", "9008")));

        let values = PropertyValues::from_database_record(&template, &record);

        assert_eq!(values.get_value("Name").unwrap(), Value::from("Alicia"));
        assert!(values.get_value("Age").unwrap().is_null());
        let home = values.get("Home").unwrap().into_nested().unwrap();
        assert_eq!(home.get_value("City").unwrap(), Value::from("Tromso"));
        assert_eq!(template.get_value("Name").unwrap(), Value::from("Alice"));
    }
}
