use crate::metadata::MetadataRegistry;
use crate::model::{Instance, Value};

/// One field of a raw record: a plain value or a nested row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordField {
    Value(Value),
    Record(DataRecord),
}

/// A raw row as produced by a query: ordered named fields, nested rows for
/// complex values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRecord {
    class: Option<String>,
    fields: Vec<(String, RecordField)>,
}

impl DataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            fields: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, RecordField::Value(value.into()));
        self
    }

    pub fn with_record(mut self, name: impl Into<String>, record: DataRecord) -> Self {
        self.push(name, RecordField::Record(record));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, field: RecordField) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = field,
            None => self.fields.push((name, field)),
        }
    }

    /// Concrete class of the row, when the source reports one
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_name(&self, ordinal: usize) -> Option<&str> {
        self.fields.get(ordinal).map(|(name, _)| name.as_str())
    }

    pub fn get(&self, ordinal: usize) -> Option<&RecordField> {
        self.fields.get(ordinal).map(|(_, field)| field)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&RecordField> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field)
    }

    /// Scalar value of a top-level field; nested rows and missing fields are `Null`
    pub fn value(&self, name: &str) -> Value {
        match self.get_by_name(name) {
            Some(RecordField::Value(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    /// Flatten an object into a row. Navigations are not part of a row.
    pub fn from_instance(instance: &Instance) -> Self {
        let mut record = Self::of_class(instance.class.clone());
        for (name, value) in &instance.values {
            match value {
                Value::Object(inner) => record.push(name.clone(), RecordField::Record(Self::from_instance(inner))),
                Value::Reference(_) | Value::Collection(_) => {}
                other => record.push(name.clone(), RecordField::Value(other.clone())),
            }
        }
        record
    }

    /// Rebuild an object of `class`, naming nested objects from the model.
    pub fn to_instance(&self, registry: &MetadataRegistry, class: &str) -> Instance {
        let mut instance = Instance::new(class);
        for (name, field) in &self.fields {
            let value = match field {
                RecordField::Value(value) => value.clone(),
                RecordField::Record(nested) => {
                    let nested_class = registry
                        .property(class, name)
                        .map(|p| p.data_type.type_name().to_string())
                        .or_else(|| nested.class.clone())
                        .unwrap_or_default();
                    Value::Object(Box::new(nested.to_instance(registry, &nested_class)))
                }
            };
            instance.set(name.clone(), value);
        }
        instance
    }
}

impl RecordField {
    pub fn as_record(&self) -> Option<&DataRecord> {
        match self {
            RecordField::Record(record) => Some(record),
            RecordField::Value(_) => None,
        }
    }
}
