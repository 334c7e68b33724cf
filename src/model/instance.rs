use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a tracked application object. Identity is pointer identity.
pub type ObjectRef = Arc<RwLock<Instance>>;

/// An application object: an instance of an entity or complex class.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: String,
    pub values: BTreeMap<String, Value>,
}

/// A value held in an object field or a property value container.
#[derive(Clone)]
pub enum Value {
    Null,
    Scalar(serde_json::Value),
    /// A complex value, owned by its parent
    Object(Box<Instance>),
    /// Single-valued navigation
    Reference(ObjectRef),
    /// Collection-valued navigation
    Collection(Vec<ObjectRef>),
}

impl Instance {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Whether the object declares a field with this name
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Read a value below nested complex objects; a null parent yields `Null`.
    pub fn get_path(&self, path: &[String]) -> Value {
        let Some((last, parents)) = path.split_last() else {
            return Value::Null;
        };
        let mut current = self;
        for name in parents {
            match current.get(name) {
                Some(Value::Object(inner)) => current = &**inner,
                _ => return Value::Null,
            }
        }
        current.get(last).cloned().unwrap_or(Value::Null)
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(RwLock::new(self))
    }
}

pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    Arc::ptr_eq(a, b)
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectRef> {
        match self {
            Value::Reference(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[ObjectRef]> {
        match self {
            Value::Collection(objects) => Some(objects),
            _ => None,
        }
    }

    /// Value equality: numbers compare numerically, complex objects field by
    /// field, navigations by object identity.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Scalar(a), Value::Scalar(b)) => scalars_equal(a, b),
            (Value::Object(a), Value::Object(b)) => {
                a.class == b.class
                    && a.values.len() == b.values.len()
                    && a.values
                        .iter()
                        .all(|(name, value)| b.get(name).is_some_and(|v| value.same_as(v)))
            }
            (Value::Reference(a), Value::Reference(b)) => same_object(a, b),
            (Value::Collection(a), Value::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_object(x, y))
            }
            _ => false,
        }
    }

    /// Short label for logs and error messages
    pub fn type_label(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Scalar(_) => "scalar".to_string(),
            Value::Object(instance) => instance.class.clone(),
            Value::Reference(object) => object.read().class.clone(),
            Value::Collection(_) => "collection".to_string(),
        }
    }
}

fn scalars_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            }
        }
        (serde_json::Value::Array(x), serde_json::Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| scalars_equal(a, b))
        }
        _ => a == b,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Scalar(value) => write!(f, "{value}"),
            Value::Object(instance) => f
                .debug_map()
                .entry(&"class", &instance.class)
                .entries(instance.values.iter())
                .finish(),
            // navigations can form cycles, so only the target class is printed
            Value::Reference(object) => write!(f, "Reference({})", object.read().class),
            Value::Collection(objects) => write!(f, "Collection(len={})", objects.len()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            other => Value::Scalar(other),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(serde_json::Value::String(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Scalar(serde_json::Value::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Scalar(serde_json::Value::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(|n| Value::Scalar(serde_json::Value::Number(n)))
            .unwrap_or(Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(serde_json::Value::Bool(value))
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Value::Object(Box::new(value))
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Reference(value)
    }
}
