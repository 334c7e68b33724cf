use std::fmt;

use crate::error::{EntryError, Result};
use crate::model::{Access, Instance, Value};

pub type Getter = fn(&Instance, &str) -> Value;
pub type Setter = fn(&mut Instance, &str, Value);

fn read_field(instance: &Instance, name: &str) -> Value {
    instance.get(name).cloned().unwrap_or(Value::Null)
}

fn write_field(instance: &mut Instance, name: &str, value: Value) {
    instance.set(name, value);
}

/// Getter/setter vtable for one member, fixed when the registry is built.
/// A missing entry means the object has no accessor of that kind.
#[derive(Clone, Copy, Default)]
pub struct PropertyAccessors {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

impl PropertyAccessors {
    pub fn for_access(access: Access) -> Self {
        Self {
            getter: access.can_read().then_some(read_field as Getter),
            setter: access.can_write().then_some(write_field as Setter),
        }
    }

    pub fn read_write() -> Self {
        Self::for_access(Access::ReadWrite)
    }
}

impl fmt::Debug for PropertyAccessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessors")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// Accessors composed along a path of complex properties, rooted at an entity.
#[derive(Clone, Debug, Default)]
pub struct AccessPath {
    segments: Vec<(String, PropertyAccessors)>,
}

impl AccessPath {
    pub fn root(name: impl Into<String>, accessors: PropertyAccessors) -> Self {
        Self {
            segments: vec![(name.into(), accessors)],
        }
    }

    pub fn child(&self, name: impl Into<String>, accessors: PropertyAccessors) -> Self {
        let mut segments = self.segments.clone();
        segments.push((name.into(), accessors));
        Self { segments }
    }

    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn can_read(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|(_, a)| a.getter.is_some())
    }

    pub fn can_write(&self) -> bool {
        match self.segments.split_last() {
            Some(((_, last), parents)) => {
                last.setter.is_some() && parents.iter().all(|(_, a)| a.getter.is_some())
            }
            None => false,
        }
    }

    /// Read through the composed getters. `None` when some getter is missing;
    /// a null complex parent short-circuits to `Some(Null)`.
    pub fn get(&self, root: &Instance) -> Option<Value> {
        let ((last_name, last), parents) = self.segments.split_last()?;
        let mut current = root;
        for (name, accessors) in parents {
            accessors.getter?;
            match current.get(name) {
                Some(Value::Object(inner)) => current = &**inner,
                _ => return Some(Value::Null),
            }
        }
        last.getter.map(|getter| getter(current, last_name))
    }

    /// Write through the composed accessors. Returns `Ok(false)` when an
    /// accessor along the path is missing.
    pub fn set(&self, root: &mut Instance, value: Value) -> Result<bool> {
        let Some(((last_name, last), parents)) = self.segments.split_last() else {
            return Ok(false);
        };
        let Some(setter) = last.setter else {
            return Ok(false);
        };
        let mut current = root;
        for (name, accessors) in parents {
            if accessors.getter.is_none() {
                return Ok(false);
            }
            match current.get_mut(name) {
                Some(Value::Object(inner)) => current = &mut **inner,
                _ => {
                    return Err(EntryError::CannotSetOnNullParent {
                        property: last_name.clone(),
                        parent: name.clone(),
                    })
                }
            }
        }
        setter(current, last_name, value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn person() -> Instance {
        Instance::new("Person")
            .with("Name", "Alice")
            .with("Home", Instance::new("Address").with("City", "Oslo"))
    }

    #[test]
    fn test_composed_path_reads_and_writes_nested_values() {
        let path = AccessPath::root("Home", PropertyAccessors::read_write())
            .child("City", PropertyAccessors::read_write());
        let mut person = person();

        assert_eq!(path.get(&person), Some(Value::from("Oslo")));
        assert!(path.set(&mut person, Value::from("Bergen")).unwrap());
        assert_eq!(path.get(&person), Some(Value::from("Bergen")));
    }

    #[test]
    fn test_missing_accessors_are_reported() {
        let read_only = AccessPath::root("Name", PropertyAccessors::for_access(Access::ReadOnly));
        let shadow = AccessPath::root("Name", PropertyAccessors::for_access(Access::None));
        let mut person = person();

        assert!(read_only.can_read());
        assert!(!read_only.can_write());
        assert!(!read_only.set(&mut person, Value::from("Bob")).unwrap());
        assert_eq!(shadow.get(&person), None);
    }

    #[test]
    fn test_null_parent_short_circuits_reads_and_rejects_writes() {
        let path = AccessPath::root("Work", PropertyAccessors::read_write())
            .child("City", PropertyAccessors::read_write());
        let mut person = person().with("Work", Value::Null);

        assert_eq!(path.get(&person), Some(Value::Null));
        let err = path.set(&mut person, Value::from("Oslo")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }
}
