use std::sync::Arc;

use crate::entry::{CollectionEntry, EntityEntry, PropertyEntry, ReferenceEntry, ValidationError};
use crate::error::{EntryError, Result};
use crate::metadata::MemberEntryMetadata;
use crate::model::Value;

/// Entry for any member of an entity: a scalar or complex property, or a
/// navigation.
#[derive(Debug, Clone)]
pub enum MemberEntry {
    Property(PropertyEntry),
    Reference(ReferenceEntry),
    Collection(CollectionEntry),
}

impl MemberEntry {
    pub fn name(&self) -> &str {
        match self {
            MemberEntry::Property(entry) => entry.name(),
            MemberEntry::Reference(entry) => entry.name(),
            MemberEntry::Collection(entry) => entry.name(),
        }
    }

    pub fn metadata(&self) -> &Arc<MemberEntryMetadata> {
        match self {
            MemberEntry::Property(entry) => entry.metadata(),
            MemberEntry::Reference(entry) => entry.metadata(),
            MemberEntry::Collection(entry) => entry.metadata(),
        }
    }

    pub fn entity_entry(&self) -> &EntityEntry {
        match self {
            MemberEntry::Property(entry) => entry.entity_entry(),
            MemberEntry::Reference(entry) => entry.entity_entry(),
            MemberEntry::Collection(entry) => entry.entity_entry(),
        }
    }

    pub fn current_value(&self) -> Result<Value> {
        match self {
            MemberEntry::Property(entry) => entry.current_value(),
            MemberEntry::Reference(entry) => entry.current_value(),
            MemberEntry::Collection(entry) => entry.current_value(),
        }
    }

    /// Navigations accept only a reference (or null) and a collection
    /// respectively.
    pub fn set_current_value(&self, value: Value) -> Result<()> {
        match (self, value) {
            (MemberEntry::Property(entry), value) => entry.set_current_value(value),
            (MemberEntry::Reference(entry), Value::Null) => entry.set_current_value(None),
            (MemberEntry::Reference(entry), Value::Reference(target)) => {
                entry.set_current_value(Some(target))
            }
            (MemberEntry::Collection(entry), Value::Collection(objects)) => {
                entry.set_current_value(objects)
            }
            (member, value) => Err(EntryError::TypeMismatch {
                expected: member.metadata().element_type().to_string(),
                actual: value.type_label(),
            }),
        }
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        match self {
            MemberEntry::Property(entry) => entry.validate(),
            MemberEntry::Reference(entry) => entry.validate(),
            MemberEntry::Collection(entry) => entry.validate(),
        }
    }

    pub fn as_property(&self) -> Option<&PropertyEntry> {
        match self {
            MemberEntry::Property(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceEntry> {
        match self {
            MemberEntry::Reference(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionEntry> {
        match self {
            MemberEntry::Collection(entry) => Some(entry),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{context, person};

    #[test]
    fn test_member_dispatches_on_kind() {
        let (context, _store) = context();
        let alice = person(1, "Alice", 30).into_ref();
        let entry = context.attach(&alice).unwrap();

        let age = entry.member("Age").unwrap();
        assert!(age.as_property().is_some());
        age.set_current_value(Value::from(31)).unwrap();
        assert!(age.current_value().unwrap().same_as(&Value::from(31)));

        let orders = entry.member("Orders").unwrap();
        assert_eq!(orders.name(), "Orders");
        assert!(orders.as_collection().is_some());
        let err = orders.set_current_value(Value::from(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        orders.set_current_value(Value::Collection(Vec::new())).unwrap();
    }
}
