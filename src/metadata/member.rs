use std::sync::Arc;

use crate::entry::{
    CollectionEntry, EntityEntry, MemberEntry, PropertyEntry, ReferenceEntry,
};
use crate::metadata::PropertyAccessors;
use crate::model::RelationshipDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    ScalarProperty,
    ComplexProperty,
    ReferenceNavigation,
    CollectionNavigation,
}

impl MemberKind {
    pub fn is_property(self) -> bool {
        matches!(self, MemberKind::ScalarProperty | MemberKind::ComplexProperty)
    }

    pub fn is_navigation(self) -> bool {
        !self.is_property()
    }
}

/// Immutable description of one member of a class, built with the registry.
#[derive(Debug, Clone)]
pub struct MemberEntryMetadata {
    pub(crate) declaring_type: String,
    pub(crate) element_type: String,
    pub(crate) name: String,
    pub(crate) kind: MemberKind,
    pub(crate) mapped: bool,
    pub(crate) nullable: bool,
    pub(crate) accessors: PropertyAccessors,
    pub(crate) relationship: Option<RelationshipDef>,
}

impl MemberEntryMetadata {
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Scalar type name, complex class, or navigation target class
    pub fn element_type(&self) -> &str {
        &self.element_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn is_complex(&self) -> bool {
        self.kind == MemberKind::ComplexProperty
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn accessors(&self) -> PropertyAccessors {
        self.accessors
    }

    pub fn relationship(&self) -> Option<&RelationshipDef> {
        self.relationship.as_ref()
    }

    /// The kind decides which entry is built; nothing else is consulted.
    pub fn create_member_entry(
        self: &Arc<Self>,
        entity: &EntityEntry,
        parent: Option<&PropertyEntry>,
    ) -> MemberEntry {
        match self.kind {
            MemberKind::ScalarProperty | MemberKind::ComplexProperty => MemberEntry::Property(
                PropertyEntry::new(entity.clone(), Arc::clone(self), parent.cloned()),
            ),
            MemberKind::ReferenceNavigation => {
                MemberEntry::Reference(ReferenceEntry::new(entity.clone(), Arc::clone(self)))
            }
            MemberKind::CollectionNavigation => {
                MemberEntry::Collection(CollectionEntry::new(entity.clone(), Arc::clone(self)))
            }
        }
    }
}
