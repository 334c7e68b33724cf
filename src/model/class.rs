use crate::model::{PropertyDef, RelationshipDef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    /// Identity-bearing type stored in an entity set
    Entity,
    /// Value object embedded inside entities or other complex values
    Complex,
}

/// Represents a class/type definition within a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Name of the class/type (e.g., "Person", "Address")
    pub name: String,

    pub kind: ClassKind,

    /// Base class whose properties and relationships are inherited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Entity set storing rows of this class; defaults to the root class name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_set: Option<String>,

    /// Names of the key properties (entity classes only, declared on the root class)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<String>,

    #[serde(default)]
    pub properties: Vec<PropertyDef>,

    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClassDef {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Entity)
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Complex)
    }

    fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            entity_set: None,
            key: Vec::new(),
            properties: Vec::new(),
            relationships: Vec::new(),
            description: None,
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn in_set(mut self, entity_set: impl Into<String>) -> Self {
        self.entity_set = Some(entity_set.into());
        self
    }

    pub fn with_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = key.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn is_entity(&self) -> bool {
        self.kind == ClassKind::Entity
    }

    /// Find a property declared directly on this class
    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Find a relationship declared directly on this class
    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }
}
