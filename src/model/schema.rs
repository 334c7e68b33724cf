use crate::model::{Access, ClassDef, DataType, Multiplicity};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Namespace of the model's types, also used as the entity container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Collection of class/type definitions
    pub classes: Vec<ClassDef>,
    /// Optional schema description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            classes: Vec::new(),
            description: None,
        }
    }

    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    /// Parse a schema from its JSON description
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a class definition by name
    pub fn get_class(&self, class_name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|class| class.name == class_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// `false` for object-only properties the tracking record knows nothing about
    #[serde(default = "default_true")]
    pub mapped: bool,
    #[serde(default)]
    pub access: Access,
}

impl PropertyDef {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            mapped: true,
            access: Access::ReadWrite,
        }
    }

    pub fn complex(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            nullable: false,
            ..Self::scalar(name, DataType::Complex(class.into()))
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unmapped(mut self) -> Self {
        self.mapped = false;
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn is_complex(&self) -> bool {
        self.data_type.is_complex()
    }
}

/// Pairs a property on the declaring entity with a property on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Entity class at the other end of the navigation
    pub target: String,
    pub multiplicity: Multiplicity,
    /// Equality conditions linking this entity to related rows
    #[serde(default)]
    pub join: Vec<JoinColumn>,
}

impl RelationshipDef {
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            multiplicity: Multiplicity::ZeroOrOne,
            join: Vec::new(),
        }
    }

    pub fn collection(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            multiplicity: Multiplicity::Many,
            ..Self::reference(name, target)
        }
    }

    pub fn required(mut self) -> Self {
        self.multiplicity = Multiplicity::One;
        self
    }

    pub fn join_on(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.join.push(JoinColumn {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn is_collection(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_deserializes_with_defaults() {
        let json = r#"{
            "name": "Shop",
            "classes": [
                {
                    "name": "Customer",
                    "kind": "entity",
                    "key": ["Id"],
                    "properties": [
                        {"name": "Id", "data_type": "Number", "nullable": false},
                        {"name": "Notes", "data_type": "String", "access": "none"},
                        {"name": "Home", "data_type": {"Complex": "Address"}}
                    ],
                    "relationships": [
                        {"name": "Orders", "target": "Order", "multiplicity": "MANY",
                         "join": [{"source": "Id", "target": "CustomerId"}]}
                    ]
                },
                {"name": "Address", "kind": "complex",
                 "properties": [{"name": "City", "data_type": "String"}]}
            ]
        }"#;

        let schema = Schema::from_json(json).unwrap();
        let customer = schema.get_class("Customer").unwrap();
        assert!(customer.is_entity());
        assert_eq!(customer.key, vec!["Id".to_string()]);

        let notes = customer.get_property("Notes").unwrap();
        assert!(notes.mapped);
        assert!(notes.nullable);
        assert_eq!(notes.access, Access::None);

        let home = customer.get_property("Home").unwrap();
        assert_eq!(home.data_type, DataType::Complex("Address".to_string()));

        let orders = customer.get_relationship("Orders").unwrap();
        assert!(orders.is_collection());
        assert_eq!(orders.join[0].target, "CustomerId");
    }
}
