use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Bytes,
    Json,
    /// A complex (value-object) property whose shape is the named complex class
    Complex(String),
}

impl DataType {
    /// Type name used for assignability checks (complex types use their class name)
    pub fn type_name(&self) -> &str {
        match self {
            DataType::String => "String",
            DataType::Number => "Number",
            DataType::Boolean => "Boolean",
            DataType::Bytes => "Bytes",
            DataType::Json => "Json",
            DataType::Complex(class) => class,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::Complex(_))
    }
}

/// Which object accessors exist for a property.
///
/// `None` marks a shadow-state property: it exists in the model only and its
/// values live in the tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
    None,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Multiplicity {
    One,
    ZeroOrOne,
    Many,
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}
