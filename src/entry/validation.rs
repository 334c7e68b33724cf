use serde::{Deserialize, Serialize};

/// One failed check reported by `validate` on an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted member path, e.g. `Home.City`
    pub property: String,
    pub error_type: ValidationErrorType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    MissingRequiredProperty,
    MissingRequiredReference,
}
