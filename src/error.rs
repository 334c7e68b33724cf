use thiserror::Error;

use crate::tracker::EntityState;

pub type Result<T> = std::result::Result<T, EntryError>;

/// Coarse classification of an [`EntryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown member, or a member of the wrong kind.
    NotFound,
    /// The entity's lifecycle state does not allow the operation.
    StateConflict,
    /// Requested and actual types are not assignable.
    TypeMismatch,
    /// A nested value container is missing or null where one is required.
    InvariantViolation,
    /// Neither an object accessor nor the tracking record can serve the value.
    NoAccessor,
    /// The query executor failed or returned an unexpected shape.
    Query,
    /// The model could not be built.
    Model,
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("the property '{property}' does not exist on type '{class}'")]
    PropertyNotFound { property: String, class: String },

    #[error("the member '{member}' is not a property or navigation property of type '{class}'")]
    NotAProperty { member: String, class: String },

    #[error("the property '{property}' on type '{class}' is not a scalar or complex property")]
    NotAScalarProperty { property: String, class: String },

    #[error("the property '{property}' on type '{class}' is not a complex property")]
    NotAComplexProperty { property: String, class: String },

    #[error("the property '{property}' on type '{class}' is not a navigation property")]
    NotANavigationProperty { property: String, class: String },

    #[error("'{part}' in the path '{path}' is not a complex property of type '{class}'")]
    DottedPartNotComplex {
        part: String,
        path: String,
        class: String,
    },

    #[error("the path '{path}' must name a single navigation property, not a dotted path")]
    DottedPathMustBeProperty { path: String },

    #[error("'{property}' on type '{class}' is a reference navigation and cannot be used as a collection")]
    UsedCollectionForReference { property: String, class: String },

    #[error("'{property}' on type '{class}' is a collection navigation and cannot be used as a reference")]
    UsedReferenceForCollection { property: String, class: String },

    #[error("the property '{property}' on type '{class}' is not part of the model")]
    NotInModel { property: String, class: String },

    #[error("the type '{class}' is not an entity type of the model")]
    NotAnEntityType { class: String },

    #[error("'{operation}' cannot be used for an entity in the {state} state")]
    InvalidForState {
        operation: &'static str,
        state: EntityState,
    },

    #[error("'{operation}' is not supported for a detached entity of type '{class}'")]
    NotSupportedForDetached {
        operation: &'static str,
        class: String,
    },

    #[error("an entity of type '{class}' with key {key} is already tracked")]
    KeyConflict { class: String, key: String },

    #[error("'{member}' on type '{class}' is of type '{actual}' which is not assignable to '{requested}'")]
    WrongTypeRequested {
        member: String,
        class: String,
        requested: String,
        actual: String,
    },

    #[error("values of type '{actual}' cannot be copied into values of type '{expected}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("the complex property '{property}' on type '{class}' cannot be set to null")]
    ComplexObjectCannotBeNull { property: String, class: String },

    #[error("the complex property '{property}' on type '{class}' must be set from a nested property value container")]
    NestedValuesRequired { property: String, class: String },

    #[error("the nested property values for '{property}' on type '{class}' are null")]
    NestedValuesNull { property: String, class: String },

    #[error("the scalar property '{property}' on type '{class}' cannot be set from a nested property value container")]
    ScalarValueRequired { property: String, class: String },

    #[error("database values cannot be read because the complex property '{property}' on type '{class}' is null")]
    ComplexPropertyIsNull { property: String, class: String },

    #[error("the property '{property}' cannot be set because its parent '{parent}' is null")]
    CannotSetOnNullParent { property: String, parent: String },

    #[error("the current value of '{property}' on type '{class}' cannot be read: no getter and no tracking record")]
    CannotGetCurrentValue { property: String, class: String },

    #[error("the current value of '{property}' on type '{class}' cannot be set: no setter and no tracking record")]
    CannotSetCurrentValue { property: String, class: String },

    #[error("query execution failed: {0}")]
    QueryFailed(#[from] anyhow::Error),

    #[error("expected at most one row but the query returned {count}")]
    MultipleRows { count: usize },

    #[error("invalid model: {0}")]
    InvalidModel(String),
}

impl EntryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PropertyNotFound { .. }
            | Self::NotAProperty { .. }
            | Self::NotAScalarProperty { .. }
            | Self::NotAComplexProperty { .. }
            | Self::NotANavigationProperty { .. }
            | Self::DottedPartNotComplex { .. }
            | Self::DottedPathMustBeProperty { .. }
            | Self::UsedCollectionForReference { .. }
            | Self::UsedReferenceForCollection { .. }
            | Self::NotInModel { .. }
            | Self::NotAnEntityType { .. } => ErrorKind::NotFound,
            Self::InvalidForState { .. }
            | Self::NotSupportedForDetached { .. }
            | Self::KeyConflict { .. } => ErrorKind::StateConflict,
            Self::WrongTypeRequested { .. } | Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ComplexObjectCannotBeNull { .. }
            | Self::NestedValuesRequired { .. }
            | Self::NestedValuesNull { .. }
            | Self::ScalarValueRequired { .. }
            | Self::ComplexPropertyIsNull { .. }
            | Self::CannotSetOnNullParent { .. } => ErrorKind::InvariantViolation,
            Self::CannotGetCurrentValue { .. } | Self::CannotSetCurrentValue { .. } => {
                ErrorKind::NoAccessor
            }
            Self::QueryFailed(_) | Self::MultipleRows { .. } => ErrorKind::Query,
            Self::InvalidModel(_) => ErrorKind::Model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        let not_found = EntryError::PropertyNotFound {
            property: "Nope".to_string(),
            class: "Person".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(
            not_found.to_string(),
            "the property 'Nope' does not exist on type 'Person'"
        );

        let state = EntryError::InvalidForState {
            operation: "original_values",
            state: EntityState::Added,
        };
        assert_eq!(state.kind(), ErrorKind::StateConflict);
        assert!(state.to_string().contains("Added"));

        let query = EntryError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(query.kind(), ErrorKind::Query);
        assert!(query.to_string().contains("connection reset"));
    }
}
