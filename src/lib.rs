pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod model;
pub mod query;
pub mod seed;
pub mod store;
pub mod tracker;
pub mod values;

// Export the entry API
pub use context::TrackingContext;
pub use entry::{
    CollectionEntry, EntityEntry, MemberEntry, PropertyEntry, ReferenceEntry, ValidationError,
    ValidationErrorType,
};
pub use error::{EntryError, ErrorKind, Result};

// Export metadata and value containers
pub use metadata::{MemberEntryMetadata, MemberKind, MetadataRegistry};
pub use values::{DataRecord, PropertyValue, PropertyValues};

// Export all model types
pub use model::*;

// Export state tracking and query types
pub use query::{EntityQuery, QueryExecutor};
pub use store::InMemoryStore;
pub use tracker::{EntityKey, EntityState, StateManager};

#[cfg(test)]
mod test_support;
