//! Shared fixtures for unit tests, built on the demo model.

use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::context::TrackingContext;
use crate::metadata::MetadataRegistry;
use crate::model::Schema;
use crate::store::InMemoryStore;

pub use crate::seed::{address, order, person};

pub fn person_schema() -> Schema {
    crate::seed::demo_schema()
}

pub fn registry() -> Arc<MetadataRegistry> {
    Arc::new(MetadataRegistry::build(person_schema()).expect("demo schema is valid"))
}

/// A context over an empty in-memory store, with default configuration
pub fn context() -> (Arc<TrackingContext>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let context = TrackingContext::new(registry(), store.clone(), TrackerConfig::default());
    (context, store)
}
