use log::debug;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::entry::EntityEntry;
use crate::error::Result;
use crate::metadata::MetadataRegistry;
use crate::model::ObjectRef;
use crate::query::{EntityQuery, QueryExecutor};
use crate::tracker::StateManager;
use crate::values::DataRecord;

/// One unit of work: a model, the tracking records of its entities and the
/// data source their stored values come from.
pub struct TrackingContext {
    registry: Arc<MetadataRegistry>,
    state_manager: StateManager,
    executor: Arc<dyn QueryExecutor>,
    config: TrackerConfig,
}

impl TrackingContext {
    pub fn new(
        registry: Arc<MetadataRegistry>,
        executor: Arc<dyn QueryExecutor>,
        config: TrackerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state_manager: StateManager::new(Arc::clone(&registry)),
            registry,
            executor,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn container_name(&self) -> &str {
        &self.config.query.container_name
    }

    /// Entry for any entity object, tracked or not
    pub fn entry(self: &Arc<Self>, object: &ObjectRef) -> Result<EntityEntry> {
        if self.config.tracking.auto_detect_changes {
            self.detect_changes();
        }
        EntityEntry::new(Arc::clone(self), Arc::clone(object))
    }

    /// Entries for every tracked entity, in tracking order
    pub fn entries(self: &Arc<Self>) -> Vec<EntityEntry> {
        if self.config.tracking.auto_detect_changes {
            self.detect_changes();
        }
        self.state_manager
            .entries()
            .iter()
            .filter_map(|entry| {
                let object = Arc::clone(entry.read().entity());
                EntityEntry::new(Arc::clone(self), object).ok()
            })
            .collect()
    }

    pub fn add(self: &Arc<Self>, object: &ObjectRef) -> Result<EntityEntry> {
        self.state_manager.add(object)?;
        EntityEntry::new(Arc::clone(self), Arc::clone(object))
    }

    pub fn attach(self: &Arc<Self>, object: &ObjectRef) -> Result<EntityEntry> {
        self.state_manager.attach(object)?;
        EntityEntry::new(Arc::clone(self), Arc::clone(object))
    }

    pub fn detect_changes(&self) -> usize {
        self.state_manager.detect_changes()
    }

    pub fn accept_all_changes(&self) -> Result<()> {
        self.state_manager.accept_all_changes()
    }

    pub(crate) fn execute(&self, query: &EntityQuery) -> Result<Vec<DataRecord>> {
        if self.config.query.log_queries {
            debug!("Executing query: {}", query.text);
        }
        Ok(self.executor.execute(query)?)
    }
}
