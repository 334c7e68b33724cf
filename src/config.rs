use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub tracking: TrackingConfig,
    pub query: QueryConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Run change detection before handing out entries
    pub auto_detect_changes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Entity container named in generated queries
    pub container_name: String,
    pub log_queries: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// JSON schema file; the demo model is used when unset
    pub path: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            container_name: "Model".to_string(),
            log_queries: true,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from defaults, an optional `tracker` config file and
    /// `TRACKER_` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&TrackerConfig::default())?);

        config = config.add_source(config::File::with_name("tracker").required(false));

        // nested keys use `__`, e.g. TRACKER_QUERY__CONTAINER_NAME
        config = config.add_source(
            config::Environment::with_prefix("TRACKER")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let tracker_config: TrackerConfig = config.try_deserialize()?;

        Ok(tracker_config)
    }

    /// Read the schema named by `model.path`, if any
    pub fn load_schema(&self) -> anyhow::Result<Option<crate::model::Schema>> {
        let Some(path) = &self.model.path else {
            return Ok(None);
        };
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read model file '{path}': {e}"))?;
        Ok(Some(crate::model::Schema::from_json(&json)?))
    }
}
