//! OpenSearch index configuration and mappings.

use serde_json::{json, Value};

/// Configuration for the target index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The base name of the index (without version suffix).
    pub name: String,
    /// The version number for the index (e.g., 0 for "events_v0").
    pub version: u32,
}

impl IndexConfig {
    /// Create a new index configuration.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// The versioned physical index name, e.g. "events_v0".
    pub fn physical_name(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }
}

/// Index settings and mappings for the event index.
///
/// Records arriving from the log carry arbitrary JSON payloads, so the
/// mapping stays dynamic; only the sharding layout is pinned.
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "dynamic": true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_name() {
        assert_eq!(IndexConfig::new("events", 0).physical_name(), "events_v0");
        assert_eq!(IndexConfig::new("events", 3).physical_name(), "events_v3");
        assert_eq!(IndexConfig::new("access-log", 12).physical_name(), "access-log_v12");
    }

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings();
        assert!(settings["settings"]["number_of_shards"].is_number());
        assert!(settings["settings"]["number_of_replicas"].is_number());
        assert_eq!(settings["mappings"]["dynamic"], true);
    }
}
