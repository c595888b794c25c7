//! Resolver configuration

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ResolveError, ResolveResult};

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum interval between live-mode emissions (default: 100)
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    /// Key receiving the collection/subcollection name (default: "__typename")
    #[serde(default = "default_type_field")]
    pub type_field: String,

    /// Key preserving a stored `id` field shadowed by the document id
    /// (default: "__original_id")
    #[serde(default = "default_original_id_field")]
    pub original_id_field: String,

    /// Type tag when a node has no collection or subcollection (default: "_")
    #[serde(default = "default_fallback_type")]
    pub fallback_type: String,
}

fn default_coalesce_window_ms() -> u64 {
    100
}

fn default_type_field() -> String {
    "__typename".to_string()
}

fn default_original_id_field() -> String {
    "__original_id".to_string()
}

fn default_fallback_type() -> String {
    "_".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            type_field: default_type_field(),
            original_id_field: default_original_id_field(),
            fallback_type: default_fallback_type(),
        }
    }
}

impl ResolverConfig {
    /// Create a config with the given coalescing window
    pub fn with_coalesce_window(window: Duration) -> Self {
        Self {
            coalesce_window_ms: window.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Parses and validates a JSON config
    pub fn from_json_str(json: &str) -> ResolveResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ResolveError::Config(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file
    pub fn from_file(path: &Path) -> ResolveResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ResolveError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> ResolveResult<()> {
        if self.coalesce_window_ms == 0 {
            return Err(ResolveError::Config(
                "coalesce_window_ms must be greater than zero".into(),
            ));
        }
        for (name, value) in [
            ("type_field", &self.type_field),
            ("original_id_field", &self.original_id_field),
        ] {
            if value.is_empty() {
                return Err(ResolveError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.type_field == self.original_id_field {
            return Err(ResolveError::Config(
                "type_field and original_id_field must differ".into(),
            ));
        }
        Ok(())
    }
}
