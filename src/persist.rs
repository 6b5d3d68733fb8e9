//! Settings that survive a restart. The control loop only reads them; the
//! store owner (startup, configuration front ends) writes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::color::BLACK;
use crate::pattern::Pattern;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistConfig {
    pub pattern: Pattern,
    /// Packed `0xRRGGBB`
    pub solid_color: u32,
}

impl Default for PersistConfig {
    fn default() -> Self {
        PersistConfig {
            pattern: Pattern::Test,
            solid_color: BLACK,
        }
    }
}

pub trait PersistStore {
    fn read(&mut self) -> Result<PersistConfig>;
    fn write(&mut self, config: &PersistConfig) -> Result<()>;
}

/// Settings kept as a JSON document on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }
}

impl PersistStore for JsonFileStore {
    /// A missing or unreadable document reverts to defaults and is rewritten
    fn read(&mut self) -> Result<PersistConfig> {
        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<PersistConfig>(&text).map_err(anyhow::Error::from));

        match parsed {
            Ok(config) => {
                info!(path = %self.path.display(), ?config, "loaded persisted settings");
                Ok(config)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "persisted settings unusable, reverting to defaults");
                let config = PersistConfig::default();
                self.write(&config)?;
                Ok(config)
            }
        }
    }

    fn write(&mut self, config: &PersistConfig) -> Result<()> {
        let text = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, text).context(format!("Failed to write {}", self.path.display()))?;
        info!(path = %self.path.display(), "persisted settings written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::GREEN;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.json");
        let mut store = JsonFileStore::new(&path);

        assert_eq!(store.read().unwrap(), PersistConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("persist.json"));
        let config = PersistConfig {
            pattern: Pattern::Solid,
            solid_color: GREEN,
        };
        store.write(&config).unwrap();
        assert_eq!(store.read().unwrap(), config);
    }

    #[test]
    fn test_garbage_reverts_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.json");
        fs::write(&path, "bC\u{1}\u{2}").unwrap();

        let mut store = JsonFileStore::new(&path);
        assert_eq!(store.read().unwrap(), PersistConfig::default());
        let rewritten: PersistConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten, PersistConfig::default());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: PersistConfig = serde_json::from_str(r#"{ "pattern": "solid" }"#).unwrap();
        assert_eq!(config.pattern, Pattern::Solid);
        assert_eq!(config.solid_color, BLACK);
    }
}
