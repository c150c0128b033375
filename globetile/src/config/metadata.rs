//! JSON metadata file written beside a cached dataset.
//!
//! The file holds the full [`LayerConfig`] so a dataset cached earlier can be
//! reopened offline without the original service description.

use std::fs;
use std::path::Path;

use super::{ConfigError, LayerConfig};

/// File name of the metadata file inside the dataset's cache directory.
pub const METADATA_FILE_NAME: &str = "layer.json";

impl LayerConfig {
    /// Reads and validates a metadata file.
    pub fn read_metadata(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: LayerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises the configuration as pretty-printed JSON.
    pub fn to_metadata_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the metadata file, creating parent directories.
    ///
    /// The content goes to a temporary sibling first and is renamed into
    /// place, so readers never observe a partially written file.
    pub fn write_metadata(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_metadata_json()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a configuration file, choosing the format by extension:
    /// `.json` is read as metadata, anything else as INI.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::read_metadata(path),
            _ => Self::load_ini(path),
        }
    }
}
