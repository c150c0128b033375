//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading, validating or persisting a layer
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse an INI file.
    #[error("Failed to read config file: {0}")]
    Ini(#[from] ini::Error),

    /// Failed to read or write a metadata file.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialise the JSON metadata file.
    #[error("Invalid metadata file: {0}")]
    Json(#[from] serde_json::Error),

    /// The metadata file could not be placed in the file store.
    #[error("File store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// The INI file has no `[layer]` section.
    #[error("Missing [{0}] section")]
    MissingSection(String),

    /// A key holds a value that cannot be parsed.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// The configuration parsed but describes an unusable layer.
    #[error("Invalid layer configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            section: "layer".to_string(),
            key: "tile_width".to_string(),
            value: "wide".to_string(),
            reason: "must be a positive integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: layer.tile_width = 'wide' - must be a positive integer"
        );
    }

    #[test]
    fn test_invalid_display() {
        let err = ConfigError::invalid("num_levels", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid layer configuration: num_levels must be at least 1"
        );
    }
}
