//! Scan configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Default batch capacity in rows.
pub const DEFAULT_VECTOR_SIZE: usize = 2048;

/// Result format requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// Binary COPY.
    #[default]
    Binary,
    /// Plain query with text cells.
    Text,
    /// Binary for PostgreSQL servers, text for anything else.
    Auto,
}

/// Scan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Rows per batch
    pub vector_size: usize,
    /// Wire format for results
    pub format: ResultFormat,
    /// Read every remote array as its text literal
    pub array_as_varchar: bool,
    /// Log issued queries at info level
    pub debug_show_queries: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            vector_size: DEFAULT_VECTOR_SIZE,
            format: ResultFormat::Binary,
            array_as_varchar: false,
            debug_show_queries: false,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ScanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the batch capacity.
    pub fn vector_size(mut self, rows: usize) -> Self {
        self.vector_size = rows;
        self
    }

    /// Set the result format.
    pub fn format(mut self, format: ResultFormat) -> Self {
        self.format = format;
        self
    }

    /// Read arrays as text.
    pub fn array_as_varchar(mut self, enabled: bool) -> Self {
        self.array_as_varchar = enabled;
        self
    }

    /// Log issued queries at info level.
    pub fn debug_show_queries(mut self, enabled: bool) -> Self {
        self.debug_show_queries = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_size == 0 {
            return Err(ScanError::Config(
                "vector_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.vector_size, 2048);
        assert_eq!(config.format, ResultFormat::Binary);
        assert!(!config.array_as_varchar);
    }

    #[test]
    fn test_builder() {
        let config = ScanConfig::new()
            .vector_size(16)
            .format(ResultFormat::Text)
            .array_as_varchar(true);
        assert_eq!(config.vector_size, 16);
        assert_eq!(config.format, ResultFormat::Text);
        assert!(config.array_as_varchar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = ScanConfig::from_json(r#"{"format": "auto", "debug_show_queries": true}"#)
            .unwrap();
        assert_eq!(config.format, ResultFormat::Auto);
        assert!(config.debug_show_queries);
        assert_eq!(config.vector_size, DEFAULT_VECTOR_SIZE);
    }

    #[test]
    fn test_from_json_rejects_zero_vector_size() {
        let err = ScanConfig::from_json(r#"{"vector_size": 0}"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_from_json_bad_format() {
        let err = ScanConfig::from_json(r#"{"format": "csv"}"#).unwrap_err();
        assert!(matches!(err, ScanError::Json(_)));
    }
}
