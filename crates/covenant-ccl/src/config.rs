//! Engine configuration structures

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ast::Document;
use crate::error::{CclError, ConfigError};
use crate::evaluator::{Evaluator, EvaluatorOptions};
use crate::parser::{parse_with, ParserOptions, MAX_CONDITION_DEPTH};

/// Top-level engine configuration, usually read from a YAML file:
///
/// ```yaml
/// parser:
///   max_condition_depth: 16
///   strict_time_units: true
/// evaluator:
///   limit_count_key: usage.count
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Parser settings
    #[serde(default)]
    pub parser: ParserOptions,

    /// Evaluator settings
    #[serde(default)]
    pub evaluator: EvaluatorOptions,
}

impl EngineConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Try to load config, returning the default if the file is missing or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring engine config");
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let depth = self.parser.max_condition_depth;
        if depth == 0 || depth > MAX_CONDITION_DEPTH {
            return Err(ConfigError::Invalid {
                field: "parser.max_condition_depth".to_string(),
                reason: format!("must be between 1 and {}", MAX_CONDITION_DEPTH),
            });
        }
        for (field, key) in [
            ("evaluator.limit_count_key", &self.evaluator.limit_count_key),
            ("evaluator.obligations_key", &self.evaluator.obligations_key),
        ] {
            if key.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parse CCL source under these settings.
    pub fn parse(&self, source: &str) -> Result<Document, CclError> {
        parse_with(source, &self.parser)
    }

    /// Build an evaluator with these settings.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.evaluator.clone())
    }
}
