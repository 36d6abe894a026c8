use error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path};
pub mod error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discard {
    /// Upper bound on how many times the boundary resolver re-reads a transaction's chain tail while its
    /// log's insert position is attributed to a newer transaction. Once exhausted, the log is left as is
    /// until the next discard pass.
    #[serde(rename = "refetch-limit")]
    pub refetch_limit: u32,
}

impl Default for Discard {
    fn default() -> Self {
        Self { refetch_limit: 16 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub discard: Discard,
}

impl Configuration {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        let mut config: Configuration = serde_yaml::from_str(content)?;
        config.check_and_apply()?;
        Ok(config)
    }

    /// Load and check configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let file = File::open(path)?;
        let mut config: Configuration = serde_yaml::from_reader(file)?;
        config.check_and_apply()?;
        Ok(config)
    }

    /// Check and apply the configuration.
    pub fn check_and_apply(&mut self) -> Result<(), ConfigurationError> {
        if self.discard.refetch_limit == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "discard.refetch-limit",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
