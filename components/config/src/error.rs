use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("`{key}` is invalid: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Malformed YAML configuration")]
    Yaml(#[from] serde_yaml::Error),

    #[error("An IO error raised")]
    Io(#[from] std::io::Error),
}
