//! Core error types

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while loading bundles and building schemas
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// A manifest could not be interpreted
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A bundle must carry exactly one ClusterServiceVersion
    #[error("bundle must contain exactly one ClusterServiceVersion, found {count}")]
    CsvCount { count: usize },

    /// The embedded base configuration schema is broken (build defect)
    #[error("embedded configuration schema is malformed: {0}")]
    BaseSchema(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// User-facing configuration errors
///
/// Every variant renders with a leading `invalid configuration:` so the
/// message can be surfaced as-is in status conditions.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Raw configuration failed to parse or to validate
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(kubundle::config::invalid),
        help("check the configuration against the bundle's configuration schema")
    )]
    Invalid { message: String },

    /// The schema supplied by the bundle format does not compile
    #[error("invalid configuration: schema could not be compiled: {message}")]
    #[diagnostic(code(kubundle::config::schema))]
    Schema { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }
}
