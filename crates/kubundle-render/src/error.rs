//! Error types for kubundle-render

use kubundle_core::{ConfigError, CoreError};
use miette::Diagnostic;
use thiserror::Error;

/// Result type for kubundle-render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors that can occur while rendering a bundle
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum RenderError {
    /// One or more structural bundle checks failed
    #[error("{}", .0.join("\n"))]
    #[diagnostic(
        code(kubundle::render::bundle),
        help("every failing check is listed; fix the bundle and render again")
    )]
    BundleValidation(Vec<String>),

    /// Render options are inconsistent with the bundle
    #[error("invalid option(s): {}", .0.join("\n"))]
    #[diagnostic(code(kubundle::render::options))]
    InvalidOptions(Vec<String>),

    /// The bundle uses a feature this renderer does not install
    #[error("unsupported bundle: {0}")]
    #[diagnostic(code(kubundle::render::unsupported))]
    UnsupportedBundle(String),

    /// User configuration was rejected
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// A passthrough manifest has a kind that cannot be installed
    #[error("bundle contains unsupported resource: Name: {name}, Kind: {kind}")]
    #[diagnostic(code(kubundle::render::unsupported_resource))]
    UnsupportedResource { name: String, kind: String },

    /// A conversion webhook targets a CRD that keeps unknown fields
    #[error(
        "custom resource definition '{0}' must have .spec.preserveUnknownFields set to false to let API Server call webhook to do the conversion"
    )]
    PreserveUnknownFields(String),

    /// A CRD is claimed by more than one conversion webhook
    #[error("custom resource definition '{0}' is referenced by multiple conversion webhook definitions")]
    DuplicateConversionCrd(String),

    /// The unique name generator failed
    #[error("failed to generate name for '{base}': {message}")]
    NameGeneration { base: String, message: String },

    /// The certificate provider failed
    #[error("certificate provider error: {0}")]
    CertificateProvider(String),

    /// A resource option was applied to an object kind that does not carry it
    #[error("option '{option}' cannot be applied to {kind}")]
    UnsupportedOption { option: &'static str, kind: String },

    /// Bundle model error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(e: serde_json::Error) -> Self {
        RenderError::Serialization(e.to_string())
    }
}
