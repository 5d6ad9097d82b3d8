//! Kubundle Core - registry+v1 bundle model and configuration contract
//!
//! This crate provides the foundational types used by the renderer:
//! - `RegistryV1`: The bundle (CSV + owned CRDs + other manifests)
//! - `build_config_schema`: Install-mode aware configuration schema
//! - `parse_config`: Format-agnostic configuration parsing and validation
//! - `DeploymentConfig`: Typed deployment overrides
//! - `naming`: Kubernetes naming rules shared by validators and generators

pub mod bundle;
pub mod config;
pub mod config_schema;
pub mod deployment_config;
pub mod error;
pub mod naming;
pub mod schema;

pub use bundle::{
    ClusterServiceVersion, InstallMode, InstallModeSet, InstallModeType, RegistryV1,
    StrategyDeploymentPermissions, StrategyDeploymentSpec, WebhookAdmissionType,
    WebhookDescription,
};
pub use config::{ParsedConfig, parse_config};
pub use config_schema::{SchemaProvider, build_config_schema};
pub use deployment_config::DeploymentConfig;
pub use error::{ConfigError, CoreError, Result};
pub use schema::SchemaMap;
