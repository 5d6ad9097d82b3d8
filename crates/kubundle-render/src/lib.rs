//! Kubundle Render - turns registry+v1 bundles into install-ready Kubernetes objects
//!
//! This crate provides:
//! - **Renderer**: validation, preflight, configuration and generation in one call
//! - **Validators**: structural bundle checks reported as a single batch
//! - **Generators**: service accounts, RBAC, CRDs, deployments, webhooks and services
//! - **Options**: install/target namespaces, certificate provider, naming and overlays
//! - **Objects**: a closed set of typed Kubernetes objects plus unstructured passthrough

pub mod certificate;
pub mod error;
pub mod generators;
pub mod object;
pub mod options;
pub mod overlay;
pub mod renderer;
pub mod resources;
pub mod validators;

pub use certificate::{
    CertSecretInfo, CertificateProvider, CertificateProvisioner, CertificateProvisionerConfig,
};
pub use error::{RenderError, Result};
pub use generators::{ResourceGenerator, generate_all, registry_v1_generators};
pub use object::Object;
pub use options::{RenderOptions, UniqueNameGenerator, default_unique_name_generator};
pub use overlay::apply_deployment_config;
pub use renderer::{BundleRenderer, registry_v1_renderer};
pub use resources::{Proxy, ResourceOption};
pub use validators::{BundleCheck, BundleValidator, registry_v1_validator};
