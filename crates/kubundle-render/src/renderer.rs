//! Bundle renderer
//!
//! Rendering runs in a fixed order:
//!
//! 1. structural bundle checks, all findings reported together
//! 2. bundle support preflight
//! 3. user configuration, validated against the bundle schema even when
//!    absent, feeding target namespaces and the deployment overlay
//! 4. option validation against the supported install modes
//! 5. the generator pipeline, stopping at the first error

use kubundle_core::{InstallModeType, RegistryV1, SchemaProvider, parse_config};

use crate::error::{RenderError, Result};
use crate::generators::{ResourceGenerator, generate_all, registry_v1_generators};
use crate::object::Object;
use crate::options::RenderOptions;
use crate::validators::{BundleValidator, registry_v1_validator};

/// Turns a bundle into install-ready objects
#[derive(Debug, Clone)]
pub struct BundleRenderer {
    pub validator: BundleValidator,
    pub generators: Vec<ResourceGenerator>,
}

impl Default for BundleRenderer {
    fn default() -> Self {
        registry_v1_renderer()
    }
}

/// Renderer wired with the standard registry+v1 checks and generators
pub fn registry_v1_renderer() -> BundleRenderer {
    BundleRenderer {
        validator: registry_v1_validator(),
        generators: registry_v1_generators(),
    }
}

impl BundleRenderer {
    pub fn render(&self, bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
        self.validator.validate(bundle)?;
        check_bundle_support(bundle, options)?;

        let options = apply_user_config(bundle, options)?;

        let errors = options.validate(&bundle.install_mode_set());
        if !errors.is_empty() {
            return Err(RenderError::InvalidOptions(errors));
        }

        let objects = generate_all(&self.generators, bundle, &options)?;

        tracing::debug!(
            package = %bundle.package_name,
            csv = bundle.csv_name(),
            namespace = %options.install_namespace,
            targets = %options.target_namespaces().join(","),
            objects = objects.len(),
            "rendered bundle"
        );
        for object in &objects {
            tracing::trace!(object = %object.display_key(), "rendered object");
        }

        Ok(objects)
    }
}

/// Reject bundles using features the renderer cannot install
fn check_bundle_support(bundle: &RegistryV1, options: &RenderOptions) -> Result<()> {
    if !bundle.csv.spec.api_service_definitions.owned.is_empty() {
        return Err(RenderError::UnsupportedBundle(
            "apiServiceDefinitions are not supported".to_string(),
        ));
    }

    if !bundle.webhook_definitions().is_empty() && options.certificate_provider().is_none() {
        tracing::warn!(
            package = %bundle.package_name,
            webhooks = bundle.webhook_definitions().len(),
            "bundle declares webhooks but no certificate provider is configured"
        );
        return Err(RenderError::UnsupportedBundle(
            "webhookDefinitions are not supported: no certificate provider is configured"
                .to_string(),
        ));
    }

    let modes = bundle.install_mode_set();
    let installable = [
        InstallModeType::AllNamespaces,
        InstallModeType::SingleNamespace,
        InstallModeType::OwnNamespace,
    ];
    if !installable.iter().any(|mode| modes.supports(*mode)) {
        return Err(RenderError::UnsupportedBundle(
            "bundle must support at least one of [AllNamespaces SingleNamespace OwnNamespace] install modes"
                .to_string(),
        ));
    }

    Ok(())
}

/// Fold validated user configuration into the options
///
/// Missing configuration is validated as `{}` so required fields are enforced.
/// Validation is skipped only when no configuration was given and the caller
/// chose target namespaces explicitly. Explicit options take precedence over
/// configuration values.
fn apply_user_config(bundle: &RegistryV1, options: &RenderOptions) -> Result<RenderOptions> {
    let mut options = options.clone();
    if options.raw_config.is_none() && options.target_namespaces.is_some() {
        return Ok(options);
    }

    let schema = bundle.get_config_schema()?;
    let config = parse_config(
        options.raw_config.as_deref(),
        Some(&schema),
        &options.install_namespace,
    )?;

    if let (None, Some(namespace)) = (&options.target_namespaces, config.watch_namespace()) {
        options.target_namespaces = Some(vec![namespace.to_string()]);
    }

    if options.deployment_config.is_none() {
        options.deployment_config = config.typed_deployment_config()?;
    }

    Ok(options)
}
