//! Resource generators
//!
//! Each generator turns one aspect of a registry+v1 bundle into Kubernetes
//! objects. Generators never mutate the bundle; anything they change is
//! cloned first. [`registry_v1_generators`] lists them in pipeline order:
//!
//! 1. service accounts
//! 2. namespaced permissions (Role / RoleBinding)
//! 3. cluster permissions (ClusterRole / ClusterRoleBinding)
//! 4. CRDs
//! 5. passthrough manifests
//! 6. deployments
//! 7. validating webhooks
//! 8. mutating webhooks
//! 9. webhook services
//! 10. certificate provider objects

mod additional;
mod crds;
mod deployments;
mod rbac;
mod webhooks;

pub use additional::{additional_resources_generator, supported_kind};
pub use crds::crd_generator;
pub use deployments::deployment_generator;
pub use rbac::{cluster_permissions_generator, permissions_generator, service_account_generator};
pub use webhooks::{
    cert_provider_resource_generator, mutating_webhook_generator, service_generator,
    validating_webhook_generator,
};

use kubundle_core::RegistryV1;

use crate::error::Result;
use crate::object::Object;
use crate::options::RenderOptions;

/// A single generation step
pub type ResourceGenerator = fn(&RegistryV1, &RenderOptions) -> Result<Vec<Object>>;

/// The standard registry+v1 generators, in pipeline order
pub fn registry_v1_generators() -> Vec<ResourceGenerator> {
    vec![
        service_account_generator,
        permissions_generator,
        cluster_permissions_generator,
        crd_generator,
        additional_resources_generator,
        deployment_generator,
        validating_webhook_generator,
        mutating_webhook_generator,
        service_generator,
        cert_provider_resource_generator,
    ]
}

/// Run generators in order and concatenate their output, stopping at the first error
pub fn generate_all(
    generators: &[ResourceGenerator],
    bundle: &RegistryV1,
    options: &RenderOptions,
) -> Result<Vec<Object>> {
    tracing::debug!(generators = generators.len(), "running generator pipeline");

    let mut objects = Vec::new();
    for (step, generator) in generators.iter().enumerate() {
        let generated = generator(bundle, options)?;
        tracing::debug!(step, objects = generated.len(), "generator finished");
        objects.extend(generated);
    }
    Ok(objects)
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::{keys, widget_bundle};
    use super::*;
    use crate::certificate::testing::FakeCertProvider;

    #[test]
    fn test_pipeline_order() {
        let options = RenderOptions::new("operators")
            .with_certificate_provider(Arc::new(FakeCertProvider))
            .with_unique_name_generator(|base, _| Ok(base.to_string()));

        let objects = generate_all(&registry_v1_generators(), &widget_bundle(), &options).unwrap();

        assert_eq!(
            keys(&objects),
            vec![
                "ServiceAccount/widget-operator",
                "ServiceAccount/widget-reader",
                "ClusterRole/widget-operator.v1.0.0-widget-reader",
                "ClusterRoleBinding/widget-operator.v1.0.0-widget-reader",
                "ClusterRole/widget-operator.v1.0.0-widget-operator",
                "ClusterRoleBinding/widget-operator.v1.0.0-widget-operator",
                "ClusterRole/widget-operator.v1.0.0-default",
                "ClusterRoleBinding/widget-operator.v1.0.0-default",
                "CustomResourceDefinition/widgets.example.com",
                "ConfigMap/widget-defaults",
                "ClusterRole/widget-viewer",
                "Deployment/widget-controller",
                "ValidatingWebhookConfiguration/vwidget.example.com",
                "MutatingWebhookConfiguration/mwidget.example.com",
                "Service/widget-controller-service",
                "Certificate/widget-controller-service-cert",
            ]
        );
    }

    #[test]
    fn test_first_error_stops() {
        fn failing(_: &RegistryV1, _: &RenderOptions) -> Result<Vec<Object>> {
            Err(crate::error::RenderError::CertificateProvider("boom".into()))
        }
        fn unreachable_generator(_: &RegistryV1, _: &RenderOptions) -> Result<Vec<Object>> {
            panic!("generator after a failure must not run");
        }

        let err = generate_all(
            &[service_account_generator, failing, unreachable_generator],
            &widget_bundle(),
            &RenderOptions::new("operators"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "certificate provider error: boom");
    }
}
