//! Certificate provider seam
//!
//! Webhook-serving deployments need a TLS certificate and the objects calling
//! them (webhook configurations, converting CRDs) need the matching CA bundle.
//! Issuing certificates is left to a [`CertificateProvider`]; the renderer only
//! decides names and asks the provider to decorate objects.

use kube::core::DynamicObject;
use kubundle_core::naming::object_name_for_base_and_suffix;

use crate::error::Result;
use crate::object::Object;
use crate::options::RenderOptions;

/// Where a provider stores the serving certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSecretInfo {
    pub secret_name: String,
    pub certificate_key: String,
    pub private_key_key: String,
}

/// Naming handed to the provider for one webhook-serving deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateProvisionerConfig {
    pub webhook_service_name: String,
    pub cert_name: String,
    pub namespace: String,
}

/// Issues serving certificates for webhook deployments
pub trait CertificateProvider: Send + Sync {
    /// Add whatever the provider needs for CA injection to `object`
    fn inject_ca_bundle(&self, object: &mut Object, config: &CertificateProvisionerConfig) -> Result<()>;

    /// Extra objects the provider relies on (issuers, certificates, ...)
    fn additional_objects(&self, config: &CertificateProvisionerConfig) -> Result<Vec<DynamicObject>>;

    /// Secret holding the serving certificate
    fn get_cert_secret_info(&self, config: &CertificateProvisionerConfig) -> CertSecretInfo;
}

/// A provider bound to the naming of one deployment
///
/// Without a provider every operation is a no-op.
pub struct CertificateProvisioner<'a> {
    provider: Option<&'a dyn CertificateProvider>,
    config: CertificateProvisionerConfig,
}

impl<'a> CertificateProvisioner<'a> {
    pub fn new(
        provider: Option<&'a dyn CertificateProvider>,
        deployment_name: &str,
        namespace: &str,
    ) -> Self {
        let webhook_service_name =
            object_name_for_base_and_suffix(&deployment_name.replace('.', "-"), "service");
        let cert_name = object_name_for_base_and_suffix(&webhook_service_name, "cert");

        Self {
            provider,
            config: CertificateProvisionerConfig {
                webhook_service_name,
                cert_name,
                namespace: namespace.to_string(),
            },
        }
    }

    /// Name of the Service fronting the deployment's webhooks
    pub fn service_name(&self) -> &str {
        &self.config.webhook_service_name
    }

    pub fn cert_name(&self) -> &str {
        &self.config.cert_name
    }

    pub fn config(&self) -> &CertificateProvisionerConfig {
        &self.config
    }

    pub fn inject_ca_bundle(&self, object: &mut Object) -> Result<()> {
        match self.provider {
            Some(provider) => provider.inject_ca_bundle(object, &self.config),
            None => Ok(()),
        }
    }

    pub fn get_cert_secret_info(&self) -> Option<CertSecretInfo> {
        self.provider
            .map(|provider| provider.get_cert_secret_info(&self.config))
    }

    pub fn additional_objects(&self) -> Result<Vec<DynamicObject>> {
        match self.provider {
            Some(provider) => provider.additional_objects(&self.config),
            None => Ok(Vec::new()),
        }
    }
}

/// Provisioner for `deployment_name` under the given render options
pub fn cert_provisioner_for<'a>(
    deployment_name: &str,
    options: &'a RenderOptions,
) -> CertificateProvisioner<'a> {
    CertificateProvisioner::new(
        options.certificate_provider(),
        deployment_name,
        &options.install_namespace,
    )
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::{FakeCertProvider, INJECT_ANNOTATION};
    use super::*;
    use crate::resources::create_service;

    #[test]
    fn test_names() {
        let provisioner = CertificateProvisioner::new(None, "my.deployment.thing", "ns");
        assert_eq!(provisioner.service_name(), "my-deployment-thing-service");
        assert_eq!(provisioner.cert_name(), "my-deployment-thing-service-cert");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let provisioner = CertificateProvisioner::new(
            None,
            "my.object.thing.has.a.really.really.really.really.really.long.name",
            "ns",
        );
        assert_eq!(
            provisioner.service_name(),
            "my-object-thing-has-a-really-really-really-really-reall-service"
        );
        assert_eq!(
            provisioner.cert_name(),
            "my-object-thing-has-a-really-really-really-really-reall-se-cert"
        );
        assert_eq!(provisioner.cert_name().len(), 63);
    }

    #[test]
    fn test_without_provider_is_noop() {
        let provisioner = CertificateProvisioner::new(None, "webhook", "ns");
        let mut service = create_service("svc", "ns", []).unwrap();
        let before = service.clone();

        provisioner.inject_ca_bundle(&mut service).unwrap();

        assert_eq!(service, before);
        assert!(provisioner.get_cert_secret_info().is_none());
        assert!(provisioner.additional_objects().unwrap().is_empty());
    }

    #[test]
    fn test_with_provider_delegates() {
        let options = RenderOptions::new("operators")
            .with_certificate_provider(Arc::new(FakeCertProvider));
        let provisioner = cert_provisioner_for("webhook", &options);

        let mut service = create_service("svc", "operators", []).unwrap();
        provisioner.inject_ca_bundle(&mut service).unwrap();
        assert_eq!(
            service.metadata().annotations.as_ref().unwrap()[INJECT_ANNOTATION],
            "operators/webhook-service-cert"
        );

        let info = provisioner.get_cert_secret_info().unwrap();
        assert_eq!(info.secret_name, "webhook-service-cert");

        let objects = provisioner.additional_objects().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].metadata.namespace.as_deref(), Some("operators"));
    }
}
