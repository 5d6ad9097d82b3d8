//! CustomResourceDefinitions

use std::collections::BTreeMap;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceConversion, ServiceReference, WebhookClientConfig, WebhookConversion,
};
use kubundle_core::{RegistryV1, WebhookAdmissionType, WebhookDescription};

use crate::certificate::cert_provisioner_for;
use crate::error::{RenderError, Result};
use crate::object::Object;
use crate::options::RenderOptions;

const WEBHOOK_CONVERSION_STRATEGY: &str = "Webhook";

const DEFAULT_CONVERSION_PATH: &str = "/";

/// Every bundle CRD, with webhook conversion wired for CRDs claimed by a
/// conversion webhook
pub fn crd_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    let mut converters: BTreeMap<&str, &WebhookDescription> = BTreeMap::new();
    for webhook in bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| wh.webhook_type == WebhookAdmissionType::ConversionWebhook)
    {
        for crd in &webhook.conversion_crds {
            if converters.insert(crd.as_str(), webhook).is_some() {
                return Err(RenderError::DuplicateConversionCrd(crd.clone()));
            }
        }
    }

    let mut objects = Vec::with_capacity(bundle.crds.len());
    for crd in &bundle.crds {
        let mut crd = crd.clone();
        let name = crd.metadata.name.clone().unwrap_or_default();

        let Some(webhook) = converters.get(name.as_str()) else {
            objects.push(Object::from(crd));
            continue;
        };

        if crd.spec.preserve_unknown_fields == Some(true) {
            return Err(RenderError::PreserveUnknownFields(name));
        }

        let provisioner = cert_provisioner_for(&webhook.deployment_name, options);
        crd.spec.conversion = Some(CustomResourceConversion {
            strategy: WEBHOOK_CONVERSION_STRATEGY.to_string(),
            webhook: Some(WebhookConversion {
                client_config: Some(WebhookClientConfig {
                    service: Some(ServiceReference {
                        namespace: options.install_namespace.clone(),
                        name: provisioner.service_name().to_string(),
                        path: Some(
                            webhook
                                .webhook_path
                                .clone()
                                .unwrap_or_else(|| DEFAULT_CONVERSION_PATH.to_string()),
                        ),
                        port: Some(webhook.effective_container_port()),
                    }),
                    ..Default::default()
                }),
                conversion_review_versions: webhook.admission_review_versions.clone(),
            }),
        });

        let mut object = Object::from(crd);
        provisioner.inject_ca_bundle(&mut object)?;
        objects.push(object);
    }
    Ok(objects)
}
