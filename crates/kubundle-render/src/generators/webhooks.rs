//! Admission webhooks, their services and certificate objects

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, ServiceReference, ValidatingWebhook, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kubundle_core::{RegistryV1, WebhookAdmissionType, WebhookDescription};

use crate::certificate::{CertificateProvisioner, cert_provisioner_for};
use crate::error::Result;
use crate::object::Object;
use crate::options::RenderOptions;
use crate::resources::{
    ResourceOption, create_mutating_webhook_configuration, create_service,
    create_validating_webhook_configuration,
};

/// Namespace label set by the API server on every namespace
const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// Webhook names drop the trailing `-` generate-name marker
fn webhook_name(webhook: &WebhookDescription) -> &str {
    webhook
        .generate_name
        .strip_suffix('-')
        .unwrap_or(&webhook.generate_name)
}

/// Selector matching the target namespaces, `None` in AllNamespaces mode
fn namespace_selector(targets: &[String]) -> Option<LabelSelector> {
    if targets.is_empty() || targets.iter().any(String::is_empty) {
        return None;
    }

    Some(LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: NAMESPACE_NAME_LABEL.to_string(),
            operator: "In".to_string(),
            values: Some(targets.to_vec()),
        }]),
        ..Default::default()
    })
}

fn client_config(
    webhook: &WebhookDescription,
    provisioner: &CertificateProvisioner<'_>,
    options: &RenderOptions,
) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            namespace: options.install_namespace.clone(),
            name: provisioner.service_name().to_string(),
            path: webhook.webhook_path.clone(),
            port: Some(webhook.effective_container_port()),
        }),
        ..Default::default()
    }
}

fn webhooks_of_type(
    bundle: &RegistryV1,
    webhook_type: WebhookAdmissionType,
) -> impl Iterator<Item = &WebhookDescription> {
    bundle
        .webhook_definitions()
        .iter()
        .filter(move |wh| wh.webhook_type == webhook_type)
}

/// One ValidatingWebhookConfiguration per validating webhook definition
pub fn validating_webhook_generator(
    bundle: &RegistryV1,
    options: &RenderOptions,
) -> Result<Vec<Object>> {
    webhooks_of_type(bundle, WebhookAdmissionType::ValidatingAdmissionWebhook)
        .map(|wh| {
            let provisioner = cert_provisioner_for(&wh.deployment_name, options);
            let name = webhook_name(wh);

            let webhook = ValidatingWebhook {
                name: name.to_string(),
                rules: (!wh.rules.is_empty()).then(|| wh.rules.clone()),
                failure_policy: wh.failure_policy.clone(),
                match_policy: wh.match_policy.clone(),
                object_selector: wh.object_selector.clone(),
                side_effects: wh.side_effects.clone().unwrap_or_default(),
                timeout_seconds: wh.timeout_seconds,
                admission_review_versions: wh.admission_review_versions.clone(),
                client_config: client_config(wh, &provisioner, options),
                namespace_selector: namespace_selector(options.target_namespaces()),
                ..Default::default()
            };

            let mut object = create_validating_webhook_configuration(
                name,
                [ResourceOption::ValidatingWebhooks(vec![webhook])],
            )?;
            provisioner.inject_ca_bundle(&mut object)?;
            Ok(object)
        })
        .collect()
}

/// One MutatingWebhookConfiguration per mutating webhook definition
pub fn mutating_webhook_generator(
    bundle: &RegistryV1,
    options: &RenderOptions,
) -> Result<Vec<Object>> {
    webhooks_of_type(bundle, WebhookAdmissionType::MutatingAdmissionWebhook)
        .map(|wh| {
            let provisioner = cert_provisioner_for(&wh.deployment_name, options);
            let name = webhook_name(wh);

            let webhook = MutatingWebhook {
                name: name.to_string(),
                rules: (!wh.rules.is_empty()).then(|| wh.rules.clone()),
                failure_policy: wh.failure_policy.clone(),
                match_policy: wh.match_policy.clone(),
                object_selector: wh.object_selector.clone(),
                side_effects: wh.side_effects.clone().unwrap_or_default(),
                timeout_seconds: wh.timeout_seconds,
                admission_review_versions: wh.admission_review_versions.clone(),
                client_config: client_config(wh, &provisioner, options),
                reinvocation_policy: wh.reinvocation_policy.clone(),
                namespace_selector: namespace_selector(options.target_namespaces()),
                ..Default::default()
            };

            let mut object = create_mutating_webhook_configuration(
                name,
                [ResourceOption::MutatingWebhooks(vec![webhook])],
            )?;
            provisioner.inject_ca_bundle(&mut object)?;
            Ok(object)
        })
        .collect()
}

fn service_port(webhook: &WebhookDescription) -> ServicePort {
    let port = webhook.effective_container_port();
    ServicePort {
        name: Some(port.to_string()),
        port,
        target_port: Some(webhook.target_port.clone().unwrap_or(IntOrString::Int(port))),
        ..Default::default()
    }
}

/// Numeric value of a target port; named ports sort as 0
fn int_value(port: Option<&IntOrString>) -> i32 {
    match port {
        Some(IntOrString::Int(value)) => *value,
        Some(IntOrString::String(value)) => value.parse().unwrap_or(0),
        None => 0,
    }
}

/// One Service per deployment serving webhooks, covering all of its ports
pub fn service_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    let mut ports_by_deployment: BTreeMap<&str, Vec<ServicePort>> = BTreeMap::new();
    for wh in bundle.webhook_definitions() {
        let ports = ports_by_deployment.entry(wh.deployment_name.as_str()).or_default();
        let port = service_port(wh);
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    let mut objects = Vec::with_capacity(ports_by_deployment.len());
    for dep in bundle.deployment_specs() {
        let Some(mut ports) = ports_by_deployment.remove(dep.name.as_str()) else {
            continue;
        };
        ports.sort_by_key(|p| (p.port, int_value(p.target_port.as_ref())));

        let provisioner = cert_provisioner_for(&dep.name, options);
        let mut object = create_service(
            provisioner.service_name(),
            &options.install_namespace,
            [ResourceOption::ServiceSpec(ServiceSpec {
                ports: Some(ports),
                selector: dep.spec.selector.match_labels.clone(),
                ..Default::default()
            })],
        )?;
        provisioner.inject_ca_bundle(&mut object)?;
        objects.push(object);
    }
    Ok(objects)
}

/// Objects the certificate provider needs, for each webhook-serving deployment in name order
pub fn cert_provider_resource_generator(
    bundle: &RegistryV1,
    options: &RenderOptions,
) -> Result<Vec<Object>> {
    let deployments: BTreeSet<&str> = bundle
        .webhook_definitions()
        .iter()
        .map(|wh| wh.deployment_name.as_str())
        .collect();

    let mut objects = Vec::new();
    for deployment in deployments {
        let additional = cert_provisioner_for(deployment, options).additional_objects()?;
        objects.extend(additional.into_iter().map(Object::from));
    }
    Ok(objects)
}
