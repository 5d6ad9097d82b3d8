//! Typed resource constructors
//!
//! Each `create_*` function builds a bare object and applies a list of
//! [`ResourceOption`]s in order. Options are matched against the object kind;
//! applying an option to a kind that has no such field is an error rather than
//! a silent no-op.

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, ValidatingWebhook,
    ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, Service, ServiceAccount, ServiceSpec};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::{RenderError, Result};
use crate::object::Object;

/// Proxy environment variable names, in the order they are injected
pub const PROXY_ENV_NAMES: [&str; 3] = ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

/// Cluster-wide HTTP proxy settings injected into deployments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxy {
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
}

impl Proxy {
    fn values(&self) -> [(&'static str, &str); 3] {
        [
            (PROXY_ENV_NAMES[0], self.http_proxy.as_str()),
            (PROXY_ENV_NAMES[1], self.https_proxy.as_str()),
            (PROXY_ENV_NAMES[2], self.no_proxy.as_str()),
        ]
    }
}

/// A modification applied to a freshly created object
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOption {
    /// Replace metadata labels (any kind)
    Labels(BTreeMap<String, String>),
    /// Role / ClusterRole rules
    Rules(Vec<PolicyRule>),
    /// RoleBinding / ClusterRoleBinding subjects
    Subjects(Vec<Subject>),
    /// RoleBinding / ClusterRoleBinding role reference
    RoleRef(RoleRef),
    DeploymentSpec(DeploymentSpec),
    ServiceSpec(ServiceSpec),
    ValidatingWebhooks(Vec<ValidatingWebhook>),
    MutatingWebhooks(Vec<MutatingWebhook>),
    /// Proxy environment for every container and init container of a Deployment
    Proxy(Proxy),
}

impl ResourceOption {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceOption::Labels(_) => "labels",
            ResourceOption::Rules(_) => "rules",
            ResourceOption::Subjects(_) => "subjects",
            ResourceOption::RoleRef(_) => "roleRef",
            ResourceOption::DeploymentSpec(_) => "deploymentSpec",
            ResourceOption::ServiceSpec(_) => "serviceSpec",
            ResourceOption::ValidatingWebhooks(_) => "validatingWebhooks",
            ResourceOption::MutatingWebhooks(_) => "mutatingWebhooks",
            ResourceOption::Proxy(_) => "proxy",
        }
    }
}

impl Object {
    /// Apply a single option to this object
    pub fn apply_option(&mut self, option: ResourceOption) -> Result<()> {
        match (self, option) {
            (object, ResourceOption::Labels(labels)) => {
                object.metadata_mut().labels = (!labels.is_empty()).then_some(labels);
            }
            (Object::Role(role), ResourceOption::Rules(rules)) => role.rules = Some(rules),
            (Object::ClusterRole(role), ResourceOption::Rules(rules)) => role.rules = Some(rules),
            (Object::RoleBinding(binding), ResourceOption::Subjects(subjects)) => {
                binding.subjects = Some(subjects)
            }
            (Object::ClusterRoleBinding(binding), ResourceOption::Subjects(subjects)) => {
                binding.subjects = Some(subjects)
            }
            (Object::RoleBinding(binding), ResourceOption::RoleRef(role_ref)) => {
                binding.role_ref = role_ref
            }
            (Object::ClusterRoleBinding(binding), ResourceOption::RoleRef(role_ref)) => {
                binding.role_ref = role_ref
            }
            (Object::Deployment(deployment), ResourceOption::DeploymentSpec(spec)) => {
                deployment.spec = Some(spec)
            }
            (Object::Deployment(deployment), ResourceOption::Proxy(proxy)) => {
                if let Some(pod) = deployment
                    .spec
                    .as_mut()
                    .and_then(|spec| spec.template.spec.as_mut())
                {
                    set_proxy_env(&mut pod.containers, &proxy);
                    if let Some(init) = pod.init_containers.as_mut() {
                        set_proxy_env(init, &proxy);
                    }
                }
            }
            (Object::Service(service), ResourceOption::ServiceSpec(spec)) => {
                service.spec = Some(spec)
            }
            (Object::ValidatingWebhookConfiguration(config), ResourceOption::ValidatingWebhooks(webhooks)) => {
                config.webhooks = Some(webhooks)
            }
            (Object::MutatingWebhookConfiguration(config), ResourceOption::MutatingWebhooks(webhooks)) => {
                config.webhooks = Some(webhooks)
            }
            (object, option) => {
                return Err(RenderError::UnsupportedOption {
                    option: option.name(),
                    kind: object.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply options in order, stopping at the first mismatch
    pub fn with_options(mut self, options: impl IntoIterator<Item = ResourceOption>) -> Result<Self> {
        for option in options {
            self.apply_option(option)?;
        }
        Ok(self)
    }
}

/// Replace proxy variables on every container
///
/// Existing proxy entries are dropped first so unsetting a value removes it.
fn set_proxy_env(containers: &mut [Container], proxy: &Proxy) {
    for container in containers {
        let mut env: Vec<EnvVar> = container
            .env
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter(|var| !PROXY_ENV_NAMES.contains(&var.name.as_str()))
            .collect();

        env.extend(
            proxy
                .values()
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(name, value)| EnvVar {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    ..Default::default()
                }),
        );

        container.env = (!env.is_empty()).then_some(env);
    }
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

pub fn create_service_account(
    name: &str,
    namespace: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(ServiceAccount {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_role(
    name: &str,
    namespace: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(Role {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_role_binding(
    name: &str,
    namespace: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(RoleBinding {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_cluster_role(
    name: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(ClusterRole {
        metadata: meta(name, None),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_cluster_role_binding(
    name: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(ClusterRoleBinding {
        metadata: meta(name, None),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_deployment(
    name: &str,
    namespace: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(Deployment {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_service(
    name: &str,
    namespace: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(Service {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    })
    .with_options(options)
}

/// Webhook configurations are cluster-scoped and carry no namespace
pub fn create_validating_webhook_configuration(
    name: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(ValidatingWebhookConfiguration {
        metadata: meta(name, None),
        ..Default::default()
    })
    .with_options(options)
}

pub fn create_mutating_webhook_configuration(
    name: &str,
    options: impl IntoIterator<Item = ResourceOption>,
) -> Result<Object> {
    Object::from(MutatingWebhookConfiguration {
        metadata: meta(name, None),
        ..Default::default()
    })
    .with_options(options)
}
