//! Rendered Kubernetes objects
//!
//! Generators produce a closed set of typed kinds. Manifests passed through
//! from the bundle keep their unstructured form.

use k8s_openapi::Resource;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::Serialize;

/// A rendered object, ready to be applied to a cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Object {
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Deployment(Deployment),
    Service(Service),
    ValidatingWebhookConfiguration(ValidatingWebhookConfiguration),
    MutatingWebhookConfiguration(MutatingWebhookConfiguration),
    CustomResourceDefinition(CustomResourceDefinition),
    Unstructured(DynamicObject),
}

/// Run `$body` against the inner value of every typed variant
macro_rules! typed_dispatch {
    ($value:expr, $inner:ident => $body:expr, $dynamic:ident => $dynamic_body:expr) => {
        match $value {
            Object::ServiceAccount($inner) => $body,
            Object::Role($inner) => $body,
            Object::RoleBinding($inner) => $body,
            Object::ClusterRole($inner) => $body,
            Object::ClusterRoleBinding($inner) => $body,
            Object::Deployment($inner) => $body,
            Object::Service($inner) => $body,
            Object::ValidatingWebhookConfiguration($inner) => $body,
            Object::MutatingWebhookConfiguration($inner) => $body,
            Object::CustomResourceDefinition($inner) => $body,
            Object::Unstructured($dynamic) => $dynamic_body,
        }
    };
}

fn kind_of<K: Resource>(_: &K) -> &'static str {
    K::KIND
}

fn api_version_of<K: Resource>(_: &K) -> &'static str {
    K::API_VERSION
}

impl Object {
    /// Kubernetes kind, e.g. `Deployment`
    pub fn kind(&self) -> &str {
        typed_dispatch!(self,
            o => kind_of(o),
            d => d.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default()
        )
    }

    /// Kubernetes apiVersion, e.g. `apps/v1`
    pub fn api_version(&self) -> &str {
        typed_dispatch!(self,
            o => api_version_of(o),
            d => d.types.as_ref().map(|t| t.api_version.as_str()).unwrap_or_default()
        )
    }

    pub fn metadata(&self) -> &ObjectMeta {
        typed_dispatch!(self, o => &o.metadata, d => &d.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        typed_dispatch!(self, o => &mut o.metadata, d => &mut d.metadata)
    }

    /// Object name, empty if unset
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, `None` for cluster-scoped objects
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Short `Kind/name` reference used in logs
    pub fn display_key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", self.kind(), ns, self.name()),
            None => format!("{}/{}", self.kind(), self.name()),
        }
    }
}

macro_rules! impl_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Object {
                fn from(value: $variant) -> Self {
                    Object::$variant(value)
                }
            }
        )*
    };
}

impl_from!(
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    Deployment,
    Service,
    ValidatingWebhookConfiguration,
    MutatingWebhookConfiguration,
    CustomResourceDefinition,
);

impl From<DynamicObject> for Object {
    fn from(value: DynamicObject) -> Self {
        Object::Unstructured(value)
    }
}
