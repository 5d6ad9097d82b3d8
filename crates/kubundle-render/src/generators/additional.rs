//! Passthrough of the bundle's other manifests

use kubundle_core::RegistryV1;

use crate::error::{RenderError, Result};
use crate::object::Object;
use crate::options::RenderOptions;

/// Kinds a bundle may ship besides its CSV and CRDs, with whether they are namespaced
const SUPPORTED_KINDS: &[(&str, bool)] = &[
    ("ClusterServiceVersion", true),
    ("Secret", true),
    ("ConfigMap", true),
    ("ServiceAccount", true),
    ("Service", true),
    ("Role", true),
    ("RoleBinding", true),
    ("PrometheusRule", true),
    ("ServiceMonitor", true),
    ("PodDisruptionBudget", true),
    ("NetworkPolicy", true),
    ("CustomResourceDefinition", false),
    ("ClusterRole", false),
    ("ClusterRoleBinding", false),
    ("PriorityClass", false),
    ("VerticalPodAutoscaler", false),
    ("ConsoleYAMLSample", false),
    ("ConsoleQuickStart", false),
    ("ConsoleCLIDownload", false),
    ("ConsoleLink", false),
    ("ConsolePlugin", false),
];

/// Whether `kind` may be shipped in a bundle; `Some(namespaced)` when it may
pub fn supported_kind(kind: &str) -> Option<bool> {
    SUPPORTED_KINDS
        .iter()
        .find(|(supported, _)| *supported == kind)
        .map(|(_, namespaced)| *namespaced)
}

/// The bundle's other manifests, namespaced kinds moved into the install namespace
pub fn additional_resources_generator(
    bundle: &RegistryV1,
    options: &RenderOptions,
) -> Result<Vec<Object>> {
    bundle
        .others
        .iter()
        .map(|manifest| {
            let mut object = Object::from(manifest.clone());
            let Some(namespaced) = supported_kind(object.kind()) else {
                return Err(RenderError::UnsupportedResource {
                    name: object.name().to_string(),
                    kind: object.kind().to_string(),
                });
            };

            if namespaced {
                object.metadata_mut().namespace = Some(options.install_namespace.clone());
            }
            Ok(object)
        })
        .collect()
}
