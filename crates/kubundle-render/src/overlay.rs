//! Deployment configuration overlay
//!
//! | Field          | Target                    | Semantics                          |
//! |----------------|---------------------------|------------------------------------|
//! | env            | every container           | merge by name, overlay wins        |
//! | envFrom        | every container           | append entries not already present |
//! | volumeMounts   | every container           | merge by name, overlay wins        |
//! | resources      | every container           | replace                            |
//! | volumes        | pod spec                  | merge by name, overlay wins        |
//! | tolerations    | pod spec                  | replace                            |
//! | nodeSelector   | pod spec                  | replace                            |
//! | affinity       | pod spec                  | replace                            |
//! | annotations    | deployment metadata       | merge, overlay wins                |
//! | annotations    | pod template metadata     | merge, existing keys win           |
//!
//! Name-merged lists put overlay entries first, followed by existing entries
//! whose names the overlay does not use. Applying the same overlay twice gives
//! the same result as applying it once.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};
use kubundle_core::DeploymentConfig;

/// Apply `config` to a deployment in place
pub fn apply_deployment_config(deployment: &mut Deployment, config: &DeploymentConfig) {
    if config.is_empty() {
        return;
    }

    if let Some(annotations) = &config.annotations {
        let existing = deployment.metadata.annotations.get_or_insert_with(BTreeMap::new);
        existing.extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    let template = &mut spec.template;

    if let Some(annotations) = &config.annotations {
        let existing = template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new);
        for (key, value) in annotations {
            existing.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    let Some(pod) = template.spec.as_mut() else {
        return;
    };

    for container in &mut pod.containers {
        apply_to_container(container, config);
    }

    if let Some(volumes) = &config.volumes {
        merge_by_name(pod.volumes.get_or_insert_with(Vec::new), volumes, volume_name);
    }
    if let Some(tolerations) = &config.tolerations {
        pod.tolerations = Some(tolerations.clone());
    }
    if let Some(node_selector) = &config.node_selector {
        pod.node_selector = Some(node_selector.clone());
    }
    if let Some(affinity) = &config.affinity {
        pod.affinity = Some(affinity.clone());
    }
}

fn apply_to_container(container: &mut Container, config: &DeploymentConfig) {
    if let Some(env) = &config.env {
        merge_env(container.env.get_or_insert_with(Vec::new), env);
    }
    if let Some(env_from) = &config.env_from {
        append_missing(container.env_from.get_or_insert_with(Vec::new), env_from);
    }
    if let Some(mounts) = &config.volume_mounts {
        merge_by_name(container.volume_mounts.get_or_insert_with(Vec::new), mounts, mount_name);
    }
    if let Some(resources) = &config.resources {
        container.resources = Some(resources.clone());
    }
}

fn merge_env(existing: &mut Vec<EnvVar>, overlay: &[EnvVar]) {
    for var in overlay {
        match existing.iter_mut().find(|e| e.name == var.name) {
            Some(slot) => *slot = var.clone(),
            None => existing.push(var.clone()),
        }
    }
}

fn volume_name(volume: &Volume) -> &str {
    &volume.name
}

fn mount_name(mount: &VolumeMount) -> &str {
    &mount.name
}

/// Overlay entries first, then existing entries with names not yet taken
fn merge_by_name<T: Clone>(existing: &mut Vec<T>, overlay: &[T], name: fn(&T) -> &str) {
    let mut seen: BTreeSet<String> = overlay.iter().map(|item| name(item).to_string()).collect();
    let original = std::mem::replace(existing, overlay.to_vec());
    existing.extend(
        original
            .into_iter()
            .filter(|item| seen.insert(name(item).to_string())),
    );
}

fn append_missing<T: Clone + PartialEq>(existing: &mut Vec<T>, overlay: &[T]) {
    for item in overlay {
        if !existing.contains(item) {
            existing.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{
        Affinity, EmptyDirVolumeSource, EnvFromSource, NodeAffinity, NodeSelector,
        NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PodTemplateSpec, ResourceRequirements,
        SecretVolumeSource, Toleration,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    fn deployment() -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("operator".into()),
                annotations: Some(BTreeMap::from([("keep".to_string(), "deployment".to_string())])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(BTreeMap::from([(
                            "shared".to_string(),
                            "template".to_string(),
                        )])),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![
                            Container {
                                name: "manager".into(),
                                env: Some(vec![env("A", "1"), env("B", "2")]),
                                ..Default::default()
                            },
                            Container {
                                name: "proxy".into(),
                                ..Default::default()
                            },
                        ],
                        tolerations: Some(vec![Toleration {
                            key: Some("old".into()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn overlay() -> DeploymentConfig {
        DeploymentConfig {
            env: Some(vec![env("B", "overridden"), env("C", "3")]),
            env_from: Some(vec![EnvFromSource {
                prefix: Some("EXTRA_".into()),
                ..Default::default()
            }]),
            resources: Some(ResourceRequirements {
                limits: Some(BTreeMap::from([("cpu".to_string(), Quantity("500m".into()))])),
                ..Default::default()
            }),
            tolerations: Some(vec![Toleration {
                key: Some("dedicated".into()),
                operator: Some("Exists".into()),
                ..Default::default()
            }]),
            node_selector: Some(BTreeMap::from([("kubernetes.io/os".to_string(), "linux".to_string())])),
            affinity: Some(Affinity {
                node_affinity: Some(NodeAffinity {
                    required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                        node_selector_terms: vec![NodeSelectorTerm {
                            match_expressions: Some(vec![NodeSelectorRequirement {
                                key: "zone".into(),
                                operator: "In".into(),
                                values: Some(vec!["a".into()]),
                            }]),
                            ..Default::default()
                        }],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            volumes: Some(vec![Volume {
                name: "cache".into(),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: "cache".into(),
                mount_path: "/cache".into(),
                ..Default::default()
            }]),
            annotations: Some(BTreeMap::from([
                ("shared".to_string(), "overlay".to_string()),
                ("added".to_string(), "overlay".to_string()),
            ])),
        }
    }

    fn pod(deployment: &Deployment) -> &PodSpec {
        deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    #[test]
    fn test_env_merges_by_name() {
        let mut dep = deployment();
        apply_deployment_config(&mut dep, &overlay());

        let containers = &pod(&dep).containers;
        assert_eq!(
            containers[0].env.clone().unwrap(),
            vec![env("A", "1"), env("B", "overridden"), env("C", "3")]
        );
        assert_eq!(
            containers[1].env.clone().unwrap(),
            vec![env("B", "overridden"), env("C", "3")]
        );
    }

    #[test]
    fn test_replacements() {
        let mut dep = deployment();
        let config = overlay();
        apply_deployment_config(&mut dep, &config);

        let pod = pod(&dep);
        assert_eq!(pod.tolerations, config.tolerations);
        assert_eq!(pod.node_selector, config.node_selector);
        assert_eq!(pod.affinity, config.affinity);
        for container in &pod.containers {
            assert_eq!(container.resources, config.resources);
            assert_eq!(container.env_from.as_ref().map(Vec::len), Some(1));
            assert_eq!(container.volume_mounts.as_ref().map(Vec::len), Some(1));
        }
        assert_eq!(pod.volumes.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_annotations() {
        let mut dep = deployment();
        apply_deployment_config(&mut dep, &overlay());

        let deployment_annotations = dep.metadata.annotations.clone().unwrap();
        assert_eq!(deployment_annotations["keep"], "deployment");
        assert_eq!(deployment_annotations["shared"], "overlay");
        assert_eq!(deployment_annotations["added"], "overlay");

        let template_annotations = dep
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();
        assert_eq!(template_annotations["shared"], "template");
        assert_eq!(template_annotations["added"], "overlay");
    }

    #[test]
    fn test_volumes_merge_by_name() {
        let mut dep = deployment();
        let spec = dep.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        spec.volumes = Some(vec![
            Volume {
                name: "cache".into(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            Volume {
                name: "config".into(),
                ..Default::default()
            },
        ]);
        spec.containers[0].volume_mounts = Some(vec![
            VolumeMount {
                name: "cache".into(),
                mount_path: "/var/cache".into(),
                ..Default::default()
            },
            VolumeMount {
                name: "config".into(),
                mount_path: "/etc/config".into(),
                ..Default::default()
            },
        ]);

        let config = DeploymentConfig {
            volumes: Some(vec![Volume {
                name: "cache".into(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some("cache-secret".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: "cache".into(),
                mount_path: "/cache".into(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        apply_deployment_config(&mut dep, &config);
        apply_deployment_config(&mut dep, &config);

        let pod = pod(&dep);
        let volumes = pod.volumes.as_ref().unwrap();
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["cache", "config"]);
        assert!(volumes[0].empty_dir.is_none());
        assert_eq!(
            volumes[0].secret.as_ref().unwrap().secret_name.as_deref(),
            Some("cache-secret")
        );

        let mounts: Vec<(&str, &str)> = pod.containers[0]
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| (m.name.as_str(), m.mount_path.as_str()))
            .collect();
        assert_eq!(mounts, vec![("cache", "/cache"), ("config", "/etc/config")]);
    }

    #[test]
    fn test_idempotent() {
        let config = overlay();
        let mut once = deployment();
        apply_deployment_config(&mut once, &config);

        let mut twice = once.clone();
        apply_deployment_config(&mut twice, &config);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_overlay_is_noop() {
        let mut dep = deployment();
        apply_deployment_config(&mut dep, &DeploymentConfig::default());
        assert_eq!(dep, deployment());
    }
}
