//! Operator deployments

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{KeyToPath, SecretVolumeSource, Volume, VolumeMount};
use kubundle_core::RegistryV1;

use crate::certificate::{CertSecretInfo, cert_provisioner_for};
use crate::error::Result;
use crate::object::Object;
use crate::options::RenderOptions;
use crate::overlay::apply_deployment_config;
use crate::resources::{ResourceOption, create_deployment};

/// Pod-template annotation recording the watched namespaces
pub const TARGET_NAMESPACES_ANNOTATION: &str = "olm.targetNamespaces";

const REVISION_HISTORY_LIMIT: i32 = 1;

const TLS_CRT_PATH: &str = "tls.crt";
const TLS_KEY_PATH: &str = "tls.key";

/// Certificate volume name and mount path, sorted by name
const CERT_VOLUME_MOUNTS: &[(&str, &str)] =
    &[("webhook-cert", "/tmp/k8s-webhook-server/serving-certs")];

/// One Deployment per CSV deployment spec
///
/// Pod templates get the CSV annotations (template annotations win) plus the
/// target namespaces annotation. Deployments serving webhooks get the
/// certificate volume when a certificate provider is set. The configured
/// overlay and proxy are applied last.
pub fn deployment_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    let webhook_deployments: BTreeSet<&str> = bundle
        .webhook_definitions()
        .iter()
        .map(|wh| wh.deployment_name.as_str())
        .collect();

    let csv_annotations = bundle.csv.annotations();
    let target_namespaces = options.target_namespaces().join(",");

    let mut objects = Vec::with_capacity(bundle.deployment_specs().len());
    for dep in bundle.deployment_specs() {
        let mut spec = dep.spec.clone();

        let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
        let mut annotations = csv_annotations.clone();
        annotations.extend(template_meta.annotations.take().unwrap_or_default());
        annotations.insert(
            TARGET_NAMESPACES_ANNOTATION.to_string(),
            target_namespaces.clone(),
        );
        template_meta.annotations = Some(annotations);

        spec.revision_history_limit = Some(REVISION_HISTORY_LIMIT);

        let mut object = create_deployment(
            &dep.name,
            &options.install_namespace,
            [
                ResourceOption::DeploymentSpec(spec),
                ResourceOption::Labels(dep.label.clone()),
            ],
        )?;

        if let Object::Deployment(deployment) = &mut object {
            if webhook_deployments.contains(dep.name.as_str()) {
                if let Some(info) = cert_provisioner_for(&dep.name, options).get_cert_secret_info() {
                    add_cert_volumes(deployment, &info);
                }
            }

            if let Some(config) = &options.deployment_config {
                apply_deployment_config(deployment, config);
            }
        }

        if let Some(proxy) = &options.proxy {
            object.apply_option(ResourceOption::Proxy(proxy.clone()))?;
        }

        objects.push(object);
    }
    Ok(objects)
}

/// Mount the serving certificate secret into every container
///
/// Volumes and mounts named like the certificate volume, or mounted at its
/// path, are replaced.
fn add_cert_volumes(deployment: &mut Deployment, info: &CertSecretInfo) {
    let Some(pod) = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    else {
        return;
    };

    let cert_paths: BTreeSet<&str> = CERT_VOLUME_MOUNTS.iter().map(|(_, path)| *path).collect();
    let mut replaced: BTreeSet<String> = CERT_VOLUME_MOUNTS
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    for container in &pod.containers {
        for mount in container.volume_mounts.iter().flatten() {
            if cert_paths.contains(mount.mount_path.as_str()) {
                replaced.insert(mount.name.clone());
            }
        }
    }

    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|volume| !replaced.contains(&volume.name));
    volumes.extend(CERT_VOLUME_MOUNTS.iter().map(|(name, _)| Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(info.secret_name.clone()),
            items: Some(vec![
                KeyToPath {
                    key: info.certificate_key.clone(),
                    path: TLS_CRT_PATH.to_string(),
                    ..Default::default()
                },
                KeyToPath {
                    key: info.private_key_key.clone(),
                    path: TLS_KEY_PATH.to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }));

    let cert_mounts: BTreeMap<&str, &str> = CERT_VOLUME_MOUNTS.iter().copied().collect();
    for container in &mut pod.containers {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        mounts.retain(|mount| !replaced.contains(&mount.name));
        mounts.extend(cert_mounts.iter().map(|(name, path)| VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::{EnvVar, PodSpec};
    use kubundle_core::DeploymentConfig;

    use super::*;
    use crate::certificate::testing::FakeCertProvider;
    use crate::generators::testing::widget_bundle;
    use crate::resources::Proxy;

    fn deployment(object: &Object) -> &Deployment {
        let Object::Deployment(deployment) = object else {
            panic!("expected a deployment");
        };
        deployment
    }

    fn pod(object: &Object) -> &PodSpec {
        deployment(object)
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
    }

    fn with_certs() -> RenderOptions {
        RenderOptions::new("operators").with_certificate_provider(Arc::new(FakeCertProvider))
    }

    #[test]
    fn test_annotations_labels_and_history() {
        let options = RenderOptions::new("operators").with_target_namespaces(["ns-a", "ns-b"]);
        let objects = deployment_generator(&widget_bundle(), &options).unwrap();
        assert_eq!(objects.len(), 1);

        let dep = deployment(&objects[0]);
        assert_eq!(dep.metadata.namespace.as_deref(), Some("operators"));
        assert_eq!(dep.metadata.labels.as_ref().unwrap()["app"], "widget");

        let spec = dep.spec.as_ref().unwrap();
        assert_eq!(spec.revision_history_limit, Some(1));

        let annotations = spec.template.metadata.as_ref().unwrap().annotations.as_ref().unwrap();
        assert_eq!(annotations["capabilities"], "Full Lifecycle");
        assert_eq!(annotations["shared"], "template");
        assert_eq!(annotations[TARGET_NAMESPACES_ANNOTATION], "ns-a,ns-b");
    }

    #[test]
    fn test_all_namespaces_annotation_is_empty() {
        let objects = deployment_generator(&widget_bundle(), &RenderOptions::new("operators")).unwrap();
        let annotations = deployment(&objects[0])
            .spec
            .as_ref()
            .unwrap()
            .template
            .metadata
            .as_ref()
            .unwrap()
            .annotations
            .clone()
            .unwrap();
        assert_eq!(annotations[TARGET_NAMESPACES_ANNOTATION], "");
    }

    #[test]
    fn test_cert_volumes_replace_colliding_entries() {
        let objects = deployment_generator(&widget_bundle(), &with_certs()).unwrap();
        let pod = pod(&objects[0]);

        let volumes = pod.volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "webhook-cert");
        let secret = volumes[0].secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("widget-controller-service-cert"));
        let items = secret.items.as_ref().unwrap();
        assert_eq!((items[0].key.as_str(), items[0].path.as_str()), ("tls.crt", "tls.crt"));
        assert_eq!((items[1].key.as_str(), items[1].path.as_str()), ("tls.key", "tls.key"));

        for container in &pod.containers {
            let mounts = container.volume_mounts.as_ref().unwrap();
            assert_eq!(mounts.len(), 1, "{}", container.name);
            assert_eq!(mounts[0].name, "webhook-cert");
            assert_eq!(mounts[0].mount_path, "/tmp/k8s-webhook-server/serving-certs");
        }
    }

    #[test]
    fn test_no_cert_volumes_without_provider() {
        let objects = deployment_generator(&widget_bundle(), &RenderOptions::new("operators")).unwrap();
        let volumes = pod(&objects[0]).volumes.as_ref().unwrap();
        assert_eq!(volumes[0].name, "stale-cert");
    }

    #[test]
    fn test_no_cert_volumes_without_webhooks() {
        let mut bundle = widget_bundle();
        bundle.csv.spec.webhook_definitions.clear();

        let objects = deployment_generator(&bundle, &with_certs()).unwrap();
        assert_eq!(pod(&objects[0]).volumes.as_ref().unwrap()[0].name, "stale-cert");
    }

    #[test]
    fn test_overlay_and_proxy() {
        let options = RenderOptions::new("operators")
            .with_deployment_config(DeploymentConfig {
                env: Some(vec![EnvVar {
                    name: "LOG_LEVEL".into(),
                    value: Some("debug".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            })
            .with_proxy(Proxy {
                http_proxy: "http://proxy:3128".into(),
                ..Default::default()
            });

        let objects = deployment_generator(&widget_bundle(), &options).unwrap();
        for container in &pod(&objects[0]).containers {
            let names: Vec<&str> = container
                .env
                .iter()
                .flatten()
                .map(|e| e.name.as_str())
                .collect();
            assert_eq!(names, vec!["LOG_LEVEL", "HTTP_PROXY"]);
        }
    }
}
