//! Structural bundle checks
//!
//! Every check is a pure function over the bundle returning its findings.
//! [`BundleValidator::validate`] runs all of them and reports everything at
//! once; output is sorted so messages are stable between runs.

use std::collections::{BTreeMap, BTreeSet};

use kubundle_core::naming::is_dns1123_subdomain;
use kubundle_core::{InstallModeType, RegistryV1, WebhookAdmissionType, WebhookDescription};

use crate::error::{RenderError, Result};

/// A single structural check
pub type BundleCheck = fn(&RegistryV1) -> Vec<String>;

/// API groups webhook rules may never target
const FORBIDDEN_WEBHOOK_RULE_API_GROUPS: [&str; 2] = ["olm.operatorframework.io", "*"];

const ADMISSION_REGISTRATION_GROUP: &str = "admissionregistration.k8s.io";

/// Resources of the admission registration group webhook rules may never target (lowercase)
const FORBIDDEN_ADMISSION_REGISTRATION_RESOURCES: [&str; 5] = [
    "*",
    "mutatingwebhookconfiguration",
    "mutatingwebhookconfigurations",
    "validatingwebhookconfiguration",
    "validatingwebhookconfigurations",
];

/// An ordered list of checks
#[derive(Debug, Clone, Default)]
pub struct BundleValidator(pub Vec<BundleCheck>);

impl BundleValidator {
    pub fn new(checks: Vec<BundleCheck>) -> Self {
        Self(checks)
    }

    /// Run every check and collect all findings
    pub fn validate(&self, bundle: &RegistryV1) -> Result<()> {
        let errors: Vec<String> = self.0.iter().flat_map(|check| check(bundle)).collect();

        if errors.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            package = %bundle.package_name,
            errors = errors.len(),
            "bundle failed validation"
        );
        Err(RenderError::BundleValidation(errors))
    }
}

/// The standard registry+v1 checks
pub fn registry_v1_validator() -> BundleValidator {
    BundleValidator(vec![
        check_deployment_spec_uniqueness,
        check_deployment_name_is_dns1123_subdomain,
        check_crd_resource_uniqueness,
        check_owned_crd_existence,
        check_package_name_not_empty,
        check_webhook_deployment_referential_integrity,
        check_webhook_name_uniqueness,
        check_webhook_name_is_dns1123_subdomain,
        check_conversion_webhook_crd_reference_uniqueness,
        check_conversion_webhooks_reference_owned_crds,
        check_webhook_rules,
    ])
}

/// Names occurring more than once, sorted
fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    names.into_iter().filter(|name| !seen.insert(*name)).collect()
}

pub fn check_deployment_spec_uniqueness(bundle: &RegistryV1) -> Vec<String> {
    duplicates(bundle.deployment_specs().iter().map(|dep| dep.name.as_str()))
        .into_iter()
        .map(|name| {
            format!("cluster service version contains duplicate strategy deployment spec '{name}'")
        })
        .collect()
}

pub fn check_deployment_name_is_dns1123_subdomain(bundle: &RegistryV1) -> Vec<String> {
    let invalid: BTreeMap<&str, Vec<String>> = bundle
        .deployment_specs()
        .iter()
        .filter_map(|dep| {
            let mut errors = is_dns1123_subdomain(&dep.name);
            errors.sort();
            (!errors.is_empty()).then_some((dep.name.as_str(), errors))
        })
        .collect();

    invalid
        .into_iter()
        .map(|(name, errors)| {
            format!(
                "invalid cluster service version strategy deployment name '{name}': {}",
                errors.join(", ")
            )
        })
        .collect()
}

pub fn check_crd_resource_uniqueness(bundle: &RegistryV1) -> Vec<String> {
    duplicates(bundle.crds.iter().map(|crd| crd.metadata.name.as_deref().unwrap_or_default()))
        .into_iter()
        .map(|name| format!("bundle contains duplicate custom resource definition '{name}'"))
        .collect()
}

pub fn check_owned_crd_existence(bundle: &RegistryV1) -> Vec<String> {
    let present: BTreeSet<&str> = bundle
        .crds
        .iter()
        .filter_map(|crd| crd.metadata.name.as_deref())
        .collect();

    bundle
        .owned_crd_names()
        .into_iter()
        .filter(|name| !present.contains(name))
        .map(|name| {
            format!(
                "cluster service definition references owned custom resource definition '{name}' not found in bundle"
            )
        })
        .collect()
}

pub fn check_package_name_not_empty(bundle: &RegistryV1) -> Vec<String> {
    if bundle.package_name.is_empty() {
        return vec!["package name is empty".to_string()];
    }
    Vec::new()
}

/// Conversion webhooks are only allowed when AllNamespaces is the sole supported mode
///
/// Not part of [`registry_v1_validator`]; callers keeping that restriction add it.
pub fn check_conversion_webhook_support(bundle: &RegistryV1) -> Vec<String> {
    let conversion: Vec<&str> = bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| wh.webhook_type == WebhookAdmissionType::ConversionWebhook)
        .map(|wh| wh.generate_name.as_str())
        .collect();

    if conversion.is_empty() {
        return Vec::new();
    }

    let modes = bundle.install_mode_set();
    let all_only = modes.iter().eq([InstallModeType::AllNamespaces]);
    if all_only {
        return Vec::new();
    }

    conversion
        .into_iter()
        .map(|name| {
            format!(
                "bundle contains conversion webhook {name:?} and supports install modes {modes} - conversion webhooks are only supported for bundles that only support AllNamespaces install mode"
            )
        })
        .collect()
}

pub fn check_webhook_deployment_referential_integrity(bundle: &RegistryV1) -> Vec<String> {
    let deployments: BTreeSet<&str> = bundle
        .deployment_specs()
        .iter()
        .map(|dep| dep.name.as_str())
        .collect();

    let mut dangling: Vec<&WebhookDescription> = bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| !deployments.contains(wh.deployment_name.as_str()))
        .collect();
    dangling.sort_by(|a, b| {
        (&a.deployment_name, a.webhook_type, &a.generate_name)
            .cmp(&(&b.deployment_name, b.webhook_type, &b.generate_name))
    });

    dangling
        .into_iter()
        .map(|wh| {
            format!(
                "webhook of type '{}' with name '{}' references non-existent deployment '{}'",
                wh.webhook_type, wh.generate_name, wh.deployment_name
            )
        })
        .collect()
}

pub fn check_webhook_name_uniqueness(bundle: &RegistryV1) -> Vec<String> {
    let mut seen: BTreeSet<(WebhookAdmissionType, &str)> = BTreeSet::new();
    let mut duplicate: BTreeSet<(WebhookAdmissionType, &str)> = BTreeSet::new();

    for wh in bundle.webhook_definitions() {
        let key = (wh.webhook_type, wh.generate_name.as_str());
        if !seen.insert(key) {
            duplicate.insert(key);
        }
    }

    duplicate
        .into_iter()
        .map(|(webhook_type, name)| format!("duplicate webhook '{name}' of type '{webhook_type}'"))
        .collect()
}

pub fn check_conversion_webhooks_reference_owned_crds(bundle: &RegistryV1) -> Vec<String> {
    let mut conversion: Vec<&WebhookDescription> = bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| wh.webhook_type == WebhookAdmissionType::ConversionWebhook)
        .collect();

    if conversion.is_empty() {
        return Vec::new();
    }

    let owned = bundle.owned_crd_names();
    conversion.sort_by(|a, b| a.generate_name.cmp(&b.generate_name));

    let mut errors = Vec::new();
    for webhook in conversion {
        let mut crds: Vec<&str> = webhook.conversion_crds.iter().map(String::as_str).collect();
        crds.sort_unstable();

        for crd in crds.into_iter().filter(|crd| !owned.contains(crd)) {
            errors.push(format!(
                "conversion webhook '{}' references custom resource definition '{crd}' not owned bundle",
                webhook.generate_name
            ));
        }
    }
    errors
}

pub fn check_conversion_webhook_crd_reference_uniqueness(bundle: &RegistryV1) -> Vec<String> {
    let mut webhooks_by_crd: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for wh in bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| wh.webhook_type == WebhookAdmissionType::ConversionWebhook)
    {
        for crd in &wh.conversion_crds {
            webhooks_by_crd
                .entry(crd.as_str())
                .or_default()
                .push(wh.generate_name.as_str());
        }
    }

    webhooks_by_crd
        .into_iter()
        .filter(|(_, webhooks)| webhooks.len() > 1)
        .map(|(crd, mut webhooks)| {
            webhooks.sort_unstable();
            format!(
                "conversion webhooks [{}] reference same custom resource definition '{crd}'",
                webhooks.join(",")
            )
        })
        .collect()
}

pub fn check_webhook_name_is_dns1123_subdomain(bundle: &RegistryV1) -> Vec<String> {
    let mut invalid: BTreeMap<(WebhookAdmissionType, &str), Vec<String>> = BTreeMap::new();
    for wh in bundle.webhook_definitions() {
        let mut errors = is_dns1123_subdomain(&wh.generate_name);
        if !errors.is_empty() {
            errors.sort();
            invalid.insert((wh.webhook_type, wh.generate_name.as_str()), errors);
        }
    }

    invalid
        .into_iter()
        .map(|((webhook_type, name), errors)| {
            format!(
                "webhook of type '{webhook_type}' has invalid name '{name}': {}",
                errors.join(",")
            )
        })
        .collect()
}

/// Reject admission webhook rules that could lock the cluster out of managing webhooks
pub fn check_webhook_rules(bundle: &RegistryV1) -> Vec<String> {
    let mut errors = Vec::new();

    for wh in bundle
        .webhook_definitions()
        .iter()
        .filter(|wh| wh.webhook_type != WebhookAdmissionType::ConversionWebhook)
    {
        let name = &wh.generate_name;
        for rule in &wh.rules {
            for api_group in rule.api_groups.iter().flatten() {
                if FORBIDDEN_WEBHOOK_RULE_API_GROUPS.contains(&api_group.as_str()) {
                    errors.push(format!(
                        "webhook {name:?} contains forbidden rule: admission webhook rules cannot reference API group {api_group:?}"
                    ));
                }

                if api_group != ADMISSION_REGISTRATION_GROUP {
                    continue;
                }
                for resource in rule.resources.iter().flatten() {
                    if FORBIDDEN_ADMISSION_REGISTRATION_RESOURCES
                        .contains(&resource.to_lowercase().as_str())
                    {
                        errors.push(format!(
                            "webhook {name:?} contains forbidden rule: admission webhook rules cannot reference resource {resource:?} for API group {api_group:?}"
                        ));
                    }
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kubundle_core::bundle::CrdDescription;
    use kubundle_core::{InstallMode, StrategyDeploymentSpec};

    use WebhookAdmissionType::*;

    fn deployment(name: &str) -> StrategyDeploymentSpec {
        StrategyDeploymentSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    fn crd(name: &str) -> CustomResourceDefinition {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn owned(name: &str) -> CrdDescription {
        CrdDescription {
            name: name.into(),
            ..Default::default()
        }
    }

    fn webhook(webhook_type: WebhookAdmissionType, name: &str, deployment: &str) -> WebhookDescription {
        WebhookDescription::new(webhook_type, name, deployment)
    }

    fn bundle() -> RegistryV1 {
        RegistryV1 {
            package_name: "my-package".into(),
            ..Default::default()
        }
    }

    fn rule(groups: &[&str], resources: &[&str]) -> RuleWithOperations {
        RuleWithOperations {
            api_groups: Some(groups.iter().map(|g| g.to_string()).collect()),
            resources: Some(resources.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_bundle_passes() {
        let mut b = bundle();
        b.csv.spec.install.spec.deployments = vec![deployment("operator")];
        b.crds = vec![crd("widgets.example.com")];
        b.csv.spec.custom_resource_definitions.owned = vec![owned("widgets.example.com")];
        b.csv.spec.webhook_definitions = vec![webhook(ValidatingAdmissionWebhook, "vwidget", "operator")];

        assert!(registry_v1_validator().validate(&b).is_ok());
    }

    #[test]
    fn test_validator_collects_every_finding() {
        let mut b = bundle();
        b.package_name = String::new();
        b.crds = vec![crd("x.y.z"), crd("x.y.z")];

        let err = registry_v1_validator().validate(&b).unwrap_err();
        let RenderError::BundleValidation(errors) = &err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(
            errors,
            &vec![
                "bundle contains duplicate custom resource definition 'x.y.z'".to_string(),
                "package name is empty".to_string(),
            ]
        );
        insta::assert_snapshot!(err.to_string(), @r"
        bundle contains duplicate custom resource definition 'x.y.z'
        package name is empty
        ");
    }

    #[test]
    fn test_deployment_spec_uniqueness() {
        let mut b = bundle();
        b.csv.spec.install.spec.deployments =
            vec![deployment("b"), deployment("a"), deployment("b"), deployment("a"), deployment("b")];

        assert_eq!(
            check_deployment_spec_uniqueness(&b),
            vec![
                "cluster service version contains duplicate strategy deployment spec 'a'",
                "cluster service version contains duplicate strategy deployment spec 'b'",
            ]
        );
    }

    #[test]
    fn test_deployment_name_validity() {
        let mut b = bundle();
        b.csv.spec.install.spec.deployments = vec![deployment("Bad_Name"), deployment("good")];

        let errors = check_deployment_name_is_dns1123_subdomain(&b);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with(
            "invalid cluster service version strategy deployment name 'Bad_Name': "
        ));
    }

    #[test]
    fn test_crd_uniqueness_reports_once() {
        let mut b = bundle();
        b.crds = vec![crd("x.y.z"), crd("x.y.z"), crd("x.y.z")];

        assert_eq!(
            check_crd_resource_uniqueness(&b),
            vec!["bundle contains duplicate custom resource definition 'x.y.z'"]
        );
    }

    #[test]
    fn test_owned_crd_existence() {
        let mut b = bundle();
        b.crds = vec![crd("a.example.com")];
        b.csv.spec.custom_resource_definitions.owned =
            vec![owned("c.example.com"), owned("a.example.com"), owned("b.example.com")];

        assert_eq!(
            check_owned_crd_existence(&b),
            vec![
                "cluster service definition references owned custom resource definition 'b.example.com' not found in bundle",
                "cluster service definition references owned custom resource definition 'c.example.com' not found in bundle",
            ]
        );
    }

    #[test]
    fn test_package_name() {
        assert!(check_package_name_not_empty(&bundle()).is_empty());
        assert_eq!(
            check_package_name_not_empty(&RegistryV1::default()),
            vec!["package name is empty"]
        );
    }

    #[test]
    fn test_webhook_referential_integrity_is_sorted() {
        let mut b = bundle();
        b.csv.spec.install.spec.deployments = vec![deployment("present")];
        b.csv.spec.webhook_definitions = vec![
            webhook(ValidatingAdmissionWebhook, "vwh", "missing-b"),
            webhook(ValidatingAdmissionWebhook, "vwh", "missing-a"),
            webhook(MutatingAdmissionWebhook, "mwh", "missing-a"),
            webhook(ConversionWebhook, "cwh", "present"),
        ];

        assert_eq!(
            check_webhook_deployment_referential_integrity(&b),
            vec![
                "webhook of type 'MutatingAdmissionWebhook' with name 'mwh' references non-existent deployment 'missing-a'",
                "webhook of type 'ValidatingAdmissionWebhook' with name 'vwh' references non-existent deployment 'missing-a'",
                "webhook of type 'ValidatingAdmissionWebhook' with name 'vwh' references non-existent deployment 'missing-b'",
            ]
        );
    }

    #[test]
    fn test_webhook_name_uniqueness_is_per_type() {
        let mut b = bundle();
        b.csv.spec.webhook_definitions = vec![
            webhook(ValidatingAdmissionWebhook, "wh", "dep"),
            webhook(MutatingAdmissionWebhook, "wh", "dep"),
            webhook(ValidatingAdmissionWebhook, "wh", "dep"),
            webhook(ConversionWebhook, "conv", "dep"),
            webhook(ConversionWebhook, "conv", "dep"),
        ];

        assert_eq!(
            check_webhook_name_uniqueness(&b),
            vec![
                "duplicate webhook 'conv' of type 'ConversionWebhook'",
                "duplicate webhook 'wh' of type 'ValidatingAdmissionWebhook'",
            ]
        );
    }

    #[test]
    fn test_webhook_name_validity() {
        let mut b = bundle();
        b.csv.spec.webhook_definitions = vec![
            webhook(ValidatingAdmissionWebhook, "Invalid", "dep"),
            webhook(MutatingAdmissionWebhook, "valid.name", "dep"),
        ];

        let errors = check_webhook_name_is_dns1123_subdomain(&b);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("webhook of type 'ValidatingAdmissionWebhook' has invalid name 'Invalid': "));
    }

    #[test]
    fn test_conversion_crd_reference_uniqueness() {
        let mut b = bundle();
        let mut first = webhook(ConversionWebhook, "conv-b", "dep");
        first.conversion_crds = vec!["a.example.com".into(), "b.example.com".into()];
        let mut second = webhook(ConversionWebhook, "conv-a", "dep");
        second.conversion_crds = vec!["a.example.com".into()];
        b.csv.spec.webhook_definitions = vec![first, second];

        assert_eq!(
            check_conversion_webhook_crd_reference_uniqueness(&b),
            vec!["conversion webhooks [conv-a,conv-b] reference same custom resource definition 'a.example.com'"]
        );
    }

    #[test]
    fn test_conversion_webhooks_reference_owned_crds() {
        let mut b = bundle();
        b.csv.spec.custom_resource_definitions.owned = vec![owned("a.example.com")];
        let mut conv = webhook(ConversionWebhook, "conv", "dep");
        conv.conversion_crds = vec!["c.example.com".into(), "a.example.com".into(), "b.example.com".into()];
        b.csv.spec.webhook_definitions = vec![conv];

        assert_eq!(
            check_conversion_webhooks_reference_owned_crds(&b),
            vec![
                "conversion webhook 'conv' references custom resource definition 'b.example.com' not owned bundle",
                "conversion webhook 'conv' references custom resource definition 'c.example.com' not owned bundle",
            ]
        );
    }

    #[test]
    fn test_conversion_webhook_support() {
        let mut b = bundle();
        b.csv.spec.webhook_definitions = vec![webhook(ConversionWebhook, "conv", "dep")];
        b.csv.spec.install_modes = vec![InstallMode::new(InstallModeType::AllNamespaces, true)];
        assert!(check_conversion_webhook_support(&b).is_empty());

        b.csv.spec.install_modes.push(InstallMode::new(InstallModeType::OwnNamespace, true));
        insta::assert_snapshot!(check_conversion_webhook_support(&b).join("\n"), @r#"bundle contains conversion webhook "conv" and supports install modes [AllNamespaces OwnNamespace] - conversion webhooks are only supported for bundles that only support AllNamespaces install mode"#);
    }

    #[test]
    fn test_webhook_rules() {
        let mut b = bundle();
        let mut validating = webhook(ValidatingAdmissionWebhook, "vwh", "dep");
        validating.rules = vec![
            rule(&["*"], &["pods"]),
            rule(&["admissionregistration.k8s.io"], &["ValidatingWebhookConfigurations", "other"]),
        ];
        let mut mutating = webhook(MutatingAdmissionWebhook, "mwh", "dep");
        mutating.rules = vec![rule(&["olm.operatorframework.io"], &["clusterextensions"])];
        let mut conversion = webhook(ConversionWebhook, "cwh", "dep");
        conversion.rules = vec![rule(&["*"], &["*"])];
        b.csv.spec.webhook_definitions = vec![validating, mutating, conversion];

        insta::assert_snapshot!(check_webhook_rules(&b).join("\n"), @r#"
        webhook "vwh" contains forbidden rule: admission webhook rules cannot reference API group "*"
        webhook "vwh" contains forbidden rule: admission webhook rules cannot reference resource "ValidatingWebhookConfigurations" for API group "admissionregistration.k8s.io"
        webhook "mwh" contains forbidden rule: admission webhook rules cannot reference API group "olm.operatorframework.io"
        "#);
    }
}
