//! Registry+v1 bundle model
//!
//! A registry+v1 bundle is made of:
//! - exactly one `ClusterServiceVersion` (CSV) describing the operator
//! - the `CustomResourceDefinition`s the operator owns
//! - any number of auxiliary manifests (Services, ConfigMaps, ...)
//!
//! Only the parts of the CSV that influence rendering are modelled here;
//! unknown CSV fields are ignored on deserialization.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Kind of a ClusterServiceVersion manifest
pub const CSV_KIND: &str = "ClusterServiceVersion";

/// Kind of a CustomResourceDefinition manifest
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// Port used for webhook services when the CSV leaves it unset
pub const DEFAULT_WEBHOOK_PORT: i32 = 443;

/// A registry+v1 bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryV1 {
    /// Name of the package the bundle belongs to
    pub package_name: String,
    /// The bundle's ClusterServiceVersion
    pub csv: ClusterServiceVersion,
    /// CustomResourceDefinitions shipped with the bundle
    pub crds: Vec<CustomResourceDefinition>,
    /// Every other manifest in the bundle
    pub others: Vec<DynamicObject>,
}

impl RegistryV1 {
    /// Build a bundle from a multi-document YAML stream
    ///
    /// Documents are classified by `kind`: exactly one ClusterServiceVersion is
    /// required, CRDs are collected separately and everything else is kept as
    /// an unstructured object. Empty documents are skipped.
    pub fn from_manifests(package_name: impl Into<String>, yaml: &str) -> Result<Self> {
        let mut csvs: Vec<ClusterServiceVersion> = Vec::new();
        let mut crds = Vec::new();
        let mut others = Vec::new();

        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = JsonValue::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let kind = value
                .get("kind")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| CoreError::InvalidManifest("manifest is missing 'kind'".to_string()))?;

            match kind {
                CSV_KIND => csvs.push(serde_json::from_value(value)?),
                CRD_KIND => crds.push(serde_json::from_value(value)?),
                _ => others.push(serde_json::from_value(value)?),
            }
        }

        if csvs.len() != 1 {
            return Err(CoreError::CsvCount { count: csvs.len() });
        }

        Ok(Self {
            package_name: package_name.into(),
            csv: csvs.remove(0),
            crds,
            others,
        })
    }

    /// Name of the CSV (`metadata.name`), empty if unset
    pub fn csv_name(&self) -> &str {
        self.csv.metadata.name.as_deref().unwrap_or_default()
    }

    /// Install modes the CSV marks as supported
    pub fn install_mode_set(&self) -> InstallModeSet {
        InstallModeSet::from_install_modes(&self.csv.spec.install_modes)
    }

    pub fn deployment_specs(&self) -> &[StrategyDeploymentSpec] {
        &self.csv.spec.install.spec.deployments
    }

    pub fn permissions(&self) -> &[StrategyDeploymentPermissions] {
        &self.csv.spec.install.spec.permissions
    }

    pub fn cluster_permissions(&self) -> &[StrategyDeploymentPermissions] {
        &self.csv.spec.install.spec.cluster_permissions
    }

    pub fn webhook_definitions(&self) -> &[WebhookDescription] {
        &self.csv.spec.webhook_definitions
    }

    /// Names of the CRDs the CSV declares as owned
    pub fn owned_crd_names(&self) -> BTreeSet<&str> {
        self.csv
            .spec
            .custom_resource_definitions
            .owned
            .iter()
            .map(|crd| crd.name.as_str())
            .collect()
    }
}

/// ClusterServiceVersion manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterServiceVersion {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterServiceVersionSpec,
}

impl ClusterServiceVersion {
    /// CSV-level annotations (empty if none)
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata.annotations.clone().unwrap_or_default()
    }
}

/// The parts of a CSV spec relevant to rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    #[serde(default)]
    pub install_modes: Vec<InstallMode>,

    #[serde(default)]
    pub install: NamedInstallStrategy,

    #[serde(default, rename = "customresourcedefinitions")]
    pub custom_resource_definitions: CustomResourceDefinitions,

    #[serde(default, rename = "apiservicedefinitions")]
    pub api_service_definitions: ApiServiceDefinitions,

    #[serde(default, rename = "webhookdefinitions")]
    pub webhook_definitions: Vec<WebhookDescription>,
}

/// Install strategy of a CSV (always the `deployment` strategy in practice)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedInstallStrategy {
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub spec: StrategyDetailsDeployment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetailsDeployment {
    #[serde(default)]
    pub deployments: Vec<StrategyDeploymentSpec>,
    #[serde(default)]
    pub permissions: Vec<StrategyDeploymentPermissions>,
    #[serde(default)]
    pub cluster_permissions: Vec<StrategyDeploymentPermissions>,
}

/// A named deployment the operator runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDeploymentSpec {
    pub name: String,
    #[serde(default)]
    pub spec: DeploymentSpec,
    /// Labels applied to the generated Deployment object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label: BTreeMap<String, String>,
}

/// RBAC rules granted to one service account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDeploymentPermissions {
    #[serde(default)]
    pub service_account_name: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomResourceDefinitions {
    #[serde(default)]
    pub owned: Vec<CrdDescription>,
    #[serde(default)]
    pub required: Vec<CrdDescription>,
}

/// Reference to a CRD from the CSV
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrdDescription {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiServiceDefinitions {
    #[serde(default)]
    pub owned: Vec<ApiServiceDescription>,
    #[serde(default)]
    pub required: Vec<ApiServiceDescription>,
}

/// Reference to an aggregated API service from the CSV
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServiceDescription {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub deployment_name: String,
}

// ============================================================================
// Install modes
// ============================================================================

/// The four OLM install modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstallModeType {
    AllNamespaces,
    MultiNamespace,
    OwnNamespace,
    SingleNamespace,
}

impl InstallModeType {
    /// Every install mode, in lexical order
    pub const ALL: [InstallModeType; 4] = [
        InstallModeType::AllNamespaces,
        InstallModeType::MultiNamespace,
        InstallModeType::OwnNamespace,
        InstallModeType::SingleNamespace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallModeType::AllNamespaces => "AllNamespaces",
            InstallModeType::MultiNamespace => "MultiNamespace",
            InstallModeType::OwnNamespace => "OwnNamespace",
            InstallModeType::SingleNamespace => "SingleNamespace",
        }
    }
}

impl fmt::Display for InstallModeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An install mode as declared in the CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMode {
    #[serde(rename = "type")]
    pub mode_type: InstallModeType,
    pub supported: bool,
}

impl InstallMode {
    pub fn new(mode_type: InstallModeType, supported: bool) -> Self {
        Self {
            mode_type,
            supported,
        }
    }
}

/// The set of install modes a bundle supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallModeSet(BTreeSet<InstallModeType>);

impl InstallModeSet {
    /// Collect the supported entries of a CSV install mode list
    pub fn from_install_modes(modes: &[InstallMode]) -> Self {
        modes
            .iter()
            .filter(|mode| mode.supported)
            .map(|mode| mode.mode_type)
            .collect()
    }

    pub fn supports(&self, mode: InstallModeType) -> bool {
        self.0.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = InstallModeType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<InstallModeType> for InstallModeSet {
    fn from_iter<I: IntoIterator<Item = InstallModeType>>(iter: I) -> Self {
        InstallModeSet(iter.into_iter().collect())
    }
}

impl fmt::Display for InstallModeSet {
    /// Renders as `[AllNamespaces OwnNamespace]`, sorted
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|mode| mode.as_str()).collect();
        write!(f, "[{}]", names.join(" "))
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// Admission type of a CSV webhook definition
///
/// Variants are ordered lexically so sorted error output matches the type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WebhookAdmissionType {
    ConversionWebhook,
    MutatingAdmissionWebhook,
    ValidatingAdmissionWebhook,
}

impl WebhookAdmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAdmissionType::ConversionWebhook => "ConversionWebhook",
            WebhookAdmissionType::MutatingAdmissionWebhook => "MutatingAdmissionWebhook",
            WebhookAdmissionType::ValidatingAdmissionWebhook => "ValidatingAdmissionWebhook",
        }
    }
}

impl fmt::Display for WebhookAdmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook served by one of the bundle's deployments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDescription {
    #[serde(rename = "type")]
    pub webhook_type: WebhookAdmissionType,

    #[serde(default)]
    pub generate_name: String,

    #[serde(default)]
    pub deployment_name: String,

    #[serde(default)]
    pub container_port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleWithOperations>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_selector: Option<LabelSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admission_review_versions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinvocation_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_path: Option<String>,

    #[serde(default, rename = "conversionCRDs", skip_serializing_if = "Vec::is_empty")]
    pub conversion_crds: Vec<String>,
}

impl WebhookDescription {
    /// Create a webhook definition with only the identifying fields set
    pub fn new(
        webhook_type: WebhookAdmissionType,
        generate_name: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            webhook_type,
            generate_name: generate_name.into(),
            deployment_name: deployment_name.into(),
            container_port: 0,
            target_port: None,
            rules: Vec::new(),
            failure_policy: None,
            match_policy: None,
            object_selector: None,
            side_effects: None,
            timeout_seconds: None,
            admission_review_versions: Vec::new(),
            reinvocation_policy: None,
            webhook_path: None,
            conversion_crds: Vec::new(),
        }
    }

    /// Container port, falling back to [`DEFAULT_WEBHOOK_PORT`]
    pub fn effective_container_port(&self) -> i32 {
        if self.container_port > 0 {
            self.container_port
        } else {
            DEFAULT_WEBHOOK_PORT
        }
    }
}
