//! Typed view of the `deploymentConfig` configuration block

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EnvFromSource, EnvVar, ResourceRequirements, Toleration, Volume, VolumeMount,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ConfigError;
use crate::schema::SchemaMap;

/// Overrides applied on top of every deployment a bundle ships
///
/// Unset fields leave the bundle's own values untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl DeploymentConfig {
    /// Convert a validated `deploymentConfig` map into the typed view
    ///
    /// Quantities given as bare numbers (`cpu: 1`) are turned into their
    /// string form first, since that is how Kubernetes stores them.
    pub fn from_map(map: &SchemaMap) -> Result<Self, ConfigError> {
        let mut value = JsonValue::Object(map.clone());
        stringify_quantities(&mut value);

        serde_json::from_value(value)
            .map_err(|e| ConfigError::invalid(format!("invalid deploymentConfig: {e}")))
    }

    /// True if no override is set
    pub fn is_empty(&self) -> bool {
        *self == DeploymentConfig::default()
    }
}

fn stringify_number(value: &mut JsonValue) {
    if let JsonValue::Number(n) = value {
        *value = JsonValue::String(n.to_string());
    }
}

fn stringify_quantities(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map.iter_mut() {
                match key.as_str() {
                    "limits" | "requests" => {
                        if let JsonValue::Object(quantities) = child {
                            quantities.values_mut().for_each(stringify_number);
                        }
                    }
                    "sizeLimit" | "divisor" => stringify_number(child),
                    _ => stringify_quantities(child),
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(stringify_quantities),
        _ => {}
    }
}
