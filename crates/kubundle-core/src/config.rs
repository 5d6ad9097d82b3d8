//! Bundle configuration parsing and validation
//!
//! Parsing is format-agnostic: any bundle format hands over its schema
//! (see [`SchemaProvider`](crate::config_schema::SchemaProvider)) together
//! with the raw user configuration and the install namespace.
//!
//! The two namespace formats (`own-namespace`, `single-namespace`) depend on
//! the install namespace, so a validator is compiled per call with format
//! closures capturing it. The schema document itself never carries it.

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{ValidationError, Validator};
use serde_json::Value as JsonValue;

use crate::config_schema::{
    DEPLOYMENT_CONFIG, OWN_NAMESPACE_FORMAT, SINGLE_NAMESPACE_FORMAT, WATCH_NAMESPACE,
};
use crate::deployment_config::DeploymentConfig;
use crate::error::ConfigError;
use crate::schema::SchemaMap;

/// Validated user configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    watch_namespace: Option<String>,
    deployment_config: Option<SchemaMap>,
}

impl ParsedConfig {
    /// The namespace to watch, `None` when unset or `null`
    pub fn watch_namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref()
    }

    /// A private copy of the `deploymentConfig` block
    pub fn deployment_config(&self) -> Option<SchemaMap> {
        self.deployment_config.clone()
    }

    /// The `deploymentConfig` block as typed Kubernetes fields
    pub fn typed_deployment_config(&self) -> Result<Option<DeploymentConfig>, ConfigError> {
        self.deployment_config
            .as_ref()
            .map(DeploymentConfig::from_map)
            .transpose()
    }
}

/// Parse and validate raw YAML/JSON configuration
///
/// - `raw`: user input; `None` or blank input is validated as `{}`
/// - `schema`: the bundle's configuration schema; `None` skips validation
/// - `install_namespace`: namespace the bundle is installed into
pub fn parse_config(
    raw: Option<&[u8]>,
    schema: Option<&SchemaMap>,
    install_namespace: &str,
) -> Result<ParsedConfig, ConfigError> {
    let value = parse_raw(raw)?;

    let JsonValue::Object(config) = &value else {
        return Err(ConfigError::invalid(format!(
            "invalid type: got {}, want object",
            json_type_name(&value)
        )));
    };

    if let Some(schema) = schema {
        let validator = compile_validator(schema, install_namespace)?;
        let messages: Vec<String> = validator
            .iter_errors(&value)
            .flat_map(|error| format_validation_error(&error, install_namespace))
            .collect();

        if !messages.is_empty() {
            tracing::debug!(errors = messages.len(), "configuration failed schema validation");
            return Err(ConfigError::invalid(join_messages(messages)));
        }
    }

    let watch_namespace = match config.get(WATCH_NAMESPACE) {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(ns)) => Some(ns.clone()),
        Some(other) => return Err(type_mismatch(WATCH_NAMESPACE, other, "string")),
    };

    let deployment_config = match config.get(DEPLOYMENT_CONFIG) {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::Object(map)) => Some(map.clone()),
        Some(other) => return Err(type_mismatch(DEPLOYMENT_CONFIG, other, "object")),
    };

    Ok(ParsedConfig {
        watch_namespace,
        deployment_config,
    })
}

/// Compile `schema` with the namespace formats bound to `install_namespace`
pub fn compile_validator(
    schema: &SchemaMap,
    install_namespace: &str,
) -> Result<Validator, ConfigError> {
    let own = install_namespace.to_string();
    let single = install_namespace.to_string();

    jsonschema::options()
        .with_format(OWN_NAMESPACE_FORMAT, move |value: &str| {
            own.is_empty() || value == own
        })
        .with_format(SINGLE_NAMESPACE_FORMAT, move |value: &str| {
            single.is_empty() || value != single
        })
        .should_validate_formats(true)
        .build(&JsonValue::Object(schema.clone()))
        .map_err(|e| ConfigError::Schema {
            message: e.to_string(),
        })
}

fn parse_raw(raw: Option<&[u8]>) -> Result<JsonValue, ConfigError> {
    let raw = match raw {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => bytes,
        _ => b"{}".as_slice(),
    };

    serde_yaml::from_slice(raw).map_err(|e| ConfigError::invalid(normalize_parse_error(&e)))
}

/// Strip position details from parser errors so the message stays stable
fn normalize_parse_error(error: &serde_yaml::Error) -> String {
    let message = error.to_string();
    match message.find(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message,
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn type_mismatch(field: &str, got: &JsonValue, want: &str) -> ConfigError {
    ConfigError::invalid(format!(
        "invalid type for field \"{field}\": got {}, want {want}",
        json_type_name(got)
    ))
}

fn join_messages(mut messages: Vec<String>) -> String {
    if messages.len() == 1 {
        return messages.remove(0);
    }

    let mut joined = String::from("multiple errors found:");
    for message in messages {
        joined.push_str("\n  - ");
        joined.push_str(&message);
    }
    joined
}

/// `/deploymentConfig/env/0` -> `deploymentConfig.env.0`
fn field_path(instance_path: &str) -> String {
    instance_path.trim_start_matches('/').replace('/', ".")
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn format_validation_error(error: &ValidationError<'_>, install_namespace: &str) -> Vec<String> {
    let path = field_path(&error.instance_path.to_string());
    let instance: &JsonValue = &error.instance;

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            vec![format!(
                "required field \"{}\" is missing",
                child_path(&path, &name)
            )]
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|name| format!("unknown field \"{}\"", child_path(&path, name)))
            .collect(),
        ValidationErrorKind::Type { kind } => {
            if instance.is_null() {
                return vec![format!("required field \"{path}\" is missing")];
            }
            let want = match kind {
                TypeKind::Single(expected) => expected.to_string(),
                _ => "one of the allowed types".to_string(),
            };
            let got = json_type_name(instance);
            if path.is_empty() {
                vec![format!("invalid type: got {got}, want {want}")]
            } else {
                vec![format!(
                    "invalid type for field \"{path}\": got {got}, want {want}"
                )]
            }
        }
        ValidationErrorKind::Format { format } => {
            let value = instance.as_str().unwrap_or_default();
            let detail = match format.as_str() {
                OWN_NAMESPACE_FORMAT => format!(
                    "invalid value \"{value}\": must be \"{install_namespace}\" (the namespace where the operator is installed) \
                     because this operator only supports OwnNamespace install mode"
                ),
                SINGLE_NAMESPACE_FORMAT => format!(
                    "invalid value \"{value}\": must be different from \"{install_namespace}\" (the install namespace) \
                     because this operator uses SingleNamespace install mode to watch a different namespace"
                ),
                other => format!("\"{value}\" is not a valid \"{other}\""),
            };
            vec![format!("invalid format for field \"{path}\": {detail}")]
        }
        ValidationErrorKind::AnyOf { .. } => {
            if path.is_empty() {
                vec!["invalid value".to_string()]
            } else {
                vec![format!("invalid value for field \"{path}\"")]
            }
        }
        ValidationErrorKind::MaxLength { limit } => vec![format!(
            "field \"{path}\" must have maximum length of {limit} (len={})",
            instance.as_str().map(|s| s.chars().count()).unwrap_or_default()
        )],
        ValidationErrorKind::MinLength { limit } => vec![format!(
            "field \"{path}\" must have minimum length of {limit} (len={})",
            instance.as_str().map(|s| s.chars().count()).unwrap_or_default()
        )],
        ValidationErrorKind::Pattern { pattern } => {
            vec![format!("field \"{path}\" must match pattern \"{pattern}\"")]
        }
        _ => vec![format!("field \"{path}\": {error}")],
    }
}
