//! Configuration schema builder
//!
//! Derives a bundle's configuration schema from the install modes it
//! supports. Only the `watchNamespace` property varies:
//!
//! | Supported modes              | watchNamespace          | format             |
//! |------------------------------|-------------------------|--------------------|
//! | AllNamespaces only           | absent                  | -                  |
//! | OwnNamespace only            | required                | `own-namespace`    |
//! | SingleNamespace only         | required                | `single-namespace` |
//! | Own + Single                 | required                | -                  |
//! | All + Own / All + Single     | optional (`null` or ns) | own / single       |
//!
//! The `deploymentConfig` property is static and comes from the base document.

use serde_json::{Value as JsonValue, json};

use crate::bundle::{InstallModeSet, InstallModeType, RegistryV1};
use crate::error::Result;
use crate::naming::DNS1123_LABEL_MAX_LENGTH;
use crate::schema::{
    SchemaMap, add_to_required, base_schema, properties_mut, prune_unreferenced_components,
    remove_from_required,
};

/// Name of the watch namespace property
pub const WATCH_NAMESPACE: &str = "watchNamespace";

/// Name of the deployment configuration property
pub const DEPLOYMENT_CONFIG: &str = "deploymentConfig";

/// Format tag: value must equal the install namespace
pub const OWN_NAMESPACE_FORMAT: &str = "own-namespace";

/// Format tag: value must differ from the install namespace
pub const SINGLE_NAMESPACE_FORMAT: &str = "single-namespace";

const NAMESPACE_PATTERN: &str = "^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";

const WATCH_NAMESPACE_DESCRIPTION: &str =
    "The namespace that the operator should watch for custom resources";

/// Capability of a packaging format to describe its configuration surface
pub trait SchemaProvider {
    /// The JSON Schema user configuration is validated against
    fn get_config_schema(&self) -> Result<SchemaMap>;
}

impl SchemaProvider for RegistryV1 {
    fn get_config_schema(&self) -> Result<SchemaMap> {
        build_config_schema(&self.install_mode_set())
    }
}

/// Whether users may set `watchNamespace` at all
pub fn is_watch_namespace_configurable(modes: &InstallModeSet) -> bool {
    modes.supports(InstallModeType::SingleNamespace) || modes.supports(InstallModeType::OwnNamespace)
}

/// Whether `watchNamespace` must be provided
pub fn is_watch_namespace_required(modes: &InstallModeSet) -> bool {
    is_watch_namespace_configurable(modes) && !modes.supports(InstallModeType::AllNamespaces)
}

/// The namespace-equality format applying to `watchNamespace`, if any
pub fn watch_namespace_format(modes: &InstallModeSet) -> Option<&'static str> {
    let own = modes.supports(InstallModeType::OwnNamespace);
    let single = modes.supports(InstallModeType::SingleNamespace);

    match (own, single) {
        (true, false) => Some(OWN_NAMESPACE_FORMAT),
        (false, true) => Some(SINGLE_NAMESPACE_FORMAT),
        _ => None,
    }
}

/// Build the configuration schema for a set of supported install modes
pub fn build_config_schema(modes: &InstallModeSet) -> Result<SchemaMap> {
    let mut schema = base_schema()?;
    let required = is_watch_namespace_required(modes);

    let properties = properties_mut(&mut schema)?;
    if is_watch_namespace_configurable(modes) {
        let namespace = namespace_schema(watch_namespace_format(modes));
        let property = if required {
            namespace
        } else {
            json!({
                "description": WATCH_NAMESPACE_DESCRIPTION,
                "anyOf": [{"type": "null"}, namespace],
            })
        };
        properties.insert(WATCH_NAMESPACE.to_string(), property);
    } else {
        properties.remove(WATCH_NAMESPACE);
    }

    if required {
        add_to_required(&mut schema, WATCH_NAMESPACE);
    } else {
        remove_from_required(&mut schema, WATCH_NAMESPACE);
    }

    prune_unreferenced_components(&mut schema);

    tracing::debug!(
        modes = %modes,
        required,
        format = watch_namespace_format(modes).unwrap_or("none"),
        "built bundle configuration schema"
    );

    Ok(schema)
}

fn namespace_schema(format: Option<&str>) -> JsonValue {
    let mut schema = json!({
        "type": "string",
        "minLength": 1,
        "maxLength": DNS1123_LABEL_MAX_LENGTH,
        "pattern": NAMESPACE_PATTERN,
        "description": WATCH_NAMESPACE_DESCRIPTION,
    });

    if let (Some(format), Some(map)) = (format, schema.as_object_mut()) {
        map.insert("format".to_string(), JsonValue::String(format.to_string()));
    }

    schema
}
