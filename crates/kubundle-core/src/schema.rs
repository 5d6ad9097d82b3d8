//! JSON Schema document primitives
//!
//! Configuration schemas are JSON Schema (draft-07) documents held as plain
//! `serde_json` maps so they can be mutated per install-mode combination and
//! handed to any bundle format. The base document is embedded at build time
//! and parsed once; every caller receives its own deep copy.
//!
//! Kubernetes field schemas live under `components/schemas` and are reached
//! through `$ref`s of the form `#/components/schemas/<name>`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};

/// A JSON Schema document (or sub-schema) as a generic map
pub type SchemaMap = Map<String, JsonValue>;

/// Prefix of every `$ref` pointing at a component schema
pub const COMPONENTS_REF_PREFIX: &str = "#/components/schemas/";

const BASE_SCHEMA_JSON: &str = include_str!("../schemas/bundle-config.schema.json");

static BASE_SCHEMA: Lazy<std::result::Result<SchemaMap, String>> = Lazy::new(|| {
    match serde_json::from_str::<JsonValue>(BASE_SCHEMA_JSON) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err("root is not a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
});

/// Fresh copy of the embedded base configuration schema
pub fn base_schema() -> Result<SchemaMap> {
    BASE_SCHEMA
        .as_ref()
        .cloned()
        .map_err(|e| CoreError::BaseSchema(e.clone()))
}

/// Mutable access to a schema's `properties` map
pub fn properties_mut(schema: &mut SchemaMap) -> Result<&mut SchemaMap> {
    schema
        .get_mut("properties")
        .and_then(JsonValue::as_object_mut)
        .ok_or_else(|| CoreError::BaseSchema("schema has no 'properties' object".to_string()))
}

/// Add `name` to the schema's `required` array unless already present
pub fn add_to_required(schema: &mut SchemaMap, name: &str) {
    let entry = schema
        .entry("required")
        .or_insert_with(|| JsonValue::Array(Vec::new()));

    if !entry.is_array() {
        *entry = JsonValue::Array(Vec::new());
    }

    if let JsonValue::Array(required) = entry {
        if !required.iter().any(|v| v.as_str() == Some(name)) {
            required.push(JsonValue::String(name.to_string()));
        }
    }
}

/// Remove `name` from the schema's `required` array, dropping the array once empty
pub fn remove_from_required(schema: &mut SchemaMap, name: &str) {
    let now_empty = match schema.get_mut("required") {
        Some(JsonValue::Array(required)) => {
            required.retain(|v| v.as_str() != Some(name));
            required.is_empty()
        }
        _ => return,
    };

    if now_empty {
        schema.remove("required");
    }
}

/// Collect every `$ref` string found anywhere below `value`
fn collect_refs(value: &JsonValue, out: &mut BTreeSet<String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                if key == "$ref" {
                    if let Some(reference) = child.as_str() {
                        out.insert(reference.to_string());
                    }
                } else {
                    collect_refs(child, out);
                }
            }
        }
        JsonValue::Array(items) => items.iter().for_each(|item| collect_refs(item, out)),
        _ => {}
    }
}

fn components(doc: &SchemaMap) -> Option<&SchemaMap> {
    doc.get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(JsonValue::as_object)
}

/// Names of the component schemas transitively referenced from the document
/// body (everything outside `components`)
pub fn referenced_components(doc: &SchemaMap) -> BTreeSet<String> {
    let mut pending = BTreeSet::new();
    for (key, value) in doc {
        if key != "components" {
            collect_refs(value, &mut pending);
        }
    }

    let schemas = components(doc);
    let mut seen = BTreeSet::new();
    let mut queue: Vec<String> = pending.into_iter().collect();

    while let Some(reference) = queue.pop() {
        let Some(name) = reference.strip_prefix(COMPONENTS_REF_PREFIX) else {
            continue;
        };
        if !seen.insert(name.to_string()) {
            continue;
        }
        if let Some(schema) = schemas.and_then(|s| s.get(name)) {
            let mut nested = BTreeSet::new();
            collect_refs(schema, &mut nested);
            queue.extend(nested);
        }
    }

    seen
}

/// `$ref`s that do not resolve inside the document
pub fn unresolved_refs(doc: &SchemaMap) -> BTreeSet<String> {
    let root = JsonValue::Object(doc.clone());
    let mut refs = BTreeSet::new();
    collect_refs(&root, &mut refs);

    refs.into_iter()
        .filter(|reference| match reference.strip_prefix('#') {
            Some("") => false,
            Some(pointer) => root.pointer(pointer).is_none(),
            None => true,
        })
        .collect()
}

/// Drop component schemas that nothing references any more
pub fn prune_unreferenced_components(doc: &mut SchemaMap) {
    let keep = referenced_components(doc);

    let Some(schemas) = doc
        .get_mut("components")
        .and_then(|c| c.get_mut("schemas"))
        .and_then(JsonValue::as_object_mut)
    else {
        return;
    };

    schemas.retain(|name, _| keep.contains(name));
}
