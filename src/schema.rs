//! Structural schema inference.
//!
//! Derives a type-level description of a plain data sample: primitive
//! leaves, field-wise object recursion, and array element types with
//! structurally-deduplicated unions. The description is value-free; semantic
//! validation is someone else's job.
//!
//! Rendered schemas are deterministic: object fields are kept in canonical
//! (sorted) order, so two samples with the same shape always produce the
//! same text, regardless of key insertion order in the source document.

use crate::error::SchemaError;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::info;

/// A structural description of a data sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDescription {
    /// Null in the sample: nothing can be said about the type.
    Unknown,
    String,
    Number,
    Boolean,
    /// `None` element type means the sample array was empty: array of any.
    Array(Option<Box<SchemaDescription>>),
    /// Distinct element shapes of a heterogeneous array, in first-seen order.
    Union(Vec<SchemaDescription>),
    /// Fields in canonical order. An empty object is representable but
    /// forbids further narrowing.
    Object(Vec<(String, SchemaDescription)>),
}

impl SchemaDescription {
    /// Plain-data rendering of the description, used for the YAML artifact.
    pub fn to_value(&self) -> Value {
        match self {
            SchemaDescription::Unknown => json!({"type": "unknown"}),
            SchemaDescription::String => json!({"type": "string"}),
            SchemaDescription::Number => json!({"type": "number"}),
            SchemaDescription::Boolean => json!({"type": "boolean"}),
            SchemaDescription::Array(None) => json!({"type": "array", "items": "any"}),
            SchemaDescription::Array(Some(element)) => {
                json!({"type": "array", "items": element.to_value()})
            }
            SchemaDescription::Union(variants) => {
                let variants: Vec<Value> = variants.iter().map(Self::to_value).collect();
                json!({"type": "union", "variants": variants})
            }
            SchemaDescription::Object(fields) => {
                let mut rendered = Map::new();
                for (key, schema) in fields {
                    rendered.insert(key.clone(), schema.to_value());
                }
                json!({"type": "object", "fields": rendered})
            }
        }
    }

    /// Deterministic YAML text for the description.
    pub fn render(&self) -> String {
        serde_yaml::to_string(&self.to_value()).expect("schema value renders as YAML")
    }
}

/// Infer the schema of a sample, which must be an object at the root.
pub fn infer(sample: &Value) -> Result<SchemaDescription, SchemaError> {
    match sample {
        Value::Object(_) => Ok(describe(sample)),
        Value::Null => Err(SchemaError::NonObjectRoot("null")),
        Value::Bool(_) => Err(SchemaError::NonObjectRoot("boolean")),
        Value::Number(_) => Err(SchemaError::NonObjectRoot("number")),
        Value::String(_) => Err(SchemaError::NonObjectRoot("string")),
        Value::Array(_) => Err(SchemaError::NonObjectRoot("array")),
    }
}

/// Infer from any serializable sample. Values that do not serialize into
/// plain data (the input was assumed already serializable) are a fatal
/// inference error.
pub fn infer_sample<T: Serialize>(sample: &T) -> Result<SchemaDescription, SchemaError> {
    let value =
        serde_json::to_value(sample).map_err(|e| SchemaError::NotPlainData(e.to_string()))?;
    infer(&value)
}

fn describe(value: &Value) -> SchemaDescription {
    match value {
        Value::Null => SchemaDescription::Unknown,
        Value::Bool(_) => SchemaDescription::Boolean,
        Value::Number(_) => SchemaDescription::Number,
        Value::String(_) => SchemaDescription::String,
        Value::Array(items) if items.is_empty() => SchemaDescription::Array(None),
        Value::Array(items) => {
            // Structural dedup: element schemas that compare equal collapse
            // to one variant, first-seen order preserved.
            let mut variants: Vec<SchemaDescription> = Vec::new();
            for item in items {
                let schema = describe(item);
                if !variants.contains(&schema) {
                    variants.push(schema);
                }
            }
            let element = if variants.len() == 1 {
                variants.remove(0)
            } else {
                SchemaDescription::Union(variants)
            };
            SchemaDescription::Array(Some(Box::new(element)))
        }
        Value::Object(map) => SchemaDescription::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), describe(value)))
                .collect(),
        ),
    }
}

/// Compose a schema artifact from its parts.
///
/// Pre-existing content is preserved and the new schema text appended; only
/// an empty artifact gets the generated header. Callers that want
/// byte-identical regeneration pass an empty `existing`.
pub fn compose_artifact(
    existing: &str,
    name: &str,
    schema: &SchemaDescription,
    sample: &Value,
) -> String {
    let mut out = String::new();
    if existing.trim().is_empty() {
        out.push_str(&format!("# {} schema (generated)\n", name));
    } else {
        out.push_str(existing.trim_end());
        out.push_str("\n\n");
    }
    out.push_str(&schema.render());
    out.push_str(&sample_tree_comment(sample));
    out
}

/// Infer a schema for `sample` and write it to `path`, appending to any
/// existing artifact content.
pub fn generate_schema(sample: &Value, name: &str, path: &Path) -> Result<(), SchemaError> {
    let schema = infer(sample)?;
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    write_artifact(path, compose_artifact(&existing, name, &schema, sample))?;
    info!("wrote schema for {} to {}", name, path.display());
    Ok(())
}

/// Infer a schema for `sample` and write it to `path` from scratch.
///
/// Regenerating from an identical sample shape yields byte-identical output;
/// the watcher uses this after every settled edit.
pub fn regenerate_schema(sample: &Value, name: &str, path: &Path) -> Result<(), SchemaError> {
    let schema = infer(sample)?;
    write_artifact(path, compose_artifact("", name, &schema, sample))?;
    info!("regenerated schema for {} at {}", name, path.display());
    Ok(())
}

fn write_artifact(path: &Path, text: String) -> Result<(), SchemaError> {
    std::fs::write(path, text).map_err(|e| SchemaError::Artifact {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Commented tree sketch of the sample's keys, appended below the schema.
fn sample_tree_comment(sample: &Value) -> String {
    let mut lines = Vec::new();
    push_tree(sample, "", &mut lines);
    lines
        .into_iter()
        .map(|line| format!("#{}\n", line))
        .collect()
}

fn push_tree(value: &Value, prefix: &str, out: &mut Vec<String>) {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return,
    };
    let count = entries.len();
    for (i, (key, child)) in entries.into_iter().enumerate() {
        let (branch, continuation) = if i + 1 == count {
            ("└─ ", "   ")
        } else {
            ("├─ ", "│  ")
        };
        out.push(format!("{}{}{}", prefix, branch, key));
        push_tree(child, &format!("{}{}", prefix, continuation), out);
    }
}
