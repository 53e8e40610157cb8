//! Type artifact generation
//!
//! Renders composed objects as TypeScript interfaces, plus an `index.ts`
//! barrel re-exporting every generated file.

use indexmap::IndexMap;
use lazy_regex::regex_is_match;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compose::ComposedObject;
use crate::traits::FieldSpec;

pub const BARREL_FILE: &str = "index.ts";

#[derive(Debug, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("Failed to create output directory {path}: {message}")]
    CreateDir { path: PathBuf, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// One rendered interface file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedInterface {
    pub name: String,
    pub file_name: String,
    pub content: String,
}

impl GeneratedInterface {
    /// Module path used by the barrel (`file_name` without `.ts`)
    pub fn module(&self) -> &str {
        self.file_name.strip_suffix(".ts").unwrap_or(&self.file_name)
    }
}

pub fn generate_interface(composed: &ComposedObject) -> GeneratedInterface {
    let name = type_name(&composed.name);
    let mut out = String::new();

    let _ = writeln!(out, "// Generated by traitsmith. Do not edit.");
    let _ = writeln!(out, "// Object: {}", composed.name);
    if composed.metadata.trait_order.is_empty() {
        let _ = writeln!(out, "// Traits: (none)");
    } else {
        let _ = writeln!(out, "// Traits: {}", composed.metadata.trait_order.join(", "));
    }
    out.push('\n');

    if let Some(ref description) = composed.description {
        let _ = writeln!(out, "/** {} */", description.trim());
    }
    let _ = writeln!(out, "export interface {} {{", name);
    for (key, spec) in &composed.schema {
        if let Some(ref description) = spec.description {
            let _ = writeln!(out, "  /** {} */", description.trim());
        }
        if let Some(provenance) = composed.provenance(key) {
            let _ = writeln!(out, "  // {}: {}", provenance.layer, provenance.source);
        }
        let optional = if spec.is_required() { "" } else { "?" };
        let _ = writeln!(out, "  {}{}: {};", property_key(key), optional, field_type(spec));
    }
    out.push_str("}\n");

    for (param, values) in parameter_unions(composed) {
        let _ = writeln!(out, "\nexport type {}{} = {};", name, type_name(&param), literal_union(&values));
    }

    GeneratedInterface {
        file_name: format!("{}.ts", name),
        name,
        content: out,
    }
}

/// `export * from` lines for every interface, sorted and deduplicated
pub fn generate_barrel(interfaces: &[GeneratedInterface]) -> String {
    let mut modules: Vec<&str> = interfaces.iter().map(|i| i.module()).collect();
    modules.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    modules.dedup();

    modules
        .into_iter()
        .map(|m| format!("export * from './{}';\n", m))
        .collect()
}

/// Write every interface plus the barrel into `dir`; returns written paths
pub fn write_artifacts(dir: &Path, interfaces: &[GeneratedInterface]) -> Result<Vec<PathBuf>, CodegenError> {
    fs::create_dir_all(dir).map_err(|e| CodegenError::CreateDir {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut written = Vec::with_capacity(interfaces.len() + 1);
    let files = interfaces
        .iter()
        .map(|i| (i.file_name.as_str(), i.content.clone()))
        .chain(std::iter::once((BARREL_FILE, generate_barrel(interfaces))));

    for (file_name, content) in files {
        let path = dir.join(file_name);
        fs::write(&path, content).map_err(|e| CodegenError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

/// Parameters given literal values by two or more traits, values merged in
/// first-seen order
fn parameter_unions(composed: &ComposedObject) -> Vec<(String, Vec<Value>)> {
    let mut unions = Vec::new();
    for (param, contributions) in &composed.parameters {
        let literal: Vec<&Vec<Value>> = contributions.iter().filter_map(|c| c.values.as_ref()).collect();
        if literal.len() < 2 {
            continue;
        }

        let mut values: Vec<Value> = Vec::new();
        for value in literal.into_iter().flatten() {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        unions.push((param.clone(), values));
    }
    unions
}

fn field_type(spec: &FieldSpec) -> String {
    if let Some(values) = spec.literal_values()
        && !values.is_empty()
    {
        return literal_union(values);
    }
    type_for(spec.kind.as_deref(), spec.items.as_ref())
}

fn type_for(kind: Option<&str>, items: Option<&Value>) -> String {
    let kind = kind.map(str::to_lowercase);
    match kind.as_deref() {
        Some("string" | "text" | "date" | "datetime" | "uuid" | "email") => "string".into(),
        Some("number" | "integer" | "float" | "decimal") => "number".into(),
        Some("boolean") => "boolean".into(),
        Some("array") => format!("Array<{}>", items_type(items)),
        Some("object" | "json") => "Record<string, unknown>".into(),
        _ => "unknown".into(),
    }
}

fn items_type(items: Option<&Value>) -> String {
    match items {
        Some(Value::String(kind)) => type_for(Some(kind), None),
        Some(Value::Object(map)) => match serde_json::from_value::<FieldSpec>(Value::Object(map.clone())) {
            Ok(spec) => field_type(&spec),
            Err(_) => "unknown".into(),
        },
        _ => "unknown".into(),
    }
}

fn literal_union(values: &[Value]) -> String {
    let mut seen: IndexMap<String, ()> = IndexMap::new();
    for value in values {
        let literal = match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => value.to_string(),
            _ => continue,
        };
        seen.entry(literal).or_default();
    }
    if seen.is_empty() {
        return "unknown".into();
    }
    seen.into_keys().collect::<Vec<_>>().join(" | ")
}

fn property_key(key: &str) -> String {
    if regex_is_match!(r"^[A-Za-z_$][A-Za-z0-9_$]*$", key) {
        key.to_string()
    } else {
        Value::String(key.to_string()).to_string()
    }
}

/// PascalCase identifier from an arbitrary name
fn type_name(name: &str) -> String {
    let mut out = String::new();
    for word in name.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Layer, ParameterContribution, Provenance};
    use crate::compose::composer::ComposedMetadata;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn composed(name: &str) -> ComposedObject {
        ComposedObject {
            name: name.to_string(),
            description: None,
            schema: IndexMap::new(),
            semantics: IndexMap::new(),
            tokens: IndexMap::new(),
            views: IndexMap::new(),
            actions: Vec::new(),
            parameters: IndexMap::new(),
            conflicts: Vec::new(),
            metadata: ComposedMetadata {
                trait_order: Vec::new(),
                trait_count: 0,
                provenance: IndexMap::new(),
                resolutions_applied: Vec::new(),
                extends: None,
                composed_at: Utc::now(),
                duration_ms: 0.0,
            },
        }
    }

    fn contribution(source: &str, values: Value) -> ParameterContribution {
        ParameterContribution {
            source: source.into(),
            kind: "enum".into(),
            values: values.as_array().cloned(),
            value: None,
        }
    }

    #[test]
    fn test_interface_fields() {
        let mut object = composed("Article");
        object.metadata.trait_order = vec!["Publishable".into()];
        object.schema.insert(
            "title".into(),
            FieldSpec {
                required: Some(true),
                description: Some("Headline".into()),
                ..FieldSpec::of_kind("text")
            },
        );
        object.schema.insert(
            "tags".into(),
            FieldSpec {
                items: Some(json!("string")),
                ..FieldSpec::of_kind("array")
            },
        );
        object.schema.insert(
            "status".into(),
            FieldSpec {
                allowed: Some(vec![json!("draft"), json!("published")]),
                ..FieldSpec::of_kind("string")
            },
        );
        object.schema.insert("content-type".into(), FieldSpec::of_kind("json"));
        object.schema.insert("extra".into(), FieldSpec::of_kind("geometry"));
        object.metadata.provenance.insert(
            "title".into(),
            Provenance {
                layer: Layer::Trait,
                source: "Publishable".into(),
            },
        );

        let generated = generate_interface(&object);
        assert_eq!(generated.file_name, "Article.ts");
        let content = &generated.content;
        assert!(content.contains("// Traits: Publishable"));
        assert!(content.contains("export interface Article {"));
        assert!(content.contains("  /** Headline */\n  // trait: Publishable\n  title: string;"));
        assert!(content.contains("  tags?: Array<string>;"));
        assert!(content.contains("  status?: \"draft\" | \"published\";"));
        assert!(content.contains("  \"content-type\"?: Record<string, unknown>;"));
        assert!(content.contains("  extra?: unknown;"));
    }

    #[test]
    fn test_parameter_union_is_deduplicated() {
        let mut object = composed("blog post");
        object.parameters.insert(
            "status".into(),
            vec![
                contribution("Publishable", json!(["draft", "published"])),
                contribution("Reviewable", json!(["published", "draft", "archived"])),
            ],
        );
        object
            .parameters
            .insert("mode".into(), vec![contribution("Publishable", json!(["a", "b"]))]);

        let generated = generate_interface(&object);
        assert_eq!(generated.name, "BlogPost");
        assert!(
            generated
                .content
                .contains("export type BlogPostStatus = \"draft\" | \"published\" | \"archived\";")
        );
        assert!(!generated.content.contains("BlogPostMode"));
    }

    #[test]
    fn test_barrel_is_sorted_and_order_independent() {
        let a = generate_interface(&composed("beta"));
        let b = generate_interface(&composed("Alpha"));
        let c = generate_interface(&composed("alpha"));

        let forward = generate_barrel(&[a.clone(), b.clone(), c.clone(), b.clone()]);
        let backward = generate_barrel(&[c, b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward, "export * from './Alpha';\nexport * from './Beta';\n");
    }

    #[test]
    fn test_write_artifacts() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("generated");
        let written = write_artifacts(&out, &[generate_interface(&composed("Task"))]).unwrap();

        assert_eq!(written.len(), 2);
        assert!(out.join("Task.ts").exists());
        assert_eq!(
            fs::read_to_string(out.join(BARREL_FILE)).unwrap(),
            "export * from './Task';\n"
        );
    }
}
