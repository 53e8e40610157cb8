//! Where parameter schemas come from

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::traits::loader::{TraitLoader, TraitRequest};
use crate::traits::{ParameterSpec, TraitDefinition, normalize_name};

/// Supplies a JSON Schema for a trait's parameter payload
///
/// `Ok(None)` means no schema exists for the trait; `Err` means one exists
/// but could not be read.
pub trait SchemaSource: Send + Sync {
    fn load_schema(&self, trait_name: &str) -> Result<Option<Value>, String>;

    /// Schema for one trait reference; sources keyed by name see its schema key
    fn load_for(&self, request: &TraitRequest) -> Result<Option<Value>, String> {
        self.load_schema(&request.schema_key())
    }

    /// Where a schema for this trait would be expected, for fix hints
    fn expected_location(&self, trait_name: &str) -> String;
}

/// Schemas stored as `<dir>/<Trait>.schema.{json,yaml,yml}`
#[derive(Debug, Clone)]
pub struct DirectorySchemaSource {
    dir: PathBuf,
}

const SCHEMA_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

impl DirectorySchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, trait_name: &str) -> Vec<PathBuf> {
        SCHEMA_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.schema.{}", trait_name, ext)))
            .collect()
    }
}

impl SchemaSource for DirectorySchemaSource {
    fn load_schema(&self, trait_name: &str) -> Result<Option<Value>, String> {
        let Some(path) = self.candidates(trait_name).into_iter().find(|p| p.is_file()) else {
            return Ok(None);
        };

        let text = fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let parsed = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        };

        log::debug!("Loaded parameter schema for \"{}\" from {}", trait_name, path.display());
        parsed
            .map(Some)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    fn expected_location(&self, trait_name: &str) -> String {
        self.dir.join(format!("{}.schema.json", trait_name)).display().to_string()
    }
}

/// In-memory schemas keyed by trait name (case-insensitive)
#[derive(Debug, Default)]
pub struct StaticSchemaSource {
    schemas: RwLock<HashMap<String, Value>>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, trait_name: &str, schema: Value) -> Self {
        self.insert(trait_name, schema);
        self
    }

    pub fn insert(&self, trait_name: &str, schema: Value) {
        self.schemas.write().insert(normalize_name(trait_name), schema);
    }
}

impl SchemaSource for StaticSchemaSource {
    fn load_schema(&self, trait_name: &str) -> Result<Option<Value>, String> {
        Ok(self.schemas.read().get(&normalize_name(trait_name)).cloned())
    }

    fn expected_location(&self, trait_name: &str) -> String {
        format!("registered schema for \"{}\"", trait_name)
    }
}

/// Derives a schema from the trait's own parameter declarations
pub struct DefinitionSchemaSource {
    loader: Arc<TraitLoader>,
}

impl DefinitionSchemaSource {
    pub fn new(loader: Arc<TraitLoader>) -> Self {
        Self { loader }
    }
}

impl SchemaSource for DefinitionSchemaSource {
    fn load_schema(&self, trait_name: &str) -> Result<Option<Value>, String> {
        self.load_for(&TraitRequest::named(trait_name))
    }

    // The full request hits the same loader cache entry as the resolver
    fn load_for(&self, request: &TraitRequest) -> Result<Option<Value>, String> {
        match self.loader.load(request) {
            Ok(loaded) => Ok(Some(parameter_schema(&loaded.definition))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn expected_location(&self, trait_name: &str) -> String {
        self.loader
            .candidates(&TraitRequest::named(trait_name))
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("{}.trait.json", trait_name))
    }
}

/// JSON Schema for a trait's parameter payload
pub fn parameter_schema(definition: &TraitDefinition) -> Value {
    let properties: IndexMap<&str, Value> = definition
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), parameter_property(p)))
        .collect();

    let required: Vec<&str> = definition
        .parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "title": format!("{} parameters", definition.name()),
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn parameter_property(param: &ParameterSpec) -> Value {
    let mut property = Map::new();
    let json_type = json_type(&param.kind);
    let is_array = json_type == Some("array");

    if let Some(kind) = json_type {
        property.insert("type".into(), Value::from(kind));
    }
    if let Some(ref description) = param.description {
        property.insert("description".into(), Value::from(description.as_str()));
    }
    if let Some(values) = param.literal_values() {
        let key = if is_array { "items" } else { "enum" };
        let values = Value::Array(values.to_vec());
        property.insert(key.into(), if is_array { json!({ "enum": values }) } else { values });
    }

    let rules = &param.validation;
    if let Some(min) = rules.minimum {
        property.insert("minimum".into(), json!(min));
    }
    if let Some(max) = rules.maximum {
        property.insert("maximum".into(), json!(max));
    }
    if let Some(min) = rules.min_length {
        property.insert(if is_array { "minItems" } else { "minLength" }.into(), json!(min));
    }
    if let Some(max) = rules.max_length {
        property.insert(if is_array { "maxItems" } else { "maxLength" }.into(), json!(max));
    }
    if let Some(ref pattern) = rules.pattern {
        property.insert("pattern".into(), Value::from(pattern.as_str()));
    }
    if param.deprecated {
        property.insert("deprecated".into(), Value::Bool(true));
    }

    Value::Object(property)
}

/// JSON Schema type for a declared trait type, if it maps to one
pub fn json_type(kind: &str) -> Option<&'static str> {
    match kind.to_ascii_lowercase().as_str() {
        "string" | "text" | "date" | "datetime" | "uuid" | "email" => Some("string"),
        "number" | "float" | "decimal" => Some("number"),
        "integer" => Some("integer"),
        "boolean" => Some("boolean"),
        "array" => Some("array"),
        "object" | "json" => Some("object"),
        _ => None,
    }
}
