//! Trait definitions
//!
//! A trait is a named, versioned bundle of schema fields, parameters and
//! metadata. Objects compose traits; each trait contributes:
//! - Parameters (with defaults and validation rules)
//! - Schema fields
//! - Semantics, view extensions and tokens
//!
//! Definitions are immutable once parsed and shared behind `Arc`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod graph;
pub mod library;
pub mod loader;
pub mod parser;

/// A fully parsed trait definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDefinition {
    #[serde(rename = "trait")]
    pub info: TraitInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSpec>,

    pub schema: IndexMap<String, FieldSpec>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub semantics: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub view_extensions: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tokens: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<StateMachine>,

    #[serde(default)]
    pub metadata: TraitMetadata,
}

/// Identity block (`trait:` key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitInfo {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A declared trait parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type", default = "default_parameter_type")]
    pub kind: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Literal values allowed for this parameter (shorthand for `validation.enum`)
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "ValidationRules::is_empty")]
    pub validation: ValidationRules,
}

fn default_parameter_type() -> String {
    "string".to_string()
}

impl ParameterSpec {
    /// Literal values from either the shorthand or the validation block
    pub fn literal_values(&self) -> Option<&[Value]> {
        self.allowed.as_deref().or(self.validation.allowed.as_deref())
    }
}

/// Validation rules shared by parameters and schema fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    /// Name of a parameter whose value supplies the allowed literal values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ValidationRules {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A schema field declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Element type for array fields (a type name or a nested declaration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "ValidationRules::is_empty")]
    pub validation: ValidationRules,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl FieldSpec {
    /// Shorthand constructor used for `field: type` declarations
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn literal_values(&self) -> Option<&[Value]> {
        self.allowed.as_deref().or(self.validation.allowed.as_deref())
    }
}

/// A dependency on another trait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Name(String),
    Detailed {
        #[serde(rename = "trait", alias = "name")]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl DependencySpec {
    pub fn name(&self) -> &str {
        match self {
            DependencySpec::Name(name) => name,
            DependencySpec::Detailed { name, .. } => name,
        }
    }
}

/// Optional lifecycle state machine contributed by a trait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachine {
    pub states: Vec<Value>,
    pub initial: String,
    #[serde(default)]
    pub transitions: Vec<Value>,
}

/// Free-form metadata plus the conflict list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl TraitDefinition {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    /// `namespace/name`, or just the name when no namespace is declared
    pub fn qualified_name(&self) -> String {
        match self.info.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.info.name),
            _ => self.info.name.clone(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Declared parameter defaults in declaration order
    pub fn default_parameters(&self) -> IndexMap<String, Value> {
        self.parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }

    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(DependencySpec::name)
    }

    /// Whether this trait declares a conflict with `other` (case-insensitive)
    pub fn conflicts_with(&self, other: &str) -> bool {
        self.metadata
            .conflicts_with
            .iter()
            .any(|c| c.eq_ignore_ascii_case(other))
    }
}

/// Normalize a trait or object name for case-insensitive lookup
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDITABLE: &str = r#"
trait:
  name: Auditable
  version: 1.0.0
  namespace: core
parameters:
  - name: retention
    type: number
    default: 30
  - name: level
    enum: [basic, full]
schema:
  created_at:
    type: datetime
    required: true
  created_by:
    type: string
    x-ui: hidden
dependencies:
  - Identifiable
  - trait: Timestamped
    version: 2.0.0
metadata:
  conflicts_with: [Ephemeral]
  owner: platform
"#;

    fn auditable() -> TraitDefinition {
        serde_yaml::from_str(AUDITABLE).unwrap()
    }

    #[test]
    fn test_deserialize_trait_definition() {
        let def = auditable();
        assert_eq!(def.name(), "Auditable");
        assert_eq!(def.qualified_name(), "core/Auditable");
        assert_eq!(def.parameters.len(), 2);
        assert_eq!(def.parameters[0].kind, "number");
        assert_eq!(def.parameters[1].kind, "string");
        assert!(def.schema["created_at"].is_required());
        assert!(!def.schema["created_by"].is_required());
        assert_eq!(def.schema["created_by"].extra["x-ui"], Value::from("hidden"));
        assert_eq!(def.metadata.extra["owner"], Value::from("platform"));
    }

    #[test]
    fn test_default_parameters_skip_missing_defaults() {
        let defaults = auditable().default_parameters();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults["retention"], Value::from(30));
    }

    #[test]
    fn test_dependency_names_accept_both_forms() {
        let def = auditable();
        let names: Vec<&str> = def.dependency_names().collect();
        assert_eq!(names, vec!["Identifiable", "Timestamped"]);
    }

    #[test]
    fn test_conflicts_with_is_case_insensitive() {
        let def = auditable();
        assert!(def.conflicts_with("ephemeral"));
        assert!(!def.conflicts_with("Searchable"));
    }

    #[test]
    fn test_literal_values_prefers_shorthand() {
        let def = auditable();
        let level = def.parameter("level").unwrap();
        assert_eq!(level.literal_values().unwrap().len(), 2);
        assert!(def.parameter("retention").unwrap().literal_values().is_none());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Order   Item "), "order item");
        assert_eq!(normalize_name("ALPHA"), "alpha");
    }
}
