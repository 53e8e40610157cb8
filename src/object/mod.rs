//! Object definitions
//!
//! An object is a named composition of trait references. It may extend a
//! base object, add its own schema fields, and pick a collision policy per
//! key through `resolutions`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::FieldSpec;
use crate::traits::loader::TraitRequest;

pub mod parser;

/// A parsed `<Name>.object.<ext>` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub object: ObjectInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<TraitReference>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schema: IndexMap<String, FieldSpec>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub semantics: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tokens: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub views: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,

    #[serde(default)]
    pub resolutions: Resolutions,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

/// Identity block (`object:` key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

impl ObjectDefinition {
    pub fn name(&self) -> &str {
        &self.object.name
    }

    pub fn extends(&self) -> Option<&str> {
        self.object.extends.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Tags from `object.tags` and `metadata.tags`, first spelling kept
    pub fn tags(&self) -> Vec<String> {
        union_labels(&self.object.tags, self.metadata.get("tags"))
    }

    /// Domains from `object.domains` and `metadata.domains`, first spelling kept
    pub fn domains(&self) -> Vec<String> {
        union_labels(&self.object.domains, self.metadata.get("domains"))
    }

    /// References that will actually be loaded
    pub fn active_traits(&self) -> impl Iterator<Item = &TraitReference> {
        self.traits.iter().filter(|r| !r.disabled)
    }
}

fn union_labels(primary: &[String], extra: Option<&Value>) -> Vec<String> {
    let extra = extra
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);

    let mut labels: Vec<String> = Vec::new();
    for label in primary.iter().map(String::as_str).chain(extra) {
        let label = label.trim();
        if !label.is_empty() && !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            labels.push(label.to_string());
        }
    }
    labels
}

/// A reference from an object to a trait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReference")]
pub struct TraitReference {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Value>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// Accepted spellings of a trait reference
#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Name(String),
    Detailed {
        #[serde(alias = "trait")]
        name: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        parameters: IndexMap<String, Value>,
        #[serde(default)]
        disabled: bool,
        #[serde(default)]
        optional: bool,
    },
}

impl From<RawReference> for TraitReference {
    fn from(raw: RawReference) -> Self {
        match raw {
            RawReference::Name(name) => TraitReference::named(name),
            RawReference::Detailed {
                name,
                namespace,
                version,
                alias,
                parameters,
                disabled,
                optional,
            } => TraitReference {
                name,
                namespace,
                version,
                alias,
                parameters,
                disabled,
                optional,
            },
        }
    }
}

impl TraitReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            version: None,
            alias: None,
            parameters: IndexMap::new(),
            disabled: false,
            optional: false,
        }
    }

    /// Alias when given, otherwise the referenced name
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().filter(|a| !a.is_empty()).unwrap_or(&self.name)
    }

    /// Loader request for this reference
    pub fn request(&self) -> TraitRequest {
        TraitRequest {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            version: self.version.clone(),
        }
    }

    /// Key used to look up the trait's parameter schema (`namespace/name`)
    pub fn schema_key(&self) -> String {
        self.request().schema_key()
    }
}

/// How a collision on one key is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the earliest trait's definition
    UseTrait,
    /// Force the object's own definition
    UseObject,
    /// Merge declarations and composite default values
    Merge,
}

/// A resolution entry: a bare strategy or `{strategy, override}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawResolution")]
pub struct Resolution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,

    /// Applied last, at the context layer
    #[serde(rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_value: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResolution {
    Strategy(ResolutionStrategy),
    Detailed {
        #[serde(default)]
        strategy: Option<ResolutionStrategy>,
        #[serde(rename = "override", default)]
        override_value: Option<Value>,
    },
}

impl From<RawResolution> for Resolution {
    fn from(raw: RawResolution) -> Self {
        match raw {
            RawResolution::Strategy(strategy) => Resolution {
                strategy: Some(strategy),
                override_value: None,
            },
            RawResolution::Detailed {
                strategy,
                override_value,
            } => Resolution {
                strategy,
                override_value,
            },
        }
    }
}

/// Composite value merge depth for the `merge` strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Top-level keys of the later value win
    #[default]
    Shallow,
    /// Nested maps merge recursively; arrays and scalars are replaced
    Deep,
}

/// Per-section collision policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolutions {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Resolution>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub semantics: IndexMap<String, Resolution>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tokens: IndexMap<String, Resolution>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub views: IndexMap<String, Resolution>,

    #[serde(default, alias = "mergeStrategy")]
    pub merge_strategy: MergeStrategy,
}

impl Resolutions {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.semantics.is_empty() && self.tokens.is_empty() && self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALPHA: &str = r#"
object:
  name: Alpha
  extends: Base
  tags: [Core, Featured]
traits:
  - Searchable
  - name: Auditable
    alias: Audit
    parameters: { retention: 90 }
  - trait: Legacy
    disabled: true
schema:
  title: { type: string, required: true }
resolutions:
  fields:
    title: use_object
    status:
      strategy: merge
      override: { default: draft }
  merge_strategy: deep
metadata:
  tags: [featured, Beta]
  domains: [billing]
"#;

    fn alpha() -> ObjectDefinition {
        serde_yaml::from_str(ALPHA).unwrap()
    }

    #[test]
    fn test_reference_forms() {
        let def = alpha();
        assert_eq!(def.traits.len(), 3);
        assert_eq!(def.traits[0], TraitReference::named("Searchable"));
        assert_eq!(def.traits[1].effective_name(), "Audit");
        assert_eq!(def.traits[1].parameters["retention"], json!(90));
        assert_eq!(def.traits[2].name, "Legacy");
        assert_eq!(def.active_traits().count(), 2);
    }

    #[test]
    fn test_resolution_forms() {
        let res = alpha().resolutions;
        assert_eq!(res.fields["title"].strategy, Some(ResolutionStrategy::UseObject));
        assert_eq!(res.fields["status"].strategy, Some(ResolutionStrategy::Merge));
        assert_eq!(res.fields["status"].override_value, Some(json!({"default": "draft"})));
        assert_eq!(res.merge_strategy, MergeStrategy::Deep);
    }

    #[test]
    fn test_tags_and_domains_union() {
        let def = alpha();
        assert_eq!(def.tags(), vec!["Core", "Featured", "Beta"]);
        assert_eq!(def.domains(), vec!["billing"]);
        assert_eq!(def.extends(), Some("Base"));
    }

    #[test]
    fn test_schema_key_includes_namespace() {
        let mut reference = TraitReference::named("Auditable");
        assert_eq!(reference.schema_key(), "Auditable");
        reference.namespace = Some("core".to_string());
        assert_eq!(reference.schema_key(), "core/Auditable");
        assert_eq!(reference.request().namespace.as_deref(), Some("core"));
    }
}
