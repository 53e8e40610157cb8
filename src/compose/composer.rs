//! Object composition
//!
//! Folds layers into one schema, in order:
//!
//! 1. Foundation fields (configured, shared by every object)
//! 2. The base object named by `extends`
//! 3. Resolved traits, in declaration order
//! 4. The object's own `schema`
//! 5. Resolution overrides (the context layer)
//!
//! Every composed field records which layer and source produced it. Field,
//! parameter and compatibility conflicts are collected, never fatal.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use super::merge::{merge_field, merge_values};
use super::resolver::ResolvedTrait;
use crate::object::{ObjectDefinition, Resolution, ResolutionStrategy};
use crate::traits::graph::conflicting_pairs;
use crate::traits::{FieldSpec, TraitDefinition};
use crate::validation::rules::allowed_from;

/// Composition layer, in fold order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Foundation,
    Base,
    Trait,
    Object,
    Context,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::Foundation => "foundation",
            Layer::Base => "base",
            Layer::Trait => "trait",
            Layer::Object => "object",
            Layer::Context => "context",
        };
        write!(f, "{}", s)
    }
}

/// Where a composed field came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub layer: Layer,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Field,
    Parameter,
    Incompatible,
}

/// A non-fatal composition conflict between two sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// Field or parameter name; the second trait for incompatibilities
    pub key: String,
    pub sources: [String; 2],
    pub message: String,
}

/// One trait's declaration of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterContribution {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A resolutions entry that took effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResolution {
    pub section: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
    pub overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedMetadata {
    pub trait_order: Vec<String>,
    pub trait_count: usize,
    pub provenance: IndexMap<String, Provenance>,
    pub resolutions_applied: Vec<AppliedResolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    pub composed_at: DateTime<Utc>,
    pub duration_ms: f64,
}

/// The fully merged view of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: IndexMap<String, FieldSpec>,
    pub semantics: IndexMap<String, Value>,
    pub tokens: IndexMap<String, Value>,
    pub views: IndexMap<String, Value>,
    pub actions: Vec<Value>,
    pub parameters: IndexMap<String, Vec<ParameterContribution>>,
    pub conflicts: Vec<Conflict>,
    pub metadata: ComposedMetadata,
}

impl ComposedObject {
    pub fn provenance(&self, field: &str) -> Option<&Provenance> {
        self.metadata.provenance.get(field)
    }

    pub fn conflicts_of(&self, kind: ConflictKind) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(move |c| c.kind == kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComposerOptions {
    /// Fields every object starts with (layer `foundation`)
    pub foundation: IndexMap<String, FieldSpec>,
}

/// One layer's value for a key
struct Candidate<T> {
    layer: Layer,
    source: String,
    value: T,
}

/// Folds resolved traits into composed objects
#[derive(Debug, Clone, Default)]
pub struct ObjectComposer {
    options: ComposerOptions,
}

impl ObjectComposer {
    pub fn new(options: ComposerOptions) -> Self {
        Self { options }
    }

    pub fn compose(
        &self,
        object: &ObjectDefinition,
        resolved: &[ResolvedTrait],
        base: Option<&ComposedObject>,
    ) -> ComposedObject {
        let started = Instant::now();
        let merge = object.resolutions.merge_strategy;
        let object_source = format!("{} (object override)", object.name());
        let mut applied = Vec::new();

        // Schema
        let mut fields: IndexMap<String, Vec<Candidate<FieldSpec>>> = IndexMap::new();
        for (key, spec) in &self.options.foundation {
            push(&mut fields, key, Layer::Foundation, "foundation", spec.clone());
        }
        if let Some(base) = base {
            for (key, spec) in &base.schema {
                push(&mut fields, key, Layer::Base, &base.name, spec.clone());
            }
        }
        for rt in resolved {
            for (key, spec) in &rt.definition.schema {
                push(&mut fields, key, Layer::Trait, rt.name(), bind_enum_from(spec, rt));
            }
        }
        for (key, spec) in &object.schema {
            push(&mut fields, key, Layer::Object, &object_source, spec.clone());
        }
        for (key, resolution) in &object.resolutions.fields {
            let Some(ref value) = resolution.override_value else {
                continue;
            };
            match serde_json::from_value::<FieldSpec>(value.clone()) {
                Ok(spec) => push(&mut fields, key, Layer::Context, &object_source, spec),
                Err(e) => log::warn!("Ignoring invalid override for field \"{}\" on {}: {}", key, object.name(), e),
            }
        }

        let mut conflicts = field_conflicts(&fields);
        let mut schema = IndexMap::new();
        let mut provenance = IndexMap::new();
        for (key, candidates) in fields {
            let resolution = object.resolutions.fields.get(&key);
            note_applied(&mut applied, "fields", &key, resolution);
            if let Some(winner) = settle(candidates, resolution, |a, b| merge_field(a, b, merge)) {
                provenance.insert(
                    key.clone(),
                    Provenance {
                        layer: winner.layer,
                        source: winner.source,
                    },
                );
                schema.insert(key, winner.value);
            }
        }

        // Keyed sections
        let semantics = self.compose_section(
            "semantics",
            base.map(|b| &b.semantics),
            resolved,
            |d| &d.semantics,
            &object.semantics,
            &object.resolutions.semantics,
            object,
            &mut applied,
        );
        let tokens = self.compose_section(
            "tokens",
            base.map(|b| &b.tokens),
            resolved,
            |d| &d.tokens,
            &object.tokens,
            &object.resolutions.tokens,
            object,
            &mut applied,
        );
        let views = self.compose_section(
            "views",
            base.map(|b| &b.views),
            resolved,
            |d| &d.view_extensions,
            &object.views,
            &object.resolutions.views,
            object,
            &mut applied,
        );

        let mut actions: Vec<Value> = base.map(|b| b.actions.clone()).unwrap_or_default();
        for rt in resolved {
            actions.extend(rt.definition.actions.iter().cloned());
        }
        actions.extend(object.actions.iter().cloned());

        let parameters = parameter_contributions(resolved);
        conflicts.extend(parameter_conflicts(&parameters));
        conflicts.extend(incompatibilities(resolved));

        for conflict in &conflicts {
            log::debug!("Composition conflict in {}: {}", object.name(), conflict.message);
        }

        let trait_order: Vec<String> = resolved.iter().map(|rt| rt.name().to_string()).collect();
        ComposedObject {
            name: object.name().to_string(),
            description: object.object.description.clone(),
            schema,
            semantics,
            tokens,
            views,
            actions,
            parameters,
            conflicts,
            metadata: ComposedMetadata {
                trait_count: trait_order.len(),
                trait_order,
                provenance,
                resolutions_applied: applied,
                extends: object.extends().map(str::to_string),
                composed_at: Utc::now(),
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compose_section(
        &self,
        section: &str,
        base: Option<&IndexMap<String, Value>>,
        resolved: &[ResolvedTrait],
        pick: fn(&TraitDefinition) -> &IndexMap<String, Value>,
        own: &IndexMap<String, Value>,
        resolutions: &IndexMap<String, Resolution>,
        object: &ObjectDefinition,
        applied: &mut Vec<AppliedResolution>,
    ) -> IndexMap<String, Value> {
        let merge = object.resolutions.merge_strategy;
        let object_source = format!("{} (object override)", object.name());
        let mut entries: IndexMap<String, Vec<Candidate<Value>>> = IndexMap::new();

        if let Some(base) = base {
            for (key, value) in base {
                push(&mut entries, key, Layer::Base, "base", value.clone());
            }
        }
        for rt in resolved {
            for (key, value) in pick(&rt.definition) {
                push(&mut entries, key, Layer::Trait, rt.name(), value.clone());
            }
        }
        for (key, value) in own {
            push(&mut entries, key, Layer::Object, &object_source, value.clone());
        }
        for (key, resolution) in resolutions {
            if let Some(ref value) = resolution.override_value {
                push(&mut entries, key, Layer::Context, &object_source, value.clone());
            }
        }

        entries
            .into_iter()
            .filter_map(|(key, candidates)| {
                let resolution = resolutions.get(&key);
                note_applied(applied, section, &key, resolution);
                settle(candidates, resolution, |a, b| merge_values(a, b, merge)).map(|c| (key, c.value))
            })
            .collect()
    }
}

fn push<T>(map: &mut IndexMap<String, Vec<Candidate<T>>>, key: &str, layer: Layer, source: &str, value: T) {
    map.entry(key.to_string()).or_default().push(Candidate {
        layer,
        source: source.to_string(),
        value,
    });
}

fn note_applied(applied: &mut Vec<AppliedResolution>, section: &str, key: &str, resolution: Option<&Resolution>) {
    if let Some(resolution) = resolution {
        applied.push(AppliedResolution {
            section: section.to_string(),
            key: key.to_string(),
            strategy: resolution.strategy,
            overridden: resolution.override_value.is_some(),
        });
    }
}

/// Pick the surviving candidate for one key
fn settle<T: Clone>(
    candidates: Vec<Candidate<T>>,
    resolution: Option<&Resolution>,
    merge: impl Fn(&T, &T) -> T,
) -> Option<Candidate<T>> {
    let (context, layered): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.layer == Layer::Context);

    let winner = match resolution.and_then(|r| r.strategy) {
        Some(ResolutionStrategy::UseTrait) => {
            let first_trait = layered.iter().position(|c| c.layer == Layer::Trait);
            pick(layered, first_trait)
        }
        Some(ResolutionStrategy::UseObject) => {
            let object = layered.iter().rposition(|c| c.layer == Layer::Object);
            pick(layered, object)
        }
        Some(ResolutionStrategy::Merge) => layered.into_iter().reduce(|acc, next| Candidate {
            value: merge(&acc.value, &next.value),
            layer: next.layer,
            source: next.source,
        }),
        None => layered.into_iter().last(),
    };

    context.into_iter().fold(winner, |current, overlay| {
        Some(match current {
            Some(current) => Candidate {
                value: merge(&current.value, &overlay.value),
                layer: overlay.layer,
                source: overlay.source,
            },
            None => overlay,
        })
    })
}

/// Candidate at `index`, or the last one when the strategy has no match
fn pick<T>(mut candidates: Vec<Candidate<T>>, index: Option<usize>) -> Option<Candidate<T>> {
    match index {
        Some(index) => Some(candidates.swap_remove(index)),
        None => candidates.pop(),
    }
}

/// Resolve `validation.enum_from` against the contributing trait's parameters
fn bind_enum_from(spec: &FieldSpec, rt: &ResolvedTrait) -> FieldSpec {
    let Some(source) = spec.validation.enum_from.as_deref() else {
        return spec.clone();
    };

    match allowed_from(&rt.parameters, source) {
        Some(values) => {
            let mut bound = spec.clone();
            bound.allowed = Some(values.to_vec());
            bound.validation.enum_from = None;
            bound
        }
        None => {
            log::debug!(
                "Field enum_from \"{}\" on trait {} has no literal list to bind",
                source,
                rt.name()
            );
            spec.clone()
        }
    }
}

/// Literal set, order-insensitive
fn literal_set(values: Option<&[Value]>) -> Option<BTreeSet<String>> {
    values.map(|v| v.iter().map(Value::to_string).collect())
}

fn differs(kind_a: Option<&str>, kind_b: Option<&str>, values_a: Option<&[Value]>, values_b: Option<&[Value]>) -> bool {
    let norm = |k: Option<&str>| k.map(str::to_ascii_lowercase);
    norm(kind_a) != norm(kind_b) || literal_set(values_a) != literal_set(values_b)
}

/// Trait-layer fields declared differently by two traits
fn field_conflicts(fields: &IndexMap<String, Vec<Candidate<FieldSpec>>>) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (key, candidates) in fields {
        let traits: Vec<&Candidate<FieldSpec>> = candidates.iter().filter(|c| c.layer == Layer::Trait).collect();
        for (i, a) in traits.iter().enumerate() {
            for b in &traits[i + 1..] {
                if differs(
                    a.value.kind.as_deref(),
                    b.value.kind.as_deref(),
                    a.value.literal_values(),
                    b.value.literal_values(),
                ) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Field,
                        key: key.clone(),
                        sources: [a.source.clone(), b.source.clone()],
                        message: format!(
                            "Field \"{}\" is declared differently by \"{}\" and \"{}\"",
                            key, a.source, b.source
                        ),
                    });
                }
            }
        }
    }
    conflicts
}

fn parameter_contributions(resolved: &[ResolvedTrait]) -> IndexMap<String, Vec<ParameterContribution>> {
    let mut parameters: IndexMap<String, Vec<ParameterContribution>> = IndexMap::new();
    for rt in resolved {
        for param in &rt.definition.parameters {
            parameters.entry(param.name.clone()).or_default().push(ParameterContribution {
                source: rt.name().to_string(),
                kind: param.kind.clone(),
                values: param.literal_values().map(<[Value]>::to_vec),
                value: rt.parameters.get(&param.name).cloned(),
            });
        }
    }
    parameters
}

/// One conflict per pair of traits declaring a parameter differently
fn parameter_conflicts(parameters: &IndexMap<String, Vec<ParameterContribution>>) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (name, contributions) in parameters {
        for (i, a) in contributions.iter().enumerate() {
            for b in &contributions[i + 1..] {
                if differs(Some(a.kind.as_str()), Some(b.kind.as_str()), a.values.as_deref(), b.values.as_deref()) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Parameter,
                        key: name.clone(),
                        sources: [a.source.clone(), b.source.clone()],
                        message: format!(
                            "Parameter \"{}\" is declared differently by \"{}\" and \"{}\"",
                            name, a.source, b.source
                        ),
                    });
                }
            }
        }
    }
    conflicts
}

fn incompatibilities(resolved: &[ResolvedTrait]) -> Vec<Conflict> {
    let definitions: Vec<&TraitDefinition> = resolved.iter().map(|rt| rt.definition.as_ref()).collect();
    conflicting_pairs(&definitions)
        .into_iter()
        .map(|(i, j)| {
            let (a, b) = (resolved[i].name(), resolved[j].name());
            Conflict {
                kind: ConflictKind::Incompatible,
                key: b.to_string(),
                sources: [a.to_string(), b.to_string()],
                message: format!("Traits \"{}\" and \"{}\" are declared incompatible", a, b),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::parser::parse_object;
    use crate::object::TraitReference;
    use crate::source::SourceFormat;
    use crate::traits::parser::parse_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn resolved(yaml: &str, params: &[(&str, Value)], alias: Option<&str>) -> ResolvedTrait {
        let definition = parse_trait(yaml, SourceFormat::Yaml, None).unwrap();
        let mut reference = TraitReference::named(definition.name());
        reference.alias = alias.map(str::to_string);
        let mut parameters = definition.default_parameters();
        for (k, v) in params {
            parameters.insert(k.to_string(), v.clone());
        }
        ResolvedTrait {
            reference,
            definition: Arc::new(definition),
            parameters,
            source_path: PathBuf::from("mem"),
            resolved_at: Utc::now(),
        }
    }

    fn object(yaml: &str) -> ObjectDefinition {
        parse_object(yaml, SourceFormat::Yaml, None).unwrap()
    }

    const SEARCHABLE: &str = r#"
trait: { name: Searchable, version: 1.0.0 }
schema:
  title: { type: string, required: true }
  rank: number
semantics:
  title: { role: label }
view_extensions:
  list: { columns: [title] }
"#;

    const AUDITABLE: &str = r#"
trait: { name: Auditable, version: 1.0.0 }
schema:
  created_at: datetime
  title: text
tokens:
  color: { primary: blue, accent: gray }
"#;

    #[test]
    fn test_layers_and_provenance() {
        let foundation: IndexMap<String, FieldSpec> = [("id".to_string(), FieldSpec::of_kind("uuid"))].into_iter().collect();
        let composer = ObjectComposer::new(ComposerOptions { foundation });

        let obj = object("object: { name: Doc }\nschema:\n  body: text\n");
        let composed = composer.compose(
            &obj,
            &[resolved(SEARCHABLE, &[], None), resolved(AUDITABLE, &[], Some("Audit"))],
            None,
        );

        let keys: Vec<_> = composed.schema.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "title", "rank", "created_at", "body"]);
        assert_eq!(composed.provenance("id").unwrap().layer, Layer::Foundation);
        assert_eq!(composed.provenance("title").unwrap().source, "Audit");
        assert_eq!(composed.schema["title"].kind.as_deref(), Some("text"));
        assert_eq!(
            composed.provenance("body").unwrap(),
            &Provenance {
                layer: Layer::Object,
                source: "Doc (object override)".to_string()
            }
        );
        assert_eq!(composed.metadata.trait_order, vec!["Searchable", "Audit"]);
        assert_eq!(composed.metadata.trait_count, 2);
        assert_eq!(composed.views["list"], json!({"columns": ["title"]}));

        for key in composed.schema.keys() {
            assert!(composed.metadata.provenance.contains_key(key));
        }
    }

    #[test]
    fn test_field_conflict_between_traits() {
        let composed = ObjectComposer::default().compose(
            &object("object: { name: Doc }\n"),
            &[resolved(SEARCHABLE, &[], None), resolved(AUDITABLE, &[], None)],
            None,
        );
        let conflicts: Vec<_> = composed.conflicts_of(ConflictKind::Field).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "title");
        assert_eq!(conflicts[0].sources, ["Searchable".to_string(), "Auditable".to_string()]);
    }

    #[test]
    fn test_use_trait_keeps_earliest_even_over_object() {
        let obj = object(
            "object: { name: Doc }\nschema:\n  title: { type: string, description: mine }\nresolutions:\n  fields: { title: use_trait }\n",
        );
        let composed = ObjectComposer::default().compose(
            &obj,
            &[resolved(SEARCHABLE, &[], None), resolved(AUDITABLE, &[], None)],
            None,
        );
        assert_eq!(composed.provenance("title").unwrap().source, "Searchable");
        assert!(composed.schema["title"].description.is_none());
        assert_eq!(composed.metadata.resolutions_applied.len(), 1);
    }

    #[test]
    fn test_use_object_forces_object_definition() {
        let obj = object(
            "object: { name: Doc }\nschema:\n  title: { type: string }\nresolutions:\n  fields:\n    title: use_object\n",
        );
        let composed = ObjectComposer::default().compose(&obj, &[resolved(SEARCHABLE, &[], None)], None);
        assert_eq!(composed.provenance("title").unwrap().layer, Layer::Object);
        assert!(!composed.schema["title"].is_required());
    }

    #[test]
    fn test_merge_strategy_and_context_override() {
        let trait_a = r#"
trait: { name: A, version: "1" }
schema:
  settings: { type: object, default: { theme: { mode: dark, size: 2 }, tags: [a] } }
"#;
        let trait_b = r#"
trait: { name: B, version: "1" }
schema:
  settings: { type: object, default: { theme: { size: 3 }, tags: [b] }, description: merged }
"#;
        let deep = object(
            r#"
object: { name: Doc }
resolutions:
  fields:
    settings: merge
    status:
      override: { type: string, default: draft }
  merge_strategy: deep
"#,
        );
        let composed = ObjectComposer::default().compose(
            &deep,
            &[resolved(trait_a, &[], None), resolved(trait_b, &[], None)],
            None,
        );
        let settings = &composed.schema["settings"];
        assert_eq!(settings.description.as_deref(), Some("merged"));
        assert_eq!(settings.default, Some(json!({"theme": {"mode": "dark", "size": 3}, "tags": ["b"]})));
        assert_eq!(composed.provenance("status").unwrap().layer, Layer::Context);
        assert_eq!(composed.schema["status"].default, Some(json!("draft")));

        let shallow = object("object: { name: Doc }\nresolutions:\n  fields: { settings: merge }\n");
        let composed = ObjectComposer::default().compose(
            &shallow,
            &[resolved(trait_a, &[], None), resolved(trait_b, &[], None)],
            None,
        );
        assert_eq!(
            composed.schema["settings"].default,
            Some(json!({"theme": {"size": 3}, "tags": ["b"]}))
        );
    }

    #[test]
    fn test_sections_use_strategies() {
        let obj = object(
            r#"
object: { name: Doc }
tokens:
  color: { primary: red }
resolutions:
  tokens: { color: merge }
"#,
        );
        let composed = ObjectComposer::default().compose(&obj, &[resolved(AUDITABLE, &[], None)], None);
        assert_eq!(composed.tokens["color"], json!({"primary": "red", "accent": "gray"}));
    }

    #[test]
    fn test_base_layer() {
        let base_obj = object("object: { name: Base }\nschema:\n  owner: string\n");
        let base = ObjectComposer::default().compose(&base_obj, &[], None);

        let child = object("object: { name: Child, extends: Base }\n");
        let composed = ObjectComposer::default().compose(&child, &[resolved(SEARCHABLE, &[], None)], Some(&base));
        assert_eq!(
            composed.provenance("owner").unwrap(),
            &Provenance {
                layer: Layer::Base,
                source: "Base".to_string()
            }
        );
        assert_eq!(composed.metadata.extends.as_deref(), Some("Base"));
    }

    const STATUS_A: &str = r#"
trait: { name: Publishable, version: "1" }
parameters:
  - name: status
    enum: [draft, published]
schema: {}
"#;

    #[test]
    fn test_identical_parameters_do_not_conflict() {
        let status_b = STATUS_A.replace("Publishable", "Reviewable").replace("[draft, published]", "[published, draft]");
        let composed = ObjectComposer::default().compose(
            &object("object: { name: Doc }\n"),
            &[resolved(STATUS_A, &[], None), resolved(&status_b, &[], None)],
            None,
        );
        assert_eq!(composed.conflicts_of(ConflictKind::Parameter).count(), 0);
        assert_eq!(composed.parameters["status"].len(), 2);
    }

    #[test]
    fn test_differing_parameters_conflict_once() {
        let status_b = STATUS_A.replace("Publishable", "Reviewable").replace("[draft, published]", "[draft, archived]");
        let composed = ObjectComposer::default().compose(
            &object("object: { name: Doc }\n"),
            &[resolved(STATUS_A, &[], None), resolved(&status_b, &[], None)],
            None,
        );
        let conflicts: Vec<_> = composed.conflicts_of(ConflictKind::Parameter).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].sources, ["Publishable".to_string(), "Reviewable".to_string()]);
    }

    #[test]
    fn test_incompatible_traits() {
        let persistent = "trait: { name: Persistent, version: '1' }\nschema: {}\nmetadata: { conflicts_with: [Ephemeral] }\n";
        let ephemeral = "trait: { name: Ephemeral, version: '1' }\nschema: {}\n";
        let composed = ObjectComposer::default().compose(
            &object("object: { name: Doc }\n"),
            &[resolved(persistent, &[], None), resolved(ephemeral, &[], None)],
            None,
        );
        assert_eq!(composed.conflicts_of(ConflictKind::Incompatible).count(), 1);
    }

    #[test]
    fn test_enum_from_binds_trait_parameter() {
        let workflow = r#"
trait: { name: Workflow, version: "1" }
parameters:
  - name: states
    type: array
    default: [draft, live]
schema:
  state: { type: string, validation: { enum_from: states } }
"#;
        let composed = ObjectComposer::default().compose(
            &object("object: { name: Doc }\n"),
            &[resolved(workflow, &[("states", json!(["open", "closed"]))], None)],
            None,
        );
        let state = &composed.schema["state"];
        assert_eq!(state.allowed, Some(vec![json!("open"), json!("closed")]));
        assert!(state.validation.enum_from.is_none());
    }
}
