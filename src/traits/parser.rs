//! Trait definition parsing
//!
//! Parses `<Name>.trait.<ext>` files into a [`TraitDefinition`].
//!
//! # Format
//!
//! ```yaml
//! trait:
//!   name: Auditable
//!   version: 1.0.0
//! parameters:
//!   - name: retention
//!     type: number
//!     default: 30
//! schema:
//!   created_at:
//!     type: datetime
//!     required: true
//!   created_by: string      # shorthand, data format only
//! ```
//!
//! Parsing never fails fast: every structural problem is collected and
//! returned together.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::TraitDefinition;
use crate::source::{self, ParseError, ParseErrorCode, Shape, ShapeCheck, SourceFormat};

/// Top-level sections a trait document may contain
pub const TRAIT_SECTIONS: &[&str] = &[
    "trait",
    "parameters",
    "schema",
    "semantics",
    "view_extensions",
    "tokens",
    "dependencies",
    "actions",
    "state_machine",
    "metadata",
];

/// Parse a trait definition from text
pub fn parse_trait(text: &str, format: SourceFormat, file: Option<&Path>) -> Result<TraitDefinition, Vec<ParseError>> {
    let mut root = source::read_document(text, format, file).map_err(|e| vec![e])?;

    let mut errors = check_structure(&root, format, file);
    if !errors.is_empty() {
        return Err(errors);
    }

    if !format.is_strict() {
        expand_field_shorthand(&mut root);
    }

    match source::conform::<TraitDefinition>(root, file) {
        Ok(definition) => Ok(definition),
        Err(e) => {
            errors.push(e);
            Err(errors)
        }
    }
}

/// Read and parse a trait file, detecting the format from its extension
pub fn parse_trait_file(path: &Path) -> Result<TraitDefinition, Vec<ParseError>> {
    let format = SourceFormat::from_path(path).ok_or_else(|| {
        vec![
            ParseError::new(
                ParseErrorCode::UnsupportedSource,
                "Unsupported trait source; expected .json, .yaml or .yml",
            )
            .with_file(Some(path)),
        ]
    })?;

    let text = fs::read_to_string(path).map_err(|e| {
        vec![ParseError::new(ParseErrorCode::ReadError, format!("Failed to read trait file: {}", e)).with_file(Some(path))]
    })?;

    log::debug!("Parsing trait file {} ({})", path.display(), format);
    parse_trait(&text, format, Some(path))
}

fn check_structure(root: &Map<String, Value>, format: SourceFormat, file: Option<&Path>) -> Vec<ParseError> {
    let mut check = ShapeCheck::new(file);

    if check.require(root, "trait", "trait", Shape::Object)
        && let Some(Value::Object(info)) = root.get("trait")
    {
        check.require(info, "name", "trait.name", Shape::String);
        check.require(info, "version", "trait.version", Shape::String);
    }

    check.require(root, "schema", "schema", Shape::Object);

    for key in ["parameters", "dependencies", "actions"] {
        check.optional(root, key, key, Shape::Array);
    }
    for key in ["semantics", "tokens", "metadata", "view_extensions"] {
        check.optional(root, key, key, Shape::Object);
    }

    if check.optional(root, "state_machine", "state_machine", Shape::Object)
        && let Some(Value::Object(machine)) = root.get("state_machine")
    {
        check_state_machine(&mut check, machine);
    }

    if format.is_strict() {
        check_conformance(&mut check, root);
    }

    check.finish()
}

fn check_state_machine(check: &mut ShapeCheck<'_>, machine: &Map<String, Value>) {
    match machine.get("states") {
        Some(Value::Array(states)) if !states.is_empty() => {
            let initial = machine.get("initial").and_then(Value::as_str);
            let names: Vec<&str> = states.iter().filter_map(Value::as_str).collect();
            if let Some(initial) = initial
                && names.len() == states.len()
                && !names.contains(&initial)
            {
                check.push(
                    ParseError::new(
                        ParseErrorCode::InvalidStateMachine,
                        format!("initial state '{}' is not one of the declared states", initial),
                    )
                    .with_field("state_machine.initial"),
                );
            }
        }
        _ => check.push(
            ParseError::new(ParseErrorCode::InvalidStateMachine, "must be a non-empty array")
                .with_field("state_machine.states"),
        ),
    }

    if !matches!(machine.get("initial"), Some(Value::String(_))) {
        check.push(ParseError::new(ParseErrorCode::InvalidStateMachine, "must be a string").with_field("state_machine.initial"));
    }
    if !matches!(machine.get("transitions"), Some(Value::Array(_))) {
        check.push(
            ParseError::new(ParseErrorCode::InvalidStateMachine, "must be an array").with_field("state_machine.transitions"),
        );
    }
}

/// Strict-format conformance: no unknown sections, no shorthand declarations
fn check_conformance(check: &mut ShapeCheck<'_>, root: &Map<String, Value>) {
    for key in root.keys() {
        if !TRAIT_SECTIONS.contains(&key.as_str()) {
            check.push(ParseError::new(ParseErrorCode::SchemaMismatch, "unknown section").with_field(key.clone()));
        }
    }

    if let Some(Value::Object(schema)) = root.get("schema") {
        for (field, decl) in schema {
            check.expect(decl, &format!("schema.{}", field), Shape::Object);
        }
    }

    if let Some(Value::Array(parameters)) = root.get("parameters") {
        for (index, param) in parameters.iter().enumerate() {
            let field = format!("parameters[{}]", index);
            if check.expect(param, &field, Shape::Object)
                && let Value::Object(param) = param
            {
                check.require(param, "name", &format!("{}.name", field), Shape::String);
            }
        }
    }
}

/// Expand `field: type` shorthand into `field: { type: type }`
fn expand_field_shorthand(root: &mut Map<String, Value>) {
    if let Some(Value::Object(schema)) = root.get_mut("schema") {
        for decl in schema.values_mut() {
            if let Value::String(kind) = decl {
                let mut expanded = Map::new();
                expanded.insert("type".to_string(), Value::String(kind.clone()));
                *decl = Value::Object(expanded);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const VALID_YAML: &str = r#"
trait:
  name: Searchable
  version: 1.2.0
parameters:
  - name: fields
    type: array
    default: [title]
schema:
  search_vector: string
  rank:
    type: number
state_machine:
  states: [idle, indexing]
  initial: idle
  transitions:
    - from: idle
      to: indexing
"#;

    #[test]
    fn test_parse_valid_yaml() {
        let def = parse_trait(VALID_YAML, SourceFormat::Yaml, None).unwrap();
        assert_eq!(def.name(), "Searchable");
        assert_eq!(def.version(), "1.2.0");
        assert_eq!(def.schema["search_vector"].kind.as_deref(), Some("string"));
        assert_eq!(def.state_machine.unwrap().initial, "idle");
    }

    #[test]
    fn test_missing_identity_and_schema_collected() {
        let errors = parse_trait("trait:\n  version: 1\n", SourceFormat::Yaml, None).unwrap_err();
        let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
        assert!(fields.contains(&"trait.name"));
        assert!(fields.contains(&"trait.version"));
        assert!(fields.contains(&"schema"));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_optional_blocks_must_have_right_shape() {
        let text = r#"
trait: { name: A, version: "1" }
schema: {}
parameters: { not: array }
tokens: [1, 2]
"#;
        let errors = parse_trait(text, SourceFormat::Yaml, None).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == ParseErrorCode::InvalidType));
    }

    #[test]
    fn test_invalid_state_machine() {
        let text = r#"
trait: { name: A, version: "1" }
schema: {}
state_machine:
  states: []
  initial: 3
"#;
        let errors = parse_trait(text, SourceFormat::Yaml, None).unwrap_err();
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ParseErrorCode::InvalidStateMachine; 3]);
    }

    #[test]
    fn test_initial_state_must_be_declared() {
        let text = r#"
trait: { name: A, version: "1" }
schema: {}
state_machine: { states: [a, b], initial: c, transitions: [] }
"#;
        let errors = parse_trait(text, SourceFormat::Yaml, None).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("state_machine.initial"));
    }

    #[test]
    fn test_strict_format_rejects_unknown_sections_and_shorthand() {
        let text = r#"{
  "trait": {"name": "A", "version": "1"},
  "schema": {"title": "string"},
  "extras": {}
}"#;
        let errors = parse_trait(text, SourceFormat::Json, None).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == ParseErrorCode::SchemaMismatch || e.code == ParseErrorCode::InvalidType));
    }

    #[test]
    fn test_strict_format_accepts_full_declarations() {
        let text = r#"{
  "trait": {"name": "A", "version": "1"},
  "parameters": [{"name": "limit", "type": "number", "default": 10}],
  "schema": {"title": {"type": "string", "required": true}}
}"#;
        let def = parse_trait(text, SourceFormat::Json, None).unwrap();
        assert_eq!(def.default_parameters()["limit"], Value::from(10));
    }

    #[test]
    fn test_parse_trait_file_unsupported_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("A.trait.ts");
        fs::write(&path, "export default {}").unwrap();

        let errors = parse_trait_file(&path).unwrap_err();
        assert_eq!(errors[0].code, ParseErrorCode::UnsupportedSource);
    }

    #[test]
    fn test_parse_trait_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Broken.trait.yaml");
        fs::write(&path, "trait: {}\n").unwrap();

        let errors = parse_trait_file(&path).unwrap_err();
        assert!(errors.iter().all(|e| e.file.as_deref() == Some(path.as_path())));
    }
}
