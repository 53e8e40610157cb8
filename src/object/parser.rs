//! Object definition parsing
//!
//! Same two formats as traits: YAML accepts `field: type` shorthand in
//! `schema`, JSON rejects unknown sections and shorthand.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::ObjectDefinition;
use crate::traits::FieldSpec;
use crate::source::{self, ParseError, ParseErrorCode, Shape, ShapeCheck, SourceFormat};

/// Top-level sections an object document may contain
pub const OBJECT_SECTIONS: &[&str] = &[
    "object",
    "traits",
    "schema",
    "semantics",
    "tokens",
    "views",
    "actions",
    "resolutions",
    "metadata",
];

/// Parse an object definition from text
pub fn parse_object(text: &str, format: SourceFormat, file: Option<&Path>) -> Result<ObjectDefinition, Vec<ParseError>> {
    let mut root = source::read_document(text, format, file).map_err(|e| vec![e])?;

    let errors = check_structure(&root, format, file);
    if !errors.is_empty() {
        return Err(errors);
    }

    if !format.is_strict()
        && let Some(Value::Object(schema)) = root.get_mut("schema")
    {
        for decl in schema.values_mut() {
            if let Value::String(kind) = decl {
                let mut expanded = Map::new();
                expanded.insert("type".to_string(), Value::String(kind.clone()));
                *decl = Value::Object(expanded);
            }
        }
    }

    source::conform::<ObjectDefinition>(root, file).map_err(|e| vec![e])
}

/// Read and parse an object file, detecting the format from its extension
pub fn parse_object_file(path: &Path) -> Result<ObjectDefinition, Vec<ParseError>> {
    let format = SourceFormat::from_path(path).ok_or_else(|| {
        vec![
            ParseError::new(
                ParseErrorCode::UnsupportedSource,
                "Unsupported object source; expected .json, .yaml or .yml",
            )
            .with_file(Some(path)),
        ]
    })?;

    let text = fs::read_to_string(path).map_err(|e| {
        vec![ParseError::new(ParseErrorCode::ReadError, format!("Failed to read object file: {}", e)).with_file(Some(path))]
    })?;

    log::debug!("Parsing object file {} ({})", path.display(), format);
    parse_object(&text, format, Some(path))
}

fn check_structure(root: &Map<String, Value>, format: SourceFormat, file: Option<&Path>) -> Vec<ParseError> {
    let mut check = ShapeCheck::new(file);

    if check.require(root, "object", "object", Shape::Object)
        && let Some(Value::Object(info)) = root.get("object")
    {
        if check.require(info, "name", "object.name", Shape::String)
            && info.get("name").and_then(Value::as_str).is_some_and(|n| n.trim().is_empty())
        {
            check.push(ParseError::new(ParseErrorCode::MissingField, "must not be empty").with_field("object.name"));
        }
        check.optional(info, "extends", "object.extends", Shape::String);
        check.optional(info, "tags", "object.tags", Shape::Array);
        check.optional(info, "domains", "object.domains", Shape::Array);
    }

    if check.optional(root, "traits", "traits", Shape::Array)
        && let Some(Value::Array(traits)) = root.get("traits")
    {
        for (index, reference) in traits.iter().enumerate() {
            let field = format!("traits[{}]", index);
            match reference {
                Value::String(_) => {}
                Value::Object(map) => {
                    let key = if map.contains_key("name") { "name" } else { "trait" };
                    check.require(map, key, &format!("{}.name", field), Shape::String);
                    check.optional(map, "parameters", &format!("{}.parameters", field), Shape::Object);
                }
                other => check.push(
                    ParseError::new(
                        ParseErrorCode::InvalidType,
                        format!("expected a trait name or mapping, found {}", source::describe(other)),
                    )
                    .with_field(field),
                ),
            }
        }
    }

    for key in ["schema", "semantics", "tokens", "views", "resolutions", "metadata"] {
        check.optional(root, key, key, Shape::Object);
    }
    check.optional(root, "actions", "actions", Shape::Array);

    if let Some(Value::Object(resolutions)) = root.get("resolutions")
        && let Some(Value::Object(fields)) = resolutions.get("fields")
    {
        for (key, resolution) in fields {
            let Some(value) = resolution.as_object().and_then(|r| r.get("override")) else {
                continue;
            };
            let field = format!("resolutions.fields.{}.override", key);
            if check.expect(value, &field, Shape::Object)
                && let Err(e) = serde_json::from_value::<FieldSpec>(value.clone())
            {
                check.push(
                    ParseError::new(ParseErrorCode::SchemaMismatch, format!("invalid field declaration: {}", e))
                        .with_field(field),
                );
            }
        }
    }

    if format.is_strict() {
        for key in root.keys() {
            if !OBJECT_SECTIONS.contains(&key.as_str()) {
                check.push(ParseError::new(ParseErrorCode::SchemaMismatch, "unknown section").with_field(key.clone()));
            }
        }
        if let Some(Value::Object(schema)) = root.get("schema") {
            for (field, decl) in schema {
                check.expect(decl, &format!("schema.{}", field), Shape::Object);
            }
        }
    }

    check.finish()
}
