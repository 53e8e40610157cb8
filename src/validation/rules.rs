//! Cross-parameter rules
//!
//! `validation.enum_from: <param>` ties one value to the literal list held by
//! another parameter. A JSON Schema cannot express that, so it is checked
//! here against the fully merged parameter map.

use indexmap::IndexMap;
use serde_json::Value;

use super::{Severity, ValidationIssue};
use crate::traits::TraitDefinition;

/// Allowed values supplied by parameter `source`, when it holds an array of literals
pub fn allowed_from<'a>(parameters: &'a IndexMap<String, Value>, source: &str) -> Option<&'a [Value]> {
    match parameters.get(source) {
        Some(Value::Array(values)) if values.iter().all(is_literal) => Some(values.as_slice()),
        _ => None,
    }
}

fn is_literal(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Check every parameter whose rules name an `enum_from` source
pub fn check_enum_from(definition: &TraitDefinition, parameters: &IndexMap<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for param in &definition.parameters {
        let Some(source) = param.validation.enum_from.as_deref() else {
            continue;
        };

        if definition.parameter(source).is_none() {
            issues.push(
                ValidationIssue::new(
                    "enum_from",
                    format!("enum_from references undeclared parameter \"{}\"", source),
                    Severity::Warning,
                )
                .at_field(&param.name),
            );
            continue;
        }

        let (Some(value), Some(source_value)) = (parameters.get(&param.name), parameters.get(source)) else {
            continue;
        };

        let Some(allowed) = allowed_from(parameters, source) else {
            issues.push(
                ValidationIssue::error(
                    "enum_from",
                    format!("parameter \"{}\" must be an array of literal values, got {}", source, source_value),
                )
                .at_field(source)
                .with_hint(format!("Set \"{}\" to a list such as [\"a\", \"b\"]", source)),
            );
            continue;
        };

        let values = match value {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        for candidate in values {
            if !allowed.contains(candidate) {
                issues.push(
                    ValidationIssue::error(
                        "enum_from",
                        format!("{} is not one of the values of parameter \"{}\"", candidate, source),
                    )
                    .at_field(&param.name)
                    .with_hint(format!("Use one of {}", Value::Array(allowed.to_vec()))),
                );
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFormat;
    use crate::traits::parser::parse_trait;
    use serde_json::json;

    fn workflow() -> TraitDefinition {
        parse_trait(
            r#"
trait: { name: Workflow, version: 1.0.0 }
parameters:
  - name: states
    type: array
    default: [draft, review, published]
  - name: initial
    default: draft
    validation: { enum_from: states }
schema: {}
"#,
            SourceFormat::Yaml,
            None,
        )
        .unwrap()
    }

    fn params(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_value_within_source_list() {
        let def = workflow();
        let p = params(&[("states", json!(["draft", "review"])), ("initial", json!("review"))]);
        assert!(check_enum_from(&def, &p).is_empty());
    }

    #[test]
    fn test_value_outside_source_list() {
        let def = workflow();
        let p = params(&[("states", json!(["draft"])), ("initial", json!("archived"))]);
        let issues = check_enum_from(&def, &p);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field.as_deref(), Some("initial"));
        assert!(issues[0].message.contains("\"archived\""));
    }

    #[test]
    fn test_source_must_be_literal_array() {
        let def = workflow();
        let p = params(&[("states", json!("draft")), ("initial", json!("draft"))]);
        let issues = check_enum_from(&def, &p);
        assert_eq!(issues[0].field.as_deref(), Some("states"));
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let def = workflow();
        assert!(check_enum_from(&def, &params(&[("states", json!(["a"]))])).is_empty());
    }

    #[test]
    fn test_allowed_from_rejects_nested_values() {
        let p = params(&[("states", json!([{"name": "draft"}]))]);
        assert!(allowed_from(&p, "states").is_none());
    }
}
