//! Compiled-schema parameter validator

use jsonschema::Validator;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    Severity, SchemaSource, ValidationIssue, ValidationOptions, ValidationReport, escape_pointer,
};
use crate::traits::loader::TraitRequest;
use crate::traits::normalize_name;

/// Cached outcome of compiling one trait's schema
enum Compiled {
    Missing { location: String },
    Invalid { message: String },
    Ready { validator: Validator, schema: Value },
}

/// Validates parameter payloads, compiling each trait's schema once
pub struct ParameterValidator {
    source: Arc<dyn SchemaSource>,
    cache: Mutex<HashMap<String, Arc<Compiled>>>,
}

impl ParameterValidator {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a payload for one trait
    pub fn validate(&self, trait_name: &str, payload: &Value, options: ValidationOptions) -> ValidationReport {
        self.validate_with(trait_name, normalize_name(trait_name), payload, options, || {
            self.source.load_schema(trait_name)
        })
    }

    /// Validate a payload for one trait reference, keeping versions apart
    pub fn validate_request(&self, request: &TraitRequest, payload: &Value, options: ValidationOptions) -> ValidationReport {
        let label = request.schema_key();
        let key = match request.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => format!("{}@{}", normalize_name(&label), version.to_lowercase()),
            _ => normalize_name(&label),
        };
        self.validate_with(&label, key, payload, options, || self.source.load_for(request))
    }

    fn validate_with(
        &self,
        trait_name: &str,
        key: String,
        payload: &Value,
        options: ValidationOptions,
        load: impl FnOnce() -> Result<Option<Value>, String>,
    ) -> ValidationReport {
        let compiled = match self.compiled(trait_name, key, load) {
            Ok(compiled) => compiled,
            Err(message) => {
                let issue = ValidationIssue::error("schema_load_failed", message)
                    .with_hint(format!("Check {}", self.source.expected_location(trait_name)));
                return ValidationReport::from_issues(vec![issue], options);
            }
        };

        let issues = match compiled.as_ref() {
            Compiled::Missing { location } => vec![
                ValidationIssue::error(
                    "schema_not_found",
                    format!("No parameter schema found for trait \"{}\"", trait_name),
                )
                .with_hint(format!("Create a parameter schema at {}", location)),
            ],
            Compiled::Invalid { message } => vec![
                ValidationIssue::error(
                    "schema_invalid",
                    format!("Parameter schema for trait \"{}\" is invalid: {}", trait_name, message),
                )
                .with_hint(format!("Fix the schema at {}", self.source.expected_location(trait_name))),
            ],
            Compiled::Ready { validator, schema } => {
                let mut issues = schema_issues(validator, payload);
                issues.extend(declaration_issues(schema, payload));
                issues
            }
        };

        let report = ValidationReport::from_issues(issues, options);
        log::debug!(
            "Validated parameters for \"{}\": {} error(s), {} warning(s)",
            trait_name,
            report.summary.errors,
            report.summary.warnings
        );
        report
    }

    fn compiled(
        &self,
        trait_name: &str,
        key: String,
        load: impl FnOnce() -> Result<Option<Value>, String>,
    ) -> Result<Arc<Compiled>, String> {
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }

        // Load errors are not cached; the source may recover
        let compiled = match load()? {
            None => Compiled::Missing {
                location: self.source.expected_location(trait_name),
            },
            Some(schema) => match jsonschema::validator_for(&schema) {
                Ok(validator) => Compiled::Ready { validator, schema },
                Err(e) => {
                    log::warn!("Parameter schema for \"{}\" failed to compile: {}", trait_name, e);
                    Compiled::Invalid { message: e.to_string() }
                }
            },
        };

        let mut cache = self.cache.lock();
        Ok(Arc::clone(cache.entry(key).or_insert_with(|| Arc::new(compiled))))
    }

    /// Drop every compiled validator
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

fn schema_issues(validator: &Validator, payload: &Value) -> Vec<ValidationIssue> {
    validator
        .iter_errors(payload)
        .map(|error| {
            let schema_path = error.schema_path.to_string();
            let code = schema_path
                .rsplit('/')
                .find(|s| !s.is_empty() && s.parse::<usize>().is_err())
                .unwrap_or("schema")
                .to_string();
            let message = error.to_string();
            let mut location = error.instance_path.to_string();

            let field = match required_property(&code, &message) {
                Some(property) => {
                    location = format!("{}/{}", location, escape_pointer(&property));
                    let parent = pointer_to_field(&error.instance_path.to_string());
                    Some(match parent {
                        Some(parent) => format!("{}.{}", parent, property),
                        None => property,
                    })
                }
                None => pointer_to_field(&location),
            };

            let hint = fix_hint(&code, field.as_deref());
            ValidationIssue {
                code,
                message,
                location,
                field,
                fix_hint: hint,
                severity: Severity::Error,
            }
        })
        .collect()
}

/// Undeclared (warning) and deprecated (info) payload keys
fn declaration_issues(schema: &Value, payload: &Value) -> Vec<ValidationIssue> {
    let (Some(properties), Some(payload)) = (
        schema.get("properties").and_then(Value::as_object),
        payload.as_object(),
    ) else {
        return Vec::new();
    };
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    let mut issues = Vec::new();
    for key in payload.keys() {
        match properties.get(key) {
            None if !closed => issues.push(
                ValidationIssue::new(
                    "unknown_parameter",
                    format!("\"{}\" is not a declared parameter", key),
                    Severity::Warning,
                )
                .at_field(key)
                .with_hint("Remove it or declare it on the trait"),
            ),
            Some(property) if property.get("deprecated") == Some(&Value::Bool(true)) => issues.push(
                ValidationIssue::new("deprecated_parameter", format!("\"{}\" is deprecated", key), Severity::Info)
                    .at_field(key),
            ),
            _ => {}
        }
    }
    issues
}

/// Property named by a `required` error (`"name" is a required property`)
fn required_property(code: &str, message: &str) -> Option<String> {
    if code != "required" {
        return None;
    }
    let quoted = message.strip_suffix(" is a required property")?;
    serde_json::from_str::<String>(quoted).ok()
}

/// `/limits/0/max` -> `limits[0].max`
fn pointer_to_field(pointer: &str) -> Option<String> {
    let mut field = String::new();
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        if token.parse::<usize>().is_ok() {
            field.push_str(&format!("[{}]", token));
        } else {
            if !field.is_empty() {
                field.push('.');
            }
            field.push_str(&token);
        }
    }
    (!field.is_empty()).then_some(field)
}

fn fix_hint(code: &str, field: Option<&str>) -> Option<String> {
    let field = field.unwrap_or("the parameter");
    let hint = match code {
        "required" => format!("Provide a value for \"{}\" or give it a default", field),
        "type" => format!("Change \"{}\" to the declared type", field),
        "enum" | "const" => format!("Use one of the allowed values for \"{}\"", field),
        "minimum" | "maximum" | "exclusiveMinimum" | "exclusiveMaximum" => {
            format!("Keep \"{}\" within the allowed range", field)
        }
        "minLength" | "maxLength" | "minItems" | "maxItems" => format!("Adjust the length of \"{}\"", field),
        "pattern" => format!("Make \"{}\" match the declared pattern", field),
        "additionalProperties" => "Remove parameters the trait does not declare".to_string(),
        _ => return None,
    };
    Some(hint)
}
