//! Merging of field declarations and composite values
//!
//! Shallow: top-level keys of the later map win. Deep: nested maps merge
//! recursively. Arrays and scalars are always replaced, never concatenated.

use serde_json::Value;

use crate::object::MergeStrategy;
use crate::traits::{FieldSpec, ValidationRules};

/// Merge two values; `later` wins wherever they cannot be combined
pub fn merge_values(earlier: &Value, later: &Value, strategy: MergeStrategy) -> Value {
    match (earlier, later) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                let next = match (strategy, merged.get(key)) {
                    (MergeStrategy::Deep, Some(existing)) => merge_values(existing, value, strategy),
                    _ => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => later.clone(),
    }
}

/// Merge two field declarations attribute by attribute
pub fn merge_field(earlier: &FieldSpec, later: &FieldSpec, strategy: MergeStrategy) -> FieldSpec {
    let default = match (&earlier.default, &later.default) {
        (Some(a), Some(b)) => Some(merge_values(a, b, strategy)),
        (a, b) => b.clone().or_else(|| a.clone()),
    };

    let mut extra = earlier.extra.clone();
    for (key, value) in &later.extra {
        let next = match extra.get(key) {
            Some(existing) => merge_values(existing, value, strategy),
            None => value.clone(),
        };
        extra.insert(key.clone(), next);
    }

    FieldSpec {
        kind: later.kind.clone().or_else(|| earlier.kind.clone()),
        required: later.required.or(earlier.required),
        default,
        description: later.description.clone().or_else(|| earlier.description.clone()),
        items: later.items.clone().or_else(|| earlier.items.clone()),
        allowed: later.allowed.clone().or_else(|| earlier.allowed.clone()),
        validation: merge_rules(&earlier.validation, &later.validation),
        extra,
    }
}

fn merge_rules(earlier: &ValidationRules, later: &ValidationRules) -> ValidationRules {
    ValidationRules {
        allowed: later.allowed.clone().or_else(|| earlier.allowed.clone()),
        enum_from: later.enum_from.clone().or_else(|| earlier.enum_from.clone()),
        minimum: later.minimum.or(earlier.minimum),
        maximum: later.maximum.or(earlier.maximum),
        min_length: later.min_length.or(earlier.min_length),
        max_length: later.max_length.or(earlier.max_length),
        pattern: later.pattern.clone().or_else(|| earlier.pattern.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shallow_replaces_nested_maps() {
        let merged = merge_values(
            &json!({"a": {"x": 1, "y": 2}, "b": 1}),
            &json!({"a": {"y": 3}}),
            MergeStrategy::Shallow,
        );
        assert_eq!(merged, json!({"a": {"y": 3}, "b": 1}));
    }

    #[test]
    fn test_deep_recurses_into_maps() {
        let merged = merge_values(
            &json!({"a": {"x": 1, "y": 2}, "b": 1}),
            &json!({"a": {"y": 3}}),
            MergeStrategy::Deep,
        );
        assert_eq!(merged, json!({"a": {"x": 1, "y": 3}, "b": 1}));
    }

    #[test]
    fn test_arrays_and_scalars_are_replaced() {
        assert_eq!(merge_values(&json!([1, 2]), &json!([3]), MergeStrategy::Deep), json!([3]));
        assert_eq!(
            merge_values(&json!({"t": [1]}), &json!({"t": [2]}), MergeStrategy::Deep),
            json!({"t": [2]})
        );
        assert_eq!(merge_values(&json!({"a": 1}), &json!("x"), MergeStrategy::Deep), json!("x"));
    }

    #[test]
    fn test_merge_field_keeps_unset_attributes() {
        let earlier = FieldSpec {
            kind: Some("string".into()),
            required: Some(true),
            description: Some("Title".into()),
            ..FieldSpec::default()
        };
        let later = FieldSpec {
            default: Some(json!("untitled")),
            ..FieldSpec::default()
        };
        let merged = merge_field(&earlier, &later, MergeStrategy::Shallow);
        assert_eq!(merged.kind.as_deref(), Some("string"));
        assert!(merged.is_required());
        assert_eq!(merged.default, Some(json!("untitled")));
    }
}
