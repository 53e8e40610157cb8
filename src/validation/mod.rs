//! Trait parameter validation
//!
//! Parameter payloads are checked against a JSON Schema per trait. Where the
//! schema comes from is pluggable ([`SchemaSource`]); compiled validators are
//! cached per trait name by the [`ParameterValidator`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod rules;
pub mod sources;
pub mod validator;

pub use rules::check_enum_from;
pub use sources::{DefinitionSchemaSource, DirectorySchemaSource, SchemaSource, StaticSchemaSource};
pub use validator::ParameterValidator;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Machine-readable code, e.g. `minimum`, `required`, `schema_not_found`
    pub code: String,
    pub message: String,
    /// JSON pointer into the payload (`""` for the root)
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: String::new(),
            field: None,
            fix_hint: None,
            severity,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, Severity::Error)
    }

    pub fn at_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.location = format!("/{}", escape_pointer(&field));
        self.field = Some(field);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Field path for display, falling back to the pointer
    pub fn path(&self) -> &str {
        match self.field.as_deref() {
            Some(field) => field,
            None if self.location.is_empty() => "(root)",
            None => &self.location,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path(), self.message)?;
        if let Some(ref hint) = self.fix_hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

/// Escape a JSON pointer token (`~` then `/`)
pub(crate) fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Issue counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

impl ValidationSummary {
    fn count(issues: &[ValidationIssue]) -> Self {
        let mut summary = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }
}

/// Which non-error issues to keep in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub include_warnings: bool,
    pub include_info: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            include_warnings: true,
            include_info: false,
        }
    }
}

/// Outcome of validating one payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    /// Build a report; validity and the summary always reflect every issue,
    /// filtering only trims the returned list.
    pub fn from_issues(issues: Vec<ValidationIssue>, options: ValidationOptions) -> Self {
        let summary = ValidationSummary::count(&issues);
        let issues = issues
            .into_iter()
            .filter(|issue| match issue.severity {
                Severity::Error => true,
                Severity::Warning => options.include_warnings,
                Severity::Info => options.include_info,
            })
            .collect();

        Self {
            valid: summary.errors == 0,
            issues,
            summary,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ValidationIssue> {
        vec![
            ValidationIssue::error("minimum", "too small").at_field("limit"),
            ValidationIssue::new("unknown_parameter", "not declared", Severity::Warning).at_field("extra"),
            ValidationIssue::new("deprecated_parameter", "deprecated", Severity::Info).at_field("old"),
        ]
    }

    #[test]
    fn test_filtering_never_changes_validity_or_summary() {
        let all = ValidationReport::from_issues(
            sample(),
            ValidationOptions {
                include_warnings: true,
                include_info: true,
            },
        );
        let errors_only = ValidationReport::from_issues(
            sample(),
            ValidationOptions {
                include_warnings: false,
                include_info: false,
            },
        );

        assert_eq!(all.issues.len(), 3);
        assert_eq!(errors_only.issues.len(), 1);
        assert_eq!(all.summary, errors_only.summary);
        assert_eq!(all.valid, errors_only.valid);
        assert!(!all.valid);
    }

    #[test]
    fn test_warnings_alone_are_valid() {
        let issues = vec![ValidationIssue::new("unknown_parameter", "x", Severity::Warning)];
        let report = ValidationReport::from_issues(issues, ValidationOptions::default());
        assert!(report.valid);
        assert_eq!(report.summary.warnings, 1);
    }

    #[test]
    fn test_issue_display_and_pointer() {
        let issue = ValidationIssue::error("pattern", "does not match").at_field("a/b").with_hint("use letters");
        assert_eq!(issue.location, "/a~1b");
        assert_eq!(issue.to_string(), "a/b: does not match (hint: use letters)");
    }
}
