//! Source documents and structured parse errors
//!
//! Trait and object definitions are read from two textual formats:
//! - YAML (`.yaml` / `.yml`), the lenient data format
//! - JSON (`.json`), the strict format with full type conformance
//!
//! Both are decoded into a `serde_json::Value` tree first so that structural
//! checks run identically regardless of the source format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Textual format of a definition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Strict format: unknown sections and shorthand declarations are rejected
    Json,
    /// Data format: accepts `field: type` shorthand
    Yaml,
}

impl SourceFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(SourceFormat::Json),
            Some("yaml") | Some("yml") => Some(SourceFormat::Yaml),
            _ => None,
        }
    }

    /// Whether the strict type-conformance check applies
    pub fn is_strict(&self) -> bool {
        matches!(self, SourceFormat::Json)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Json => write!(f, "json"),
            SourceFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Machine-readable parse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    SyntaxError,
    MissingField,
    InvalidType,
    InvalidStateMachine,
    SchemaMismatch,
    UnsupportedSource,
    ReadError,
}

impl ParseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorCode::SyntaxError => "syntax_error",
            ParseErrorCode::MissingField => "missing_field",
            ParseErrorCode::InvalidType => "invalid_type",
            ParseErrorCode::InvalidStateMachine => "invalid_state_machine",
            ParseErrorCode::SchemaMismatch => "schema_mismatch",
            ParseErrorCode::UnsupportedSource => "unsupported_source",
            ParseErrorCode::ReadError => "read_error",
        }
    }
}

impl fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural or syntactic problem in a definition file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl ParseError {
    pub fn new(code: ParseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            file: None,
            field: None,
            line: None,
            column: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_file(mut self, file: Option<&Path>) -> Self {
        if self.file.is_none() {
            self.file = file.map(Path::to_path_buf);
        }
        self
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code)?;
        if let Some(ref file) = self.file {
            write!(f, "{}", file.display())?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, ": ")?;
        } else if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, "line {}, column {}: ", line, column)?;
        }
        if let Some(ref field) = self.field {
            write!(f, "{}: ", field)?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Join a list of parse errors into one human-readable block
pub fn render_errors(errors: &[ParseError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Decode raw text into a JSON value tree whose root must be a mapping
pub fn read_document(text: &str, format: SourceFormat, file: Option<&Path>) -> Result<Map<String, Value>, ParseError> {
    let value: Value = match format {
        SourceFormat::Json => serde_json::from_str(text).map_err(|e| {
            ParseError::new(ParseErrorCode::SyntaxError, format!("Invalid JSON: {}", e))
                .at(e.line(), e.column())
                .with_file(file)
        })?,
        SourceFormat::Yaml => serde_yaml::from_str(text).map_err(|e| {
            let err = ParseError::new(ParseErrorCode::SyntaxError, format!("Invalid YAML: {}", e)).with_file(file);
            match e.location() {
                Some(loc) => err.at(loc.line(), loc.column()),
                None => err,
            }
        })?,
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(ParseError::new(ParseErrorCode::SyntaxError, "Document is empty").with_file(file)),
        other => Err(ParseError::new(
            ParseErrorCode::InvalidType,
            format!("Document root must be a mapping, found {}", describe(&other)),
        )
        .with_file(file)),
    }
}

/// Expected JSON shape of a section or field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    String,
    Array,
    Object,
}

impl Shape {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Shape::String => value.is_string(),
            Shape::Array => value.is_array(),
            Shape::Object => value.is_object(),
        }
    }

    fn article(&self) -> &'static str {
        match self {
            Shape::String => "a string",
            Shape::Array => "an array",
            Shape::Object => "an object",
        }
    }
}

/// Short description of a JSON value's type for error messages
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Collects structural errors while walking a decoded document
pub struct ShapeCheck<'a> {
    file: Option<&'a Path>,
    errors: Vec<ParseError>,
}

impl<'a> ShapeCheck<'a> {
    pub fn new(file: Option<&'a Path>) -> Self {
        Self {
            file,
            errors: Vec::new(),
        }
    }

    /// Require `map[key]` to exist and have the given shape
    pub fn require(&mut self, map: &Map<String, Value>, key: &str, field: &str, shape: Shape) -> bool {
        match map.get(key) {
            None | Some(Value::Null) => {
                self.push(ParseError::new(ParseErrorCode::MissingField, "is required").with_field(field));
                false
            }
            Some(value) => self.expect(value, field, shape),
        }
    }

    /// Check `map[key]` has the given shape if it is present
    pub fn optional(&mut self, map: &Map<String, Value>, key: &str, field: &str, shape: Shape) -> bool {
        match map.get(key) {
            None | Some(Value::Null) => true,
            Some(value) => self.expect(value, field, shape),
        }
    }

    pub fn expect(&mut self, value: &Value, field: &str, shape: Shape) -> bool {
        if shape.matches(value) {
            return true;
        }
        self.push(
            ParseError::new(
                ParseErrorCode::InvalidType,
                format!("must be {}, found {}", shape.article(), describe(value)),
            )
            .with_field(field),
        );
        false
    }

    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error.with_file(self.file));
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Vec<ParseError> {
        self.errors
    }
}

/// Convert a structurally valid document into its typed form
pub fn conform<T: serde::de::DeserializeOwned>(root: Map<String, Value>, file: Option<&Path>) -> Result<T, ParseError> {
    serde_json::from_value(Value::Object(root))
        .map_err(|e| ParseError::new(ParseErrorCode::SchemaMismatch, e.to_string()).with_file(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(SourceFormat::from_path(Path::new("A.trait.json")), Some(SourceFormat::Json));
        assert_eq!(SourceFormat::from_path(Path::new("A.trait.yml")), Some(SourceFormat::Yaml));
        assert_eq!(SourceFormat::from_path(Path::new("A.trait.ts")), None);
    }

    #[test]
    fn test_yaml_syntax_error_has_location() {
        let err = read_document("trait:\n  name: [unclosed\n", SourceFormat::Yaml, None).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::SyntaxError);
        assert!(err.line.is_some());
    }

    #[test]
    fn test_json_syntax_error_has_location() {
        let err = read_document("{\"trait\": }", SourceFormat::Json, Some(Path::new("x.json"))).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::SyntaxError);
        assert_eq!(err.line, Some(1));
        assert!(err.to_string().contains("x.json:1:"));
    }

    #[test]
    fn test_non_mapping_root() {
        let err = read_document("- a\n- b\n", SourceFormat::Yaml, None).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::InvalidType);
        assert!(err.message.contains("an array"));
    }

    #[test]
    fn test_shape_check_collects_everything() {
        let map = read_document("a: 1\nb: x\n", SourceFormat::Yaml, None).unwrap();
        let mut check = ShapeCheck::new(None);
        check.require(&map, "a", "a", Shape::String);
        check.require(&map, "missing", "missing", Shape::Object);
        check.optional(&map, "b", "b", Shape::String);
        let errors = check.finish();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, ParseErrorCode::InvalidType);
        assert_eq!(errors[1].code, ParseErrorCode::MissingField);
    }
}
