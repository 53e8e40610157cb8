//! Trait resolution
//!
//! Turns an object's trait references into [`ResolvedTrait`]s: load each
//! trait, overlay reference overrides on declared defaults, and optionally
//! validate the merged parameter map. Loads run on scoped threads; the
//! output always follows declaration order.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crate::object::TraitReference;
use crate::traits::loader::{LoadError, LoadedTrait, TraitLoader};
use crate::traits::{TraitDefinition, normalize_name};
use crate::validation::{ParameterValidator, Severity, ValidationIssue, ValidationOptions, check_enum_from};

/// Where a resolution was requested from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionContext {
    pub object_name: Option<String>,
    pub object_path: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn for_object(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            object_name: Some(name.into()),
            object_path: path,
        }
    }
}

/// A trait with its final parameter values for one reference
#[derive(Debug, Clone)]
pub struct ResolvedTrait {
    pub reference: TraitReference,
    pub definition: Arc<TraitDefinition>,
    pub parameters: IndexMap<String, Value>,
    pub source_path: PathBuf,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedTrait {
    /// Alias when given, otherwise the trait's declared name
    pub fn name(&self) -> &str {
        match self.reference.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => self.definition.name(),
        }
    }
}

/// Why one reference failed
#[derive(Debug, Clone)]
pub enum ResolutionErrorKind {
    Load(LoadError),
    Validation(Vec<ValidationIssue>),
    Duplicate { name: String, previous: String },
}

/// A reference that could not be resolved, with the object it came from
#[derive(Debug, Clone)]
pub struct ResolutionError {
    pub reference: TraitReference,
    pub context: ResolutionContext,
    pub kind: ResolutionErrorKind,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to resolve trait \"{}\"", self.reference.name)?;
        if let Some(ref alias) = self.reference.alias {
            write!(f, " (alias \"{}\")", alias)?;
        }
        if let Some(ref namespace) = self.reference.namespace {
            write!(f, " (namespace \"{}\")", namespace)?;
        }
        if let Some(ref object) = self.context.object_name {
            write!(f, " for object \"{}\"", object)?;
        }
        if let Some(ref path) = self.context.object_path {
            write!(f, " in {}", path.display())?;
        }

        match &self.kind {
            ResolutionErrorKind::Load(e) => write!(f, ": {}", e),
            ResolutionErrorKind::Validation(issues) => {
                write!(f, ": parameter validation failed")?;
                for issue in issues {
                    write!(f, "\n  - {}", issue)?;
                }
                Ok(())
            }
            ResolutionErrorKind::Duplicate { name, previous } => write!(
                f,
                ": duplicate trait name \"{}\" (already referenced as \"{}\")",
                name, previous
            ),
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ResolutionErrorKind::Load(e) => Some(e),
            _ => None,
        }
    }
}

/// Loads, defaults and validates trait references
pub struct TraitResolver {
    loader: Arc<TraitLoader>,
    validator: Option<Arc<ParameterValidator>>,
    options: ValidationOptions,
}

impl TraitResolver {
    pub fn new(loader: Arc<TraitLoader>) -> Self {
        Self {
            loader,
            validator: None,
            options: ValidationOptions::default(),
        }
    }

    /// Enable parameter validation
    pub fn with_validator(mut self, validator: Arc<ParameterValidator>, options: ValidationOptions) -> Self {
        self.validator = Some(validator);
        self.options = options;
        self
    }

    pub fn loader(&self) -> &Arc<TraitLoader> {
        &self.loader
    }

    pub fn validates(&self) -> bool {
        self.validator.is_some()
    }

    /// Resolve every enabled reference, preserving declaration order
    pub fn resolve_object(
        &self,
        references: &[TraitReference],
        context: &ResolutionContext,
    ) -> Result<Vec<ResolvedTrait>, ResolutionError> {
        let active: Vec<&TraitReference> = references.iter().filter(|r| !r.disabled).collect();

        let mut seen: HashMap<String, &str> = HashMap::new();
        for reference in &active {
            let name = reference.effective_name();
            if let Some(previous) = seen.insert(normalize_name(name), name) {
                return Err(self.fail(reference, context, ResolutionErrorKind::Duplicate {
                    name: name.to_string(),
                    previous: previous.to_string(),
                }));
            }
        }

        let loads: Vec<Result<LoadedTrait, LoadError>> = thread::scope(|scope| {
            let handles: Vec<_> = active
                .iter()
                .map(|reference| scope.spawn(move || self.loader.load(&reference.request())))
                .collect();
            handles
                .into_iter()
                .zip(&active)
                .map(|(handle, reference)| {
                    // A panicking load is reported like any other load failure
                    handle.join().unwrap_or_else(|_| {
                        Err(LoadError::Io {
                            name: reference.name.clone(),
                            path: PathBuf::new(),
                            message: "trait load panicked".to_string(),
                        })
                    })
                })
                .collect()
        });

        // Two paths may declare the same trait name; recheck once names are known
        let mut loaded_names: HashMap<String, String> = HashMap::new();
        let mut resolved = Vec::with_capacity(active.len());
        for (reference, load) in active.into_iter().zip(loads) {
            let loaded = match load {
                Ok(loaded) => loaded,
                Err(e) if reference.optional && e.is_not_found() => {
                    log::warn!("Skipping optional trait \"{}\": not found", reference.name);
                    continue;
                }
                Err(e) => return Err(self.fail(reference, context, ResolutionErrorKind::Load(e))),
            };

            let name = match reference.alias.as_deref() {
                Some(alias) if !alias.is_empty() => alias,
                _ => loaded.definition.name(),
            };
            if let Some(previous) = loaded_names.insert(normalize_name(name), reference.name.clone()) {
                return Err(self.fail(reference, context, ResolutionErrorKind::Duplicate {
                    name: name.to_string(),
                    previous,
                }));
            }

            resolved.push(self.apply_parameters(reference, loaded, context)?);
        }

        log::debug!(
            "Resolved {} trait(s){}",
            resolved.len(),
            context
                .object_name
                .as_deref()
                .map(|n| format!(" for object \"{}\"", n))
                .unwrap_or_default()
        );
        Ok(resolved)
    }

    fn apply_parameters(
        &self,
        reference: &TraitReference,
        loaded: LoadedTrait,
        context: &ResolutionContext,
    ) -> Result<ResolvedTrait, ResolutionError> {
        let mut parameters = loaded.definition.default_parameters();
        for (key, value) in &reference.parameters {
            parameters.insert(key.clone(), value.clone());
        }

        if let Some(ref validator) = self.validator {
            let payload = Value::Object(parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>());
            let report = validator.validate_request(&reference.request(), &payload, self.options);

            let mut errors: Vec<ValidationIssue> = report.errors().cloned().collect();
            errors.extend(
                check_enum_from(&loaded.definition, &parameters)
                    .into_iter()
                    .filter(|i| i.severity == Severity::Error),
            );
            if !errors.is_empty() {
                return Err(self.fail(reference, context, ResolutionErrorKind::Validation(errors)));
            }
        }

        Ok(ResolvedTrait {
            reference: reference.clone(),
            definition: loaded.definition,
            parameters,
            source_path: loaded.path,
            resolved_at: Utc::now(),
        })
    }

    fn fail(&self, reference: &TraitReference, context: &ResolutionContext, kind: ResolutionErrorKind) -> ResolutionError {
        ResolutionError {
            reference: reference.clone(),
            context: context.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::StaticSchemaSource;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "Throttled.trait.yaml",
            r#"
trait: { name: Throttled, version: 1.0.0 }
parameters:
  - name: maxRequests
    type: number
    required: true
  - name: window
    default: minute
  - name: burst
    type: number
schema:
  rate_limit: number
"#,
        );
        write(
            temp.path(),
            "core/Auditable.trait.yaml",
            "trait: { name: Auditable, version: 1.0.0 }\nschema:\n  created_at: datetime\n",
        );
        temp
    }

    fn resolver(temp: &TempDir) -> TraitResolver {
        TraitResolver::new(Arc::new(TraitLoader::new(vec![temp.path().to_path_buf()])))
    }

    fn throttled(params: Value) -> TraitReference {
        let mut reference = TraitReference::named("Throttled");
        if let Value::Object(map) = params {
            reference.parameters = map.into_iter().collect();
        }
        reference
    }

    #[test]
    fn test_defaults_overlaid_with_overrides() {
        let temp = fixture();
        let resolved = resolver(&temp)
            .resolve_object(&[throttled(json!({"maxRequests": 5, "custom": true}))], &ResolutionContext::default())
            .unwrap();

        let params = &resolved[0].parameters;
        assert_eq!(params["window"], json!("minute"));
        assert_eq!(params["maxRequests"], json!(5));
        assert_eq!(params["custom"], json!(true));
        assert!(!params.contains_key("burst"));
    }

    #[test]
    fn test_order_and_disabled_references() {
        let temp = fixture();
        let mut disabled = TraitReference::named("DoesNotExist");
        disabled.disabled = true;
        let refs = vec![TraitReference::named("core/Auditable"), disabled, throttled(json!({}))];

        let resolver = resolver(&temp);
        let resolved = resolver.resolve_object(&refs, &ResolutionContext::default()).unwrap();
        let names: Vec<_> = resolved.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Auditable", "Throttled"]);
        assert!(!resolver.loader().is_cached(&TraitReference::named("DoesNotExist").request()));
    }

    #[test]
    fn test_missing_trait_error_names_reference_and_context() {
        let temp = fixture();
        let context = ResolutionContext::for_object("Example", Some(PathBuf::from("/objects/Example.object.yaml")));
        let err = resolver(&temp)
            .resolve_object(&[TraitReference::named("missing/DoesNotExist")], &context)
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Failed to resolve trait \"missing/DoesNotExist\""));
        assert!(message.contains("for object \"Example\""));
        assert!(message.contains("/objects/Example.object.yaml"));
        assert!(matches!(err.kind, ResolutionErrorKind::Load(ref e) if e.is_not_found()));
    }

    #[test]
    fn test_optional_missing_trait_is_skipped() {
        let temp = fixture();
        let mut optional = TraitReference::named("Ghost");
        optional.optional = true;
        let resolved = resolver(&temp)
            .resolve_object(&[optional, throttled(json!({}))], &ResolutionContext::default())
            .unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_duplicate_effective_names_rejected() {
        let temp = fixture();
        let mut aliased = TraitReference::named("core/Auditable");
        aliased.alias = Some("throttled".to_string());
        let err = resolver(&temp)
            .resolve_object(&[throttled(json!({})), aliased], &ResolutionContext::default())
            .unwrap_err();
        assert!(matches!(err.kind, ResolutionErrorKind::Duplicate { .. }));
        assert!(err.to_string().contains("(alias \"throttled\")"));
    }

    #[test]
    fn test_same_declared_name_from_two_paths_rejected() {
        let temp = fixture();
        write(
            temp.path(),
            "audit/Auditable.trait.yaml",
            "trait: { name: Auditable, version: 2.0.0 }\nschema:\n  audited_by: string\n",
        );

        let refs = vec![TraitReference::named("core/Auditable"), TraitReference::named("audit/Auditable")];
        let err = resolver(&temp)
            .resolve_object(&refs, &ResolutionContext::default())
            .unwrap_err();
        assert_eq!(err.reference.name, "audit/Auditable");
        assert!(matches!(
            err.kind,
            ResolutionErrorKind::Duplicate { ref name, ref previous } if name == "Auditable" && previous == "core/Auditable"
        ));

        // An alias keeps the second reference distinct
        let mut aliased = TraitReference::named("audit/Auditable");
        aliased.alias = Some("AuditTrail".to_string());
        let resolved = resolver(&temp)
            .resolve_object(&[TraitReference::named("core/Auditable"), aliased], &ResolutionContext::default())
            .unwrap();
        let names: Vec<_> = resolved.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Auditable", "AuditTrail"]);
    }

    #[test]
    fn test_validation_runs_on_merged_parameters() {
        let temp = fixture();
        let schema = json!({
            "type": "object",
            "properties": {
                "maxRequests": { "type": "number", "minimum": 0 },
                "window": { "type": "string", "enum": ["second", "minute"] }
            },
            "required": ["maxRequests"]
        });
        let validator = Arc::new(ParameterValidator::new(Arc::new(
            StaticSchemaSource::new().with_schema("Throttled", schema),
        )));
        let resolver = resolver(&temp).with_validator(validator, ValidationOptions::default());

        // Default "minute" participates and passes
        assert!(resolver.resolve_object(&[throttled(json!({"maxRequests": 1}))], &ResolutionContext::default()).is_ok());

        let err = resolver
            .resolve_object(&[throttled(json!({}))], &ResolutionContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("maxRequests"));

        let err = resolver
            .resolve_object(&[throttled(json!({"maxRequests": 1, "window": "hour"}))], &ResolutionContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("window: "));
    }

    #[test]
    fn test_loads_share_cache_within_one_resolution() {
        let temp = fixture();
        let resolver = resolver(&temp);
        let mut a = throttled(json!({}));
        a.alias = Some("First".into());
        let mut b = throttled(json!({}));
        b.alias = Some("Second".into());
        let mut c = throttled(json!({}));
        c.alias = Some("Third".into());

        let resolved = resolver.resolve_object(&[a, b, c], &ResolutionContext::default()).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolver.loader().parse_count(), 1);
        assert!(Arc::ptr_eq(&resolved[0].definition, &resolved[2].definition));
    }
}
