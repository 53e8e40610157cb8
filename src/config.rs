use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compose::{ObjectComposer, TraitResolver};
use crate::registry::RegistryOptions;
use crate::traits::loader::TraitLoader;
use crate::validation::{
    DefinitionSchemaSource, DirectorySchemaSource, ParameterValidator, SchemaSource, ValidationOptions,
};

/// Main traitsmith configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub paths: PathsConfig,
    pub registry: RegistryConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Trait library roots, searched in order
    pub traits: Vec<PathBuf>,
    /// Object registry roots
    pub objects: Vec<PathBuf>,
    /// Directory of `<trait>.schema.json` parameter schemas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<PathBuf>,
    /// Where `generate` writes artifacts
    pub output: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub extensions: Vec<String>,
    pub ignore_directories: Vec<String>,
    pub watch: bool,
    pub polling_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub include_warnings: bool,
    pub include_info: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            paths: PathsConfig::default(),
            registry: RegistryConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let dir = Config::traitsmith_dir();

        Self {
            traits: vec![dir.join("traits")],
            objects: vec![dir.join("objects")],
            schemas: None,
            output: PathBuf::from("generated"),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let defaults = RegistryOptions::default();

        Self {
            extensions: defaults.extensions,
            ignore_directories: defaults.ignore_directories,
            watch: defaults.watch,
            polling_interval_ms: defaults.polling_interval_ms,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let defaults = ValidationOptions::default();

        Self {
            enabled: true,
            include_warnings: defaults.include_warnings,
            include_info: defaults.include_info,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("TRAITSMITH_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from TRAITSMITH_CONFIG: {}", e);
                    }
                }
            }
        }

        if let Ok(dir) = std::env::var("TRAITSMITH_DIR") {
            let path = PathBuf::from(dir).join("traitsmith.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from TRAITSMITH_DIR: {}", e);
                    }
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("traitsmith").join("traitsmith.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // ./traitsmith.yaml (for development)
        let local_config = PathBuf::from("traitsmith.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// The traitsmith directory (default home of traits and objects)
    pub fn traitsmith_dir() -> PathBuf {
        std::env::var("TRAITSMITH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("traitsmith"))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }

    pub fn trait_roots(&self) -> Vec<PathBuf> {
        self.paths.traits.iter().map(|p| Self::expand_path(p)).collect()
    }

    pub fn object_roots(&self) -> Vec<PathBuf> {
        self.paths.objects.iter().map(|p| Self::expand_path(p)).collect()
    }

    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.output)
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            include_warnings: self.validation.include_warnings,
            include_info: self.validation.include_info,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            roots: self.object_roots(),
            extensions: self.registry.extensions.clone(),
            ignore_directories: self.registry.ignore_directories.clone(),
            watch: self.registry.watch,
            polling_interval_ms: self.registry.polling_interval_ms,
            auto_load: true,
        }
    }

    /// Resolver over the configured trait roots. Parameters are validated
    /// against the schema directory when one is configured, otherwise
    /// against schemas derived from the traits' own declarations.
    pub fn resolver(&self) -> TraitResolver {
        let loader = Arc::new(TraitLoader::new(self.trait_roots()));
        if !self.validation.enabled {
            return TraitResolver::new(loader);
        }

        let source: Arc<dyn SchemaSource> = match self.paths.schemas {
            Some(ref dir) => Arc::new(DirectorySchemaSource::new(Self::expand_path(dir))),
            None => Arc::new(DefinitionSchemaSource::new(loader.clone())),
        };
        let validator = Arc::new(ParameterValidator::new(source));
        TraitResolver::new(loader).with_validator(validator, self.validation_options())
    }

    pub fn composer(&self) -> ObjectComposer {
        ObjectComposer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validation.enabled);
        assert!(!config.registry.watch);
        assert_eq!(config.registry.polling_interval_ms, 750);
        assert!(config.registry.extensions.contains(&".object.yaml".to_string()));
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/usr/local/bin");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, PathBuf::from("/usr/local/bin"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = Config::expand_path(&path);
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().contains("test"));
    }

    #[test]
    fn test_expand_path_with_env_var() {
        // SAFETY: Test runs single-threaded, env var is test-specific
        unsafe {
            std::env::set_var("TRAITSMITH_TEST_VAR", "/custom/path");
        }
        let path = PathBuf::from("$TRAITSMITH_TEST_VAR/subdir");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, PathBuf::from("/custom/path/subdir"));
        unsafe {
            std::env::remove_var("TRAITSMITH_TEST_VAR");
        }
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("traitsmith.yaml");
        fs::write(
            &path,
            "log_level: debug\npaths:\n  traits: [/srv/traits]\nregistry:\n  watch: true\nvalidation:\n  include_info: true\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.trait_roots(), vec![PathBuf::from("/srv/traits")]);
        assert!(config.registry.watch);
        assert_eq!(config.registry.polling_interval_ms, 750);
        assert!(config.validation_options().include_info);
        assert!(config.registry_options().auto_load);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let path = PathBuf::from("/definitely/not/traitsmith.yaml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_resolver_validation_toggle() {
        let mut config = Config::default();
        assert!(config.resolver().validates());

        config.paths.schemas = Some(PathBuf::from("/tmp/schemas"));
        assert!(config.resolver().validates());

        config.validation.enabled = false;
        assert!(!config.resolver().validates());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).expect("Failed to serialize");
        let parsed: Config = serde_yaml::from_str(&yaml_str).expect("Failed to deserialize");
        assert_eq!(parsed.registry.extensions, config.registry.extensions);
        assert_eq!(parsed.log_level, config.log_level);
    }
}
