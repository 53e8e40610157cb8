//! Trait library commands

use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::{OutputFormat, TraitAction};
use traitsmith::config::Config;
use traitsmith::traits::TraitDefinition;
use traitsmith::traits::graph::{DependencyGraph, GraphError};
use traitsmith::traits::library::TraitLibrary;
use traitsmith::traits::loader::{LoadedTrait, TraitLoader, TraitRequest, load_trait_at};

pub fn run(action: TraitAction, config: &Config) -> Result<()> {
    match action {
        TraitAction::Show {
            name,
            namespace,
            version,
            format,
        } => show(&name, namespace, version, OutputFormat::resolve(format), config),
        TraitAction::Check { format } => check(OutputFormat::resolve(format), config),
        TraitAction::Order => order(config),
    }
}

/// Load by name, or straight from disk when given a trait file path
fn load(name: &str, namespace: Option<String>, version: Option<String>, config: &Config) -> Result<LoadedTrait> {
    let path = Path::new(name);
    if path.is_file() {
        return load_trait_at(path).with_context(|| format!("Failed to load trait file {}", path.display()));
    }

    let mut request = TraitRequest::named(name);
    if let Some(ns) = namespace {
        request = request.in_namespace(ns);
    }
    if let Some(v) = version {
        request = request.at_version(v);
    }

    let loader = TraitLoader::new(config.trait_roots());
    loader
        .load(&request)
        .with_context(|| format!("Failed to load trait \"{}\"", name))
}

fn show(
    name: &str,
    namespace: Option<String>,
    version: Option<String>,
    format: OutputFormat,
    config: &Config,
) -> Result<()> {
    let loaded = load(name, namespace, version, config)?;
    let def = &loaded.definition;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(def.as_ref())?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(def.as_ref())?),
        OutputFormat::Text => print_trait(def, &loaded),
    }

    Ok(())
}

fn print_trait(def: &TraitDefinition, loaded: &LoadedTrait) {
    println!("{} {}", def.qualified_name().bold(), def.version().dimmed());
    if let Some(ref description) = def.info.description {
        println!("  {}", description);
    }
    println!("  {}: {}", "file".cyan(), loaded.path.display());

    if !def.parameters.is_empty() {
        println!();
        println!("{}:", "parameters".cyan());
        for p in &def.parameters {
            let required = if p.required { " (required)".yellow().to_string() } else { String::new() };
            println!("  {}: {}{}", p.name, p.kind, required);
        }
    }

    println!();
    println!("{}:", "schema".cyan());
    for (field, spec) in &def.schema {
        println!("  {}: {}", field, spec.kind.as_deref().unwrap_or("unknown"));
    }

    let deps: Vec<&str> = def.dependency_names().collect();
    if !deps.is_empty() {
        println!();
        println!("{}: {}", "dependencies".cyan(), deps.join(", "));
    }
    if !def.metadata.conflicts_with.is_empty() {
        println!("{}: {}", "conflicts_with".cyan(), def.metadata.conflicts_with.join(", "));
    }
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    traits: usize,
    failures: Vec<FailureOutput>,
    duplicates: &'a [(String, Vec<std::path::PathBuf>)],
    errors: &'a [GraphError],
    valid: bool,
}

#[derive(Serialize)]
struct FailureOutput {
    path: String,
    errors: Vec<String>,
}

fn check(format: OutputFormat, config: &Config) -> Result<()> {
    let library = TraitLibrary::load(&config.trait_roots());
    let graph = DependencyGraph::from_definitions(library.definitions().map(|d| d.as_ref()));
    let report = graph.validate();
    let valid = report.is_valid() && library.failures.is_empty();

    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let output = CheckOutput {
                traits: library.len(),
                failures: library
                    .failures
                    .iter()
                    .map(|f| FailureOutput {
                        path: f.path.display().to_string(),
                        errors: f.errors.iter().map(|e| e.to_string()).collect(),
                    })
                    .collect(),
                duplicates: &library.duplicates,
                errors: &report.errors,
                valid,
            };
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", serde_yaml::to_string(&output)?);
            }
        }
        OutputFormat::Text => {
            println!("Checked {} trait(s)", library.len());
            for failure in &library.failures {
                println!("{} {}", "✗".red(), failure.path.display());
                for error in &failure.errors {
                    println!("    {}", error);
                }
            }
            for (name, paths) in &library.duplicates {
                println!("{} Duplicate trait \"{}\":", "!".yellow(), name);
                for path in paths {
                    println!("    {}", path.display());
                }
            }
            for error in &report.errors {
                println!("{} {}", "✗".red(), error);
            }
            if valid {
                println!("{} Trait graph is valid", "✓".green());
            }
        }
    }

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

fn order(config: &Config) -> Result<()> {
    let library = TraitLibrary::load(&config.trait_roots());
    let graph = DependencyGraph::from_definitions(library.definitions().map(|d| d.as_ref()));
    let order = graph
        .topological_order()
        .context("Failed to order trait library")?;

    for name in order {
        println!("{}", name);
    }
    Ok(())
}
