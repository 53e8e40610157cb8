//! Object registry commands

use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::cli::{ObjectAction, OutputFormat};
use traitsmith::compose::{ComposedObject, ConflictKind};
use traitsmith::config::Config;
use traitsmith::registry::{ObjectRegistry, Query, RegistryRecord};

pub fn run(action: ObjectAction, config: &Config) -> Result<()> {
    match action {
        ObjectAction::List {
            traits,
            tags,
            domains,
            trait_match,
            tag_match,
            format,
        } => {
            let query = Query {
                traits,
                tags,
                domains,
                trait_match: trait_match.into(),
                tag_match: tag_match.into(),
            };
            list(&query, OutputFormat::resolve(format), config)
        }
        ObjectAction::Show { name, format } => show(&name, OutputFormat::resolve(format), config),
        ObjectAction::Resolve { name, format } => resolve(&name, OutputFormat::resolve(format), config),
        ObjectAction::Diagnostics { format } => diagnostics(OutputFormat::resolve(format), config),
    }
}

/// Open the registry once, without watching
pub fn open_registry(config: &Config) -> Result<Arc<ObjectRegistry>> {
    let mut options = config.registry_options();
    options.watch = false;
    ObjectRegistry::open(options, config.resolver(), config.composer()).context("Failed to open object registry")
}

/// Serializable record summary for JSON/YAML output
#[derive(Serialize)]
struct RecordInfo<'a> {
    name: &'a str,
    traits: &'a [String],
    tags: &'a [String],
    domains: &'a [String],
    path: String,
}

impl<'a> From<&'a RegistryRecord> for RecordInfo<'a> {
    fn from(record: &'a RegistryRecord) -> Self {
        Self {
            name: &record.name,
            traits: &record.traits,
            tags: &record.tags,
            domains: &record.domains,
            path: record.source.path.display().to_string(),
        }
    }
}

fn list(query: &Query, format: OutputFormat, config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let records = registry.query(query);

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No objects found.");
                return Ok(());
            }
            for record in &records {
                println!("{} - {}", record.name.bold(), record.traits.join(", "));
                if !record.tags.is_empty() {
                    println!("    {}: {}", "tags".cyan(), record.tags.join(", "));
                }
            }
            println!();
            println!("Total: {} object(s)", records.len());
        }
        OutputFormat::Json => {
            let infos: Vec<RecordInfo> = records.iter().map(RecordInfo::from).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        OutputFormat::Yaml => {
            let infos: Vec<RecordInfo> = records.iter().map(RecordInfo::from).collect();
            println!("{}", serde_yaml::to_string(&infos)?);
        }
    }

    Ok(())
}

fn show(name: &str, format: OutputFormat, config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let record = registry
        .get(name)
        .ok_or_else(|| eyre::eyre!("Object \"{}\" not found in registry", name))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record.definition)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&record.definition)?),
        OutputFormat::Text => {
            println!("{}", record.name.bold());
            println!("  {}: {}", "file".cyan(), record.source.path.display());
            if let Some(parent) = record.definition.extends() {
                println!("  {}: {}", "extends".cyan(), parent);
            }
            println!("  {}: {}", "traits".cyan(), record.traits.join(", "));
            println!("  {}: {}", "domains".cyan(), record.domains.join(", "));
            if !record.tags.is_empty() {
                println!("  {}: {}", "tags".cyan(), record.tags.join(", "));
            }
        }
    }

    Ok(())
}

fn resolve(name: &str, format: OutputFormat, config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let composed = registry
        .resolve(name)
        .with_context(|| format!("Failed to resolve object \"{}\"", name))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&composed)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&composed)?),
        OutputFormat::Text => print_composed(&composed),
    }

    Ok(())
}

fn print_composed(composed: &ComposedObject) {
    println!("{}", composed.name.bold());
    println!(
        "  {}: {}",
        "traits".cyan(),
        if composed.metadata.trait_order.is_empty() {
            "(none)".to_string()
        } else {
            composed.metadata.trait_order.join(" → ")
        }
    );
    println!();

    println!("{}:", "schema".cyan());
    for (field, spec) in &composed.schema {
        let origin = composed
            .provenance(field)
            .map(|p| format!("{}: {}", p.layer, p.source))
            .unwrap_or_default();
        println!(
            "  {}: {} {}",
            field,
            spec.kind.as_deref().unwrap_or("unknown"),
            format!("({})", origin).dimmed()
        );
    }

    if !composed.conflicts.is_empty() {
        println!();
        println!("{}:", "conflicts".yellow());
        for kind in [ConflictKind::Field, ConflictKind::Parameter, ConflictKind::Incompatible] {
            for conflict in composed.conflicts_of(kind) {
                println!("  {} {}", "!".yellow(), conflict.message);
            }
        }
    }

    println!();
    println!("Composed in {:.2}ms", composed.metadata.duration_ms);
}

fn diagnostics(format: OutputFormat, config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let diagnostics = registry.diagnostics();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diagnostics)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&diagnostics)?),
        OutputFormat::Text => {
            if diagnostics.is_empty() {
                println!("{} No diagnostics", "✓".green());
                return Ok(());
            }
            for d in &diagnostics {
                let kind = serde_json::to_value(d.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                println!("{} [{}] {}", "✗".red(), kind, d.path.display());
                for line in d.message.lines() {
                    println!("    {}", line);
                }
            }
        }
    }

    Ok(())
}
