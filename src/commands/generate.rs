//! Type artifact generation command

use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;

use super::object::open_registry;
use traitsmith::codegen::{GeneratedInterface, generate_barrel, generate_interface, write_artifacts};
use traitsmith::config::Config;

pub fn run(names: Vec<String>, out: Option<PathBuf>, stdout: bool, config: &Config) -> Result<()> {
    let registry = open_registry(config)?;

    let names = if names.is_empty() {
        registry.list().into_iter().map(|r| r.name).collect()
    } else {
        names
    };
    if names.is_empty() {
        println!("No objects to generate.");
        return Ok(());
    }

    let mut interfaces: Vec<GeneratedInterface> = Vec::with_capacity(names.len());
    for name in &names {
        let composed = registry
            .resolve(name)
            .with_context(|| format!("Failed to compose {}", name))?;
        interfaces.push(generate_interface(&composed));
    }

    if stdout {
        for interface in &interfaces {
            println!("{}", interface.content);
        }
        print!("{}", generate_barrel(&interfaces));
        return Ok(());
    }

    let dir = out.map(|p| Config::expand_path(&p)).unwrap_or_else(|| config.output_dir());
    let written = write_artifacts(&dir, &interfaces).context("Failed to write artifacts")?;
    for path in &written {
        println!("  {} {}", "✓".green(), path.display());
    }
    println!("Generated {} interface(s) in {}", interfaces.len(), dir.display());

    Ok(())
}
