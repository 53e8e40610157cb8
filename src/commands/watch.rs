//! Watch object roots and print registry lifecycle events

use colored::*;
use eyre::{Context, Result};

use traitsmith::config::Config;
use traitsmith::registry::{ObjectRegistry, RegistryEvent};

pub fn run(interval: Option<u64>, config: &Config) -> Result<()> {
    let mut options = config.registry_options();
    if let Some(ms) = interval {
        options.polling_interval_ms = ms;
    }

    // Subscribe before the first refresh so initial events are printed too
    options.auto_load = false;
    options.watch = false;
    let registry = ObjectRegistry::open(options, config.resolver(), config.composer())
        .context("Failed to open object registry")?;
    let events = registry.subscribe();
    registry.refresh().context("Initial registry refresh failed")?;
    registry.start_watching().context("Failed to start watcher")?;

    println!(
        "Watching {} (every {}ms, Ctrl-C to stop)",
        registry
            .options()
            .roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        registry.options().polling_interval_ms
    );

    for event in events {
        match event {
            RegistryEvent::Ready { records } => println!("{} ready ({} objects)", "●".blue(), records),
            RegistryEvent::Added(r) => println!("{} added {} ({})", "+".green(), r.name, r.source.path.display()),
            RegistryEvent::Updated(r) => println!("{} updated {}", "~".yellow(), r.name),
            RegistryEvent::Removed(r) => println!("{} removed {}", "-".red(), r.name),
            RegistryEvent::Error(d) => println!("{} {}: {}", "✗".red(), d.path.display(), d.message),
        }
    }

    Ok(())
}
