use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use traitsmith::config::Config;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            let join = |paths: &[std::path::PathBuf]| {
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };

            println!("{}", "traitsmith Configuration".bold());
            println!();
            println!("log_level: {}", config.log_level.as_filter());
            println!();

            println!("{}:", "paths".cyan());
            println!("  traits: {}", join(&config.paths.traits));
            println!("  objects: {}", join(&config.paths.objects));
            if let Some(ref schemas) = config.paths.schemas {
                println!("  schemas: {}", schemas.display());
            }
            println!("  output: {}", config.paths.output.display());
            println!();

            println!("{}:", "registry".cyan());
            println!("  extensions: {}", config.registry.extensions.join(", "));
            println!("  ignore_directories: {}", config.registry.ignore_directories.join(", "));
            println!("  watch: {}", config.registry.watch);
            println!("  polling_interval_ms: {}", config.registry.polling_interval_ms);
            println!();

            println!("{}:", "validation".cyan());
            println!("  enabled: {}", config.validation.enabled);
            println!("  include_warnings: {}", config.validation.include_warnings);
            println!("  include_info: {}", config.validation.include_info);
        }
    }

    Ok(())
}
