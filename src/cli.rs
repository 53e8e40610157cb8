use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use traitsmith::registry::MatchMode;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

/// `any` / `all` for multi-value filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MatchArg {
    #[default]
    Any,
    All,
}

impl From<MatchArg> for MatchMode {
    fn from(arg: MatchArg) -> Self {
        match arg {
            MatchArg::Any => MatchMode::Any,
            MatchArg::All => MatchMode::All,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "traitsmith",
    about = "Trait composition engine - resolve trait-based object definitions into composed schemas",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/traitsmith/logs/traitsmith.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to traitsmith.yaml config file")]
    pub config: Option<PathBuf>,

    /// Trait library root (repeatable; overrides paths.traits)
    #[arg(long = "traits", global = true, value_name = "DIR")]
    pub traits: Vec<PathBuf>,

    /// Object registry root (repeatable; overrides paths.objects)
    #[arg(long = "objects", global = true, value_name = "DIR")]
    pub objects: Vec<PathBuf>,

    /// Parameter schema directory (overrides paths.schemas)
    #[arg(long = "schemas", global = true, value_name = "DIR")]
    pub schemas: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect the trait library
    Trait {
        #[command(subcommand)]
        action: TraitAction,
    },

    /// Query and resolve objects in the registry
    Object {
        #[command(subcommand)]
        action: ObjectAction,
    },

    /// Generate type artifacts for composed objects
    Generate {
        /// Objects to generate (default: all)
        names: Vec<String>,

        /// Output directory (overrides paths.output)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print artifacts instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Watch object roots and print registry events
    Watch {
        /// Poll interval in milliseconds (overrides registry.polling_interval_ms)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum TraitAction {
    /// Show a trait definition
    Show {
        /// Trait name (may contain directory segments)
        name: String,

        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        version: Option<String>,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Validate the trait dependency graph
    Check {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print traits in dependency load order
    Order,
}

#[derive(Subcommand)]
pub enum ObjectAction {
    /// List registered objects
    List {
        /// Require trait (repeatable)
        #[arg(long = "trait", id = "trait_filter", value_name = "TRAIT")]
        traits: Vec<String>,

        /// Require tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Require domain (repeatable)
        #[arg(long = "domain")]
        domains: Vec<String>,

        #[arg(long, value_enum, default_value_t)]
        trait_match: MatchArg,

        #[arg(long, value_enum, default_value_t)]
        tag_match: MatchArg,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show an object definition
    Show {
        name: String,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Resolve and compose an object
    Resolve {
        name: String,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show files the registry could not index
    Diagnostics {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(short = 'o', long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_object_list_filters() {
        let cli = Cli::try_parse_from([
            "traitsmith",
            "object",
            "list",
            "--trait",
            "Searchable",
            "--tag",
            "core",
            "--tag-match",
            "all",
        ])
        .unwrap();
        match cli.command {
            Commands::Object {
                action: ObjectAction::List {
                    traits, tags, tag_match, ..
                },
            } => {
                assert_eq!(traits, vec!["Searchable"]);
                assert_eq!(tags, vec!["core"]);
                assert_eq!(tag_match, MatchArg::All);
            }
            _ => panic!("expected object list"),
        }
    }

    #[test]
    fn test_trait_filter_alongside_global_trait_roots() {
        let cli = Cli::try_parse_from([
            "traitsmith",
            "--traits",
            "/srv/traits",
            "object",
            "list",
            "--trait",
            "Auditable",
        ])
        .unwrap();
        assert_eq!(cli.traits, vec![PathBuf::from("/srv/traits")]);
        match cli.command {
            Commands::Object {
                action: ObjectAction::List { traits, .. },
            } => assert_eq!(traits, vec!["Auditable"]),
            _ => panic!("expected object list"),
        }

        let cli = Cli::try_parse_from(["traitsmith", "object", "list"]).unwrap();
        assert!(cli.traits.is_empty());
    }

    #[test]
    fn test_global_roots() {
        let cli = Cli::try_parse_from(["traitsmith", "trait", "order", "--traits", "a", "--traits", "b"]).unwrap();
        assert_eq!(cli.traits, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
