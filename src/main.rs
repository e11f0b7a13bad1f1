//! obsflow - plugin pipeline core for observability logs.
//!
//! Lists and validates plugins, inspects configured instances and runs the
//! pipelines described by the portal configuration.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use obsflow::core::{CancelFlag, PortalConfig};
use obsflow::pipeline::{PipelineRun, Portal};
use obsflow::plugin::{PluginCategory, PluginConfig, PluginRegistry};

/// Plugin pipeline core for observability logs
#[derive(Parser)]
#[command(name = "obsflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Portal configuration file (defaults to ./obsflow.toml, then the user config)
    #[arg(short, long, global = true, env = "OBSFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect registered plugin types
    Plugins {
        #[command(subcommand)]
        operation: PluginOperation,
    },

    /// Validate a configuration against a plugin's schema
    Validate {
        /// Plugin id, e.g. "output:Webhook"
        plugin: String,

        /// Configuration as inline JSON
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,

        /// Configuration file (JSON or TOML)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run the configured pipelines
    Run {
        /// Number of passes (runs until interrupted when omitted)
        #[arg(short, long)]
        passes: Option<usize>,

        /// Pause between passes in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Push a file into an input before running, one body per line (id=path)
        #[arg(long, value_name = "ID=PATH")]
        feed: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List configured plugin instances
    Instances {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Export validated instances and pipelines
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (toml, json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum PluginOperation {
    /// List registered plugins
    List {
        /// Only show one category (input, processing, output, alert, analytics)
        #[arg(long)]
        category: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print a plugin's configuration schema as JSON
    Schema {
        /// Plugin id
        plugin: String,
    },

    /// Scan a directory for plugin manifests
    Discover {
        /// Directory to scan
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "Failed to load .env file");
        }
    }

    match cli.command {
        Commands::Plugins { operation } => cmd_plugins(operation, cli.config.as_deref())?,
        Commands::Validate { plugin, json, file } => {
            cmd_validate(&plugin, json.as_deref(), file.as_deref(), cli.config.as_deref())?;
        }
        Commands::Run { passes, interval_ms, feed, format } => {
            cmd_run(cli.config.as_deref(), passes, interval_ms, &feed, &format)?;
        }
        Commands::Instances { format } => cmd_instances(cli.config.as_deref(), &format)?,
        Commands::Export { output, format } => {
            cmd_export(cli.config.as_deref(), output.as_deref(), &format)?;
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PortalConfig> {
    match path {
        Some(path) => PortalConfig::load_from_file(path),
        None => PortalConfig::load(),
    }
}

/// Registry with the plugins the configuration enables.
fn build_registry(config: &PortalConfig) -> PluginRegistry {
    let mut registry =
        if config.general.builtins { PluginRegistry::with_builtins() } else { PluginRegistry::new() };
    if let Some(ref dir) = config.general.plugin_dir {
        registry.discover(dir);
    }
    registry
}

fn cmd_plugins(operation: PluginOperation, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    match operation {
        PluginOperation::List { category, format } => {
            let category = category
                .map(|c| {
                    PluginCategory::parse(&c).ok_or_else(|| anyhow::anyhow!("Unknown category '{c}'"))
                })
                .transpose()?;

            let plugins = build_registry(&config).list(category);

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&plugins)?),
                _ => {
                    if plugins.is_empty() {
                        println!("No plugins registered.");
                        return Ok(());
                    }
                    for plugin in &plugins {
                        println!(
                            "  {} v{} [{}]",
                            plugin.id, plugin.metadata.version, plugin.metadata.category
                        );
                        println!("      {}", plugin.metadata.description);
                    }
                    println!("\nTotal: {} plugin(s)", plugins.len());
                }
            }
        }

        PluginOperation::Schema { plugin } => {
            let instance = build_registry(&config).create(&plugin)?;
            println!("{}", serde_json::to_string_pretty(&instance.config_schema())?);
        }

        PluginOperation::Discover { path, format } => {
            let mut registry = PluginRegistry::new();
            let report = registry.discover(&path);

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&report)?),
                _ => {
                    for id in &report.registered {
                        println!("  ✓ {id}");
                    }
                    for path in &report.disabled {
                        println!("  ○ {} (disabled)", path.display());
                    }
                    for failure in &report.failures {
                        println!("  ✗ {}: {}", failure.path.display(), failure.error);
                    }
                    println!(
                        "\nRegistered {} plugin(s), {} failure(s)",
                        report.registered.len(),
                        report.failures.len()
                    );
                }
            }
        }
    }

    Ok(())
}

fn cmd_validate(
    plugin: &str,
    json: Option<&str>,
    file: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let plugin_config: PluginConfig = match (json, file) {
        (Some(text), _) => serde_json::from_str(text).context("Configuration is not a JSON object")?,
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if path.extension().is_some_and(|ext| ext == "toml") {
                toml::from_str(&text).with_context(|| format!("Invalid TOML in {}", path.display()))?
            } else {
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid JSON in {}", path.display()))?
            }
        }
        (None, None) => PluginConfig::new(),
    };

    let config = load_config(config_path)?;
    let instance = build_registry(&config).create(plugin)?;
    instance.validate_config(&plugin_config)?;

    println!("✓ Configuration is valid for {plugin}");
    Ok(())
}

fn cmd_run(
    config_path: Option<&Path>,
    passes: Option<usize>,
    interval_ms: Option<u64>,
    feeds: &[String],
    format: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut portal = Portal::from_config(&config)?;

    let mut scheduler = portal.scheduler().clone();
    if passes.is_some() {
        scheduler.max_passes = passes;
    }
    if let Some(interval) = interval_ms {
        scheduler.interval_ms = interval;
    }
    portal.set_scheduler(scheduler);

    if portal.pipelines().is_empty() {
        println!("No pipelines configured.");
        return Ok(());
    }

    for feed in feeds {
        let (id, path) =
            feed.split_once('=').ok_or_else(|| anyhow::anyhow!("Invalid feed '{feed}', expected ID=PATH"))?;
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read feed file {path}"))?;

        let mut accepted = 0;
        let mut rejected = 0;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            if portal.deliver(id, line)? {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        tracing::info!(instance = id, accepted, rejected, "Fed input from file");
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    portal.run_loop(&cancel, |pass, runs| print_pass(pass, runs, format));
    Ok(())
}

fn print_pass(pass: usize, runs: &[PipelineRun], format: &str) {
    match format {
        "json" => {
            let line = serde_json::json!({ "pass": pass, "pipelines": runs });
            println!("{line}");
        }
        _ => {
            for run in runs {
                let stats = &run.stats;
                println!(
                    "[pass {pass}] {}: collected {}, processed {}, sent {}, failed {} ({} ms)",
                    run.pipeline,
                    stats.events_collected,
                    stats.events_processed,
                    stats.events_sent,
                    stats.events_failed,
                    stats.duration_ms
                );
                for error in &stats.errors {
                    println!("    ✗ {error}");
                }
                if stats.cancelled {
                    println!("    (cancelled)");
                }
            }
        }
    }
}

fn cmd_instances(config_path: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let portal = Portal::from_config(&config)?;
    let instances = portal.manager().list_instances();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&instances)?),
        _ => {
            if instances.is_empty() {
                println!("No plugin instances configured.");
                return Ok(());
            }
            for instance in &instances {
                println!(
                    "  {} ({}) [{}] {}",
                    instance.id, instance.plugin, instance.category, instance.status
                );
            }
            println!("\nTotal: {} instance(s)", instances.len());
        }
    }

    Ok(())
}

fn cmd_export(config_path: Option<&Path>, output: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let exported = Portal::from_config(&config)?.to_config();

    let content = match format {
        "json" => serde_json::to_string_pretty(&serde_json::json!({
            "instances": exported.instances,
            "pipelines": exported.pipelines,
        }))?,
        _ => exported.to_toml()?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None => println!("{content}"),
    }

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "obsflow", &mut io::stdout());
}
