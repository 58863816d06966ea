//! arbiter-sim - replay media session scenarios against a SessionArbiter
//!
//! Scenario files script host events (sessions playing and pausing, the app
//! going to the background, interruptions, remote commands) and print what the
//! arbiter decided after each step.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arbiterconf::{ArbiterConfig, ConfigSources};
use clap::{Parser, Subcommand};
use media_arbiter::{Scenario, StepReport};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Media session arbitration simulator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of ./media-arbiter.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scenario and print the arbiter state after each step
    Run {
        /// Scenario file; relative names are also looked up in the scenario dir
        scenario: PathBuf,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenarios in the scenario dir
    List,

    /// Print the effective configuration and where it came from
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ArbiterConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.infra.telemetry.log_level);
    debug!("loaded config from {:?}", sources.files);

    match cli.command {
        Commands::Run { scenario, json } => run_scenario(&config, &scenario, json),
        Commands::List => list_scenarios(&config),
        Commands::Config => {
            print_config(&config, &sources);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    // RUST_LOG has already been folded into log_level by the config loader
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_scenario(config: &ArbiterConfig, path: &Path) -> PathBuf {
    if path.exists() || path.is_absolute() {
        return path.to_path_buf();
    }

    let in_dir = config.infra.paths.scenario_dir.join(path);
    if in_dir.exists() {
        return in_dir;
    }
    in_dir.with_extension("toml")
}

fn run_scenario(config: &ArbiterConfig, path: &Path, json: bool) -> Result<()> {
    let path = resolve_scenario(config, path);
    let scenario = Scenario::load(&path)
        .with_context(|| format!("Failed to load scenario {}", path.display()))?;

    info!(
        "running '{}' from {}",
        scenario.name,
        path.display()
    );

    let reports = scenario
        .run(&config.seed)
        .with_context(|| format!("Scenario {} failed", path.display()))?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&reports).context("Failed to serialize reports")?;
        println!("{}", rendered);
    } else {
        print_reports(&scenario, &reports);
    }
    Ok(())
}

fn print_reports(scenario: &Scenario, reports: &[StepReport]) {
    if !scenario.name.is_empty() {
        println!("# {}", scenario.name);
    }
    if !scenario.description.is_empty() {
        println!("# {}", scenario.description);
    }
    for report in reports {
        println!("{}", report);
    }
}

fn list_scenarios(config: &ArbiterConfig) -> Result<()> {
    let dir = &config.infra.paths.scenario_dir;
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read scenario dir {}", dir.display()))?;

    let mut names: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    names.sort();

    for path in names {
        match Scenario::load(&path) {
            Ok(scenario) => println!(
                "{:<32} {}",
                path.file_stem().unwrap_or_default().to_string_lossy(),
                scenario.description
            ),
            Err(e) => println!(
                "{:<32} (invalid: {})",
                path.file_stem().unwrap_or_default().to_string_lossy(),
                e
            ),
        }
    }
    Ok(())
}

fn print_config(config: &ArbiterConfig, sources: &ConfigSources) {
    println!("# Sources:");
    if sources.files.is_empty() {
        println!("#   (defaults only)");
    }
    for file in &sources.files {
        println!("#   file: {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("#   env: {}", var);
    }
    println!();
    print!("{}", config.to_toml());
}
