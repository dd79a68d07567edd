//! anchor-reloc CLI: replay recorded sessions and inspect anchor stores.

use std::fs;
use std::path::{Path, PathBuf};

use anchor_reloc::core::{AnchorStore, JsonFileStore};
use anchor_reloc::engine::RelocalizationConfig;
use anchor_reloc::fiducial::FiducialCatalog;
use anchor_reloc::replay::ReplayScenario;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use uuid::Uuid;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "anchor-reloc")]
#[command(about = "Replay and inspect fiducial anchor relocalization sessions")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit structured JSON logs (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario through the relocalization engine.
    Replay {
        /// Scenario JSON file.
        scenario: PathBuf,

        /// Load packages from this store directory instead of the scenario.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Restrict store packages to one map patch.
        #[arg(long, requires = "store")]
        patch: Option<Uuid>,

        /// Override the scenario's engine config with this JSON file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the fiducials a session over a store would register.
    Catalog {
        /// Store directory.
        store: PathBuf,

        #[arg(long)]
        patch: Option<Uuid>,

        /// Engine config JSON (only the catalog section is used).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default engine config as JSON.
    DefaultConfig,
}

#[derive(Serialize)]
struct CatalogEntry {
    name: String,
    category: String,
    width_m: f32,
    height_m: f32,
}

#[derive(Serialize)]
struct CatalogReport {
    packages: usize,
    skipped: usize,
    fiducials: Vec<CatalogEntry>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    match cli.command {
        Commands::Replay {
            scenario,
            store,
            patch,
            config,
            out,
        } => run_replay(&scenario, store.as_deref(), patch, config.as_deref(), out.as_deref()),
        Commands::Catalog {
            store,
            patch,
            config,
        } => run_catalog(&store, patch, config.as_deref()),
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&RelocalizationConfig::default())?);
            Ok(())
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_verbose: u8, json: bool) -> CliResult<()> {
    let _ = tracing_log::LogTracer::init();
    anchor_reloc::core::init_tracing(json);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8, json: bool) -> CliResult<()> {
    if json {
        return Err("--json-logs requires the `tracing` feature".into());
    }
    anchor_reloc::core::init_with_level(anchor_reloc::core::level_for_verbosity(verbose))?;
    Ok(())
}

fn load_packages(
    store: &Path,
    patch: Option<Uuid>,
) -> CliResult<Vec<anchor_reloc::core::AnchorPackage>> {
    let store = JsonFileStore::open(store)?;
    let packages = match patch {
        Some(p) => store.packages_for_patch(p)?,
        None => store.load_packages()?,
    };
    info!("loaded {} package(s) from {}", packages.len(), store.root().display());
    Ok(packages)
}

fn run_replay(
    scenario_path: &Path,
    store: Option<&Path>,
    patch: Option<Uuid>,
    config: Option<&Path>,
    out: Option<&Path>,
) -> CliResult<()> {
    let mut scenario = ReplayScenario::load_json(scenario_path)?;
    if let Some(path) = config {
        scenario.config = RelocalizationConfig::load_json(path)?;
    }
    let packages = match store {
        Some(dir) => load_packages(dir, patch)?,
        None => scenario.packages.clone(),
    };

    let report = scenario.run_with_packages(packages)?;
    let json = serde_json::to_string_pretty(&report)?;
    match out {
        Some(path) => {
            fs::write(path, json)?;
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_catalog(store: &Path, patch: Option<Uuid>, config: Option<&Path>) -> CliResult<()> {
    let config = match config {
        Some(path) => RelocalizationConfig::load_json(path)?,
        None => RelocalizationConfig::default(),
    };
    let packages = load_packages(store, patch)?;
    let catalog = FiducialCatalog::build(&packages, &config.catalog);

    let report = CatalogReport {
        packages: packages.len(),
        skipped: catalog.skipped(),
        fiducials: catalog
            .iter()
            .map(|f| CatalogEntry {
                name: f.name.to_string(),
                category: format!("{:?}", f.category),
                width_m: f.physical_size().width_m,
                height_m: f.physical_size().height_m,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
