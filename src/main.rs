//! Scenegraft - Main entry point
//!
//! Drives the engine against the in-memory host so descriptions and packages
//! can be checked without a running host application.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use scenegraft::cli::{Cli, Commands};
use scenegraft::{
    BuildReport, BuiltGraph, CollectionHost, EngineConfig, FixedIdentity, InstallRequest,
    Installer, JsonFileSource, MemoryHost, ObjectHost, ReloadCoordinator, Scope, SelectOutcome,
    unique_backing_id,
};

/// Consumer type the preview registers its active scene under
const PREVIEW_CONSUMER_TYPE: &str = "scene_preview";

/// Initialize the logger with appropriate settings
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let config = match &cli.config {
        Some(path) => {
            let config = EngineConfig::load_from_file(path)?;
            config
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", path))?;
            config
        }
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Preview { file, scene } => {
            run_preview(&file, scene.as_deref(), &cli.identity, config)
        }
        Commands::Install {
            package_dir,
            name,
            existing,
        } => run_install(&package_dir, &name, existing, &cli.identity, config),
        Commands::BackingId { name, existing } => {
            let file = unique_backing_id(&name, &existing, &config.naming);
            println!("{}", file.display());
            Ok(())
        }
        Commands::ValidateConfig { path } => validate_config(&path),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", path);
    let checked = EngineConfig::load_from_file(path)
        .and_then(|config| config.validate().map_err(anyhow::Error::from));
    match checked {
        Ok(()) => {
            info!("Configuration validation successful");
            println!("✓ Configuration file is valid: {:?}", path);
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Build a private preview and print what got linked
fn run_preview(file: &Path, scene: Option<&str>, identity: &str, config: EngineConfig) -> Result<()> {
    let host = Arc::new(MemoryHost::new());
    let objects: Arc<dyn ObjectHost> = host.clone();

    let consumer = host
        .create_object(
            PREVIEW_CONSUMER_TYPE,
            "preview",
            &Default::default(),
            Scope::Private,
        )
        .context("In-memory host refused the preview consumer")?;

    let mut coordinator = ReloadCoordinator::new(
        objects,
        Box::new(JsonFileSource),
        Box::new(FixedIdentity::new(identity)),
        consumer,
        config,
    );
    coordinator
        .reload(file)
        .with_context(|| format!("Failed to build preview from {:?}", file))?;

    if let Some(graph) = coordinator.graph() {
        print_graph(graph);
    }
    if let Some(report) = coordinator.report() {
        print_report(report);
    }

    if let Some(name) = scene {
        match coordinator.select(name) {
            SelectOutcome::NotFound => eprintln!("✗ No scene named '{}'", name),
            _ => {
                let (width, height) = coordinator.active_dimensions().unwrap_or_default();
                println!("✓ Selected '{}' ({}x{})", name, width, height);
            }
        }
    }

    Ok(())
}

/// Install a package into a fresh in-memory collection
fn run_install(
    package_dir: &Path,
    name: &str,
    existing: Vec<String>,
    identity: &str,
    config: EngineConfig,
) -> Result<()> {
    let files: Vec<String> = existing
        .iter()
        .map(|n| unique_backing_id(n, Vec::<String>::new(), &config.naming))
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let host = Arc::new(MemoryHost::new().with_collections(existing, files));
    let objects: Arc<dyn ObjectHost> = host.clone();
    let collections: Arc<dyn CollectionHost> = host.clone();

    let mut installer = Installer::new(
        objects,
        collections,
        Box::new(FixedIdentity::new(identity)),
        config,
    );
    let request = InstallRequest {
        name: name.to_string(),
        package_dir: package_dir.to_path_buf(),
    };

    match installer.install(&request) {
        Ok(receipt) => {
            println!(
                "✓ Installed '{}' ({}), {} object(s)",
                receipt.collection_name,
                receipt.backing_file.display(),
                receipt.objects
            );
            for scene in &receipt.scenes {
                let marker = if receipt.current_scene.as_deref() == Some(scene.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("  {} {}", marker, scene);
            }
            print_report(&receipt.report);
            Ok(())
        }
        Err(e) => {
            let stage = installer
                .context()
                .failed_at()
                .unwrap_or(installer.context().current_stage());
            eprintln!("✗ Installation failed at {}: {}", stage, e);
            std::process::exit(1);
        }
    }
}

fn print_graph(graph: &BuiltGraph) {
    for scene in graph.scene_names() {
        println!("{}", scene);
        for member in graph.member_names(&scene) {
            println!("  └ {}", member);
        }
    }
}

fn print_report(report: &BuildReport) {
    println!(
        "{} object(s), {} filter(s), {} container(s), {} member link(s)",
        report.created, report.filters, report.containers, report.linked_members
    );
    for diagnostic in &report.diagnostics {
        println!("  ! {}", diagnostic);
    }
}
