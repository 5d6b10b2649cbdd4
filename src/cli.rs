use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scenegraft - rebuild exported scene collections into a live object graph
#[derive(Parser)]
#[command(name = "scenegraft")]
#[command(about = "Preview and install exported scene collections")]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Caller identity substituted for the identity marker
    #[arg(long, global = true, default_value = "")]
    pub identity: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a private preview graph from a description file
    Preview {
        /// Scene description (JSON)
        file: PathBuf,

        /// Scene to select after the build
        #[arg(short, long)]
        scene: Option<String>,
    },
    /// Install an unpacked package as a new scene collection
    Install {
        /// Directory the package was unpacked into
        package_dir: PathBuf,

        /// Desired collection name
        #[arg(short, long)]
        name: String,

        /// Collection names that already exist
        #[arg(long)]
        existing: Vec<String>,
    },
    /// Print the backing file a collection name would be saved to
    BackingId {
        /// Desired collection name
        name: String,

        /// File names already present in the backing directory
        #[arg(long)]
        existing: Vec<String>,
    },
    /// Validate a configuration file
    ValidateConfig {
        /// Path to configuration file to validate
        path: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
