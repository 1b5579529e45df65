//! meshctl - inspect and maintain a meshlink registry.
//!
//! This is the entry point for the `meshctl` binary.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshlink_control::MeshConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::Output;

/// meshctl - inspect and maintain a meshlink registry.
#[derive(Parser, Debug)]
#[command(name = "meshctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Registry data directory.
    #[arg(long, env = "MESHLINK_DATA_DIR", default_value = "/var/lib/meshlink")]
    data_dir: PathBuf,

    /// JSON configuration file.
    #[arg(long, env = "MESHLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List provisioned nodes.
    Nodes {
        /// Only nodes not known to be offline.
        #[arg(long)]
        online: bool,
    },
    /// List scenes.
    Scenes,
    /// Manage static OOB values.
    #[command(subcommand)]
    Oob(OobCommand),
    /// Print the next address that will be provisioned.
    Cursor,
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum OobCommand {
    /// Store the OOB value for one device.
    Import {
        /// Device UUID (32 hex characters).
        uuid: String,
        /// OOB value in hex.
        oob: String,
    },
    /// Import `<uuid> <oob>` lines from a file.
    ImportFile {
        /// Path of the file.
        path: PathBuf,
    },
    /// List stored OOB values.
    List,
    /// Show the OOB value of one device.
    Show {
        /// Device UUID.
        uuid: String,
    },
    /// Remove the OOB value of one device.
    Remove {
        /// Device UUID.
        uuid: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MeshConfig> {
    let Some(path) = path else {
        return Ok(MeshConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meshctl=debug,meshlink_control=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(args.config.as_ref())?;
    let output = Output::new(args.json);
    tracing::debug!(data_dir = %args.data_dir.display(), "Opening registry");

    if let Command::Config = args.command {
        return output.config(&config);
    }

    let store = commands::open(&args.data_dir)?;
    match args.command {
        Command::Nodes { online } => output.nodes(&commands::nodes(&store, online)?),
        Command::Scenes => output.scenes(&commands::scenes(&store)?),
        Command::Cursor => output.cursor(commands::cursor(store)?),
        Command::Oob(OobCommand::Import { uuid, oob }) => {
            let pair = commands::import_oob(&store, &uuid, &oob)?;
            output.oob(&[pair])
        }
        Command::Oob(OobCommand::ImportFile { path }) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let pairs = commands::import_oob_file(&store, &raw)?;
            output.oob(&pairs)
        }
        Command::Oob(OobCommand::List) => output.oob(&commands::list_oob(&store)?),
        Command::Oob(OobCommand::Show { uuid }) => output.oob(&[commands::show_oob(&store, &uuid)?]),
        Command::Oob(OobCommand::Remove { uuid }) => {
            commands::remove_oob(&store, &uuid)?;
            tracing::info!(uuid = %uuid, "OOB value removed");
            Ok(())
        }
        Command::Config => Ok(()),
    }
}
