//! campusdrive CLI - browse and edit spreadsheets in a shared drive folder.
//!
//! Runs the interactive console browser, the HTTP service, or one-shot
//! commands against the remote drive. `--demo` swaps the remote drive for a
//! seeded in-memory one so everything works offline.

mod console;
mod demo;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use campusdrive_drive::{DriveClient, DriveConfig};
use campusdrive_navigator::Navigator;
use campusdrive_server::AppState;

use crate::console::Console;

#[derive(Parser)]
#[command(name = "campusdrive")]
#[command(about = "campusdrive - Spreadsheets in a shared drive folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file (default: environment and .env).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use a seeded in-memory drive instead of the remote one.
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the shared folder interactively.
    Browse,

    /// Run the HTTP service.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        address: IpAddr,

        /// Port to listen on.
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },

    /// List a folder of the shared folder.
    Ls {
        /// Folder path below the shared folder, e.g. "2024/reports".
        #[arg(short, long, default_value = "")]
        path: String,
    },

    /// Sign in and cache the tokens.
    Login,

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source = Source {
        config: cli.config.as_deref(),
        demo: cli.demo,
    };

    match cli.command {
        Commands::Browse => cmd_browse(&source).await,

        Commands::Serve { address, port } => {
            cmd_serve(&source, SocketAddr::new(address, port)).await
        }

        Commands::Ls { path } => cmd_ls(&source, &path).await,

        Commands::Login => cmd_login(&source).await,

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "campusdrive", &mut io::stdout());
            Ok(())
        }
    }
}

/// Where the drive client comes from.
struct Source<'a> {
    config: Option<&'a Path>,
    demo: bool,
}

impl Source<'_> {
    /// Build the drive client and return it with the shared folder name.
    fn connect(&self) -> Result<(Arc<DriveClient>, String)> {
        if self.demo {
            info!("Using the in-memory demo drive");
            return Ok((demo::client()?, demo::FOLDER.to_string()));
        }

        let config = match self.config {
            Some(path) => DriveConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => DriveConfig::from_env()
                .context("Failed to load config from the environment")?,
        };
        let client = DriveClient::connect(&config).context("Failed to set up the drive client")?;
        Ok((Arc::new(client), config.shared_folder))
    }
}

/// Run the interactive browser on stdin/stdout.
async fn cmd_browse(source: &Source<'_>) -> Result<()> {
    let (client, folder) = source.connect()?;
    let navigator = Navigator::new(client, folder);

    let stdin = io::stdin();
    let mut console = Console::new(navigator, stdin.lock(), io::stdout());
    console.run().await
}

/// Run the HTTP service until interrupted.
async fn cmd_serve(source: &Source<'_>, addr: SocketAddr) -> Result<()> {
    let (client, folder) = source.connect()?;
    info!(folder = %folder, "Starting HTTP service");

    campusdrive_server::serve(AppState::new(client, folder), addr)
        .await
        .context("HTTP service failed")
}

/// Print the contents of a folder.
async fn cmd_ls(source: &Source<'_>, path: &str) -> Result<()> {
    let (client, folder) = source.connect()?;
    let mut navigator = Navigator::new(client, folder);
    navigator
        .initialize()
        .await
        .context("Failed to open the shared folder")?;
    navigator
        .enter_path(path)
        .await
        .with_context(|| format!("Failed to open '{}'", path))?;

    let items = navigator.list_current().await.context("Failed to list folder")?;
    println!("{}:", navigator.cursor()?.breadcrumb());
    if items.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    let (folders, files): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.is_folder());
    for item in &folders {
        println!("  {}/", item.name);
    }
    for item in &files {
        println!("  {:<40} {:>10.2} MB", item.name, item.size_mb());
    }
    println!("\n{} folders, {} files", folders.len(), files.len());

    Ok(())
}

/// Sign in, forcing a fresh token.
async fn cmd_login(source: &Source<'_>) -> Result<()> {
    let (client, _folder) = source.connect()?;
    let token = client
        .tokens()
        .get_token(true)
        .await
        .context("Sign-in failed")?;

    println!("Signed in successfully!");
    println!("  Token valid for: {} minutes", token.expires_in / 60);

    Ok(())
}
