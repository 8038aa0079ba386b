//! `photobooth`: command-line entry point for the kiosk orchestrator.

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use colored::Colorize;
use pb_core::config::{config_path, load_config};
use pb_core::init::{init_project, InitOptions};
use pb_core::kiosk::{run_kiosk, KioskOptions};
use pb_core::session::SessionStore;
use pb_core::supervisor::StageRequest;
use pb_protocol::stage_models::StageKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment switch for debug logging, equivalent to `--verbose`.
const DEBUG_LOG_ENV: &str = "PHOTOBOOTH_DEBUG_LOG";

#[derive(Debug, Parser)]
#[command(name = "photobooth", author, version, about = "Photobooth kiosk orchestrator")]
struct Cli {
    /// Project root containing `.photobooth/` and the stage programs.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the kiosk (default).
    Run {
        /// Ignore stdin instead of reading override commands from it.
        #[arg(long)]
        no_console: bool,
    },
    /// Write `.photobooth/config.toml` and create the data directories.
    Init {
        /// Overwrite an existing configuration.
        #[arg(long)]
        force: bool,
        /// Use shell stand-ins for every stage and disable GPIO.
        #[arg(long)]
        demo: bool,
    },
    /// Validate the configuration and print the resolved stage commands.
    CheckConfig,
    /// List finished sessions, newest first.
    Sessions {
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::Run { no_console: false }) {
        Commands::Run { no_console } => {
            run_kiosk(KioskOptions {
                root: cli.root,
                console: !no_console,
            })
            .await
            .map_err(|err| color_eyre::eyre::eyre!("{err:#}"))?;
            // The console reader can still be parked in a blocking stdin
            // read, which would hold up runtime shutdown.
            std::process::exit(0);
        }
        Commands::Init { force, demo } => init(cli.root, force, demo).await,
        Commands::CheckConfig => check_config(cli.root).await,
        Commands::Sessions { json } => sessions(cli.root, json).await,
    }
}

fn init_tracing(verbose: bool) {
    let debug = verbose || std::env::var(DEBUG_LOG_ENV).is_ok_and(|value| value == "1");
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn init(root: PathBuf, force: bool, demo: bool) -> color_eyre::Result<()> {
    let written = init_project(InitOptions {
        target_dir: root,
        force,
        demo,
    })
    .await?;

    println!("{} {}", "Created".green().bold(), written.display());
    if demo {
        println!("Run `photobooth` and type s (start), b (capture) or q (quit).");
    }
    Ok(())
}

async fn check_config(root: PathBuf) -> color_eyre::Result<()> {
    let path = config_path(&root);
    let config = load_config(&root)
        .await
        .wrap_err("configuration is invalid")?;

    if path.exists() {
        println!("{} {}", "Config".bold(), path.display());
    } else {
        println!("{} none found, using defaults", "Config".bold());
    }
    println!("  data      {}", config.paths.data_dir.display());
    println!("  cache     {}", config.paths.cache_dir.display());
    println!("  snapshots {}", config.paths.snapshot_dir.display());
    println!(
        "  hardware  {}",
        if config.hardware.enabled {
            "gpio"
        } else {
            "override-only"
        }
    );

    println!("{}", "Stages".bold());
    for stage in StageKind::ALL {
        let request = StageRequest::from_command(stage, config.stages.get(stage));
        let status = if !request.enabled {
            "disabled".yellow()
        } else if request.script.as_ref().is_some_and(|script| !script.is_file()) {
            "missing script".red()
        } else {
            "ok".green()
        };
        println!(
            "  {:<11} {} [{status}]",
            stage.to_string(),
            request.display_command()
        );
    }
    Ok(())
}

async fn sessions(root: PathBuf, json: bool) -> color_eyre::Result<()> {
    let config = load_config(&root).await?;
    let sessions: Vec<_> = SessionStore::from_config(&config)
        .list_sessions()
        .into_iter()
        .map(|(_, session)| session)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    for session in &sessions {
        let story = session
            .story_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let names = if session.users.names.is_empty() {
            "-".to_string()
        } else {
            session.users.names.join(", ")
        };
        let image = if session.image_path.is_empty() {
            "no photo".dimmed().to_string()
        } else {
            session.image_path.clone()
        };
        println!(
            "{}  story {story}  {names}  {image}",
            session.session_id.cyan()
        );
    }
    Ok(())
}
