//! coretray - Supervise an external proxy core and its configuration profiles
//!
//! Runs an interactive control shell by default; subcommands cover one-shot
//! settings changes and foreground supervision.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coretray::core::{AppState, Supervisor, DEFAULT_CONSOLE_URL};
use coretray::persistence::SettingsFile;
use coretray::shell::{self, describe_profiles, describe_settings, describe_status};
use coretray::{APP_NAME, APP_VERSION};

/// How long leftover runtime tasks may delay exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "coretray")]
#[command(about = "coretray - Supervise an external proxy core and its profiles")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to .config in the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Append the core's stdout and stderr to this file
    #[arg(long, global = true, value_name = "FILE")]
    core_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive control shell (default)
    Shell {
        /// Console URL opened by the `console` command
        #[arg(long, default_value = DEFAULT_CONSOLE_URL)]
        console_url: String,
    },
    /// Start the core and supervise it until it exits or Ctrl-C is pressed
    Start,
    /// Stop the core. A fresh process owns no core, so this only reports.
    Stop,
    /// Restart the core and supervise it in the foreground
    Restart,
    /// Show the core status and configured launch
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open the core's web console in the default browser
    Console {
        #[arg(long, default_value = DEFAULT_CONSOLE_URL)]
        url: String,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Manage hosted profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show saved settings
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the core executable path
    Core { path: PathBuf },
    /// Use a local profile file
    Local { path: PathBuf },
    /// Use a hosted profile by name
    Hosted { name: String },
    /// Start the core automatically when the shell opens
    AutoStart {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List hosted profiles
    List,
    /// Add a hosted profile
    Add { name: String, url: String },
    /// Remove a hosted profile
    Remove { name: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let store = match &cli.settings {
        Some(path) => SettingsFile::new(path),
        None => SettingsFile::in_current_dir(),
    };
    let mut supervisor = Supervisor::new();
    if let Some(log) = &cli.core_log {
        supervisor = supervisor.with_output_log(log);
    }
    let state = AppState::new(store, supervisor);

    match cli.command {
        None => run_shell(state, DEFAULT_CONSOLE_URL.to_string()),
        Some(Commands::Shell { console_url }) => run_shell(state, console_url),
        Some(Commands::Start) => {
            let _guard = acquire_instance_lock(&state)?;
            foreground(shell::run_foreground(state))
        }
        Some(Commands::Stop) => {
            println!("{}", state.stop_core()?);
            Ok(())
        }
        Some(Commands::Restart) => {
            let _guard = acquire_instance_lock(&state)?;
            foreground(shell::restart_foreground(state))
        }
        Some(Commands::Status { json }) => {
            let report = state.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", describe_status(&report));
            }
            Ok(())
        }
        Some(Commands::Console { url }) => state.open_console(&url),
        Some(Commands::Config { action }) => run_config(&state, action),
        Some(Commands::Profiles { action }) => run_profiles(&state, action),
    }
}

fn run_shell(state: AppState, console_url: String) -> Result<()> {
    let _guard = acquire_instance_lock(&state)?;
    println!("{} v{}. Type 'help' for commands.", APP_NAME, APP_VERSION);
    let rt = runtime()?;
    let result = rt.block_on(shell::run(state, console_url));
    rt.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result?;
    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Drive a foreground supervision future and pass the core's exit code through
fn foreground(task: impl std::future::Future<Output = Result<i32>>) -> Result<()> {
    let rt = runtime()?;
    let result = rt.block_on(task);
    rt.shutdown_timeout(SHUTDOWN_TIMEOUT);
    let code = result?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run_config(state: &AppState, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show { json } => {
            let settings = state.settings();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("{}", describe_settings(&settings));
            }
        }
        ConfigCommands::Core { path } => {
            let settings = state.set_core_path(path)?;
            println!("Using core: {}", settings.executable_path.display());
        }
        ConfigCommands::Local { path } => {
            let settings = state.use_local_profile(path)?;
            println!("Using profile: {}", settings.profile_source_label());
        }
        ConfigCommands::Hosted { name } => {
            let settings = state.use_hosted_profile(&name)?;
            println!("Using profile: {}", settings.profile_source_label());
        }
        ConfigCommands::AutoStart { state: toggle } => {
            let enabled = matches!(toggle, Toggle::On);
            state.set_auto_start(enabled)?;
            println!("Auto-start {}", if enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

fn run_profiles(state: &AppState, action: ProfileCommands) -> Result<()> {
    match action {
        ProfileCommands::List => println!("{}", describe_profiles(&state.settings())),
        ProfileCommands::Add { name, url } => {
            state.add_hosted_profile(&name, &url)?;
            println!("Added hosted profile '{}'", name);
        }
        ProfileCommands::Remove { name } => {
            state.remove_hosted_profile(&name)?;
            println!("Removed hosted profile '{}'", name);
        }
    }
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Ensure only one supervisor drives a given settings file
fn acquire_instance_lock(state: &AppState) -> Result<SingleInstance> {
    let path = std::fs::canonicalize(state.store.path())
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(state.store.path())))
        .unwrap_or_else(|_| state.store.path().to_path_buf());
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let name = format!("{}-{:016x}", APP_NAME, hasher.finish());

    let instance = SingleInstance::new(&name)
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        anyhow::bail!(
            "Another {} is already supervising {}",
            APP_NAME,
            state.store.path().display()
        );
    }
    Ok(instance)
}

/// Initialize the logging system
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coretray=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
