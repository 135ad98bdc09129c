//! Interactive control shell - Drives the supervisor in place of the tray menu
//!
//! Every lifecycle operation runs on a blocking worker thread so that the
//! shell keeps reading input and polling for core exits while a stop waits
//! for the OS.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::{AppState, Settings, StatusReport};

/// How often the shell checks whether the core exited on its own
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const PROMPT: &str = "coretray> ";

const HELP: &str = "\
Commands:
  start                 start the core
  stop                  stop the core
  restart               stop, wait, and start again with current settings
  status                show the core status
  console               open the web console
  core <path>           use a different core executable
  local <path>          use a local profile file
  hosted <name>         use a hosted profile
  profiles              list hosted profiles
  add <name> <url>      add a hosted profile
  remove <name>         remove a hosted profile
  autostart on|off      start the core when the shell opens
  settings              show saved settings
  help                  show this help
  quit                  stop the core and leave";

/// A parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Start,
    Stop,
    Restart,
    Status,
    Console,
    Core(PathBuf),
    Local(PathBuf),
    Hosted(String),
    Profiles,
    Add { name: String, url: String },
    Remove(String),
    AutoStart(bool),
    Settings,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let require = |what: &str| -> Result<String, String> {
            if rest.is_empty() {
                Err(format!("Usage: {} {}", word, what))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" | "kill" => Self::Stop,
            "restart" => Self::Restart,
            "status" | "query" => Self::Status,
            "console" => Self::Console,
            "core" => Self::Core(PathBuf::from(require("<path>")?)),
            "local" => Self::Local(PathBuf::from(require("<path>")?)),
            "hosted" | "use" => Self::Hosted(require("<name>")?),
            "profiles" => Self::Profiles,
            "add" => {
                let args = require("<name> <url>")?;
                match args.split_once(char::is_whitespace) {
                    Some((name, url)) if !url.trim().is_empty() => Self::Add {
                        name: name.to_string(),
                        url: url.trim().to_string(),
                    },
                    _ => return Err(format!("Usage: {} <name> <url>", word)),
                }
            }
            "remove" => Self::Remove(require("<name>")?),
            "autostart" => match require("on|off")?.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => Self::AutoStart(true),
                "off" | "false" | "no" => Self::AutoStart(false),
                _ => return Err(format!("Usage: {} on|off", word)),
            },
            "settings" | "config" => Self::Settings,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
        };
        Ok(Some(command))
    }
}

/// Run `f` against the state on a blocking worker
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T>
where
    F: FnOnce(&AppState) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .context("Shell worker panicked")?
}

fn print_prompt() {
    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}

/// Describe settings for the `settings` command
pub fn describe_settings(settings: &Settings) -> String {
    let mut out = String::new();
    out.push_str(&format!("Core: {}\n", settings.executable_path.display()));
    out.push_str(&format!(
        "Local profile: {}\n",
        settings
            .local_profile_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".into())
    ));
    out.push_str(&format!("Profile source: {}\n", settings.profile_source_label()));
    out.push_str(&format!("Auto-start: {}\n", settings.auto_start_on_launch));
    out.push_str(&describe_profiles(settings));
    out
}

/// List hosted profiles, marking the active one
pub fn describe_profiles(settings: &Settings) -> String {
    if settings.hosted_profiles.is_empty() {
        return "No hosted profiles".to_string();
    }
    let active = settings.active_profile().map(|p| p.name.as_str());
    let mut out = String::from("Hosted profiles:");
    for profile in &settings.hosted_profiles {
        let marker = if Some(profile.name.as_str()) == active {
            "*"
        } else {
            " "
        };
        out.push_str(&format!("\n {} {}  {}", marker, profile.name, profile.source_url));
    }
    out
}

/// Read stdin lines on a dedicated thread. The channel closes at end of input.
fn spawn_input_reader() -> Result<mpsc::UnboundedReceiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("coretray-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to start input reader")?;
    Ok(rx)
}

/// Status text, with a warning when the running flag and the OS disagree
pub fn describe_status(report: &StatusReport) -> String {
    if report.running && report.state.is_inconsistent() {
        warn!("Core is flagged running but reported {}", report.state.label());
        format!(
            "{}
Warning: core is marked running but the process is {}",
            report,
            report.state.label().to_ascii_lowercase()
        )
    } else {
        report.to_string()
    }
}

/// Execute one command. Returns false when the shell should exit.
async fn execute(state: &AppState, command: ShellCommand, console_url: &str) -> Result<bool> {
    match command {
        ShellCommand::Start => {
            let outcome = blocking(state, |s| s.start_core()).await?;
            println!("{}", outcome);
            if outcome.is_ok() {
                println!("{}", blocking(state, |s| s.status()).await?);
            }
        }
        ShellCommand::Stop => {
            let outcome = blocking(state, |s| s.stop_core()).await?;
            println!("{}", outcome);
            println!("{}", blocking(state, |s| s.status()).await?);
        }
        ShellCommand::Restart => {
            println!("{}", blocking(state, |s| s.restart_core()).await?);
        }
        ShellCommand::Status => {
            println!("{}", describe_status(&blocking(state, |s| s.status()).await?));
        }
        ShellCommand::Console => {
            state.open_console(console_url)?;
        }
        ShellCommand::Core(path) => {
            let settings = state.set_core_path(path)?;
            println!("Using core: {}", settings.executable_path.display());
        }
        ShellCommand::Local(path) => {
            let settings = state.use_local_profile(path)?;
            println!("Using profile: {}", settings.profile_source_label());
        }
        ShellCommand::Hosted(name) => {
            let settings = state.use_hosted_profile(&name)?;
            println!("Using profile: {}", settings.profile_source_label());
        }
        ShellCommand::Profiles => {
            println!("{}", describe_profiles(&state.settings()));
        }
        ShellCommand::Add { name, url } => {
            state.add_hosted_profile(&name, &url)?;
            println!("Added hosted profile '{}'", name);
        }
        ShellCommand::Remove(name) => {
            state.remove_hosted_profile(&name)?;
            println!("Removed hosted profile '{}'", name);
        }
        ShellCommand::AutoStart(enabled) => {
            state.set_auto_start(enabled)?;
            println!("Auto-start {}", if enabled { "enabled" } else { "disabled" });
        }
        ShellCommand::Settings => {
            print!("{}", describe_settings(&state.settings()));
            println!();
        }
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Run the interactive shell until `quit`, end of input, or Ctrl-C
pub async fn run(state: AppState, console_url: String) -> Result<()> {
    match blocking(&state, |s| s.auto_start()).await {
        Ok(Some(outcome)) => println!("{}", outcome),
        Ok(None) => {}
        Err(e) => error!("Auto-start failed: {:#}", e),
    }

    let mut input = spawn_input_reader()?;
    let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    print_prompt();
    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else {
                    debug!("End of input");
                    break;
                };
                let line = line.context("Failed to read input")?;
                match ShellCommand::parse(&line) {
                    Ok(Some(command)) => match execute(&state, command, &console_url).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("Error: {:#}", e),
                    },
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                }
                print_prompt();
            }
            _ = exit_poll.tick() => {
                if let Some(notice) = blocking(&state, |s| s.poll_exit()).await? {
                    println!("\nCore (pid {}) exited with code {:?}", notice.pid, notice.code);
                    print_prompt();
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    blocking(&state, |s| s.shutdown()).await
}

/// Start the core and supervise it until it exits or Ctrl-C is pressed.
/// Returns the exit code the process should use.
pub async fn run_foreground(state: AppState) -> Result<i32> {
    let outcome = blocking(&state, |s| s.start_core()).await?;
    if !outcome.is_ok() {
        anyhow::bail!("{}", outcome);
    }
    println!("{}", outcome);
    supervise(state).await
}

/// Restart the core (stop, pause, start with freshly loaded settings) and
/// supervise it like [`run_foreground`]
pub async fn restart_foreground(state: AppState) -> Result<i32> {
    let outcome = blocking(&state, |s| s.restart_core()).await?;
    if !outcome.is_ok() {
        anyhow::bail!("{}", outcome);
    }
    println!("{}", outcome);
    supervise(state).await
}

async fn supervise(state: AppState) -> Result<i32> {
    println!("{}", blocking(&state, |s| s.status()).await?);

    let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = exit_poll.tick() => {
                if let Some(notice) = blocking(&state, |s| s.poll_exit()).await? {
                    println!("Core (pid {}) exited with code {:?}", notice.pid, notice.code);
                    return Ok(notice.code.unwrap_or(1));
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping core");
                println!("{}", blocking(&state, |s| s.stop_core()).await?);
                return Ok(0);
            }
        }
    }
}
