//! Application state - The operations the shell exposes to the user

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::process::{
    ExitNotice, RestartOutcome, SharedSupervisor, StartOutcome, StopOutcome, Supervisor,
};
use super::profile::HostedProfile;
use super::settings::Settings;
use super::status::StatusReport;
use crate::persistence::SettingsFile;

/// Default address of the core's web console
pub const DEFAULT_CONSOLE_URL: &str = "http://localhost:9090/ui";

/// Central application state
#[derive(Clone)]
pub struct AppState {
    /// Settings storage
    pub store: Arc<SettingsFile>,
    /// The core supervisor
    pub supervisor: SharedSupervisor,
}

impl AppState {
    pub fn new(store: SettingsFile, supervisor: Supervisor) -> Self {
        Self {
            store: Arc::new(store),
            supervisor: SharedSupervisor::new(supervisor),
        }
    }

    /// Current settings, read fresh from disk
    pub fn settings(&self) -> Settings {
        self.store.load()
    }

    /// Start the core if auto-start is enabled
    pub fn auto_start(&self) -> Result<Option<StartOutcome>> {
        if !self.settings().auto_start_on_launch {
            return Ok(None);
        }
        info!("Auto-start enabled, starting core");
        self.start_core().map(Some)
    }

    pub fn start_core(&self) -> Result<StartOutcome> {
        let settings = self.settings();
        Ok(self.supervisor.start(&settings)?)
    }

    pub fn stop_core(&self) -> Result<StopOutcome> {
        Ok(self.supervisor.stop()?)
    }

    /// Restart, picking up settings saved while the old core was stopping
    pub fn restart_core(&self) -> Result<RestartOutcome> {
        let store = Arc::clone(&self.store);
        Ok(self.supervisor.restart_with(move || store.load())?)
    }

    /// Status report, naming the configured core when nothing was launched yet
    pub fn status(&self) -> Result<StatusReport> {
        let mut report = self.supervisor.query_status()?;
        if report.executable.is_none() {
            report.executable = Some(self.settings().executable_path);
        }
        Ok(report)
    }

    /// Check whether the core exited on its own
    pub fn poll_exit(&self) -> Result<Option<ExitNotice>> {
        Ok(self.supervisor.reap()?)
    }

    pub fn set_core_path(&self, path: impl Into<PathBuf>) -> Result<Settings> {
        let path = path.into();
        if !path.is_file() {
            warn!("Core {:?} does not exist yet", path);
        }
        let settings = self
            .store
            .update(|s| s.set_executable_path(path))
            .context("Failed to save core path")?;
        info!("Using core {:?}", settings.executable_path);
        Ok(settings)
    }

    pub fn use_local_profile(&self, path: impl Into<PathBuf>) -> Result<Settings> {
        let path = path.into();
        if !path.is_file() {
            warn!("Profile {:?} does not exist yet", path);
        }
        let settings = self
            .store
            .update(|s| s.select_local_profile(path))
            .context("Failed to select local profile")?;
        info!("Using local profile {:?}", settings.local_profile_path);
        Ok(settings)
    }

    pub fn use_hosted_profile(&self, name: &str) -> Result<Settings> {
        let settings = self
            .store
            .update(|s| s.select_hosted_profile(name))
            .context("Failed to select hosted profile")?;
        info!("Using hosted profile '{}'", name);
        Ok(settings)
    }

    pub fn set_auto_start(&self, enabled: bool) -> Result<Settings> {
        self.store
            .update(|s| {
                s.auto_start_on_launch = enabled;
                Ok(())
            })
            .context("Failed to save auto-start setting")
    }

    /// Replace the whole hosted list, as the list editor does on confirm
    pub fn set_hosted_profiles(&self, profiles: Vec<HostedProfile>) -> Result<Settings> {
        self.store
            .update(|s| s.replace_hosted_profiles(profiles))
            .context("Failed to save hosted profiles")
    }

    pub fn add_hosted_profile(&self, name: &str, url: &str) -> Result<Settings> {
        let profile = HostedProfile::new(name, url)?;
        self.store
            .update(|s| s.add_hosted_profile(profile))
            .context("Failed to add hosted profile")
    }

    pub fn remove_hosted_profile(&self, name: &str) -> Result<Settings> {
        self.store
            .update(|s| s.remove_hosted_profile(name))
            .context("Failed to remove hosted profile")
    }

    /// Open the core's web console in the default browser
    pub fn open_console(&self, url: &str) -> Result<()> {
        open::that(url).with_context(|| format!("Failed to open console URL {}", url))?;
        info!("Opened console at {}", url);
        Ok(())
    }

    /// Stop the core before the application exits
    pub fn shutdown(&self) -> Result<()> {
        if let StopOutcome::Stopped { pid, .. } = self.stop_core()? {
            info!("Stopped core {} on shutdown", pid);
        }
        Ok(())
    }
}
