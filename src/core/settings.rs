//! Application settings - The persisted record the supervisor launches from

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::error::SettingsError;
use super::profile::{self, HostedProfile};

/// Conventional name of the managed core when none is configured
#[cfg(windows)]
pub const DEFAULT_CORE_NAME: &str = "clash.exe";
#[cfg(not(windows))]
pub const DEFAULT_CORE_NAME: &str = "clash";

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Path to the managed core executable
    pub executable_path: PathBuf,
    /// Locally chosen profile file, if any
    pub local_profile_path: Option<PathBuf>,
    /// Start the core as soon as the shell opens
    pub auto_start_on_launch: bool,
    /// Use the hosted profile list instead of the local profile
    pub hosted_profiles_enabled: bool,
    /// Selected hosted profile. `None` is a valid "not chosen yet" state.
    pub active_hosted_profile: Option<String>,
    /// Hosted profiles in display order
    pub hosted_profiles: Vec<HostedProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable_path: PathBuf::from(DEFAULT_CORE_NAME),
            local_profile_path: None,
            auto_start_on_launch: false,
            hosted_profiles_enabled: false,
            active_hosted_profile: None,
            hosted_profiles: Vec::new(),
        }
    }
}

impl Settings {
    /// Normalize empty values to their defaults
    pub fn validate(&mut self) {
        if self.executable_path.as_os_str().is_empty()
            || self.executable_path.to_string_lossy().trim().is_empty()
        {
            self.executable_path = PathBuf::from(DEFAULT_CORE_NAME);
        }
        if self
            .local_profile_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.local_profile_path = None;
        }
        if self
            .active_hosted_profile
            .as_ref()
            .is_some_and(|name| name.trim().is_empty())
        {
            self.active_hosted_profile = None;
        }
    }

    /// Drop a hosted selection that no longer names a listed profile.
    /// Returns true when something was cleared.
    pub fn heal(&mut self) -> bool {
        if !self.hosted_profiles_enabled {
            return false;
        }
        match self.active_hosted_profile.as_deref() {
            Some(name) if self.find_hosted_profile(name).is_none() => {
                self.hosted_profiles_enabled = false;
                self.active_hosted_profile = None;
                true
            }
            _ => false,
        }
    }

    /// Look up a hosted profile by name
    pub fn find_hosted_profile(&self, name: &str) -> Option<&HostedProfile> {
        profile::find_profile(&self.hosted_profiles, name)
    }

    /// The hosted profile currently in use, if hosted mode is on
    pub fn active_profile(&self) -> Option<&HostedProfile> {
        if !self.hosted_profiles_enabled {
            return None;
        }
        self.active_hosted_profile
            .as_deref()
            .and_then(|name| self.find_hosted_profile(name))
    }

    /// Point at a different core executable
    pub fn set_executable_path(&mut self, path: impl Into<PathBuf>) -> Result<(), SettingsError> {
        let path = path.into();
        check_path("Core path", &path)?;
        self.executable_path = path;
        self.validate();
        Ok(())
    }

    /// Use a local profile file and leave hosted mode
    pub fn select_local_profile(&mut self, path: impl Into<PathBuf>) -> Result<(), SettingsError> {
        let path = path.into();
        check_path("Profile path", &path)?;
        self.local_profile_path = Some(path);
        self.hosted_profiles_enabled = false;
        self.validate();
        Ok(())
    }

    /// Switch to a hosted profile from the list
    pub fn select_hosted_profile(&mut self, name: &str) -> Result<(), SettingsError> {
        if self.find_hosted_profile(name).is_none() {
            return Err(SettingsError::HostedProfileNotFound(name.to_string()));
        }
        self.hosted_profiles_enabled = true;
        self.active_hosted_profile = Some(name.to_string());
        Ok(())
    }

    /// Replace the hosted list, keeping the selection only if it still exists
    pub fn replace_hosted_profiles(&mut self, profiles: Vec<HostedProfile>) -> Result<(), SettingsError> {
        for profile in &profiles {
            profile.validate()?;
        }
        self.hosted_profiles = profiles;
        self.heal();
        Ok(())
    }

    /// Append a hosted profile
    pub fn add_hosted_profile(&mut self, profile: HostedProfile) -> Result<(), SettingsError> {
        profile.validate()?;
        if self.find_hosted_profile(&profile.name).is_some() {
            return Err(SettingsError::DuplicateProfile(profile.name));
        }
        self.hosted_profiles.push(profile);
        Ok(())
    }

    /// Remove every hosted profile with the given name
    pub fn remove_hosted_profile(&mut self, name: &str) -> Result<(), SettingsError> {
        let before = self.hosted_profiles.len();
        self.hosted_profiles.retain(|p| p.name != name);
        if self.hosted_profiles.len() == before {
            return Err(SettingsError::HostedProfileNotFound(name.to_string()));
        }
        self.heal();
        Ok(())
    }

    /// Human-readable name of the profile source in use
    pub fn profile_source_label(&self) -> String {
        if self.hosted_profiles_enabled {
            match self.active_hosted_profile.as_deref() {
                Some(name) => format!("hosted: {}", name),
                None => "hosted: (none selected)".to_string(),
            }
        } else {
            match &self.local_profile_path {
                Some(path) => format!("local: {}", path.display()),
                None => "local: (core defaults)".to_string(),
            }
        }
    }
}

fn check_path(field: &'static str, path: &Path) -> Result<(), SettingsError> {
    profile::check_reserved(field, &path.to_string_lossy(), &[])
}
