//! Error types for settings persistence and process supervision

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while changing or persisting settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to write settings to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hosted profile not found: {0}")]
    HostedProfileNotFound(String),

    #[error("Hosted profile already exists: {0}")]
    DuplicateProfile(String),

    #[error("Hosted profile name must not be empty")]
    EmptyProfileName,

    #[error("{field} contains unsupported character {ch:?}: {value}")]
    ReservedCharacter {
        field: &'static str,
        ch: char,
        value: String,
    },
}

/// Launch preconditions that keep the supervisor stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("Can not find core: {}", .0.display())]
    CoreNotFound(PathBuf),

    #[error("Can not find profile: {}", .0.display())]
    ProfileNotFound(PathBuf),
}

/// Hard failures from the supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to terminate core process {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Supervisor lock poisoned")]
    LockPoisoned,
}
