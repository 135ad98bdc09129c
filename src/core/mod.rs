//! Core module - Settings, hosted profiles, and supervision of the managed core

pub mod app_state;
pub mod error;
mod instance;
mod monitor;
pub mod process;
pub mod profile;
pub mod resource;
pub mod settings;
pub mod status;

pub use app_state::{AppState, DEFAULT_CONSOLE_URL};
pub use error::{LaunchError, SettingsError, SupervisorError};
pub use instance::ProcessState;
pub use process::{
    ExitNotice, LaunchPlan, RestartOutcome, SharedSupervisor, StartOutcome, StopOutcome,
    Supervisor, RESTART_DELAY,
};
pub use profile::HostedProfile;
pub use resource::ResourceUsage;
pub use settings::Settings;
pub use status::StatusReport;
