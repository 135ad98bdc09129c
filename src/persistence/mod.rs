//! Persistence layer for the settings record

pub mod settings_file;

pub use settings_file::{SettingsFile, SETTINGS_FILE_NAME};
