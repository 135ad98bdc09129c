//! Line-based settings file storage
//!
//! The file holds one field per line in a fixed order:
//!
//! 1. core executable path
//! 2. local profile path
//! 3. auto-start flag (`True` / `False`)
//! 4. hosted-profile flag (`True` / `False`)
//! 5. hosted profile list (`name,url;name,url;`)
//! 6. active hosted profile name
//!
//! Shorter files are valid: every missing line takes its default.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::core::error::SettingsError;
use crate::core::profile::{decode_profiles, encode_profiles};
use crate::core::Settings;

/// Conventional settings file name in the working directory
pub const SETTINGS_FILE_NAME: &str = ".config";

/// Durable store for the single settings record
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings file in the current working directory
    pub fn in_current_dir() -> Self {
        Self::new(SETTINGS_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings record, falling back to defaults for anything missing.
    ///
    /// A hosted selection that names a profile no longer in the list is
    /// cleared and written back before returning.
    pub fn load(&self) -> Settings {
        let mut settings = match std::fs::read(&self.path) {
            Ok(bytes) => parse(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, using defaults", self.path);
                Settings::default()
            }
            Err(e) => {
                warn!("Failed to read settings from {:?}: {}", self.path, e);
                Settings::default()
            }
        };

        if settings.heal() {
            info!("Active hosted profile no longer exists, switching back to local profile");
            if let Err(e) = self.save(&settings) {
                error!("Failed to persist corrected settings: {}", e);
            }
        }

        settings
    }

    /// Write the full record, replacing the previous file atomically
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = NamedTempFile::new_in(&dir).map_err(write_err)?;
        file.write_all(render(settings).as_bytes())
            .map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!("Settings saved to {:?}", self.path);
        Ok(())
    }

    /// Load, apply `change`, and save. Nothing is written if `change` fails.
    pub fn update<F>(&self, change: F) -> Result<Settings, SettingsError>
    where
        F: FnOnce(&mut Settings) -> Result<(), SettingsError>,
    {
        let mut settings = self.load();
        change(&mut settings)?;
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Parse settings content. Never fails; malformed fields take their defaults.
pub fn parse(content: &str) -> Settings {
    let mut settings = Settings::default();
    let mut lines = content.lines();

    if let Some(line) = lines.next() {
        settings.executable_path = PathBuf::from(line);
    }
    if let Some(line) = lines.next() {
        settings.local_profile_path = Some(PathBuf::from(line));
    }
    if let Some(line) = lines.next() {
        settings.auto_start_on_launch = parse_bool(line);
    }
    if let Some(line) = lines.next() {
        settings.hosted_profiles_enabled = parse_bool(line);
    }
    if let Some(line) = lines.next() {
        settings.hosted_profiles = decode_profiles(line);
    }
    if let Some(line) = lines.next() {
        settings.active_hosted_profile = Some(line.to_string());
    }

    settings.validate();
    settings
}

/// Render settings in the fixed line order
pub fn render(settings: &Settings) -> String {
    let lines = [
        settings.executable_path.to_string_lossy().into_owned(),
        settings
            .local_profile_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        render_bool(settings.auto_start_on_launch).to_string(),
        render_bool(settings.hosted_profiles_enabled).to_string(),
        encode_profiles(&settings.hosted_profiles),
        settings.active_hosted_profile.clone().unwrap_or_default(),
    ];

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn render_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::DEFAULT_CORE_NAME;
    use crate::core::HostedProfile;
    use tempfile::TempDir;

    fn store() -> (TempDir, SettingsFile) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = SettingsFile::new(dir.path().join(SETTINGS_FILE_NAME));
        (dir, store)
    }

    fn sample() -> Settings {
        Settings {
            executable_path: PathBuf::from("/opt/core/clash"),
            local_profile_path: Some(PathBuf::from("/home/me/profile.yaml")),
            auto_start_on_launch: true,
            hosted_profiles_enabled: true,
            active_hosted_profile: Some("work".into()),
            hosted_profiles: vec![
                HostedProfile::new("work", "https://example.com/work").unwrap(),
                HostedProfile::new("home", "https://example.com/home").unwrap(),
            ],
        }
    }

    #[test]
    fn missing_file_loads_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load(), Settings::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = store();
        let settings = sample();
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn writes_legacy_line_layout() {
        let (_dir, store) = store();
        store.save(&sample()).unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "/opt/core/clash");
        assert_eq!(lines[2], "True");
        assert_eq!(lines[3], "True");
        assert_eq!(
            lines[4],
            "work,https://example.com/work;home,https://example.com/home;"
        );
        assert_eq!(lines[5], "work");
    }

    #[test]
    fn truncated_files_use_defaults_for_missing_tail() {
        let full = render(&sample());
        let lines: Vec<&str> = full.lines().collect();

        for keep in 0..lines.len() {
            let settings = parse(&lines[..keep].join("\n"));
            let defaults = Settings::default();
            if keep < 1 {
                assert_eq!(settings.executable_path, defaults.executable_path);
            }
            if keep < 2 {
                assert_eq!(settings.local_profile_path, None);
            }
            if keep < 3 {
                assert!(!settings.auto_start_on_launch);
            }
            if keep < 4 {
                assert!(!settings.hosted_profiles_enabled);
            }
            if keep < 5 {
                assert!(settings.hosted_profiles.is_empty());
            }
            assert!(settings.active_hosted_profile.is_none());
        }
    }

    #[test]
    fn empty_executable_line_uses_default_name() {
        let settings = parse("\n\nTrue\n");
        assert_eq!(settings.executable_path, PathBuf::from(DEFAULT_CORE_NAME));
        assert!(settings.local_profile_path.is_none());
        assert!(settings.auto_start_on_launch);
    }

    #[test]
    fn malformed_booleans_read_as_false() {
        let settings = parse("clash\n\nyes\n1\n");
        assert!(!settings.auto_start_on_launch);
        assert!(!settings.hosted_profiles_enabled);
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let settings = parse("clash.exe\r\nprofile.yaml\r\nTrue\r\nFalse\r\na,http://a;\r\n");
        assert_eq!(settings.local_profile_path, Some(PathBuf::from("profile.yaml")));
        assert!(settings.auto_start_on_launch);
        assert_eq!(settings.hosted_profiles.len(), 1);
    }

    #[test]
    fn load_heals_and_persists_missing_hosted_selection() {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            "clash\n\nFalse\nTrue\na,http://a;\nremoved\n",
        )
        .unwrap();

        let settings = store.load();
        assert!(!settings.hosted_profiles_enabled);
        assert!(settings.active_hosted_profile.is_none());

        let on_disk = parse(&std::fs::read_to_string(store.path()).unwrap());
        assert!(!on_disk.hosted_profiles_enabled);
        assert!(on_disk.active_hosted_profile.is_none());
        assert_eq!(on_disk.hosted_profiles.len(), 1);
    }

    #[test]
    fn hosted_mode_without_selection_is_kept() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "clash\n\nFalse\nTrue\na,http://a;\n").unwrap();
        let settings = store.load();
        assert!(settings.hosted_profiles_enabled);
        assert!(settings.active_hosted_profile.is_none());
    }

    #[test]
    fn save_into_missing_directory_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        let store = SettingsFile::new(dir.path().join("missing").join(SETTINGS_FILE_NAME));
        let err = store.save(&Settings::default()).unwrap_err();
        assert!(matches!(err, SettingsError::Write { .. }));
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let (_dir, store) = store();
        store.save(&sample()).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let result = store.update(|s| s.select_hosted_profile("nope"));
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }
}
