//! Hosted profiles - Named remote configurations tracked in settings

use serde::Serialize;
use tracing::warn;

use super::error::SettingsError;

/// Separator between a profile's name and its source URL
const FIELD_SEPARATOR: char = ',';
/// Separator between profiles in the encoded list
const ENTRY_SEPARATOR: char = ';';

/// A named profile whose content lives at a remote source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedProfile {
    /// Display label and lookup key
    pub name: String,
    /// Where the profile content comes from
    pub source_url: String,
}

impl HostedProfile {
    /// Create a profile, rejecting values the list encoding cannot represent
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Result<Self, SettingsError> {
        let profile = Self {
            name: name.into(),
            source_url: source_url.into(),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Check the profile against the reserved separators
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.name.trim().is_empty() {
            return Err(SettingsError::EmptyProfileName);
        }
        check_reserved("Profile name", &self.name, &[FIELD_SEPARATOR, ENTRY_SEPARATOR])?;
        check_reserved("Profile URL", &self.source_url, &[ENTRY_SEPARATOR])?;
        Ok(())
    }
}

/// Reject values containing any of `reserved` or a line break
pub(crate) fn check_reserved(
    field: &'static str,
    value: &str,
    reserved: &[char],
) -> Result<(), SettingsError> {
    match value
        .chars()
        .find(|c| reserved.contains(c) || *c == '\n' || *c == '\r')
    {
        Some(ch) => Err(SettingsError::ReservedCharacter {
            field,
            ch,
            value: value.to_string(),
        }),
        None => Ok(()),
    }
}

/// Encode profiles as `name,url;name,url;`
pub fn encode_profiles(profiles: &[HostedProfile]) -> String {
    profiles
        .iter()
        .map(|p| format!("{}{}{}{}", p.name, FIELD_SEPARATOR, p.source_url, ENTRY_SEPARATOR))
        .collect()
}

/// Decode a profile list line. Empty input yields an empty list.
pub fn decode_profiles(line: &str) -> Vec<HostedProfile> {
    line.split(ENTRY_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once(FIELD_SEPARATOR) {
            Some((name, url)) => Some(HostedProfile {
                name: name.to_string(),
                source_url: url.to_string(),
            }),
            None => {
                warn!("Skipping malformed hosted profile entry: {:?}", entry);
                None
            }
        })
        .collect()
}

/// First profile with the given name
pub fn find_profile<'a>(profiles: &'a [HostedProfile], name: &str) -> Option<&'a HostedProfile> {
    profiles.iter().find(|p| p.name == name)
}
