//! Status reports for the supervised core

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::instance::ProcessState;
use super::resource::ResourceUsage;

/// Snapshot of the supervisor and its child process
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub working_directory: Option<PathBuf>,
    /// Core executable, from the last launch or the configuration
    pub executable: Option<PathBuf>,
    /// Arguments resolved for the last launch
    pub arguments: Vec<String>,
    /// The supervisor's own running flag
    pub running: bool,
    pub pid: Option<u32>,
    /// What the OS reports for the child
    #[serde(flatten)]
    pub state: ProcessState,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime: Option<String>,
    pub usage: Option<ResourceUsage>,
}

impl StatusReport {
    pub(crate) fn stopped() -> Self {
        Self {
            working_directory: std::env::current_dir().ok(),
            executable: None,
            arguments: Vec::new(),
            running: false,
            pid: None,
            state: ProcessState::Stopped,
            started_at: None,
            uptime: None,
            usage: None,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = self
            .working_directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let core = self
            .executable
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        writeln!(f, "# Working Directory: {}", dir)?;
        writeln!(f, "# Core: {}", core)?;
        writeln!(f, "# Arguments: {}", self.arguments.join(" "))?;
        writeln!(f, "------")?;

        if !self.running {
            return write!(f, "# Running Flag: false");
        }

        if let Some(pid) = self.pid {
            writeln!(f, "# ID: {}", pid)?;
        }
        match &self.state {
            ProcessState::Stale { reason } => {
                write!(
                    f,
                    "# Running Flag: true. But process handle is unusable: {}",
                    reason
                )
            }
            state => {
                writeln!(f, "# Running Flag: true")?;
                match state {
                    ProcessState::Exited { code } => {
                        let code = code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into());
                        write!(f, "# HasExited: true (exit code {})", code)?;
                    }
                    _ => write!(f, "# HasExited: false")?,
                }
                if let Some(uptime) = &self.uptime {
                    write!(f, "\n# Uptime: {}", uptime)?;
                }
                if let Some(usage) = &self.usage {
                    write!(f, "\n# Resources: {}", usage.summary())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> StatusReport {
        StatusReport {
            working_directory: Some(PathBuf::from("/srv")),
            executable: Some(PathBuf::from("/srv/clash")),
            arguments: vec!["-f".into(), "profile.yaml".into()],
            ..StatusReport::stopped()
        }
    }

    #[test]
    fn stopped_report_lists_configuration() {
        let text = report().to_string();
        assert!(text.contains("# Working Directory: /srv"));
        assert!(text.contains("# Core: /srv/clash"));
        assert!(text.contains("# Arguments: -f profile.yaml"));
        assert!(text.ends_with("# Running Flag: false"));
    }

    #[test]
    fn running_report_includes_pid() {
        let text = StatusReport {
            running: true,
            pid: Some(4242),
            state: ProcessState::Running,
            uptime: Some("5s".into()),
            ..report()
        }
        .to_string();
        assert!(text.contains("# ID: 4242"));
        assert!(text.contains("# Running Flag: true"));
        assert!(text.contains("# HasExited: false"));
        assert!(text.contains("# Uptime: 5s"));
    }

    #[test]
    fn stale_handle_is_surfaced() {
        let text = StatusReport {
            running: true,
            pid: Some(1),
            state: ProcessState::Stale {
                reason: "No child processes".into(),
            },
            ..report()
        }
        .to_string();
        assert!(text.contains("But process handle is unusable: No child processes"));
    }

    #[test]
    fn serializes_state_inline() {
        let value = serde_json::to_value(StatusReport {
            running: true,
            pid: Some(7),
            state: ProcessState::Exited { code: Some(2) },
            ..report()
        })
        .unwrap();
        assert_eq!(value["state"], "exited");
        assert_eq!(value["code"], 2);
        assert_eq!(value["pid"], 7);
    }
}
