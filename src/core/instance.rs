//! The running core - Child handle and observed process state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::Child;

/// What the OS reports about the supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// No process has been started, or it was stopped
    Stopped,
    /// The child is alive
    Running,
    /// The child exited on its own; the supervisor has not been told yet
    Exited { code: Option<i32> },
    /// The running flag is set but the handle can no longer be queried
    Stale { reason: String },
}

impl ProcessState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
            Self::Exited { .. } => "Exited",
            Self::Stale { .. } => "Stale",
        }
    }

    /// True when the flag and the OS disagree
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Stale { .. })
    }
}

/// A launched core process
#[derive(Debug)]
pub struct CoreInstance {
    pub(crate) child: Child,
    /// Operating system process ID
    pub pid: u32,
    /// When the process was spawned
    pub started_at: DateTime<Utc>,
}

impl CoreInstance {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child,
            started_at: Utc::now(),
        }
    }

    /// Ask the OS whether the child is still alive
    pub fn probe(&mut self) -> ProcessState {
        match self.child.try_wait() {
            Ok(None) => ProcessState::Running,
            Ok(Some(status)) => ProcessState::Exited {
                code: status.code(),
            },
            Err(e) => ProcessState::Stale {
                reason: e.to_string(),
            },
        }
    }

    /// Format uptime as human-readable string
    pub fn uptime_string(&self) -> String {
        format_uptime((Utc::now() - self.started_at).num_seconds())
    }
}

pub(crate) fn format_uptime(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(-3), "0s");
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(7260), "2h 1m");
        assert_eq!(format_uptime(90000), "1d 1h");
    }

    #[test]
    fn only_exited_and_stale_are_inconsistent() {
        assert!(!ProcessState::Running.is_inconsistent());
        assert!(!ProcessState::Stopped.is_inconsistent());
        assert!(ProcessState::Exited { code: Some(1) }.is_inconsistent());
        assert!(ProcessState::Stale {
            reason: "gone".into()
        }
        .is_inconsistent());
    }
}
