//! Process supervision - Starting, stopping and inspecting the managed core

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info, warn};

use super::error::{LaunchError, SupervisorError};
use super::instance::{CoreInstance, ProcessState};
use super::monitor::ResourceMonitor;
use super::settings::Settings;
use super::status::StatusReport;

/// Pause between stopping and relaunching so ports can be released
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Flag that hands the profile path to the core
const PROFILE_FLAG: &str = "-f";

/// Executable and arguments resolved from settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    pub profile: Option<PathBuf>,
}

impl LaunchPlan {
    /// Resolve what to launch, checking that every referenced file exists
    pub fn resolve(settings: &Settings) -> Result<Self, LaunchError> {
        let executable = settings.executable_path.clone();
        if !executable.is_file() {
            return Err(LaunchError::CoreNotFound(executable));
        }

        let profile = match &settings.local_profile_path {
            None => None,
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => return Err(LaunchError::ProfileNotFound(path.clone())),
        };

        Ok(Self {
            executable,
            profile,
        })
    }

    pub fn arguments(&self) -> Vec<String> {
        match &self.profile {
            Some(profile) => vec![
                PROFILE_FLAG.to_string(),
                profile.to_string_lossy().into_owned(),
            ],
            None => Vec::new(),
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
    CoreNotFound(PathBuf),
    ProfileNotFound(PathBuf),
    SpawnFailed { path: PathBuf, reason: String },
}

impl StartOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

impl From<LaunchError> for StartOutcome {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::CoreNotFound(path) => Self::CoreNotFound(path),
            LaunchError::ProfileNotFound(path) => Self::ProfileNotFound(path),
        }
    }
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { pid } => write!(f, "Core started (pid {})", pid),
            Self::AlreadyRunning { pid } => write!(f, "Core is already running (pid {})", pid),
            Self::CoreNotFound(path) => {
                write!(f, "{}", LaunchError::CoreNotFound(path.clone()))
            }
            Self::ProfileNotFound(path) => {
                write!(f, "{}", LaunchError::ProfileNotFound(path.clone()))
            }
            Self::SpawnFailed { path, reason } => {
                write!(f, "Failed to launch core {}: {}", path.display(), reason)
            }
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32, code: Option<i32> },
    NotRunning,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped { pid, .. } => write!(f, "Core stopped (pid {})", pid),
            Self::NotRunning => write!(f, "Core is not running"),
        }
    }
}

/// Result of a restart request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub stop: StopOutcome,
    pub start: StartOutcome,
}

impl RestartOutcome {
    pub fn is_ok(&self) -> bool {
        self.start.is_ok()
    }
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            write!(f, "Successfully restarted. {}", self.start)
        } else {
            write!(f, "Restart failed. {}", self.start)
        }
    }
}

/// A child that exited without being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitNotice {
    pub pid: u32,
    pub code: Option<i32>,
}

/// Owns at most one running core process
pub struct Supervisor {
    instance: Option<CoreInstance>,
    /// Last plan that was launched, kept for status reports after stop
    last_plan: Option<LaunchPlan>,
    monitor: ResourceMonitor,
    restart_delay: Duration,
    /// Where the core's stdout/stderr go; discarded when unset
    output_log: Option<PathBuf>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            instance: None,
            last_plan: None,
            monitor: ResourceMonitor::new(),
            restart_delay: RESTART_DELAY,
            output_log: None,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_output_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_log = Some(path.into());
        self
    }

    /// Whether the supervisor believes the core is running
    pub fn is_running(&self) -> bool {
        self.instance.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.instance.as_ref().map(|i| i.pid)
    }

    /// Launch the core described by `settings`
    pub fn start(&mut self, settings: &Settings) -> StartOutcome {
        if let Some(instance) = &self.instance {
            info!("Core is already running with PID {}", instance.pid);
            return StartOutcome::AlreadyRunning { pid: instance.pid };
        }

        // Validate core and profile exist
        let plan = match LaunchPlan::resolve(settings) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Not starting core: {}", e);
                return e.into();
            }
        };

        info!(
            "Spawning core {:?} with arguments {:?}",
            plan.executable,
            plan.arguments()
        );

        // Build the command
        let mut cmd = Command::new(program_path(&plan.executable));
        cmd.args(plan.arguments()).stdin(Stdio::null());
        self.attach_output(&mut cmd);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(0x0800_0000); // CREATE_NO_WINDOW
        }

        // Spawn the process
        let outcome = match cmd.spawn() {
            Ok(child) => {
                let instance = CoreInstance::new(child);
                info!("Spawned core with PID {}", instance.pid);
                let pid = instance.pid;
                self.instance = Some(instance);
                StartOutcome::Started { pid }
            }
            Err(e) => {
                error!("Failed to spawn core: {}", e);
                StartOutcome::SpawnFailed {
                    path: plan.executable.clone(),
                    reason: e.to_string(),
                }
            }
        };

        self.last_plan = Some(plan);
        outcome
    }

    /// Kill the core and wait until the OS confirms it is gone
    pub fn stop(&mut self) -> Result<StopOutcome, SupervisorError> {
        let Some(instance) = self.instance.as_mut() else {
            return Ok(StopOutcome::NotRunning);
        };

        let pid = instance.pid;
        info!("Stopping core with PID {}", pid);

        // Force kill, then reap
        instance
            .child
            .kill()
            .map_err(|source| SupervisorError::Terminate { pid, source })?;
        let status = instance
            .child
            .wait()
            .map_err(|source| SupervisorError::Terminate { pid, source })?;

        self.instance = None;
        info!("Core with PID {} terminated ({})", pid, status);

        Ok(StopOutcome::Stopped {
            pid,
            code: status.code(),
        })
    }

    /// Stop, wait for the restart delay, then start with `settings`
    pub fn restart(&mut self, settings: &Settings) -> Result<RestartOutcome, SupervisorError> {
        self.restart_with(|| settings.clone())
    }

    /// Like [`Supervisor::restart`], reading settings only after the pause
    pub fn restart_with<F>(&mut self, settings: F) -> Result<RestartOutcome, SupervisorError>
    where
        F: FnOnce() -> Settings,
    {
        let stop = self.stop()?;
        std::thread::sleep(self.restart_delay);
        let start = self.start(&settings());
        Ok(RestartOutcome { stop, start })
    }

    /// Report the supervisor state without changing it
    pub fn query_status(&mut self) -> StatusReport {
        let mut report = StatusReport::stopped();
        if let Some(plan) = &self.last_plan {
            report.executable = Some(plan.executable.clone());
            report.arguments = plan.arguments();
        }

        let Some(instance) = self.instance.as_mut() else {
            return report;
        };

        let state = instance.probe();
        report.running = true;
        report.pid = Some(instance.pid);
        report.started_at = Some(instance.started_at);
        report.uptime = Some(instance.uptime_string());
        if state == ProcessState::Running {
            report.usage = self.monitor.process_usage(instance.pid);
        }
        report.state = state;
        report
    }

    /// Clear the running flag if the core exited on its own
    pub fn reap(&mut self) -> Option<ExitNotice> {
        let instance = self.instance.as_mut()?;
        match instance.probe() {
            ProcessState::Exited { code } => {
                let notice = ExitNotice {
                    pid: instance.pid,
                    code,
                };
                warn!("Core with PID {} exited with code {:?}", notice.pid, code);
                self.instance = None;
                Some(notice)
            }
            _ => None,
        }
    }

    fn attach_output(&self, cmd: &mut Command) {
        let Some(path) = &self.output_log else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            return;
        };

        let opened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|file| Ok((file.try_clone()?, file)));
        match opened {
            Ok((out, err)) => {
                cmd.stdout(out).stderr(err);
            }
            Err(e) => {
                warn!("Failed to open core log {:?}: {}", path, e);
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn exactly the file that was checked, not a `PATH` lookup of its name
fn program_path(executable: &Path) -> PathBuf {
    if executable.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(executable);
        }
    }
    executable.to_path_buf()
}

/// Thread-safe wrapper for Supervisor
pub struct SharedSupervisor {
    inner: Arc<Mutex<Supervisor>>,
}

impl SharedSupervisor {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(supervisor)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Supervisor>, SupervisorError> {
        self.inner.lock().map_err(|_| SupervisorError::LockPoisoned)
    }

    pub fn start(&self, settings: &Settings) -> Result<StartOutcome, SupervisorError> {
        Ok(self.lock()?.start(settings))
    }

    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        self.lock()?.stop()
    }

    pub fn restart_with<F>(&self, settings: F) -> Result<RestartOutcome, SupervisorError>
    where
        F: FnOnce() -> Settings,
    {
        self.lock()?.restart_with(settings)
    }

    pub fn query_status(&self) -> Result<StatusReport, SupervisorError> {
        Ok(self.lock()?.query_status())
    }

    pub fn reap(&self) -> Result<Option<ExitNotice>, SupervisorError> {
        Ok(self.lock()?.reap())
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().map(|s| s.is_running()).unwrap_or(false)
    }
}

impl Clone for SharedSupervisor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    const SHELL: &str = "/bin/sh";

    /// A core that runs until killed when started without arguments
    fn endless_core() -> PathBuf {
        ["/usr/bin/yes", "/bin/yes"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .expect("yes(1) is required for supervisor tests")
    }

    fn supervisor() -> Supervisor {
        Supervisor::new().with_restart_delay(Duration::from_millis(20))
    }

    fn settings_for(executable: impl Into<PathBuf>) -> Settings {
        Settings {
            executable_path: executable.into(),
            ..Default::default()
        }
    }

    /// `sh -f <script>` runs the profile as a script, which gives a controllable core
    fn scripted_settings(dir: &TempDir, script: &str) -> Settings {
        let profile = dir.path().join("profile.sh");
        std::fs::write(&profile, script).unwrap();
        Settings {
            executable_path: PathBuf::from(SHELL),
            local_profile_path: Some(profile),
            ..Default::default()
        }
    }

    fn wait_for_exit(supervisor: &mut Supervisor) -> StatusReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let report = supervisor.query_status();
            if report.state != ProcessState::Running || Instant::now() > deadline {
                return report;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn missing_core_keeps_supervisor_stopped() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no-such-core");
        let mut supervisor = supervisor();

        let outcome = supervisor.start(&settings_for(&missing));
        assert_eq!(outcome, StartOutcome::CoreNotFound(missing.clone()));
        assert!(!outcome.is_ok());
        assert!(outcome.to_string().contains("Can not find core"));
        assert!(!supervisor.is_running());
        assert!(!supervisor.query_status().running);
    }

    #[test]
    fn missing_profile_keeps_supervisor_stopped() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(endless_core());
        settings.local_profile_path = Some(dir.path().join("missing.yaml"));

        let mut supervisor = supervisor();
        let outcome = supervisor.start(&settings);
        assert!(matches!(outcome, StartOutcome::ProfileNotFound(_)));
        assert!(outcome.to_string().contains("Can not find profile"));
        assert!(!supervisor.is_running());
    }

    #[test]
    fn starts_without_profile_argument() {
        let mut supervisor = supervisor();
        let outcome = supervisor.start(&settings_for(endless_core()));
        let StartOutcome::Started { pid } = outcome else {
            panic!("unexpected outcome: {}", outcome);
        };

        let report = supervisor.query_status();
        assert!(report.running);
        assert_eq!(report.pid, Some(pid));
        assert_eq!(report.state, ProcessState::Running);
        assert!(report.arguments.is_empty());

        supervisor.stop().unwrap();
    }

    #[test]
    fn passes_profile_with_flag() {
        let dir = TempDir::new().unwrap();
        let settings = scripted_settings(&dir, "sleep 30\n");
        let mut supervisor = supervisor();

        assert!(supervisor.start(&settings).is_ok());
        let report = supervisor.query_status();
        assert_eq!(report.arguments[0], "-f");
        assert_eq!(
            PathBuf::from(&report.arguments[1]),
            dir.path().join("profile.sh")
        );
        assert_eq!(report.state, ProcessState::Running);

        supervisor.stop().unwrap();
    }

    #[test]
    fn second_start_is_rejected() {
        let mut supervisor = supervisor();
        let settings = settings_for(endless_core());

        let StartOutcome::Started { pid } = supervisor.start(&settings) else {
            panic!("first start failed");
        };
        let second = supervisor.start(&settings);
        assert_eq!(second, StartOutcome::AlreadyRunning { pid });
        assert!(!second.is_ok());
        assert_eq!(supervisor.pid(), Some(pid));

        supervisor.stop().unwrap();
    }

    #[test]
    fn stop_when_stopped_is_a_no_op() {
        let mut supervisor = supervisor();
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::NotRunning);
        assert!(!supervisor.is_running());
    }

    #[test]
    fn stop_kills_and_clears_flag() {
        let mut supervisor = supervisor();
        let StartOutcome::Started { pid } = supervisor.start(&settings_for(endless_core())) else {
            panic!("start failed");
        };

        let outcome = supervisor.stop().unwrap();
        assert!(matches!(outcome, StopOutcome::Stopped { pid: p, .. } if p == pid));
        assert!(!supervisor.is_running());

        let report = supervisor.query_status();
        assert!(!report.running);
        assert_eq!(report.state, ProcessState::Stopped);
        assert_eq!(report.executable, Some(endless_core()));
    }

    #[test]
    fn exited_core_is_reported_but_not_cleared() {
        let dir = TempDir::new().unwrap();
        let settings = scripted_settings(&dir, "exit 3\n");
        let mut supervisor = supervisor();
        assert!(supervisor.start(&settings).is_ok());

        let report = wait_for_exit(&mut supervisor);
        assert!(report.running);
        assert_eq!(report.state, ProcessState::Exited { code: Some(3) });
        assert!(supervisor.is_running());

        let notice = supervisor.reap().expect("exit should be detected");
        assert_eq!(notice.code, Some(3));
        assert!(!supervisor.is_running());
        assert!(supervisor.reap().is_none());
    }

    #[test]
    fn restart_replaces_running_core() {
        let mut supervisor = supervisor();
        let settings = settings_for(endless_core());
        let StartOutcome::Started { pid: first } = supervisor.start(&settings) else {
            panic!("start failed");
        };

        let outcome = supervisor.restart(&settings).unwrap();
        assert!(outcome.is_ok());
        assert!(matches!(outcome.stop, StopOutcome::Stopped { pid, .. } if pid == first));
        assert!(outcome.to_string().starts_with("Successfully restarted"));
        assert!(supervisor.is_running());

        supervisor.stop().unwrap();
    }

    #[test]
    fn restart_rereads_settings_after_stopping() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = supervisor();
        assert!(supervisor.start(&settings_for(endless_core())).is_ok());

        let missing = dir.path().join("moved-core");
        let outcome = supervisor
            .restart_with(|| settings_for(&missing))
            .unwrap();

        assert!(matches!(outcome.stop, StopOutcome::Stopped { .. }));
        assert_eq!(outcome.start, StartOutcome::CoreNotFound(missing));
        assert!(!outcome.is_ok());
        assert!(outcome.to_string().starts_with("Restart failed"));
        assert!(!supervisor.is_running());
    }

    fn process_exists(pid: u32) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn restart_waits_for_delay_after_old_core_is_gone() {
        let delay = Duration::from_millis(300);
        let mut supervisor = Supervisor::new().with_restart_delay(delay);
        let settings = settings_for(endless_core());
        let StartOutcome::Started { pid: old } = supervisor.start(&settings) else {
            panic!("start failed");
        };

        let began = Instant::now();
        let mut reloaded_at = None;
        let mut old_alive_at_reload = None;
        let outcome = supervisor
            .restart_with(|| {
                reloaded_at = Some(began.elapsed());
                old_alive_at_reload = Some(process_exists(old));
                settings.clone()
            })
            .unwrap();

        assert!(outcome.is_ok());
        assert!(began.elapsed() >= delay);
        assert!(reloaded_at.unwrap() >= delay);
        assert_eq!(old_alive_at_reload, Some(false));
        assert_ne!(supervisor.pid(), Some(old));

        supervisor.stop().unwrap();
    }

    #[test]
    fn core_output_is_appended_to_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("core.log");
        let settings = scripted_settings(&dir, "echo hello from core\n");
        let mut supervisor = supervisor().with_output_log(&log);

        assert!(supervisor.start(&settings).is_ok());
        wait_for_exit(&mut supervisor);
        supervisor.reap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("hello from core"));
    }

    #[test]
    fn shared_supervisor_serializes_access() {
        let shared = SharedSupervisor::new(supervisor());
        let other = shared.clone();

        assert!(shared.start(&settings_for(endless_core())).unwrap().is_ok());
        assert!(other.is_running());
        assert!(matches!(
            other.start(&settings_for(endless_core())).unwrap(),
            StartOutcome::AlreadyRunning { .. }
        ));
        assert!(matches!(other.stop().unwrap(), StopOutcome::Stopped { .. }));
        assert!(!shared.is_running());
    }
}
