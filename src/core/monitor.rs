//! Resource monitoring - Sampling the core process through sysinfo

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;

use super::resource::ResourceUsage;

/// Samples resource usage for individual processes
pub struct ResourceMonitor {
    system: System,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refresh one process and return its usage, or `None` if the OS no longer lists it
    pub fn process_usage(&mut self, pid: u32) -> Option<ResourceUsage> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        trace!("Refreshed process {}", pid);

        let process = self.system.process(pid)?;
        let disk = process.disk_usage();
        Some(ResourceUsage {
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            virtual_memory_bytes: process.virtual_memory(),
            disk_read_bytes: disk.total_read_bytes,
            disk_write_bytes: disk.total_written_bytes,
        })
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
