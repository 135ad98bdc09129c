//! Resource usage of the supervised core

use serde::Serialize;

/// Point-in-time resource usage for a process
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// CPU usage percentage since the previous sample
    pub cpu_percent: f32,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Virtual memory in bytes
    pub virtual_memory_bytes: u64,
    /// Bytes read from disk
    pub disk_read_bytes: u64,
    /// Bytes written to disk
    pub disk_write_bytes: u64,
}

impl ResourceUsage {
    /// One-line summary for status output
    pub fn summary(&self) -> String {
        format!(
            "{} resident, {} virtual, {:.1}% CPU",
            format_bytes(self.memory_bytes),
            format_bytes(self.virtual_memory_bytes),
            self.cpu_percent
        )
    }
}

/// Format a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
