use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{CpuInfo, CpuTicks, DiskSpace, RawMemory, NET_COUNTERS, NET_COUNTER_NAMES};

pub mod linux;

/// Source of raw OS values. Implementations handle the low-level details;
/// every call either returns current values or reports the source as
/// unavailable.
pub trait RawReader: Send + Sync {
    /// Static facts from `/proc/cpuinfo`, read once at startup.
    fn cpu_info(&self) -> Result<CpuInfo>;

    /// Number of cores, derived from the highest present core index.
    fn core_count(&self) -> Result<usize>;

    /// Kernel clock ticks per second.
    fn ticks_per_second(&self) -> Result<u64>;

    /// Aggregate (`cpu`) and per-core (`cpuN`) tick counters.
    fn cpu_ticks(&self) -> Result<Vec<CpuTicks>>;

    fn memory(&self) -> Result<RawMemory>;

    /// 1, 5 and 15 minute load averages.
    fn load_average(&self) -> Result<[f64; 3]>;

    fn uptime_secs(&self) -> Result<u64>;

    fn disk_space(&self, mount_point: &Path) -> Result<DiskSpace>;

    /// All seven counters of one interface, or an error if any is missing.
    fn network_counters(&self, interface: &NetworkInterfaceState) -> Result<[u64; NET_COUNTERS]>;
}

/// A registered network interface and its sysfs counter files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkInterfaceState {
    pub name: String,
    pub files: [PathBuf; NET_COUNTERS],
}

impl NetworkInterfaceState {
    /// `sys_root` is normally `/sys`.
    pub fn new(sys_root: &Path, name: &str) -> Self {
        let base = sys_root.join("class/net").join(name).join("statistics");
        Self {
            name: name.to_string(),
            files: NET_COUNTER_NAMES.map(|counter| base.join(counter)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_files_follow_sysfs_layout() {
        let state = NetworkInterfaceState::new(Path::new("/sys"), "eth0");
        assert_eq!(
            state.files[0],
            PathBuf::from("/sys/class/net/eth0/statistics/rx_packets")
        );
        assert_eq!(
            state.files[6],
            PathBuf::from("/sys/class/net/eth0/statistics/collisions")
        );
    }
}
