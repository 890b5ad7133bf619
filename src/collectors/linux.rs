use super::{NetworkInterfaceState, RawReader};
use crate::error::{Result, WatchError};
use crate::model::{CpuInfo, CpuTicks, DiskSpace, RawMemory, CPU_COUNTERS, NET_COUNTERS};
use nix::unistd::{sysconf, SysconfVar};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use sysinfo::System;
use tracing::debug;

/// Labels picked from `/proc/cpuinfo`, in publishing order.
pub const CPUINFO_LABELS: [&str; 7] = [
    "vendor_id",
    "model name",
    "cpu family",
    "model",
    "cpu MHz",
    "cache size",
    "bogomips",
];

/// `statfs` is not guaranteed to be reentrant everywhere; every caller in
/// the process goes through this one lock.
static STATFS_LOCK: Mutex<()> = Mutex::new(());

pub struct LinuxReader {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for LinuxReader {
    fn default() -> Self {
        Self::new("/proc", "/sys")
    }
}

impl LinuxReader {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn sys_root(&self) -> &Path {
        &self.sys_root
    }

    fn read(path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| WatchError::unavailable(path.display().to_string(), e))
    }
}

// ── parsers ─────────────────────────────────────────────────────────────

/// Parse the `cpu`/`cpuN` lines of `/proc/stat`. Only the first four
/// columns (user, nice, system, idle) are kept.
pub fn parse_proc_stat(content: &str) -> Vec<CpuTicks> {
    let mut result = Vec::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else { continue };
        if !label.starts_with("cpu") {
            continue;
        }
        let mut ticks = [0u64; CPU_COUNTERS];
        let mut complete = true;
        for slot in ticks.iter_mut() {
            match parts.next().and_then(|v| v.parse().ok()) {
                Some(v) => *slot = v,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            result.push(CpuTicks {
                label: label.to_string(),
                ticks,
            });
        }
    }
    result
}

/// Core count from `/sys/devices/system/cpu/present`, e.g. `0-7` or
/// `0-3,8-11`: the highest index plus one.
pub fn parse_present(content: &str) -> Option<usize> {
    content
        .trim()
        .split(',')
        .filter_map(|range| {
            let last = range.rsplit('-').next()?;
            last.trim().parse::<usize>().ok()
        })
        .max()
        .map(|highest| highest + 1)
}

/// One pass over the text per label, starting from the top each time; the
/// first line containing the label wins.
pub fn parse_cpuinfo(content: &str, labels: &[&str]) -> CpuInfo {
    let mut fields = Vec::new();
    for label in labels {
        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            if key.trim() == *label {
                fields.push((label.to_string(), value.trim().to_string()));
                break;
            }
        }
    }
    CpuInfo { fields }
}

/// Memory figures (KiB) from `/proc/meminfo`. `MemTotal` is mandatory.
pub fn parse_meminfo(content: &str) -> Option<RawMemory> {
    let mut mem = RawMemory::default();
    let mut has_total = false;
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else { continue };
        let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) else {
            continue;
        };
        match key {
            "MemTotal" => {
                mem.total = value;
                has_total = true;
            }
            "MemFree" => mem.free = value,
            "Cached" => mem.cached = value,
            "SwapTotal" => mem.swap_total = value,
            "SwapFree" => mem.swap_free = value,
            _ => {}
        }
    }
    has_total.then_some(mem)
}

// ── trait implementation ────────────────────────────────────────────────

impl RawReader for LinuxReader {
    fn cpu_info(&self) -> Result<CpuInfo> {
        let content = Self::read(&self.proc_root.join("cpuinfo"))?;
        Ok(parse_cpuinfo(&content, &CPUINFO_LABELS))
    }

    fn core_count(&self) -> Result<usize> {
        let path = self.sys_root.join("devices/system/cpu/present");
        let content = Self::read(&path)?;
        parse_present(&content)
            .ok_or_else(|| WatchError::unavailable(path.display().to_string(), "unparsable core list"))
    }

    fn ticks_per_second(&self) -> Result<u64> {
        match sysconf(SysconfVar::CLK_TCK)? {
            Some(ticks) if ticks > 0 => Ok(ticks as u64),
            other => Err(WatchError::unavailable(
                "sysconf(_SC_CLK_TCK)",
                format!("invalid value {other:?}"),
            )),
        }
    }

    /// Tick counters from `/proc/stat`.
    fn cpu_ticks(&self) -> Result<Vec<CpuTicks>> {
        let path = self.proc_root.join("stat");
        let ticks = parse_proc_stat(&Self::read(&path)?);
        if ticks.is_empty() {
            return Err(WatchError::unavailable(path.display().to_string(), "no cpu lines"));
        }
        Ok(ticks)
    }

    fn memory(&self) -> Result<RawMemory> {
        let path = self.proc_root.join("meminfo");
        parse_meminfo(&Self::read(&path)?)
            .ok_or_else(|| WatchError::unavailable(path.display().to_string(), "MemTotal missing"))
    }

    fn load_average(&self) -> Result<[f64; 3]> {
        let load = System::load_average();
        Ok([load.one, load.five, load.fifteen])
    }

    fn uptime_secs(&self) -> Result<u64> {
        Ok(System::uptime())
    }

    /// `statfs` on the mount point, serialized through [`STATFS_LOCK`].
    fn disk_space(&self, mount_point: &Path) -> Result<DiskSpace> {
        let stat = {
            let _guard = STATFS_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            nix::sys::statfs::statfs(mount_point)
        }
        .map_err(|e| WatchError::unavailable(mount_point.display().to_string(), e))?;

        let block_size = stat.block_size() as u64;
        Ok(DiskSpace {
            total_bytes: stat.blocks() as u64 * block_size,
            free_bytes: stat.blocks_free() as u64 * block_size,
            available_bytes: stat.blocks_available() as u64 * block_size,
        })
    }

    /// Read every sysfs counter of the interface. A single missing or
    /// malformed file fails the whole sample.
    fn network_counters(&self, interface: &NetworkInterfaceState) -> Result<[u64; NET_COUNTERS]> {
        let mut values = [0u64; NET_COUNTERS];
        for (slot, path) in values.iter_mut().zip(&interface.files) {
            let content = Self::read(path)?;
            *slot = content.trim().parse::<u64>().map_err(|e| {
                debug!(file = %path.display(), "malformed counter file");
                WatchError::unavailable(path.display().to_string(), e)
            })?;
        }
        Ok(values)
    }
}
