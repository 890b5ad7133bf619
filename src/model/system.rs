use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_HOUR: u64 = 3_600;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// --- Raw values handed over by a reader ---

/// Memory and swap figures in KiB as found in `/proc/meminfo`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawMemory {
    pub total: u64,
    pub free: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// `statfs` figures already multiplied by the block size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

// --- Derived values ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Uptime {
    pub total_secs: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Uptime {
    pub fn from_secs(total_secs: u64) -> Self {
        let days = total_secs / SECS_PER_DAY;
        let rest = total_secs % SECS_PER_DAY;
        Self {
            total_secs,
            days,
            hours: rest / SECS_PER_HOUR,
            minutes: (rest % SECS_PER_HOUR) / 60,
            seconds: rest % 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryStats {
    pub max_mem: u64,
    pub free_mem: u64,
    pub cached_mem: u64,
    pub used_mem: u64,
    pub max_swap: u64,
    pub free_swap: u64,
    pub used_swap: u64,
    pub load_avg: [f64; 3],
    pub uptime: Uptime,
    /// Boot time in seconds since the epoch.
    pub start_time: i64,
    pub start_time_str: String,
}

impl MemoryStats {
    /// Build a complete snapshot. `now` anchors the boot-time computation.
    pub fn from_raw(
        raw: RawMemory,
        load_avg: [f64; 3],
        uptime_secs: u64,
        now: DateTime<Local>,
    ) -> Self {
        let start_time = now.timestamp() - uptime_secs as i64;
        let start_time_str = Local
            .timestamp_opt(start_time, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        Self {
            max_mem: raw.total,
            free_mem: raw.free,
            cached_mem: raw.cached,
            used_mem: raw.total.saturating_sub(raw.free),
            max_swap: raw.swap_total,
            free_swap: raw.swap_free,
            used_swap: raw.swap_total.saturating_sub(raw.swap_free),
            load_avg,
            uptime: Uptime::from_secs(uptime_secs),
            start_time,
            start_time_str,
        }
    }
}

/// Filesystem figures in GiB (2^30 bytes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DiskUsage {
    pub size: f64,
    pub free: f64,
    pub free_user: f64,
    /// Used share of the space an unprivileged user can reach. Pseudo
    /// filesystems with no blocks report 0.
    pub usage: f64,
}

impl From<DiskSpace> for DiskUsage {
    fn from(space: DiskSpace) -> Self {
        let usage = if space.total_bytes > 0 {
            let used = space.total_bytes.saturating_sub(space.available_bytes);
            100.0 * used as f64 / space.total_bytes as f64
        } else {
            0.0
        };
        Self {
            size: space.total_bytes as f64 / GIB,
            free: space.free_bytes as f64 / GIB,
            free_user: space.available_bytes as f64 / GIB,
            usage,
        }
    }
}

/// Static facts scanned once from `/proc/cpuinfo`, keyed by label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    pub fields: Vec<(String, String)>,
}

impl CpuInfo {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_decomposes_into_days_hours_minutes_seconds() {
        let up = Uptime::from_secs(90_061);
        assert_eq!(up.days, 1);
        assert_eq!(up.hours, 1);
        assert_eq!(up.minutes, 1);
        assert_eq!(up.seconds, 1);
        assert_eq!(up.total_secs, 90_061);
    }

    #[test]
    fn uptime_below_one_minute() {
        let up = Uptime::from_secs(59);
        assert_eq!((up.days, up.hours, up.minutes, up.seconds), (0, 0, 0, 59));
    }

    #[test]
    fn disk_usage_relative_to_user_space() {
        let gib = 1u64 << 30;
        let usage = DiskUsage::from(DiskSpace {
            total_bytes: 100 * gib,
            free_bytes: 30 * gib,
            available_bytes: 25 * gib,
        });
        assert!((usage.usage - 75.0).abs() < 1e-9);
        assert!((usage.size - 100.0).abs() < 1e-9);
        assert!((usage.free - 30.0).abs() < 1e-9);
        assert!((usage.free_user - 25.0).abs() < 1e-9);
    }

    #[test]
    fn disk_usage_of_empty_filesystem_is_zero() {
        let usage = DiskUsage::from(DiskSpace::default());
        assert_eq!(usage.usage, 0.0);
        assert_eq!(usage.size, 0.0);
    }

    #[test]
    fn memory_stats_derive_used_and_boot_time() {
        let now = Local.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let raw = RawMemory {
            total: 16_000,
            free: 4_000,
            cached: 2_000,
            swap_total: 1_000,
            swap_free: 250,
        };
        let stats = MemoryStats::from_raw(raw, [0.5, 0.25, 0.1], 3_600, now);
        assert_eq!(stats.used_mem, 12_000);
        assert_eq!(stats.used_swap, 750);
        assert_eq!(stats.cached_mem, 2_000);
        assert_eq!(stats.start_time, 1_700_000_000 - 3_600);
        assert_eq!(stats.uptime.hours, 1);
        assert_eq!(stats.start_time_str.len(), "2023-11-14 21:13:20".len());
    }

    #[test]
    fn cpu_info_lookup() {
        let info = CpuInfo {
            fields: vec![("model name".into(), "Test CPU".into())],
        };
        assert_eq!(info.get("model name"), Some("Test CPU"));
        assert_eq!(info.get("vendor_id"), None);
    }
}
