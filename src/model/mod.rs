// Re-export all model types from submodules.

pub use counters::{
    CounterSample, CpuSample, CpuTicks, NetSample, CPU_COUNTERS, CPU_IDLE, NET_COUNTERS,
    NET_COUNTER_NAMES,
};
pub use system::{CpuInfo, DiskSpace, DiskUsage, MemoryStats, RawMemory, Uptime};

mod counters;
mod system;
