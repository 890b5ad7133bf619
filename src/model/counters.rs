use std::time::Instant;

/// CPU tick counters in `/proc/stat` order: user, nice, system, idle.
pub const CPU_COUNTERS: usize = 4;
pub const CPU_IDLE: usize = 3;

/// Network counters in sysfs `statistics/` file order.
pub const NET_COUNTERS: usize = 7;
pub const NET_COUNTER_NAMES: [&str; NET_COUNTERS] = [
    "rx_packets",
    "tx_packets",
    "rx_bytes",
    "tx_bytes",
    "rx_dropped",
    "tx_dropped",
    "collisions",
];

/// One read of a fixed set of monotonic counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CounterSample<const N: usize> {
    values: [u64; N],
    captured_at: Instant,
}

impl<const N: usize> CounterSample<N> {
    pub fn new(values: [u64; N], captured_at: Instant) -> Self {
        Self { values, captured_at }
    }

    pub fn values(&self) -> &[u64; N] {
        &self.values
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

pub type CpuSample = CounterSample<CPU_COUNTERS>;
pub type NetSample = CounterSample<NET_COUNTERS>;

/// Raw tick counters for one `cpu`/`cpuN` line of `/proc/stat`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuTicks {
    pub label: String,
    pub ticks: [u64; CPU_COUNTERS],
}
