//! Delta and rate computation over monotonic kernel counters.
//!
//! Counters may wrap or be reset between two reads. A decrease is never
//! turned into a negative or wrapped delta; it is reported as
//! [`Rate::Overflow`] and published as [`SENTINEL`].

use crate::model::{CounterSample, CpuSample, CPU_IDLE};

/// Published in place of a value that cannot be computed this cycle.
pub const SENTINEL: f64 = -1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rate {
    Value(f64),
    /// A counter decreased since the previous sample.
    Overflow,
    /// No previous sample, or no time/ticks elapsed.
    NotComputable,
}

impl Rate {
    pub fn overflow_detected(&self) -> bool {
        matches!(self, Rate::Overflow)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Rate::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn published(&self) -> f64 {
        self.value().unwrap_or(SENTINEL)
    }
}

/// Busy share of the elapsed CPU ticks, in percent.
pub fn cpu_percent(previous: &CpuSample, current: &CpuSample) -> Rate {
    let prev = previous.values();
    let cur = current.values();

    if cur.iter().zip(prev).any(|(c, p)| c < p) {
        return Rate::Overflow;
    }
    if current.captured_at() <= previous.captured_at() {
        return Rate::NotComputable;
    }

    // Widened so four large deltas cannot overflow.
    let total: u128 = cur.iter().zip(prev).map(|(c, p)| u128::from(c - p)).sum();
    if total == 0 {
        return Rate::NotComputable;
    }
    let busy = total - u128::from(cur[CPU_IDLE] - prev[CPU_IDLE]);

    let percent = 100.0 * busy as f64 / total as f64;
    Rate::Value(percent.clamp(0.0, 100.0))
}

/// Per-second rate of every counter. Counters are independent: a decrease
/// in one only marks that entry as overflowed.
pub fn counter_rates<const N: usize>(
    previous: &CounterSample<N>,
    current: &CounterSample<N>,
) -> [Rate; N] {
    let elapsed = current
        .captured_at()
        .saturating_duration_since(previous.captured_at())
        .as_secs_f64();
    if elapsed <= 0.0 {
        return [Rate::NotComputable; N];
    }

    let prev = previous.values();
    let cur = current.values();
    std::array::from_fn(|i| match cur[i].checked_sub(prev[i]) {
        Some(delta) => Rate::Value(delta as f64 / elapsed),
        None => Rate::Overflow,
    })
}

/// First-sample aware wrapper: without a previous sample nothing can be
/// computed yet.
pub fn cpu_percent_since(previous: Option<&CpuSample>, current: &CpuSample) -> Rate {
    previous.map_or(Rate::NotComputable, |prev| cpu_percent(prev, current))
}

pub fn counter_rates_since<const N: usize>(
    previous: Option<&CounterSample<N>>,
    current: &CounterSample<N>,
) -> [Rate; N] {
    previous.map_or([Rate::NotComputable; N], |prev| counter_rates(prev, current))
}
