//! CPU usage and memory/uptime sampling.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, warn};

use super::SamplingModule;
use crate::collectors::RawReader;
use crate::delta::{cpu_percent_since, SENTINEL};
use crate::error::Result;
use crate::history::{cpu_keys, SampleHistory};
use crate::model::{CpuInfo, CpuSample, MemoryStats};
use crate::surface::MetricSink;

pub struct SystemInfoModule {
    reader: Arc<dyn RawReader>,
    cpu_info: CpuInfo,
    ticks_per_second: u64,
    history: SampleHistory<CpuSample>,
    cpu_total: f64,
    /// One slot per core, sized once from the discovered core count.
    cpu_usage: Box<[f64]>,
}

impl SystemInfoModule {
    /// Reads the static facts (cpu info, core count, clock ticks) once.
    pub fn new(reader: Arc<dyn RawReader>) -> Result<Self> {
        let core_count = reader.core_count()?;
        let ticks_per_second = reader.ticks_per_second()?;
        let cpu_info = reader.cpu_info().unwrap_or_else(|e| {
            warn!(error = %e, "cpu info not available");
            CpuInfo::default()
        });
        Ok(Self {
            reader,
            cpu_info,
            ticks_per_second,
            history: SampleHistory::new(cpu_keys(core_count)),
            cpu_total: SENTINEL,
            cpu_usage: vec![SENTINEL; core_count].into_boxed_slice(),
        })
    }

    pub fn core_count(&self) -> usize {
        self.cpu_usage.len()
    }

    pub fn cpu_total(&self) -> f64 {
        self.cpu_total
    }

    pub fn cpu_usage(&self) -> &[f64] {
        &self.cpu_usage
    }

    fn refresh_cpu(&mut self, sink: &dyn MetricSink) -> Result<()> {
        let ticks = match self.reader.cpu_ticks() {
            Ok(ticks) => ticks,
            Err(e) => {
                // Never leave a stale percentage behind.
                self.cpu_total = SENTINEL;
                self.cpu_usage.fill(SENTINEL);
                self.publish_cpu(sink);
                return Err(e);
            }
        };
        let now = Instant::now();

        self.cpu_total = SENTINEL;
        self.cpu_usage.fill(SENTINEL);
        for line in ticks {
            if !self.history.contains(&line.label) {
                continue;
            }
            let sample = CpuSample::new(line.ticks, now);
            let rate = cpu_percent_since(self.history.get(&line.label).as_ref(), &sample);
            if rate.overflow_detected() {
                debug!(source = %line.label, "cpu counter decreased, publishing sentinel");
            }
            self.history.put(&line.label, sample);

            let value = rate.published();
            match core_index(&line.label) {
                None => self.cpu_total = value,
                Some(i) => self.cpu_usage[i] = value,
            }
        }
        self.publish_cpu(sink);
        Ok(())
    }

    fn publish_cpu(&self, sink: &dyn MetricSink) {
        sink.publish("system.cpu_total", self.cpu_total.into());
        sink.publish("system.cpu_usage", self.cpu_usage.to_vec().into());
    }

    fn refresh_memory(&self, sink: &dyn MetricSink) -> Result<()> {
        let raw = self.reader.memory()?;
        let load = self.reader.load_average()?;
        let uptime = self.reader.uptime_secs()?;
        let stats = MemoryStats::from_raw(raw, load, uptime, Local::now());

        sink.publish("system.max_mem", stats.max_mem.into());
        sink.publish("system.free_mem", stats.free_mem.into());
        sink.publish("system.cached_mem", stats.cached_mem.into());
        sink.publish("system.used_mem", stats.used_mem.into());
        sink.publish("system.max_swap", stats.max_swap.into());
        sink.publish("system.free_swap", stats.free_swap.into());
        sink.publish("system.used_swap", stats.used_swap.into());
        sink.publish("system.load_avg", stats.load_avg.to_vec().into());
        sink.publish("system.uptime_sec_total", stats.uptime.total_secs.into());
        sink.publish("system.uptime_days", stats.uptime.days.into());
        sink.publish("system.uptime_hours", stats.uptime.hours.into());
        sink.publish("system.uptime_min", stats.uptime.minutes.into());
        sink.publish("system.uptime_sec", stats.uptime.seconds.into());
        sink.publish("system.start_time", stats.start_time.into());
        sink.publish("system.start_time_str", stats.start_time_str.into());
        Ok(())
    }
}

/// `cpu` is the aggregate, `cpuN` is core N.
fn core_index(label: &str) -> Option<usize> {
    label.strip_prefix("cpu")?.parse().ok()
}

impl SamplingModule for SystemInfoModule {
    fn name(&self) -> &str {
        "system"
    }

    fn publish_static(&self, sink: &dyn MetricSink) {
        sink.publish("system.ticks_per_second", self.ticks_per_second.into());
        sink.publish("system.n_cpu", (self.core_count() as u64).into());
        for (label, value) in &self.cpu_info.fields {
            let key = format!("system.cpu.{}", label.replace(' ', "_"));
            sink.publish(&key, value.as_str().into());
        }
    }

    /// CPU and memory are independent sources: a failure in one still
    /// refreshes the other.
    fn refresh(&mut self, sink: &dyn MetricSink) -> Result<()> {
        let cpu = self.refresh_cpu(sink);
        let memory = self.refresh_memory(sink);
        cpu.and(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::core_index;

    #[test]
    fn core_labels() {
        assert_eq!(core_index("cpu"), None);
        assert_eq!(core_index("cpu0"), Some(0));
        assert_eq!(core_index("cpu15"), Some(15));
    }
}
