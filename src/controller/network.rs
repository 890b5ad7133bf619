use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::SamplingModule;
use crate::collectors::{NetworkInterfaceState, RawReader};
use crate::delta::{counter_rates_since, Rate, SENTINEL};
use crate::error::Result;
use crate::history::SampleHistory;
use crate::model::{NetSample, NET_COUNTERS, NET_COUNTER_NAMES};
use crate::surface::MetricSink;

const MIB: f64 = 1024.0 * 1024.0;
/// Positions of rx_bytes and tx_bytes, published in MiB/s.
const BYTE_COUNTERS: [usize; 2] = [2, 3];

/// Per-second rates of one interface's sysfs counters.
pub struct NetworkModule {
    reader: Arc<dyn RawReader>,
    state: NetworkInterfaceState,
    /// Shared by all interface modules; this module only writes its own key.
    history: Arc<SampleHistory<NetSample>>,
    rates: [f64; NET_COUNTERS],
    prefix: String,
}

impl NetworkModule {
    pub fn new(
        reader: Arc<dyn RawReader>,
        state: NetworkInterfaceState,
        history: Arc<SampleHistory<NetSample>>,
    ) -> Self {
        let prefix = format!("net.{}", state.name);
        Self {
            reader,
            state,
            history,
            rates: [0.0; NET_COUNTERS],
            prefix,
        }
    }

    pub fn rates(&self) -> &[f64; NET_COUNTERS] {
        &self.rates
    }
}

impl SamplingModule for NetworkModule {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn publish_static(&self, sink: &dyn MetricSink) {
        sink.publish(&format!("{}.device", self.prefix), self.state.name.as_str().into());
    }

    /// A failed read leaves both history and published values untouched.
    /// A counter that decreased keeps its previous value for this cycle.
    /// The first sample publishes 0; no elapsed time since a previous
    /// sample publishes the sentinel.
    fn refresh(&mut self, sink: &dyn MetricSink) -> Result<()> {
        let values = self.reader.network_counters(&self.state)?;
        let sample = NetSample::new(values, Instant::now());
        let key = self.state.name.as_str();

        let previous = self.history.get(key);
        let rates = counter_rates_since(previous.as_ref(), &sample);
        self.history.put(key, sample);

        for (i, rate) in rates.iter().enumerate() {
            let scale = if BYTE_COUNTERS.contains(&i) { MIB } else { 1.0 };
            match rate {
                Rate::Value(v) => self.rates[i] = v / scale,
                Rate::NotComputable if previous.is_some() => self.rates[i] = SENTINEL,
                Rate::NotComputable => self.rates[i] = 0.0,
                Rate::Overflow => {
                    debug!(interface = key, counter = NET_COUNTER_NAMES[i], "counter decreased, keeping previous rate");
                    continue;
                }
            }
            sink.publish(
                &format!("{}.{}", self.prefix, NET_COUNTER_NAMES[i]),
                self.rates[i].into(),
            );
        }
        Ok(())
    }
}
