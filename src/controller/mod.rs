//! Sampling modules: one per monitored entity, each refreshed on a trigger.

mod filesystem;
mod network;
mod system;

use crate::error::Result;
use crate::surface::MetricSink;

pub use filesystem::FileSystemModule;
pub use network::NetworkModule;
pub use system::SystemInfoModule;

/// A unit of sampling work. `refresh` pulls raw values, combines them with
/// the module's history and publishes the result.
pub trait SamplingModule: Send {
    fn name(&self) -> &str;

    /// Values that never change, published once before the first refresh.
    fn publish_static(&self, _sink: &dyn MetricSink) {}

    fn refresh(&mut self, sink: &dyn MetricSink) -> Result<()>;
}
