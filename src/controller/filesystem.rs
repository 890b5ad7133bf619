use std::path::PathBuf;
use std::sync::Arc;

use super::SamplingModule;
use crate::collectors::RawReader;
use crate::error::Result;
use crate::model::DiskUsage;
use crate::surface::MetricSink;

/// Size and free space of one mounted filesystem.
///
/// `statfs` works on the mount point, not the device: `/dev/sdb1` mounted at
/// `/media/data` is sampled through `/media/data`.
pub struct FileSystemModule {
    reader: Arc<dyn RawReader>,
    device_name: String,
    mount_point: PathBuf,
    prefix: String,
}

impl FileSystemModule {
    pub fn new(reader: Arc<dyn RawReader>, device_name: &str, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            device_name: device_name.to_string(),
            mount_point: mount_point.into(),
            prefix: format!("fs.{device_name}"),
        }
    }
}

impl SamplingModule for FileSystemModule {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn publish_static(&self, sink: &dyn MetricSink) {
        let p = &self.prefix;
        sink.publish(&format!("{p}.device_name"), self.device_name.as_str().into());
        sink.publish(
            &format!("{p}.mount_point"),
            self.mount_point.to_string_lossy().into_owned().into(),
        );
    }

    fn refresh(&mut self, sink: &dyn MetricSink) -> Result<()> {
        let usage = DiskUsage::from(self.reader.disk_space(&self.mount_point)?);
        let p = &self.prefix;
        sink.publish(&format!("{p}.size"), usage.size.into());
        sink.publish(&format!("{p}.free"), usage.free.into());
        sink.publish(&format!("{p}.free_user"), usage.free_user.into());
        sink.publish(&format!("{p}.usage"), usage.usage.into());
        Ok(())
    }
}
