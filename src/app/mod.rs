mod event_loop;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::collectors::{NetworkInterfaceState, RawReader};
use crate::config::AgentConfig;
use crate::controller::{FileSystemModule, NetworkModule, SamplingModule, SystemInfoModule};
use crate::error::Result;
use crate::history::SampleHistory;
use crate::supervisor::{count_children, ProcessSupervisor};
use crate::surface::{MetricSink, MetricStore};

/// Sampling modules, their output store and the optional supervised child.
pub struct Agent {
    config: AgentConfig,
    store: Arc<MetricStore>,
    modules: Vec<Box<dyn SamplingModule>>,
    supervisor: Option<ProcessSupervisor>,
}

impl Agent {
    /// Builds one module per monitored entity. Core and interface counts are
    /// fixed from here on.
    pub fn new(config: AgentConfig, reader: Arc<dyn RawReader>) -> Result<Self> {
        config.validate()?;

        let mut modules: Vec<Box<dyn SamplingModule>> = Vec::new();
        let system = SystemInfoModule::new(Arc::clone(&reader))?;
        info!(cores = system.core_count(), "system module ready");
        modules.push(Box::new(system));

        for mount in &config.mounts {
            modules.push(Box::new(FileSystemModule::new(
                Arc::clone(&reader),
                &mount.device,
                mount.mount_point.clone(),
            )));
        }

        let net_history = Arc::new(SampleHistory::new(config.interfaces.iter().cloned()));
        for interface in &config.interfaces {
            let state = NetworkInterfaceState::new(&config.sys_root, interface);
            modules.push(Box::new(NetworkModule::new(
                Arc::clone(&reader),
                state,
                Arc::clone(&net_history),
            )));
        }
        info!(
            mounts = config.mounts.len(),
            interfaces = config.interfaces.len(),
            "sampling modules registered"
        );

        Ok(Self {
            config,
            store: Arc::new(MetricStore::new()),
            modules,
            supervisor: None,
        })
    }

    pub fn store(&self) -> Arc<MetricStore> {
        Arc::clone(&self.store)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Launch the configured child process, if any.
    pub fn start_process(&mut self) -> Result<Option<i32>> {
        let Some(process) = &self.config.process else {
            return Ok(None);
        };
        let supervisor = self
            .supervisor
            .get_or_insert_with(|| ProcessSupervisor::new(&process.pid_file_suffix));
        let pid = supervisor.start(&process.work_dir, &process.command)?;
        Ok(Some(pid))
    }

    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }

    fn publish_process_state(&self) {
        let Some(supervisor) = &self.supervisor else { return };
        let pid = supervisor.pid().unwrap_or(0);
        let running = supervisor.tracked_is_running();
        let children = if running { count_children(pid) } else { 0 };
        self.store.publish("process.pid", i64::from(pid).into());
        self.store.publish("process.running", running.into());
        self.store.publish("process.children", (children as u64).into());
    }

    /// Run the trigger loop until `should_quit` is set. Stops the supervised
    /// child on the way out.
    pub fn run(mut self, should_quit: Arc<AtomicBool>, print_json: bool) -> Result<()> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .build()?;
        rt.block_on(self.event_loop(should_quit, print_json));

        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.stop();
        }
        info!("agent stopped");
        Ok(())
    }
}
