use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use hostwatch::app::Agent;
use hostwatch::collectors::linux::LinuxReader;
use hostwatch::config::{AgentConfig, MountConfig, ProcessConfig};
use sysinfo::{Disks, Networks};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostwatch", version, about = "Host monitoring agent core")]
struct Cli {
    /// JSON configuration file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trigger interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Filesystem to watch as DEVICE=MOUNT_POINT (repeatable).
    #[arg(long = "mount", value_parser = parse_mount)]
    mounts: Vec<MountConfig>,

    /// Network interface to watch (repeatable).
    #[arg(long = "interface")]
    interfaces: Vec<String>,

    /// Working directory of the supervised process.
    #[arg(long, requires = "command")]
    work_dir: Option<PathBuf>,

    /// Command line of the supervised process (whitespace separated, no quoting).
    #[arg(long, requires = "work_dir")]
    command: Option<String>,

    /// Print the metric snapshot as JSON on every trigger.
    #[arg(long)]
    json: bool,

    /// Write logs to a daily rolling file in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn parse_mount(s: &str) -> Result<MountConfig, String> {
    let (device, mount_point) = s
        .split_once('=')
        .ok_or_else(|| format!("expected DEVICE=MOUNT_POINT, got `{s}`"))?;
    Ok(MountConfig {
        device: device.to_string(),
        mount_point: PathBuf::from(mount_point),
    })
}

impl Cli {
    fn into_config(self) -> Result<AgentConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => AgentConfig::default(),
        };
        if let Some(ms) = self.interval_ms {
            config.trigger_interval_ms = ms;
        }
        if !self.mounts.is_empty() {
            config.mounts = self.mounts;
        }
        if !self.interfaces.is_empty() {
            config.interfaces = self.interfaces;
        }
        if let (Some(work_dir), Some(command)) = (self.work_dir, self.command) {
            config.process = Some(ProcessConfig {
                work_dir,
                command,
                pid_file_suffix: format!("_{}", std::process::id()),
            });
        }

        if config.mounts.is_empty() {
            config.mounts = discover_mounts();
        }
        if config.interfaces.is_empty() {
            config.interfaces = discover_interfaces();
        }
        Ok(config)
    }
}

fn discover_mounts() -> Vec<MountConfig> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .map(|disk| {
            let name = disk.name().to_string_lossy();
            MountConfig {
                device: name.rsplit('/').next().unwrap_or(&name).to_string(),
                mount_point: disk.mount_point().to_path_buf(),
            }
        })
        .collect()
}

fn discover_interfaces() -> Vec<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut names: Vec<String> = networks
        .iter()
        .map(|(name, _)| name.clone())
        .filter(|name| name != "lo")
        .collect();
    names.sort();
    names
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _guard = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hostwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let print_json = cli.json;
    let config = cli.into_config()?;

    let should_quit = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&should_quit))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&should_quit))?;

    let reader = Arc::new(LinuxReader::new(&config.proc_root, &config.sys_root));
    let mut agent = Agent::new(config, reader)?;
    info!(modules = ?agent.module_names(), "starting hostwatch");

    if let Err(e) = agent.start_process() {
        error!(error = %e, "supervised process not started");
    }

    agent.run(should_quit, print_json)?;
    Ok(())
}
