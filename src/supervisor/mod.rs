//! Supervision of a single child process.
//!
//! The child is forked, becomes the leader of its own process group, hands
//! its pid back through a pid file and then execs the target program. Stop
//! signals go to the negated pid so every descendant in the group is
//! reached.

pub mod table;

use std::ffi::{CStr, CString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::unistd::{fork, getpid, setpgid, ForkResult, Pid};
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};

pub use table::{count_children, get_info, is_running, ProcessInfo, ProcessTable};

/// How long `start` waits for the child's pid file.
pub const PID_FILE_TIMEOUT: Duration = Duration::from_secs(1);
const PID_FILE_POLL: Duration = Duration::from_millis(10);
/// Grace period between SIGINT and SIGKILL.
pub const STOP_GRACE: Duration = Duration::from_millis(200);
/// Upper bound for a killed group to leave the process table.
const KILL_SETTLE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Clone, Debug, Default)]
pub struct ProcessHandle {
    pub pid: Option<i32>,
    pub work_dir: PathBuf,
    pub command_line: String,
    pub pid_file: PathBuf,
}

/// Tokens separated by spaces or tabs. Quoting is not honoured:
/// `sh -c "a b"` yields `sh`, `-c`, `"a`, `b"`.
pub fn split_arguments(command_line: &str) -> Vec<&str> {
    command_line
        .split([' ', '\t'])
        .filter(|token| !token.is_empty())
        .collect()
}

pub struct ProcessSupervisor {
    handle: ProcessHandle,
    state: SupervisorState,
    pid_dir: PathBuf,
    pid_file_name: String,
}

impl ProcessSupervisor {
    /// `suffix` distinguishes the pid files of several supervisors sharing
    /// a directory: the file is named `pid<suffix>`.
    pub fn new(suffix: &str) -> Self {
        Self {
            handle: ProcessHandle::default(),
            state: SupervisorState::Idle,
            pid_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            pid_file_name: format!("pid{suffix}"),
        }
    }

    pub fn with_pid_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pid_dir = dir.into();
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn pid(&self) -> Option<i32> {
        self.handle.pid
    }

    pub fn is_running(&self, pid: i32) -> bool {
        is_running(pid)
    }

    pub fn count_children(&self, pgid: i32) -> usize {
        count_children(pgid)
    }

    pub fn get_info(&self, pid: i32) -> Option<ProcessInfo> {
        get_info(pid)
    }

    /// Whether the tracked child is still alive.
    pub fn tracked_is_running(&self) -> bool {
        self.handle.pid.is_some_and(is_running)
    }

    /// Start `command_line` inside `work_dir` and return the child's pid.
    pub fn start(&mut self, work_dir: impl AsRef<Path>, command_line: &str) -> Result<i32> {
        let work_dir = work_dir.as_ref();
        if work_dir.as_os_str().is_empty() || command_line.trim().is_empty() {
            return Err(WatchError::Configuration(
                "work directory and command line must both be set before starting a process"
                    .into(),
            ));
        }
        let args = split_arguments(command_line);
        // The child changes directory before writing its pid file, so both
        // paths must not depend on the current directory.
        let launch = Launch::prepare(
            &std::path::absolute(work_dir)?,
            &args,
            &std::path::absolute(self.pid_dir.join(&self.pid_file_name))?,
        )?;

        if self.tracked_is_running() {
            warn!(
                pid = ?self.handle.pid,
                "a previous process is still running, stopping it before starting a new one"
            );
            self.stop();
        }

        self.state = SupervisorState::Starting;
        self.handle = ProcessHandle {
            pid: None,
            work_dir: work_dir.to_path_buf(),
            command_line: command_line.to_string(),
            pid_file: launch.pid_file.clone(),
        };
        let _ = fs::remove_file(&launch.pid_file);
        ignore_sigchld();

        // SAFETY: the child only runs async-signal-safe calls on data that
        // was prepared before the fork, then execs or exits. No allocation
        // happens between fork and exec.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => launch.run_child(),
            Ok(ForkResult::Parent { child }) => match self.adopt(child, &launch) {
                Ok(pid) => {
                    self.state = SupervisorState::Running;
                    Ok(pid)
                }
                Err(e) => {
                    self.state = SupervisorState::Idle;
                    Err(e)
                }
            },
            Err(e) => {
                self.state = SupervisorState::Idle;
                Err(WatchError::ProcessStart(format!("fork failed: {e}")))
            }
        }
    }

    fn adopt(&mut self, child: Pid, launch: &Launch) -> Result<i32> {
        let deadline = Instant::now() + PID_FILE_TIMEOUT;
        loop {
            if let Some(pid) = read_pid_file(&launch.pid_file) {
                if let Err(e) = fs::remove_file(&launch.pid_file) {
                    warn!(file = %launch.pid_file.display(), error = %e, "could not remove pid file");
                }
                if pid != child.as_raw() {
                    debug!(pid, fork_pid = child.as_raw(), "pid file differs from fork result");
                }
                info!(pid, command = %self.handle.command_line, "process started");
                self.handle.pid = Some(pid);
                return Ok(pid);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(PID_FILE_POLL);
        }

        // The fork never reported back; do not leave it behind.
        if let Err(e) = kill(child, Signal::SIGKILL) {
            debug!(pid = child.as_raw(), error = %e, "orphaned fork already gone");
        }
        let _ = fs::remove_file(&launch.pid_tmp_path);
        Err(WatchError::ProcessStart(format!(
            "pid file {} did not appear within {:?}",
            launch.pid_file.display(),
            PID_FILE_TIMEOUT
        )))
    }

    /// SIGINT to the process group, then SIGKILL if it is still alive after
    /// [`STOP_GRACE`]. A no-op when nothing live is tracked.
    pub fn stop(&mut self) {
        let Some(pid) = self.handle.pid else { return };
        if !is_running(pid) {
            debug!(pid, "tracked process already gone");
            self.clear();
            return;
        }

        self.state = SupervisorState::Stopping;
        info!(pid, "sending SIGINT to process group");
        signal_group(pid, Signal::SIGINT);
        thread::sleep(STOP_GRACE);

        if is_running(pid) {
            warn!(pid, "process survived SIGINT, sending SIGKILL to process group");
            signal_group(pid, Signal::SIGKILL);
            if !wait_for_exit(pid, KILL_SETTLE) {
                warn!(pid, "process still listed after SIGKILL");
            }
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.handle.pid = None;
        self.state = SupervisorState::Idle;
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Exited children are reaped by the kernel instead of lingering as
/// zombies until someone waits for them. Installed before the fork so a
/// child that exits immediately is reaped too.
fn ignore_sigchld() {
    // SAFETY: installs SIG_IGN, no handler code runs.
    if let Err(e) = unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) } {
        warn!(error = %e, "could not ignore SIGCHLD");
    }
}

fn signal_group(pid: i32, sig: Signal) {
    match kill(Pid::from_raw(-pid), sig) {
        Ok(()) => {}
        Err(Errno::ESRCH) => debug!(pid, ?sig, "no such process group"),
        Err(e) => warn!(pid, ?sig, error = %e, "failed to signal process group"),
    }
}

fn wait_for_exit(pid: i32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while is_running(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(PID_FILE_POLL);
    }
    true
}

fn read_pid_file(path: &Path) -> Option<i32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok().filter(|pid| *pid > 0)
}

/// Everything the child needs, allocated before the fork.
struct Launch {
    program: CString,
    argv: Vec<CString>,
    /// NULL-terminated pointers into `argv`, handed to `execv` as-is.
    argv_ptrs: Vec<*const libc::c_char>,
    work_dir: CString,
    pid_file: PathBuf,
    pid_tmp_path: PathBuf,
    pid_file_c: CString,
    pid_tmp_c: CString,
}

impl Launch {
    fn prepare(work_dir: &Path, args: &[&str], pid_file: &Path) -> Result<Self> {
        let cstring = |bytes: &[u8]| {
            CString::new(bytes).map_err(|_| {
                WatchError::Configuration("command line or path contains a NUL byte".into())
            })
        };
        let program = cstring(work_dir.join(args[0]).as_os_str().as_bytes())?;
        let argv = args
            .iter()
            .map(|arg| cstring(arg.as_bytes()))
            .collect::<Result<Vec<CString>>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        let mut tmp = pid_file.as_os_str().to_owned();
        tmp.push(".tmp");
        let pid_tmp_path = PathBuf::from(tmp);

        Ok(Self {
            program,
            argv,
            argv_ptrs,
            work_dir: cstring(work_dir.as_os_str().as_bytes())?,
            pid_file_c: cstring(pid_file.as_os_str().as_bytes())?,
            pid_tmp_c: cstring(pid_tmp_path.as_os_str().as_bytes())?,
            pid_file: pid_file.to_path_buf(),
            pid_tmp_path,
        })
    }

    /// Child side of the fork. Errors cannot be reported across the exec,
    /// so every failure ends in a silent `_exit`.
    ///
    /// The pid file appears only after the work directory is entered.
    fn run_child(&self) -> ! {
        let me = getpid();
        // SAFETY: `work_dir`, `program` and every `argv_ptrs` entry point at
        // NUL-terminated buffers owned by `self`, and `argv_ptrs` ends in
        // NULL. `_exit` skips destructors and atexit handlers inherited from
        // the parent.
        unsafe {
            if setpgid(Pid::from_raw(0), Pid::from_raw(0)).is_ok()
                && libc::chdir(self.work_dir.as_ptr()) == 0
                && write_pid_file(&self.pid_tmp_c, &self.pid_file_c, me.as_raw())
            {
                libc::execv(self.program.as_ptr(), self.argv_ptrs.as_ptr());
            }
            libc::_exit(0)
        }
    }
}

/// Write the pid to `tmp` and rename it onto `target`, so the parent never
/// reads a partially written file. Raw syscalls only.
fn write_pid_file(tmp: &CStr, target: &CStr, pid: i32) -> bool {
    let mut buf = [0u8; 12];
    let len = format_pid(pid, &mut buf);
    // SAFETY: both paths are valid NUL-terminated strings and `buf` holds
    // `len` initialized bytes.
    unsafe {
        let fd = libc::open(
            tmp.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            0o644 as libc::c_uint,
        );
        if fd < 0 {
            return false;
        }
        let written = libc::write(fd, buf.as_ptr().cast(), len);
        libc::close(fd);
        written == len as isize && libc::rename(tmp.as_ptr(), target.as_ptr()) == 0
    }
}

/// Decimal digits of a positive pid, without allocating.
fn format_pid(pid: i32, buf: &mut [u8; 12]) -> usize {
    let mut n = pid.unsigned_abs();
    let mut digits = [0u8; 12];
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for i in 0..count {
        buf[i] = digits[count - 1 - i];
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_split_on_spaces_and_tabs() {
        assert_eq!(split_arguments("prog -a\tb  c"), vec!["prog", "-a", "b", "c"]);
        assert_eq!(split_arguments("sh -c \"a b\""), vec!["sh", "-c", "\"a", "b\""]);
        assert!(split_arguments(" \t ").is_empty());
    }

    #[test]
    fn pid_formatting() {
        let mut buf = [0u8; 12];
        let len = format_pid(40213, &mut buf);
        assert_eq!(&buf[..len], b"40213");
        let len = format_pid(7, &mut buf);
        assert_eq!(&buf[..len], b"7");
    }

    #[test]
    fn pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("pid_test");
        let tmp = dir.path().join("pid_test.tmp");
        let target_c = CString::new(target.as_os_str().as_bytes()).unwrap();
        let tmp_c = CString::new(tmp.as_os_str().as_bytes()).unwrap();

        assert!(write_pid_file(&tmp_c, &target_c, 31337));
        assert_eq!(read_pid_file(&target), Some(31337));
        assert!(!tmp.exists());
    }

    #[test]
    fn launch_resolves_program_inside_work_dir() {
        let launch = Launch::prepare(
            Path::new("/opt/app"),
            &["bin/server", "--port", "80"],
            Path::new("/tmp/pid"),
        )
        .unwrap();
        assert_eq!(launch.program.as_bytes(), b"/opt/app/bin/server");
        assert_eq!(launch.argv.len(), 3);
        assert_eq!(launch.argv_ptrs.len(), 4);
        assert_eq!(launch.argv_ptrs[0], launch.argv[0].as_ptr());
        assert!(launch.argv_ptrs[3].is_null());
        assert_eq!(launch.pid_tmp_path, PathBuf::from("/tmp/pid.tmp"));

        let absolute =
            Launch::prepare(Path::new("/opt/app"), &["/bin/sleep", "1"], Path::new("/tmp/pid"))
                .unwrap();
        assert_eq!(absolute.program.as_bytes(), b"/bin/sleep");
    }

    #[test]
    fn idle_supervisor_stop_is_noop() {
        let mut supervisor = ProcessSupervisor::new("_idle");
        supervisor.stop();
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert_eq!(supervisor.pid(), None);
    }
}
