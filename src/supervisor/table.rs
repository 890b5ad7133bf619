//! Snapshot of the live process table, read from `/proc/[pid]/stat`.
//!
//! Every query captures a fresh snapshot; nothing is cached between calls.

use std::fs;
use std::path::Path;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub comm: String,
    pub state: char,
    pub ppid: i32,
    pub pgrp: i32,
    pub session: i32,
    /// User and system time in clock ticks.
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u64,
    /// Start time in clock ticks after boot.
    pub start_time: u64,
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: u64,
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    pub fn is_zombie(&self) -> bool {
        matches!(self.state, 'Z' | 'X')
    }
}

/// Parse one `/proc/[pid]/stat` line. The command name is enclosed in
/// parentheses and may itself contain spaces or parentheses, so fields are
/// located from the last `)`.
pub fn parse_stat(line: &str) -> Option<ProcessInfo> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }
    let pid = line[..open].trim().parse().ok()?;
    let comm = line[open + 1..close].to_string();
    let fields: Vec<&str> = line.get(close + 1..)?.split_whitespace().collect();
    // Offsets relative to the field after the command name:
    //  0 state   1 ppid   2 pgrp   3 session
    // 11 utime  12 stime 17 num_threads 19 starttime 20 vsize 21 rss
    if fields.len() < 22 {
        return None;
    }
    let num = |i: usize| fields[i].parse::<u64>().ok();
    Some(ProcessInfo {
        pid,
        comm,
        state: fields[0].chars().next()?,
        ppid: fields[1].parse().ok()?,
        pgrp: fields[2].parse().ok()?,
        session: fields[3].parse().ok()?,
        utime: num(11)?,
        stime: num(12)?,
        num_threads: num(17)?,
        start_time: num(19)?,
        vsize: num(20)?,
        // rss can be reported negative for kernel threads.
        rss: fields[21].parse::<i64>().ok()?.max(0) as u64,
        cmdline: Vec::new(),
    })
}

#[derive(Clone, Debug, Default)]
pub struct ProcessTable {
    entries: Vec<ProcessInfo>,
}

impl ProcessTable {
    /// Read the table under `/proc`. An unreadable table is an empty table.
    pub fn capture() -> Self {
        Self::capture_from(Path::new("/proc"))
    }

    pub fn capture_from(proc_root: &Path) -> Self {
        let mut entries = Vec::new();
        let Ok(dir) = fs::read_dir(proc_root) else {
            return Self { entries };
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            // The process may have exited between read_dir and here.
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(info) = parse_stat(&stat) {
                entries.push(info);
            }
        }
        Self { entries }
    }

    pub fn from_entries(entries: Vec<ProcessInfo>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProcessInfo] {
        &self.entries
    }

    /// A zombie holds a table entry but is not running.
    pub fn is_running(&self, pid: i32) -> bool {
        pid > 0
            && self
                .entries
                .iter()
                .any(|p| p.pid == pid && !p.is_zombie())
    }

    /// Number of entries in process group `pgid`.
    pub fn count_in_group(&self, pgid: i32) -> usize {
        self.entries.iter().filter(|p| p.pgrp == pgid).count()
    }

    pub fn get(&self, pid: i32) -> Option<&ProcessInfo> {
        self.entries.iter().find(|p| p.pid == pid)
    }
}

pub fn is_running(pid: i32) -> bool {
    ProcessTable::capture().is_running(pid)
}

pub fn count_children(pgid: i32) -> usize {
    ProcessTable::capture().count_in_group(pgid)
}

/// Snapshot of one process including its argument vector.
pub fn get_info(pid: i32) -> Option<ProcessInfo> {
    let mut info = ProcessTable::capture().get(pid)?.clone();
    if let Ok(raw) = fs::read(format!("/proc/{pid}/cmdline")) {
        info.cmdline = raw
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
    }
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 100 0 0 0 \
                        7 3 0 0 20 0 2 0 123456 10485760 512 18446744073709551615";

    fn entry(pid: i32, pgrp: i32, state: char) -> ProcessInfo {
        let mut info = parse_stat(STAT).unwrap();
        info.pid = pid;
        info.pgrp = pgrp;
        info.state = state;
        info
    }

    #[test]
    fn stat_line_with_parentheses_in_name() {
        let info = parse_stat(STAT).unwrap();
        assert_eq!(info.pid, 4242);
        assert_eq!(info.comm, "my (odd) proc");
        assert_eq!(info.state, 'S');
        assert_eq!(info.ppid, 1);
        assert_eq!(info.pgrp, 4242);
        assert_eq!(info.utime, 7);
        assert_eq!(info.stime, 3);
        assert_eq!(info.num_threads, 2);
        assert_eq!(info.start_time, 123456);
        assert_eq!(info.vsize, 10485760);
        assert_eq!(info.rss, 512);
    }

    #[test]
    fn truncated_stat_is_rejected() {
        assert!(parse_stat("12 (x) S 1 2").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn table_queries() {
        let table = ProcessTable::from_entries(vec![
            entry(10, 10, 'S'),
            entry(11, 10, 'R'),
            entry(12, 10, 'Z'),
            entry(20, 20, 'S'),
        ]);
        assert!(table.is_running(10));
        assert!(table.is_running(11));
        assert!(!table.is_running(12));
        assert!(!table.is_running(99));
        assert!(!table.is_running(0));
        assert_eq!(table.count_in_group(10), 3);
        assert_eq!(table.count_in_group(20), 1);
        assert_eq!(table.get(20).map(|p| p.pid), Some(20));
        assert!(table.get(99).is_none());
    }

    #[test]
    fn own_process_is_visible() {
        let me = std::process::id() as i32;
        assert!(is_running(me));
        let info = get_info(me).unwrap();
        assert_eq!(info.pid, me);
        assert!(!info.cmdline.is_empty());
    }

    #[test]
    fn unreadable_table_is_empty() {
        let table = ProcessTable::capture_from(Path::new("/definitely/not/proc"));
        assert!(table.entries().is_empty());
        assert!(!table.is_running(1));
    }
}
