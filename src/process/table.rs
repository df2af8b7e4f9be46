// src/process/table.rs

//! Capability interface over the OS process table, used by the post-stop
//! sweep to find stray terminal processes (detached grandchildren that
//! outlived their signalled parent).

use std::collections::{HashMap, HashSet};
use std::io;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use crate::process::terminate::force_kill_pid;

pub trait ProcessTable: Send + Sync {
    /// All transitive descendants of `pid` (not including `pid` itself).
    fn find_processes_by_ancestor(&self, pid: u32) -> Vec<u32>;

    /// Processes whose command line contains `text`.
    fn find_processes_by_command_substring(&self, text: &str) -> Vec<u32>;

    /// Is `pid` still in the process table (and not a zombie)?
    fn process_exists(&self, pid: u32) -> bool;

    fn force_kill(&self, pid: u32) -> io::Result<()>;
}

/// [`ProcessTable`] backed by `sysinfo`.
///
/// Each query takes a fresh snapshot of the process table; that is
/// expensive, but the sweep only runs once per stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    fn snapshot(with_cmd: bool) -> System {
        let mut kind = ProcessRefreshKind::new();
        if with_cmd {
            kind = kind.with_cmd(UpdateKind::Always);
        }
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        system
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn find_processes_by_ancestor(&self, pid: u32) -> Vec<u32> {
        let system = Self::snapshot(false);

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (child_pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(child_pid.as_u32());
            }
        }

        let mut found = Vec::new();
        let mut visited = HashSet::from([pid]);
        let mut stack = vec![pid];
        while let Some(current) = stack.pop() {
            for &child in children.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    found.push(child);
                    stack.push(child);
                }
            }
        }
        found
    }

    fn find_processes_by_command_substring(&self, text: &str) -> Vec<u32> {
        if text.is_empty() {
            return Vec::new();
        }
        let system = Self::snapshot(true);

        system
            .processes()
            .iter()
            .filter(|(_, process)| {
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                cmdline.contains(text)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn process_exists(&self, pid: u32) -> bool {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::new(),
        );
        system
            .process(target)
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        force_kill_pid(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_own_process_by_command_line() {
        let me = std::process::id();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();

        let found = SysinfoProcessTable.find_processes_by_command_substring(&name);
        assert!(found.contains(&me), "expected {me} in {found:?}");
    }

    #[test]
    fn own_process_exists() {
        assert!(SysinfoProcessTable.process_exists(std::process::id()));
        assert!(!SysinfoProcessTable.process_exists(u32::MAX - 1));
    }

    #[test]
    fn empty_needle_matches_nothing() {
        assert!(SysinfoProcessTable
            .find_processes_by_command_substring("")
            .is_empty());
    }
}
