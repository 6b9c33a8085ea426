//! Host queries for `monitor` and `qThreadExtraInfo`.

use std::fs;
use std::path::Path;

use sysinfo::{ProcessRefreshKind, RefreshKind, System};

use super::NativeTarget;
use crate::arch::OsError;
use crate::common::{Pid, Tid};
use crate::target::ext::memory_regions::{
    MemoryRegion, MemoryRegions, Protection, RegionKind, RegionState,
};
use crate::target::ext::monitor_cmd::{outputln, ConsoleOutput, MonitorCmd};
use crate::target::ext::thread_extra_info::{ThreadExtraInfo, ThreadInfo, ThreadState};

impl MonitorCmd for NativeTarget {
    fn window_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError> {
        outputln!(out, "window listing is not available on this host");
        Ok(())
    }

    fn process_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError> {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        let mut procs: Vec<_> = sys
            .processes()
            .iter()
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string()))
            .collect();
        procs.sort_unstable();

        let me = self.pid.as_raw() as u32;
        outputln!(out, "  {:>7} {}", "PID", "NAME");
        for (pid, name) in procs {
            let mark = if pid == me { '*' } else { ' ' };
            outputln!(out, "{} {:>7} {}", mark, pid, name);
        }
        Ok(())
    }
}

impl MemoryRegions for NativeTarget {
    fn memory_regions(
        &mut self,
        pid: Pid,
        region: &mut dyn FnMut(MemoryRegion),
    ) -> Result<(), OsError> {
        self.check_pid(pid)?;
        let maps = proc_maps::get_process_maps(self.pid.as_raw())?;
        let image = self.image_name.as_deref().map(Path::new);

        let mut next = 0u64;
        for map in maps {
            let start = map.start() as u64;
            if start > next {
                region(MemoryRegion {
                    start: next,
                    size: start - next,
                    state: RegionState::Free,
                    kind: RegionKind::Unknown,
                    protection: Protection::empty(),
                });
            }

            let kind = match map.filename() {
                Some(file) if Some(file) == image => RegionKind::Image,
                // pseudo files such as [heap] and [stack]
                Some(file) if file.to_string_lossy().starts_with('[') => RegionKind::Private,
                Some(_) => RegionKind::Mapped,
                None => RegionKind::Private,
            };
            let mut protection = Protection::empty();
            protection.set(Protection::READ, map.is_read());
            protection.set(Protection::WRITE, map.is_write());
            protection.set(Protection::EXEC, map.is_exec());

            region(MemoryRegion {
                start,
                size: map.size() as u64,
                state: RegionState::Commit,
                kind,
                protection,
            });
            next = start + map.size() as u64;
        }
        Ok(())
    }
}

impl ThreadExtraInfo for NativeTarget {
    fn thread_info(&mut self, pid: Pid, tid: Tid) -> Result<ThreadInfo, OsError> {
        self.check_pid(pid)?;
        let stat = fs::read_to_string(format!("/proc/{}/task/{}/stat", self.pid, tid))
            .map_err(|_| OsError::NoSuchProcess)?;
        parse_task_stat(&stat).ok_or(OsError::Unsupported)
    }
}

/// Pull the scheduling state and nice value out of a `/proc/*/task/*/stat`
/// line.
fn parse_task_stat(stat: &str) -> Option<ThreadInfo> {
    // the command name may itself contain spaces and parens
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();

    let state = match fields.first()?.chars().next()? {
        't' | 'T' => ThreadState::Suspended(1),
        'Z' | 'X' | 'x' => ThreadState::Terminated(0),
        _ => ThreadState::Running,
    };
    // field 19 of the full line
    let priority = fields.get(16).and_then(|nice| nice.parse().ok());

    Some(ThreadInfo { state, priority })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_stat_with_awkward_name() {
        let stat = "4242 (my (odd) prog) t 4241 4242 4241 34817 4242 1077936192 \
                    120 0 0 0 0 0 0 0 20 -5 1 0 1234 0 0";
        assert_eq!(
            parse_task_stat(stat),
            Some(ThreadInfo {
                state: ThreadState::Suspended(1),
                priority: Some(-5),
            })
        );
    }

    #[test]
    fn task_stat_states() {
        let running = "1 (a) R 0 1 1 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 1 0 0";
        assert_eq!(parse_task_stat(running).unwrap().state, ThreadState::Running);
        let zombie = "1 (a) Z 0 1 1 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 1 0 0";
        assert_eq!(
            parse_task_stat(zombie).unwrap().state,
            ThreadState::Terminated(0)
        );
        assert_eq!(parse_task_stat("garbage"), None);
    }
}
