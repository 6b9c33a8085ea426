//! A [`Target`] for Linux x86-64 processes, built on `ptrace`.
//!
//! Every thread is traced with `PTRACE_SEIZE`, which lets the target stop
//! running threads with `PTRACE_INTERRUPT` instead of signals. The debuggee
//! is kept in all-stop mode: whenever one thread reports an event, every
//! other thread is interrupted before the event is handed to the pump.
//!
//! Events are delivered one at a time. Stops that are collected while
//! interrupting the other threads are queued, and their threads stay
//! stopped ("held") until the queue has drained, even if the pump asks for
//! them to be resumed in the meantime.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{self, Signal as HostSignal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid as HostPid};
use sysinfo::{RefreshKind, System};

use crate::arch::{InsnClassifier, Machine, OsError, RegisterContext};
use crate::common::{Pid, Tid};
use crate::session::{DebugEvent, ExceptionCode};
use crate::target::ext::memory_regions::MemoryRegionsOps;
use crate::target::ext::monitor_cmd::MonitorCmdOps;
use crate::target::ext::thread_extra_info::ThreadExtraInfoOps;
use crate::target::{Disposition, Target};

mod disasm;
mod events;
mod ext;
mod memory;
mod regs;

pub use disasm::CapstoneClassifier;

/// Tracing state of one thread.
#[derive(Debug, Clone, Copy, Default)]
struct TracedThread {
    running: bool,
    /// A `PTRACE_INTERRUPT` was sent and its stop has not been seen yet.
    interrupting: bool,
}

/// A single process traced with `ptrace`.
pub struct NativeTarget {
    pid: HostPid,
    attached: bool,
    image_name: Option<String>,
    threads: BTreeMap<HostPid, TracedThread>,
    pending: VecDeque<DebugEvent>,
    /// Resumes requested while `pending` was not empty.
    deferred: Vec<(HostPid, Disposition)>,
    break_requested: bool,
    classifier: Option<CapstoneClassifier>,
}

impl fmt::Debug for NativeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTarget")
            .field("pid", &self.pid)
            .field("attached", &self.attached)
            .field("image_name", &self.image_name)
            .field("threads", &self.threads)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn trace_options(attached: bool) -> Options {
    let options = Options::PTRACE_O_TRACECLONE
        .union(Options::PTRACE_O_TRACEEXEC)
        .union(Options::PTRACE_O_TRACEEXIT);
    if attached {
        options
    } else {
        // a spawned debuggee does not outlive us
        options.union(Options::PTRACE_O_EXITKILL)
    }
}

pub(crate) fn os_error(e: Errno) -> OsError {
    match e {
        Errno::ESRCH | Errno::ECHILD => OsError::NoSuchProcess,
        Errno::EPERM => OsError::PermissionDenied,
        e => OsError::Errno(e as i32),
    }
}

fn host_pid(id: Pid) -> HostPid {
    HostPid::from_raw(id.get() as libc::pid_t)
}

fn from_host(pid: HostPid) -> Result<Tid, OsError> {
    Tid::new(pid.as_raw() as usize).ok_or(OsError::NoSuchProcess)
}

fn exited_early(program: &str, how: String) -> OsError {
    OsError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("{} {} before it started", program, how),
    ))
}

impl NativeTarget {
    fn new(pid: HostPid, attached: bool) -> NativeTarget {
        let classifier = match CapstoneClassifier::new() {
            Ok(classifier) => Some(classifier),
            Err(e) => {
                warn!("disassembler unavailable, range steps will step into calls: {}", e);
                None
            }
        };

        NativeTarget {
            pid,
            attached,
            image_name: std::fs::read_link(format!("/proc/{}/exe", pid))
                .ok()
                .map(|path| path.to_string_lossy().into_owned()),
            threads: BTreeMap::new(),
            pending: VecDeque::new(),
            deferred: Vec::new(),
            break_requested: false,
            classifier,
        }
    }

    /// Run `program` under the debugger. The debuggee is stopped right after
    /// `exec`, and reports a breakpoint there.
    pub fn spawn(program: &str, args: &[String]) -> Result<NativeTarget, OsError> {
        let mut cmd = Command::new(program);
        cmd.args(args);

        // SAFETY: the child only raises a signal and execs.
        let pid = match unsafe { fork() }.map_err(os_error)? {
            ForkResult::Child => {
                // wait for the tracer to seize us
                let _ = signal::raise(HostSignal::SIGSTOP);
                let err = cmd.exec();
                eprintln!("cannot run {}: {}", program, err);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => child,
        };

        waitpid(pid, Some(WaitPidFlag::WSTOPPED)).map_err(os_error)?;
        ptrace::seize(pid, trace_options(false)).map_err(os_error)?;

        loop {
            match waitpid(pid, Some(WaitPidFlag::__WALL)).map_err(os_error)? {
                WaitStatus::PtraceEvent(_, _, libc::PTRACE_EVENT_EXEC) => break,
                WaitStatus::Exited(_, code) => {
                    return Err(exited_early(program, format!("exited with code {}", code)))
                }
                WaitStatus::Signaled(_, sig, _) => {
                    return Err(exited_early(program, format!("was killed by {}", sig)))
                }
                status => {
                    trace!("spawn: {:?}", status);
                    ptrace::cont(pid, None).map_err(os_error)?;
                }
            }
        }
        info!("spawned {} as process {}", program, pid);

        let mut target = NativeTarget::new(pid, false);
        target.threads.insert(pid, TracedThread::default());
        target.announce()?;
        Ok(target)
    }

    /// Attach to a running process and stop all of its threads.
    pub fn attach(pid: Pid) -> Result<NativeTarget, OsError> {
        let pid = host_pid(pid);
        let mut target = NativeTarget::new(pid, true);

        // threads may be created while we attach, so look twice
        let mut seen = HashSet::new();
        for _ in 0..2 {
            let tids: Vec<HostPid> = list_tasks(pid)
                .into_iter()
                .filter(|tid| !seen.contains(tid))
                .collect();

            for tid in &tids {
                ptrace::seize(*tid, trace_options(true)).map_err(os_error)?;
            }
            for tid in &tids {
                ptrace::interrupt(*tid).map_err(os_error)?;
            }
            for tid in &tids {
                if events::wait_interrupted(*tid)? {
                    target.threads.insert(*tid, TracedThread::default());
                }
            }
            seen.extend(tids);
        }
        if !target.threads.contains_key(&pid) {
            return Err(OsError::NoSuchProcess);
        }
        info!("attached to process {} ({} threads)", pid, target.threads.len());

        target.announce()?;
        Ok(target)
    }

    /// The process id of the debuggee.
    pub fn pid(&self) -> Pid {
        // only ever built from a live, positive pid
        Pid::new(self.pid.as_raw() as usize).unwrap_or(Pid::MIN)
    }

    /// Queue the events that introduce an already stopped debuggee to the
    /// pump.
    fn announce(&mut self) -> Result<(), OsError> {
        let pid = from_host(self.pid)?;
        let teb = regs::thread_pointer(self.pid).unwrap_or(0);
        let base = memory::image_base(self.pid, self.image_name.as_deref()).unwrap_or(0);

        self.pending.push_back(DebugEvent::ProcessCreate {
            pid,
            tid: pid,
            machine: Machine::Amd64,
            image_name: self.image_name.clone(),
            teb,
            base,
        });
        let main = self.pid;
        let others: Vec<HostPid> = self
            .threads
            .keys()
            .copied()
            .filter(|tid| *tid != main)
            .collect();
        for tid in others {
            self.pending.push_back(DebugEvent::ThreadCreate {
                pid,
                tid: from_host(tid)?,
                teb: regs::thread_pointer(tid).unwrap_or(0),
            });
        }
        self.pending.push_back(DebugEvent::Exception {
            pid,
            tid: pid,
            code: ExceptionCode::Breakpoint,
            address: regs::program_counter(self.pid).unwrap_or(0),
            first_chance: true,
        });
        Ok(())
    }

    fn check_pid(&self, pid: Pid) -> Result<(), OsError> {
        if host_pid(pid) == self.pid {
            Ok(())
        } else {
            Err(OsError::NoSuchProcess)
        }
    }

    /// A thread of the debuggee that is currently stopped.
    fn stopped_thread(&self, pid: Pid, tid: Tid) -> Result<HostPid, OsError> {
        self.check_pid(pid)?;
        let tid = host_pid(tid);
        match self.threads.get(&tid) {
            Some(thread) if !thread.running => Ok(tid),
            Some(_) => Err(OsError::Unsupported),
            None => Err(OsError::NoSuchProcess),
        }
    }

    fn do_resume(&mut self, tid: HostPid, disposition: Disposition) -> Result<(), OsError> {
        let thread = self.threads.get_mut(&tid).ok_or(OsError::NoSuchProcess)?;
        if thread.running {
            return Ok(());
        }

        let sig = match disposition {
            Disposition::Continue => None,
            Disposition::Deliver(sig) => sig
                .to_host()
                .and_then(|sig| HostSignal::try_from(sig).ok()),
        };
        ptrace::cont(tid, sig).map_err(os_error)?;
        thread.running = true;
        Ok(())
    }

    fn flush_deferred(&mut self) {
        for (tid, disposition) in std::mem::take(&mut self.deferred) {
            if let Err(e) = self.do_resume(tid, disposition) {
                warn!("cannot resume held thread {}: {}", tid, e);
            }
        }
    }

    /// Wait for the debuggee to go away after it was killed.
    fn reap(&mut self) {
        loop {
            match waitpid(HostPid::from_raw(-1), Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _))
                    if pid == self.pid =>
                {
                    break
                }
                Ok(status) => trace!("reaping: {:?}", status),
                Err(_) => break,
            }
        }
        self.threads.clear();
    }
}

/// Every thread of `pid`, the main thread first.
fn list_tasks(pid: HostPid) -> Vec<HostPid> {
    let sys = System::new_with_specifics(RefreshKind::everything().without_cpu().without_memory());
    let mut tids = vec![pid];
    let tasks = sys
        .process(sysinfo::Pid::from_u32(pid.as_raw() as u32))
        .and_then(|process| process.tasks());
    if let Some(tasks) = tasks {
        tids.extend(
            tasks
                .iter()
                .map(|tid| HostPid::from_raw(tid.as_u32() as libc::pid_t))
                .filter(|tid| *tid != pid),
        );
    }
    tids
}

impl Target for NativeTarget {
    fn wait_for_event(&mut self, timeout: Option<Duration>) -> Result<Option<DebugEvent>, OsError> {
        self.next_event(timeout)
    }

    fn resume_thread(&mut self, pid: Pid, tid: Tid, disposition: Disposition) -> Result<(), OsError> {
        self.check_pid(pid)?;
        let tid = host_pid(tid);
        if !self.threads.contains_key(&tid) {
            return Err(OsError::NoSuchProcess);
        }

        if self.pending.is_empty() {
            self.do_resume(tid, disposition)
        } else {
            self.deferred.push((tid, disposition));
            Ok(())
        }
    }

    fn read_context(&mut self, pid: Pid, tid: Tid, ctx: &mut RegisterContext) -> Result<(), OsError> {
        let tid = self.stopped_thread(pid, tid)?;
        regs::read_context(tid, ctx)
    }

    fn write_context(&mut self, pid: Pid, tid: Tid, ctx: &RegisterContext) -> Result<(), OsError> {
        let tid = self.stopped_thread(pid, tid)?;
        regs::write_context(tid, ctx)
    }

    fn read_memory(&mut self, pid: Pid, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
        self.check_pid(pid)?;
        memory::read(self.pid, addr, buf)
    }

    fn write_memory(&mut self, pid: Pid, addr: u64, data: &[u8]) -> Result<usize, OsError> {
        self.check_pid(pid)?;
        memory::write(self.pid, addr, data)
    }

    fn break_in(&mut self, pid: Pid) -> Result<(), OsError> {
        self.check_pid(pid)?;
        let tid = match self.threads.iter().find(|(_, t)| t.running) {
            Some((tid, _)) => *tid,
            None => return Err(OsError::Unsupported),
        };
        self.break_requested = true;
        ptrace::interrupt(tid).map_err(os_error)
    }

    fn terminate(&mut self, pid: Pid) -> Result<(), OsError> {
        self.check_pid(pid)?;
        self.pending.clear();
        self.deferred.clear();
        signal::kill(self.pid, HostSignal::SIGKILL).map_err(os_error)?;
        self.reap();
        Ok(())
    }

    fn detach(&mut self, pid: Pid) -> Result<(), OsError> {
        self.check_pid(pid)?;
        self.pending.clear();
        self.deferred.clear();

        // PTRACE_DETACH needs a stopped tracee
        self.stop_all(None)?;
        for tid in std::mem::take(&mut self.threads).into_keys() {
            if let Err(e) = ptrace::detach(tid, None) {
                warn!("cannot detach from thread {}: {}", tid, e);
            }
        }
        Ok(())
    }

    fn is_attached(&self, pid: Pid) -> bool {
        host_pid(pid) == self.pid && self.attached
    }

    fn support_monitor_cmd(&mut self) -> Option<MonitorCmdOps<'_>> {
        Some(self)
    }

    fn support_memory_regions(&mut self) -> Option<MemoryRegionsOps<'_>> {
        Some(self)
    }

    fn support_thread_extra_info(&mut self) -> Option<ThreadExtraInfoOps<'_>> {
        Some(self)
    }

    fn support_insn_classifier(&mut self) -> Option<&mut dyn InsnClassifier> {
        match &mut self.classifier {
            Some(classifier) => Some(classifier),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_lists_every_thread() {
        // an untraced process: register reads fail and fall back to 0
        let me = nix::unistd::getpid();
        let mut target = NativeTarget::new(me, true);
        for tid in [me.as_raw(), me.as_raw() + 1, me.as_raw() + 2] {
            target
                .threads
                .insert(HostPid::from_raw(tid), TracedThread::default());
        }

        target.announce().unwrap();
        let events: Vec<DebugEvent> = target.pending.drain(..).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], DebugEvent::ProcessCreate { .. }));
        let created: Vec<Tid> = events[1..3]
            .iter()
            .map(|e| match e {
                DebugEvent::ThreadCreate { tid, .. } => *tid,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(
            created,
            vec![
                from_host(HostPid::from_raw(me.as_raw() + 1)).unwrap(),
                from_host(HostPid::from_raw(me.as_raw() + 2)).unwrap(),
            ]
        );
        assert!(matches!(
            events[3],
            DebugEvent::Exception {
                code: ExceptionCode::Breakpoint,
                ..
            }
        ));
    }
}
