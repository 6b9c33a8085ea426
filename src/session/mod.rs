//! Process and thread bookkeeping for a debugging session.
//!
//! A [`DebugSession`] owns every [`Process`] currently being debugged,
//! the [`XpointRegistry`], and the record of the last stop reported to the
//! controller. It is mutated exclusively by the event [`pump`] and by the
//! command handlers, both of which run on the server's single event-loop
//! thread.

use crate::arch::{ContextAccess, CpuBackend, Machine, Memory, OsError, RegisterContext};
use crate::common::{Pid, Tid};
use crate::target::Target;
use crate::xpoint::XpointRegistry;

mod event;
pub mod pump;

pub use event::{DebugEvent, ExceptionCode, StopEvent};
pub use pump::{Controller, PumpError, ThreadFilter, WaitStatus};

/// A thread of a debuggee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub tid: Tid,
    /// Thread-local storage base.
    pub teb: u64,
    /// Whether the thread is stopped under our control.
    pub suspended: bool,
    /// Whether the trap flag is currently set in the thread's context.
    pub stepping: bool,
}

impl Thread {
    fn new(tid: Tid, teb: u64) -> Thread {
        Thread {
            tid,
            teb,
            suspended: true,
            stepping: false,
        }
    }
}

/// A loaded module (shared library or DLL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub base: u64,
}

/// A process being debugged.
pub struct Process {
    pid: Pid,
    threads: Vec<Thread>,
    backend: &'static dyn CpuBackend,
    image_name: Option<String>,
    base: u64,
    modules: Vec<Module>,
    attached: bool,
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("machine", &self.backend.machine())
            .field("threads", &self.threads)
            .field("image_name", &self.image_name)
            .finish()
    }
}

impl Process {
    /// Create a process record with a single, suspended, initial thread.
    pub fn new(pid: Pid, machine: Machine, tid: Tid, teb: u64) -> Process {
        Process {
            pid,
            threads: vec![Thread::new(tid, teb)],
            backend: machine.backend(),
            image_name: None,
            base: 0,
            modules: Vec::new(),
            attached: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn backend(&self) -> &'static dyn CpuBackend {
        self.backend
    }

    /// Whether the debuggee uses 32-bit pointers.
    pub fn is_32bit(&self) -> bool {
        self.backend.machine().is_32bit()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.image_name.as_deref()
    }

    /// Load address of the main image.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn threads_mut(&mut self) -> &mut [Thread] {
        &mut self.threads
    }

    pub fn thread(&self, tid: Tid) -> Option<&Thread> {
        self.threads.iter().find(|t| t.tid == tid)
    }

    pub fn thread_mut(&mut self, tid: Tid) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.tid == tid)
    }

    pub fn thread_ids(&self) -> impl Iterator<Item = Tid> + '_ {
        self.threads.iter().map(|t| t.tid)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub(crate) fn add_thread(&mut self, tid: Tid, teb: u64) {
        if self.thread(tid).is_some() {
            warn!("thread {} of process {} already known", tid, self.pid);
            return;
        }
        self.threads.push(Thread::new(tid, teb));
    }

    pub(crate) fn remove_thread(&mut self, tid: Tid) -> Option<Thread> {
        let idx = self.threads.iter().position(|t| t.tid == tid)?;
        Some(self.threads.remove(idx))
    }

    pub(crate) fn add_module(&mut self, name: String, base: u64) {
        self.modules.push(Module { name, base });
    }

    pub(crate) fn remove_module(&mut self, base: u64) -> Option<Module> {
        let idx = self.modules.iter().position(|m| m.base == base)?;
        Some(self.modules.remove(idx))
    }

    /// Mark every thread as stopped.
    pub(crate) fn suspend_all(&mut self) {
        for thread in &mut self.threads {
            thread.suspended = true;
        }
    }

    /// Fetch a thread's register context.
    pub fn read_context(
        &self,
        target: &mut dyn Target,
        tid: Tid,
    ) -> Result<RegisterContext, OsError> {
        self.backend.get_context(&mut ThreadContext {
            target,
            pid: self.pid,
            tid,
        })
    }

    /// Commit a thread's register context.
    pub fn write_context(
        &self,
        target: &mut dyn Target,
        tid: Tid,
        ctx: &RegisterContext,
    ) -> Result<(), OsError> {
        self.backend.set_context(
            &mut ThreadContext {
                target,
                pid: self.pid,
                tid,
            },
            ctx,
        )
    }
}

/// [`Memory`] view of a single process.
pub struct ProcessMemory<'a> {
    pub target: &'a mut dyn Target,
    pub pid: Pid,
}

impl Memory for ProcessMemory<'_> {
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
        self.target.read_memory(self.pid, addr, buf)
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<usize, OsError> {
        self.target.write_memory(self.pid, addr, data)
    }
}

/// [`ContextAccess`] view of a single thread.
pub struct ThreadContext<'a> {
    pub target: &'a mut dyn Target,
    pub pid: Pid,
    pub tid: Tid,
}

impl ContextAccess for ThreadContext<'_> {
    fn read_context(&mut self, ctx: &mut RegisterContext) -> Result<(), OsError> {
        self.target.read_context(self.pid, self.tid, ctx)
    }

    fn write_context(&mut self, ctx: &RegisterContext) -> Result<(), OsError> {
        self.target.write_context(self.pid, self.tid, ctx)
    }
}

/// Everything known about the debuggees of one controller connection.
#[derive(Debug)]
pub struct DebugSession {
    processes: Vec<Process>,
    current: Option<Pid>,
    xpoints: XpointRegistry,
    last_stop: Option<StopEvent>,
    running: bool,
    report_libraries: bool,
    console: Vec<String>,
}

impl Default for DebugSession {
    fn default() -> Self {
        DebugSession::new()
    }
}

impl DebugSession {
    pub fn new() -> DebugSession {
        DebugSession {
            processes: Vec::new(),
            current: None,
            xpoints: XpointRegistry::new(),
            last_stop: None,
            running: false,
            report_libraries: true,
            console: Vec::new(),
        }
    }

    /// Whether module load/unload events stop the debuggee with a
    /// `library` stop reply. Enabled by default.
    pub fn set_report_libraries(&mut self, report: bool) {
        self.report_libraries = report;
    }

    pub fn reports_libraries(&self) -> bool {
        self.report_libraries
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.iter_mut().find(|p| p.pid == pid)
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    /// The process the controller is talking to.
    pub fn current_process(&self) -> Option<&Process> {
        self.process(self.current?)
    }

    pub fn current_process_mut(&mut self) -> Option<&mut Process> {
        let pid = self.current?;
        self.process_mut(pid)
    }

    /// The current process together with the xpoint registry, borrowed
    /// disjointly.
    pub fn current_with_xpoints(&mut self) -> Option<(&mut Process, &mut XpointRegistry)> {
        let pid = self.current?;
        let process = self.processes.iter_mut().find(|p| p.pid == pid)?;
        Some((process, &mut self.xpoints))
    }

    pub fn xpoints(&self) -> &XpointRegistry {
        &self.xpoints
    }

    pub fn xpoints_mut(&mut self) -> &mut XpointRegistry {
        &mut self.xpoints
    }

    pub(crate) fn add_process(&mut self, process: Process) {
        let pid = process.pid;
        if self.process(pid).is_some() {
            warn!("process {} already known, replacing it", pid);
            self.remove_process(pid);
        }
        self.processes.push(process);
        if self.current.is_none() {
            self.current = Some(pid);
        }
    }

    /// Forget a process and every xpoint scoped to it.
    pub(crate) fn remove_process(&mut self, pid: Pid) -> Option<Process> {
        let idx = self.processes.iter().position(|p| p.pid == pid)?;
        let process = self.processes.remove(idx);
        self.xpoints.sweep_process(pid);
        if self.current == Some(pid) {
            self.current = self.processes.first().map(|p| p.pid);
        }
        Some(process)
    }

    /// The event the debuggee is currently stopped on.
    pub fn last_stop(&self) -> Option<&StopEvent> {
        self.last_stop.as_ref()
    }

    pub(crate) fn set_last_stop(&mut self, stop: StopEvent) {
        self.last_stop = Some(stop);
        self.running = false;
    }

    /// The thread that reported the last stop, if it still exists.
    pub fn stopped_thread(&self) -> Option<Tid> {
        let tid = self.last_stop.as_ref()?.tid()?;
        self.current_process()?.thread(tid).map(|t| t.tid)
    }

    /// Whether the debuggee has been resumed and not stopped since.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self) {
        self.running = true;
    }

    pub(crate) fn push_console(&mut self, text: String) {
        self.console.push(text);
    }

    /// Drain debug strings emitted by the debuggee since the last call.
    pub fn take_console_output(&mut self) -> Vec<String> {
        core::mem::take(&mut self.console)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> Pid {
        Pid::new(n).unwrap()
    }

    #[test]
    fn first_process_becomes_current() {
        let mut session = DebugSession::new();
        session.add_process(Process::new(id(10), Machine::Amd64, id(10), 0));
        session.add_process(Process::new(id(20), Machine::I386, id(21), 0));
        assert_eq!(session.current_pid(), Some(id(10)));
        assert!(!session.current_process().unwrap().is_32bit());

        session.remove_process(id(10));
        assert_eq!(session.current_pid(), Some(id(20)));
        assert!(session.current_process().unwrap().is_32bit());

        session.remove_process(id(20));
        assert_eq!(session.current_pid(), None);
    }

    #[test]
    fn thread_bookkeeping() {
        let mut process = Process::new(id(1), Machine::Arm64, id(1), 0x7000);
        process.add_thread(id(2), 0x8000);
        process.add_thread(id(2), 0x9000);
        assert_eq!(process.threads().len(), 2);
        assert_eq!(process.thread(id(2)).unwrap().teb, 0x8000);

        process.remove_thread(id(1));
        assert_eq!(process.thread_ids().collect::<Vec<_>>(), vec![id(2)]);
        assert!(process.remove_thread(id(1)).is_none());
    }

    #[test]
    fn stopped_thread_must_still_exist() {
        let mut session = DebugSession::new();
        session.add_process(Process::new(id(5), Machine::Amd64, id(6), 0));
        session.set_last_stop(StopEvent::Signal {
            pid: id(5),
            tid: id(6),
            signal: crate::common::Signal::SIGTRAP,
            code: None,
            sw_break: false,
        });
        assert_eq!(session.stopped_thread(), Some(id(6)));

        session.current_process_mut().unwrap().remove_thread(id(6));
        assert_eq!(session.stopped_thread(), None);
    }
}
