//! Turning `waitpid` statuses into [`DebugEvent`]s.

use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace;
use nix::sys::signal::Signal as HostSignal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid as HostPid;

use super::{from_host, os_error, regs, NativeTarget, TracedThread};
use crate::arch::OsError;
use crate::common::Signal;
use crate::session::{DebugEvent, ExceptionCode};

const POLL_STEP: Duration = Duration::from_millis(1);

// `si_code` values of a SIGTRAP
const TRAP_BRKPT: i32 = 1;
const TRAP_TRACE: i32 = 2;
const TRAP_HWBKPT: i32 = 4;
const SI_KERNEL: i32 = 0x80;

/// Signals passed straight through to the debuggee without stopping it.
static QUIET_SIGNALS: [HostSignal; 7] = [
    HostSignal::SIGALRM,
    HostSignal::SIGURG,
    HostSignal::SIGCHLD,
    HostSignal::SIGIO,
    HostSignal::SIGVTALRM,
    HostSignal::SIGPROF,
    HostSignal::SIGWINCH,
];

impl NativeTarget {
    pub(super) fn next_event(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<DebugEvent>, OsError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if let Some(event) = self.pending.pop_front() {
                // held threads never ran, so they are stopped again
                self.deferred.clear();
                return Ok(Some(event));
            }
            self.flush_deferred();

            let status = match wait_any(deadline)? {
                Some(status) => status,
                None => return Ok(None),
            };
            trace!("wait: {:?}", status);

            let tid = status.pid();
            let event = match self.translate(status)? {
                Some(event) => event,
                None => continue,
            };

            match event {
                DebugEvent::ProcessExit { .. } | DebugEvent::ProcessKilled { .. } => {}
                DebugEvent::Exception { .. } => {
                    // an interrupt that arrives late is not a break-in
                    self.break_requested = false;
                    self.stop_all(tid)?;
                }
                _ => self.stop_all(tid)?,
            }
            return Ok(Some(event));
        }
    }

    /// Interrupt every running thread except `except`, and wait until they
    /// are all stopped. Events reported on the way are queued.
    pub(super) fn stop_all(&mut self, except: Option<HostPid>) -> Result<(), OsError> {
        let running: Vec<HostPid> = self
            .threads
            .iter()
            .filter(|(tid, thread)| thread.running && Some(**tid) != except)
            .map(|(tid, _)| *tid)
            .collect();

        for tid in &running {
            match ptrace::interrupt(*tid) {
                Ok(()) => {
                    if let Some(thread) = self.threads.get_mut(tid) {
                        thread.interrupting = true;
                    }
                }
                // exiting; the exit status is collected below
                Err(Errno::ESRCH) => debug!("cannot interrupt thread {}: gone", tid),
                Err(e) => return Err(os_error(e)),
            }
        }

        for tid in running {
            while self.threads.get(&tid).map_or(false, |t| t.running) {
                let status = waitpid(tid, Some(WaitPidFlag::__WALL)).map_err(os_error)?;
                if let WaitStatus::PtraceEvent(_, _, libc::PTRACE_EVENT_STOP) = status {
                    if let Some(thread) = self.threads.get_mut(&tid) {
                        thread.running = false;
                        thread.interrupting = false;
                    }
                    continue;
                }

                trace!("wait {}: {:?}", tid, status);
                if let Some(event) = self.translate(status)? {
                    self.pending.push_back(event);
                }
            }
        }
        Ok(())
    }

    fn mark_stopped(&mut self, tid: HostPid) -> &mut TracedThread {
        let thread = self.threads.entry(tid).or_default();
        thread.running = false;
        thread
    }

    /// Continue a thread without telling anyone.
    fn continue_quietly(&mut self, tid: HostPid, sig: Option<HostSignal>) {
        match ptrace::cont(tid, sig) {
            Ok(()) => {
                if let Some(thread) = self.threads.get_mut(&tid) {
                    thread.running = true;
                }
            }
            Err(e) => debug!("cannot continue thread {}: {}", tid, e),
        }
    }

    /// Fold a wait status into the thread table, and decide whether it is
    /// worth reporting.
    fn translate(&mut self, status: WaitStatus) -> Result<Option<DebugEvent>, OsError> {
        let pid = from_host(self.pid)?;

        let event = match status {
            WaitStatus::Exited(tid, code) if tid == self.pid => {
                self.threads.clear();
                DebugEvent::ProcessExit {
                    pid,
                    exit_code: code as u32,
                }
            }
            WaitStatus::Signaled(tid, sig, _) if tid == self.pid => {
                self.threads.clear();
                DebugEvent::ProcessKilled {
                    pid,
                    signal: Signal::from_host(sig as i32),
                }
            }
            WaitStatus::Exited(tid, _) | WaitStatus::Signaled(tid, _, _) => {
                if self.threads.remove(&tid).is_none() {
                    // some other child of ours
                    debug!("ignoring exit of {}", tid);
                    return Ok(None);
                }
                let exit_code = match status {
                    WaitStatus::Exited(_, code) => code as u32,
                    _ => 0,
                };
                DebugEvent::ThreadExit {
                    pid,
                    tid: from_host(tid)?,
                    exit_code,
                }
            }

            WaitStatus::PtraceEvent(tid, _, libc::PTRACE_EVENT_CLONE) => {
                self.mark_stopped(tid);
                let new = HostPid::from_raw(ptrace::getevent(tid).map_err(os_error)? as libc::pid_t);
                // the new thread may already have reported its initial stop
                if !self.threads.contains_key(&new) {
                    if !wait_interrupted(new)? {
                        return Ok(None);
                    }
                    self.threads.insert(new, TracedThread::default());
                }
                DebugEvent::ThreadCreate {
                    pid,
                    tid: from_host(new)?,
                    teb: regs::thread_pointer(new).unwrap_or(0),
                }
            }
            WaitStatus::PtraceEvent(tid, _, libc::PTRACE_EVENT_EXEC) => {
                // exec leaves only the thread group leader behind
                let leader = self.pid;
                self.threads.retain(|tid, _| *tid == leader);
                self.mark_stopped(tid);
                self.image_name = std::fs::read_link(format!("/proc/{}/exe", leader))
                    .ok()
                    .map(|path| path.to_string_lossy().into_owned());
                info!("process {} executed {:?}", leader, self.image_name);

                DebugEvent::Exception {
                    pid,
                    tid: from_host(tid)?,
                    code: ExceptionCode::Signal(Signal::SIGTRAP),
                    address: regs::program_counter(tid).unwrap_or(0),
                    first_chance: true,
                }
            }
            WaitStatus::PtraceEvent(tid, _, libc::PTRACE_EVENT_EXIT) => {
                self.mark_stopped(tid);
                self.continue_quietly(tid, None);
                return Ok(None);
            }
            WaitStatus::PtraceEvent(tid, _, libc::PTRACE_EVENT_STOP) => {
                if !self.threads.contains_key(&tid) {
                    // initial stop of a new thread, ahead of its clone event
                    self.mark_stopped(tid);
                    return Ok(None);
                }
                self.mark_stopped(tid).interrupting = false;
                if !self.break_requested {
                    // group-stop, or an interrupt we no longer care about
                    self.continue_quietly(tid, None);
                    return Ok(None);
                }

                self.break_requested = false;
                DebugEvent::Exception {
                    pid,
                    tid: from_host(tid)?,
                    code: ExceptionCode::ControlC,
                    address: regs::program_counter(tid).unwrap_or(0),
                    first_chance: true,
                }
            }
            WaitStatus::PtraceEvent(tid, _, code) => {
                warn!("ignoring ptrace event {} on thread {}", code, tid);
                self.mark_stopped(tid);
                self.continue_quietly(tid, None);
                return Ok(None);
            }

            WaitStatus::Stopped(tid, sig) => {
                self.mark_stopped(tid);
                if QUIET_SIGNALS.contains(&sig) {
                    self.continue_quietly(tid, Some(sig));
                    return Ok(None);
                }

                let info = ptrace::getsiginfo(tid).map_err(os_error)?;
                let (code, address) = match sig {
                    HostSignal::SIGTRAP => {
                        let code = match info.si_code {
                            TRAP_TRACE | TRAP_HWBKPT => ExceptionCode::SingleStep,
                            TRAP_BRKPT | SI_KERNEL => ExceptionCode::Breakpoint,
                            _ => ExceptionCode::Signal(Signal::SIGTRAP),
                        };
                        (code, regs::program_counter(tid).unwrap_or(0))
                    }
                    // SAFETY: si_addr is valid for memory faults
                    HostSignal::SIGSEGV | HostSignal::SIGBUS => {
                        (exception_code(sig), unsafe { info.si_addr() } as u64)
                    }
                    sig => (exception_code(sig), regs::program_counter(tid).unwrap_or(0)),
                };

                DebugEvent::Exception {
                    pid,
                    tid: from_host(tid)?,
                    code,
                    address,
                    first_chance: true,
                }
            }

            WaitStatus::PtraceSyscall(_) | WaitStatus::Continued(_) | WaitStatus::StillAlive => {
                return Ok(None)
            }
        };
        Ok(Some(event))
    }
}

fn exception_code(sig: HostSignal) -> ExceptionCode {
    match sig {
        HostSignal::SIGSEGV => ExceptionCode::AccessViolation,
        HostSignal::SIGBUS => ExceptionCode::DatatypeMisalignment,
        HostSignal::SIGFPE => ExceptionCode::FloatFault,
        HostSignal::SIGILL => ExceptionCode::IllegalInstruction,
        HostSignal::SIGINT => ExceptionCode::ControlC,
        sig => ExceptionCode::Signal(Signal::from_host(sig as i32)),
    }
}

/// Wait for a status change of any traced thread, until `deadline` if given.
fn wait_any(deadline: Option<Instant>) -> Result<Option<WaitStatus>, OsError> {
    let any = HostPid::from_raw(-1);
    let deadline = match deadline {
        Some(deadline) => deadline,
        None => {
            return waitpid(any, Some(WaitPidFlag::__WALL))
                .map(Some)
                .map_err(os_error)
        }
    };

    loop {
        match waitpid(any, Some(WaitPidFlag::__WALL | WaitPidFlag::WNOHANG)).map_err(os_error)? {
            WaitStatus::StillAlive => {}
            status => return Ok(Some(status)),
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_STEP.min(deadline - now));
    }
}

/// Wait for the `PTRACE_EVENT_STOP` of a freshly seized or cloned thread.
/// Returns `false` if the thread exited instead.
pub(super) fn wait_interrupted(tid: HostPid) -> Result<bool, OsError> {
    loop {
        match waitpid(tid, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::PtraceEvent(_, _, libc::PTRACE_EVENT_STOP)) => return Ok(true),
            Ok(WaitStatus::PtraceEvent(_, _, libc::PTRACE_EVENT_EXIT)) => {
                ptrace::cont(tid, None).map_err(os_error)?;
            }
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(Errno::ECHILD) => {
                return Ok(false)
            }
            Ok(status) => {
                // stopped for another reason; the signal is dropped
                debug!("thread {} stopped with {:?} while attaching", tid, status);
                return Ok(true);
            }
            Err(e) => return Err(os_error(e)),
        }
    }
}
