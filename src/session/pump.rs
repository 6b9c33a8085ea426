//! The debug event pump.
//!
//! [`wait_and_apply`] pulls one event from the [`Target`], folds it into the
//! [`DebugSession`], and decides whether it stops the debuggee (exceptions,
//! exits, library events) or is silently continued (thread churn, debug
//! strings). [`resume`] is the other half: it releases stopped threads,
//! toggling the single-step flag through the CPU backend on the way.

use std::time::Duration;

use thiserror::Error;

use crate::arch::{CpuBackend, OsError};
use crate::common::{Pid, Signal, Tid};
use crate::session::{DebugEvent, DebugSession, ExceptionCode, Process, StopEvent, ThreadContext};
use crate::target::{Disposition, Target};

/// What the controller connection did while the debuggee was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    /// Nothing to act on.
    Idle,
    /// The interrupt byte (`0x03`) arrived.
    Interrupt,
    /// The connection is gone.
    Hangup,
}

/// Outcome of [`wait_and_apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// An event was folded into the session. Check
    /// [`DebugSession::is_running`] to see whether it stopped the debuggee.
    Applied,
    /// No event arrived in time.
    TimedOut,
    /// The controller hung up while the debuggee was running.
    ControllerDetached,
}

/// Which threads a [`resume`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadFilter {
    All,
    Only(Tid),
}

impl ThreadFilter {
    pub fn matches(self, tid: Tid) -> bool {
        match self {
            ThreadFilter::All => true,
            ThreadFilter::Only(only) => only == tid,
        }
    }
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("waiting for a debug event failed: {0}")]
    Wait(#[source] OsError),
    #[error("cannot interrupt process {pid}: {source}")]
    BreakIn {
        pid: Pid,
        #[source]
        source: OsError,
    },
    #[error("no process is being debugged")]
    NoProcess,
}

/// Wait up to `timeout` for the next debug event and apply it.
///
/// On a timeout, `poll` is asked what the controller is doing. An interrupt
/// forces the current process to break in, and the resulting stop is waited
/// for without a timeout.
pub fn wait_and_apply(
    target: &mut dyn Target,
    session: &mut DebugSession,
    timeout: Duration,
    mut poll: impl FnMut() -> Controller,
) -> Result<WaitStatus, PumpError> {
    let event = match target.wait_for_event(Some(timeout)).map_err(PumpError::Wait)? {
        Some(event) => event,
        None => match poll() {
            Controller::Idle => return Ok(WaitStatus::TimedOut),
            Controller::Hangup => return Ok(WaitStatus::ControllerDetached),
            Controller::Interrupt => {
                let pid = session.current_pid().ok_or(PumpError::NoProcess)?;
                info!("interrupting process {}", pid);
                target
                    .break_in(pid)
                    .map_err(|source| PumpError::BreakIn { pid, source })?;
                match target.wait_for_event(None).map_err(PumpError::Wait)? {
                    Some(event) => event,
                    None => return Ok(WaitStatus::TimedOut),
                }
            }
        },
    };

    apply(target, session, event);
    Ok(WaitStatus::Applied)
}

/// Pump events until the debuggee stops for the first time, typically on the
/// initial breakpoint of a process that was just spawned or attached to.
pub fn wait_for_first_stop(
    target: &mut dyn Target,
    session: &mut DebugSession,
    timeout: Duration,
) -> Result<(), PumpError> {
    session.set_running();
    while session.is_running() {
        wait_and_apply(target, session, timeout, || Controller::Idle)?;
    }
    Ok(())
}

/// Fold a single event into the session.
pub(crate) fn apply(target: &mut dyn Target, session: &mut DebugSession, event: DebugEvent) {
    trace!("debug event: {:?}", event);

    let pid = event.pid();
    match session.process_mut(pid) {
        // the whole process is stopped while an event is pending
        Some(process) => process.suspend_all(),
        None if matches!(event, DebugEvent::ProcessCreate { .. }) => {}
        None => {
            warn!("event for unknown process {}: {:?}", pid, event);
            if let Some(tid) = event.tid() {
                if let Err(e) = target.resume_thread(pid, tid, Disposition::Continue) {
                    debug!("cannot release thread {}: {}", tid, e);
                }
            }
            return;
        }
    }

    match event {
        DebugEvent::ProcessCreate {
            pid,
            tid,
            machine,
            image_name,
            teb,
            base,
        } => {
            info!(
                "process {} created: {:?} {}",
                pid,
                machine,
                image_name.as_deref().unwrap_or("<unknown image>")
            );
            let mut process = Process::new(pid, machine, tid, teb);
            process.image_name = image_name;
            process.base = base;
            process.attached = target.is_attached(pid);
            session.add_process(process);
            continue_all(target, session, pid);
        }
        DebugEvent::ThreadCreate { pid, tid, teb } => {
            debug!("process {}: new thread {}", pid, tid);
            let DebugSession {
                processes, xpoints, ..
            } = session;
            if let Some(process) = processes.iter_mut().find(|p| p.pid == pid) {
                process.add_thread(tid, teb);
                xpoints.propagate_to_thread(target, process, tid);
            }
            continue_all(target, session, pid);
        }
        DebugEvent::ThreadExit {
            pid,
            tid,
            exit_code,
        } => {
            debug!("process {}: thread {} exited ({})", pid, tid, exit_code);
            session.xpoints.sweep_thread(pid, tid);
            if let Some(process) = session.process_mut(pid) {
                process.remove_thread(tid);
            }
            if let Err(e) = target.resume_thread(pid, tid, Disposition::Continue) {
                debug!("cannot release exiting thread {}: {}", tid, e);
            }
            continue_all(target, session, pid);
        }
        DebugEvent::ProcessExit { pid, exit_code } => {
            info!("process {} exited with code {}", pid, exit_code);
            session.remove_process(pid);
            session.set_last_stop(StopEvent::Exited {
                pid,
                code: exit_code,
            });
        }
        DebugEvent::ProcessKilled { pid, signal } => {
            info!("process {} killed by {}", pid, signal);
            session.remove_process(pid);
            session.set_last_stop(StopEvent::Killed { pid, signal });
        }
        DebugEvent::ModuleLoad {
            pid,
            tid,
            name,
            base,
        } => {
            debug!("process {}: loaded {} at {:#x}", pid, name, base);
            if let Some(process) = session.process_mut(pid) {
                process.add_module(name, base);
            }
            library_event(target, session, pid, tid);
        }
        DebugEvent::ModuleUnload { pid, tid, base } => {
            debug!("process {}: unloaded module at {:#x}", pid, base);
            let known = session
                .process_mut(pid)
                .and_then(|p| p.remove_module(base))
                .is_some();
            if !known {
                warn!("process {}: unload of unknown module at {:#x}", pid, base);
            }
            library_event(target, session, pid, tid);
        }
        DebugEvent::Exception {
            pid,
            tid,
            code,
            address,
            first_chance,
        } => {
            let signal = code.to_signal();
            debug!(
                "process {}: thread {} raised {:?} at {:#x} ({} chance) -> {}",
                pid,
                tid,
                code,
                address,
                if first_chance { "first" } else { "last" },
                signal
            );
            let sw_break = code == ExceptionCode::Breakpoint && rewind_sw_break(target, session, pid, tid);
            session.current = Some(pid);
            session.set_last_stop(StopEvent::Signal {
                pid,
                tid,
                signal,
                code: Some(code),
                sw_break,
            });
        }
        DebugEvent::OutputString { pid, tid, text } => {
            trace!("process {}: thread {} says {:?}", pid, tid, text);
            session.push_console(text);
            continue_all(target, session, pid);
        }
    }
}

fn library_event(target: &mut dyn Target, session: &mut DebugSession, pid: Pid, tid: Tid) {
    if session.reports_libraries() {
        session.current = Some(pid);
        session.set_last_stop(StopEvent::Library { pid, tid });
    } else {
        continue_all(target, session, pid);
    }
}

/// If `tid` stopped on one of our software breakpoints, move its PC back
/// onto the breakpoint.
fn rewind_sw_break(
    target: &mut dyn Target,
    session: &mut DebugSession,
    pid: Pid,
    tid: Tid,
) -> bool {
    let process = match session.process(pid) {
        Some(process) => process,
        None => return false,
    };
    let backend = process.backend();

    let mut ctx = match process.read_context(target, tid) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("cannot read context of thread {}: {}", tid, e);
            return false;
        }
    };
    let pc = match backend.pc(&ctx) {
        Ok(pc) => pc,
        Err(e) => {
            warn!("cannot read pc of thread {}: {}", tid, e);
            return false;
        }
    };

    if !backend.trap_advances_pc() {
        return session.xpoints.is_sw_break(pid, pc);
    }

    let bp = pc.wrapping_sub(backend.breakpoint_insn().len() as u64);
    if !session.xpoints.is_sw_break(pid, bp) {
        return false;
    }
    let res = backend
        .adjust_pc_for_break(&mut ctx, true)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            process
                .write_context(target, tid, &ctx)
                .map_err(|e| e.to_string())
        });
    match res {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot rewind pc of thread {} to {:#x}: {}", tid, bp, e);
            false
        }
    }
}

/// Release every stopped thread of `pid` without reporting anything.
fn continue_all(target: &mut dyn Target, session: &mut DebugSession, pid: Pid) {
    let process = match session.process_mut(pid) {
        Some(process) => process,
        None => return,
    };
    for thread in process.threads.iter_mut().filter(|t| t.suspended) {
        match target.resume_thread(pid, thread.tid, Disposition::Continue) {
            Ok(()) => thread.suspended = false,
            Err(e) => warn!("cannot continue thread {}: {}", thread.tid, e),
        }
    }
}

fn set_stepping(
    target: &mut dyn Target,
    backend: &dyn CpuBackend,
    pid: Pid,
    tid: Tid,
    enable: bool,
) -> Result<(), String> {
    let mut thread = ThreadContext { target, pid, tid };
    let mut ctx = backend.get_context(&mut thread).map_err(|e| e.to_string())?;
    backend
        .single_step(&mut ctx, enable)
        .map_err(|e| e.to_string())?;
    backend
        .set_context(&mut thread, &ctx)
        .map_err(|e| e.to_string())
}

/// Release the stopped threads of the current process selected by `filter`.
///
/// Thread `step` (if any) executes a single instruction; every other
/// released thread runs freely. `reinject` is delivered to the thread that
/// reported the last stop, and swallowed everywhere else. Failures on
/// individual threads are logged.
pub fn resume(
    target: &mut dyn Target,
    session: &mut DebugSession,
    filter: ThreadFilter,
    step: Option<Tid>,
    reinject: Option<Signal>,
) -> Result<(), PumpError> {
    let trapped = session.last_stop().and_then(StopEvent::tid);
    let process = session.current_process_mut().ok_or(PumpError::NoProcess)?;
    let pid = process.pid;
    let backend = process.backend;

    let mut released = 0;
    for thread in process
        .threads
        .iter_mut()
        .filter(|t| t.suspended && filter.matches(t.tid))
    {
        let want_step = step == Some(thread.tid);
        if thread.stepping != want_step {
            match set_stepping(target, backend, pid, thread.tid, want_step) {
                Ok(()) => thread.stepping = want_step,
                Err(e) => warn!(
                    "cannot {} single-step on thread {}: {}",
                    if want_step { "enable" } else { "disable" },
                    thread.tid,
                    e
                ),
            }
        }

        let disposition = match reinject {
            Some(sig) if trapped == Some(thread.tid) && sig != Signal::SIGZERO => {
                Disposition::Deliver(sig)
            }
            _ => Disposition::Continue,
        };
        match target.resume_thread(pid, thread.tid, disposition) {
            Ok(()) => {
                thread.suspended = false;
                released += 1;
            }
            Err(e) => warn!("cannot resume thread {}: {}", thread.tid, e),
        }
    }

    if released == 0 {
        warn!("resume of process {} released no thread", pid);
    }
    session.set_running();
    Ok(())
}

/// Stop debugging `pid`: lift every xpoint, clear single-step, release all
/// threads and either detach or kill the process.
pub fn release_process(
    target: &mut dyn Target,
    session: &mut DebugSession,
    pid: Pid,
    kill: bool,
) -> Result<(), OsError> {
    let DebugSession {
        processes, xpoints, ..
    } = session;
    let process = match processes.iter_mut().find(|p| p.pid == pid) {
        Some(process) => process,
        None => return Err(OsError::NoSuchProcess),
    };

    xpoints.remove_all(target, process);
    let backend = process.backend;
    for thread in process.threads.iter_mut().filter(|t| t.stepping) {
        if let Err(e) = set_stepping(target, backend, pid, thread.tid, false) {
            warn!("cannot clear single-step on thread {}: {}", thread.tid, e);
        }
        thread.stepping = false;
    }

    let res = if kill {
        info!("killing process {}", pid);
        target.terminate(pid)
    } else {
        for thread in process.threads.iter_mut().filter(|t| t.suspended) {
            if let Err(e) = target.resume_thread(pid, thread.tid, Disposition::Continue) {
                warn!("cannot resume thread {}: {}", thread.tid, e);
            }
            thread.suspended = false;
        }
        info!("detaching from process {}", pid);
        target.detach(pid)
    };

    session.remove_process(pid);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Machine, XpointKind};
    use crate::test_util::MockTarget;

    const TIMEOUT: Duration = Duration::from_millis(1);

    fn id(n: usize) -> Tid {
        Tid::new(n).unwrap()
    }

    fn started(machine: Machine) -> (MockTarget, DebugSession) {
        let mut target = MockTarget::new(machine);
        target.add_thread(id(7));
        target.map_memory(0x401000, &[0x90; 16]);
        target.push_event(DebugEvent::ProcessCreate {
            pid: id(7),
            tid: id(7),
            machine,
            image_name: Some("/bin/true".into()),
            teb: 0x7ff000,
            base: 0x400000,
        });

        let mut session = DebugSession::new();
        let status = wait_and_apply(&mut target, &mut session, TIMEOUT, || Controller::Idle).unwrap();
        assert_eq!(status, WaitStatus::Applied);
        (target, session)
    }

    fn pump(target: &mut MockTarget, session: &mut DebugSession) -> WaitStatus {
        wait_and_apply(target, session, TIMEOUT, || Controller::Idle).unwrap()
    }

    #[test]
    fn process_create_is_not_a_stop() {
        let (target, session) = started(Machine::Amd64);
        assert_eq!(session.current_pid(), Some(id(7)));
        let process = session.current_process().unwrap();
        assert_eq!(process.image_name(), Some("/bin/true"));
        assert_eq!(process.base(), 0x400000);
        assert!(session.last_stop().is_none());
        assert_eq!(target.resumed, vec![(id(7), Disposition::Continue)]);
    }

    #[test]
    fn breakpoint_stop_rewinds_onto_our_breakpoint() {
        let (mut target, mut session) = started(Machine::Amd64);
        let (process, xpoints) = session.current_with_xpoints().unwrap();
        xpoints
            .insert(&mut target, process, None, XpointKind::Break, 0x401004, 1)
            .unwrap();

        target.set_pc(id(7), 0x401005);
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(7),
            code: ExceptionCode::Breakpoint,
            address: 0x401004,
            first_chance: true,
        });
        assert_eq!(pump(&mut target, &mut session), WaitStatus::Applied);

        assert!(!session.is_running());
        assert_eq!(
            session.last_stop(),
            Some(&StopEvent::Signal {
                pid: id(7),
                tid: id(7),
                signal: Signal::SIGTRAP,
                code: Some(ExceptionCode::Breakpoint),
                sw_break: true,
            })
        );
        assert_eq!(target.pc(id(7)), 0x401004);
    }

    #[test]
    fn foreign_traps_are_left_alone() {
        let (mut target, mut session) = started(Machine::Amd64);
        target.set_pc(id(7), 0x401005);
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(7),
            code: ExceptionCode::Breakpoint,
            address: 0x401004,
            first_chance: true,
        });
        pump(&mut target, &mut session);

        assert!(matches!(
            session.last_stop(),
            Some(StopEvent::Signal { sw_break: false, .. })
        ));
        assert_eq!(target.pc(id(7)), 0x401005);
    }

    #[test]
    fn thread_churn_keeps_running() {
        let (mut target, mut session) = started(Machine::Amd64);
        let (process, xpoints) = session.current_with_xpoints().unwrap();
        xpoints
            .insert(&mut target, process, None, XpointKind::WriteWatch, 0x401000, 4)
            .unwrap();

        target.add_thread(id(8));
        target.push_event(DebugEvent::ThreadCreate {
            pid: id(7),
            tid: id(8),
            teb: 0x7fe000,
        });
        pump(&mut target, &mut session);
        assert!(session.last_stop().is_none());
        assert!(session
            .xpoints()
            .find(id(7), Some(id(8)), XpointKind::WriteWatch, 0x401000, 4)
            .is_some());

        target.push_event(DebugEvent::ThreadExit {
            pid: id(7),
            tid: id(8),
            exit_code: 0,
        });
        pump(&mut target, &mut session);
        assert!(session.current_process().unwrap().thread(id(8)).is_none());
        assert!(session
            .xpoints()
            .find(id(7), Some(id(8)), XpointKind::WriteWatch, 0x401000, 4)
            .is_none());
        assert!(session.last_stop().is_none());
    }

    #[test]
    fn debug_strings_are_queued() {
        let (mut target, mut session) = started(Machine::I386);
        target.push_event(DebugEvent::OutputString {
            pid: id(7),
            tid: id(7),
            text: "hello\n".into(),
        });
        pump(&mut target, &mut session);
        assert!(session.last_stop().is_none());
        assert_eq!(session.take_console_output(), vec!["hello\n".to_string()]);
        assert!(session.take_console_output().is_empty());
    }

    #[test]
    fn library_events_stop_when_reported() {
        let (mut target, mut session) = started(Machine::Amd64);
        target.push_event(DebugEvent::ModuleLoad {
            pid: id(7),
            tid: id(7),
            name: "libc.so.6".into(),
            base: 0x7f0000,
        });
        pump(&mut target, &mut session);
        assert_eq!(
            session.last_stop(),
            Some(&StopEvent::Library {
                pid: id(7),
                tid: id(7)
            })
        );
        assert_eq!(session.current_process().unwrap().modules().len(), 1);

        session.set_report_libraries(false);
        session.last_stop = None;
        target.push_event(DebugEvent::ModuleUnload {
            pid: id(7),
            tid: id(7),
            base: 0x7f0000,
        });
        pump(&mut target, &mut session);
        assert!(session.last_stop().is_none());
        assert!(session.current_process().unwrap().modules().is_empty());
    }

    #[test]
    fn process_exit_ends_the_session() {
        let (mut target, mut session) = started(Machine::Amd64);
        target.push_event(DebugEvent::ProcessExit {
            pid: id(7),
            exit_code: 3,
        });
        pump(&mut target, &mut session);
        assert_eq!(
            session.last_stop(),
            Some(&StopEvent::Exited {
                pid: id(7),
                code: 3
            })
        );
        assert!(session.current_process().is_none());
    }

    #[test]
    fn interrupt_breaks_in() {
        let (mut target, mut session) = started(Machine::Amd64);
        let status =
            wait_and_apply(&mut target, &mut session, TIMEOUT, || Controller::Interrupt).unwrap();
        assert_eq!(status, WaitStatus::Applied);
        assert_eq!(target.interrupts, 1);
        assert!(matches!(
            session.last_stop(),
            Some(StopEvent::Signal {
                signal: Signal::SIGINT,
                ..
            })
        ));
    }

    #[test]
    fn timeout_and_hangup() {
        let (mut target, mut session) = started(Machine::Amd64);
        assert_eq!(pump(&mut target, &mut session), WaitStatus::TimedOut);
        let status =
            wait_and_apply(&mut target, &mut session, TIMEOUT, || Controller::Hangup).unwrap();
        assert_eq!(status, WaitStatus::ControllerDetached);
    }

    #[test]
    fn wait_failures_are_fatal() {
        let (mut target, mut session) = started(Machine::Amd64);
        target.fail_wait = true;
        let err = wait_and_apply(&mut target, &mut session, TIMEOUT, || Controller::Idle).unwrap_err();
        assert!(matches!(err, PumpError::Wait(_)));
    }

    #[test]
    fn resume_steps_and_reinjects_on_the_trapping_thread_only() {
        let (mut target, mut session) = started(Machine::Amd64);
        target.add_thread(id(8));
        target.push_event(DebugEvent::ThreadCreate {
            pid: id(7),
            tid: id(8),
            teb: 0,
        });
        pump(&mut target, &mut session);
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(8),
            code: ExceptionCode::AccessViolation,
            address: 0,
            first_chance: true,
        });
        pump(&mut target, &mut session);
        target.resumed.clear();

        resume(
            &mut target,
            &mut session,
            ThreadFilter::All,
            Some(id(8)),
            Some(Signal::SIGSEGV),
        )
        .unwrap();
        assert!(session.is_running());
        assert_eq!(
            target.resumed,
            vec![
                (id(7), Disposition::Continue),
                (id(8), Disposition::Deliver(Signal::SIGSEGV)),
            ]
        );
        assert!(target.trap_flag(id(8)));
        assert!(!target.trap_flag(id(7)));

        // stepping is turned back off on the next plain resume
        session.current_process_mut().unwrap().suspend_all();
        resume(&mut target, &mut session, ThreadFilter::Only(id(8)), None, None).unwrap();
        assert!(!target.trap_flag(id(8)));
    }

    #[test]
    fn detach_restores_everything() {
        let (mut target, mut session) = started(Machine::Amd64);
        let (process, xpoints) = session.current_with_xpoints().unwrap();
        xpoints
            .insert(&mut target, process, None, XpointKind::Break, 0x401000, 1)
            .unwrap();
        assert_eq!(target.memory_at(0x401000, 1), vec![0xcc]);

        release_process(&mut target, &mut session, id(7), false).unwrap();
        assert_eq!(target.memory_at(0x401000, 1), vec![0x90]);
        assert!(target.detached);
        assert!(session.xpoints().is_empty());
        assert!(session.current_process().is_none());
    }
}
