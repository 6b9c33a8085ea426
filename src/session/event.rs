//! The normalized debug event stream delivered by a [`Target`].
//!
//! [`Target`]: crate::target::Target

use crate::arch::Machine;
use crate::common::{Pid, Signal, Tid};

/// Why a thread raised an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    AccessViolation,
    PrivilegedInstruction,
    StackOverflow,
    GuardPage,
    DatatypeMisalignment,
    /// Trap flag or hardware debug register trap.
    SingleStep,
    /// Software breakpoint trap.
    Breakpoint,
    FloatFault,
    IntegerDivideByZero,
    IntegerOverflow,
    IllegalInstruction,
    /// The debuggee was interrupted on the controller's request.
    ControlC,
    PossibleDeadlock,
    /// A host signal with no more specific meaning.
    Signal(Signal),
    /// An exception the OS layer could not classify.
    Unknown(u32),
}

impl ExceptionCode {
    /// The signal reported to GDB for this exception.
    pub fn to_signal(self) -> Signal {
        match self {
            ExceptionCode::AccessViolation
            | ExceptionCode::PrivilegedInstruction
            | ExceptionCode::StackOverflow
            | ExceptionCode::GuardPage => Signal::SIGSEGV,
            ExceptionCode::DatatypeMisalignment => Signal::SIGBUS,
            ExceptionCode::SingleStep | ExceptionCode::Breakpoint => Signal::SIGTRAP,
            ExceptionCode::FloatFault
            | ExceptionCode::IntegerDivideByZero
            | ExceptionCode::IntegerOverflow => Signal::SIGFPE,
            ExceptionCode::IllegalInstruction => Signal::SIGILL,
            ExceptionCode::ControlC => Signal::SIGINT,
            ExceptionCode::PossibleDeadlock => Signal::SIGALRM,
            ExceptionCode::Signal(sig) => sig,
            ExceptionCode::Unknown(code) => {
                debug!("unhandled exception code {:#010x}", code);
                Signal::SIGABRT
            }
        }
    }
}

/// A single notification from the OS debugging facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    ProcessCreate {
        pid: Pid,
        /// Initial thread.
        tid: Tid,
        machine: Machine,
        image_name: Option<String>,
        /// Thread-local storage base of the initial thread.
        teb: u64,
        /// Load address of the main image.
        base: u64,
    },
    ThreadCreate {
        pid: Pid,
        tid: Tid,
        teb: u64,
    },
    ThreadExit {
        pid: Pid,
        tid: Tid,
        exit_code: u32,
    },
    ProcessExit {
        pid: Pid,
        exit_code: u32,
    },
    /// The process was terminated by a signal.
    ProcessKilled {
        pid: Pid,
        signal: Signal,
    },
    ModuleLoad {
        pid: Pid,
        tid: Tid,
        name: String,
        base: u64,
    },
    ModuleUnload {
        pid: Pid,
        tid: Tid,
        base: u64,
    },
    Exception {
        pid: Pid,
        tid: Tid,
        code: ExceptionCode,
        /// Faulting address, when the OS reports one.
        address: u64,
        first_chance: bool,
    },
    /// A debug string emitted by the debuggee.
    OutputString {
        pid: Pid,
        tid: Tid,
        text: String,
    },
}

impl DebugEvent {
    pub fn pid(&self) -> Pid {
        match *self {
            DebugEvent::ProcessCreate { pid, .. }
            | DebugEvent::ThreadCreate { pid, .. }
            | DebugEvent::ThreadExit { pid, .. }
            | DebugEvent::ProcessExit { pid, .. }
            | DebugEvent::ProcessKilled { pid, .. }
            | DebugEvent::ModuleLoad { pid, .. }
            | DebugEvent::ModuleUnload { pid, .. }
            | DebugEvent::Exception { pid, .. }
            | DebugEvent::OutputString { pid, .. } => pid,
        }
    }

    /// The thread the event was raised on, if any.
    pub fn tid(&self) -> Option<Tid> {
        match *self {
            DebugEvent::ProcessCreate { tid, .. }
            | DebugEvent::ThreadCreate { tid, .. }
            | DebugEvent::ThreadExit { tid, .. }
            | DebugEvent::ModuleLoad { tid, .. }
            | DebugEvent::ModuleUnload { tid, .. }
            | DebugEvent::Exception { tid, .. }
            | DebugEvent::OutputString { tid, .. } => Some(tid),
            DebugEvent::ProcessExit { .. } | DebugEvent::ProcessKilled { .. } => None,
        }
    }
}

/// The event the debuggee is currently stopped on, as reported to GDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopEvent {
    /// A thread stopped with a signal.
    Signal {
        pid: Pid,
        tid: Tid,
        signal: Signal,
        code: Option<ExceptionCode>,
        /// The thread hit one of our own software breakpoints, and its PC
        /// has been rewound onto the breakpoint address.
        sw_break: bool,
    },
    /// A module was loaded or unloaded.
    Library { pid: Pid, tid: Tid },
    /// The process exited.
    Exited { pid: Pid, code: u32 },
    /// The process was killed by a signal.
    Killed { pid: Pid, signal: Signal },
}

impl StopEvent {
    pub fn pid(&self) -> Pid {
        match *self {
            StopEvent::Signal { pid, .. }
            | StopEvent::Library { pid, .. }
            | StopEvent::Exited { pid, .. }
            | StopEvent::Killed { pid, .. } => pid,
        }
    }

    /// The thread that stopped, if the process is still alive.
    pub fn tid(&self) -> Option<Tid> {
        match *self {
            StopEvent::Signal { tid, .. } | StopEvent::Library { tid, .. } => Some(tid),
            StopEvent::Exited { .. } | StopEvent::Killed { .. } => None,
        }
    }

    /// Signal carried by the stop, passed back to the debuggee on resume.
    pub fn signal(&self) -> Signal {
        match *self {
            StopEvent::Signal { signal, .. } => signal,
            StopEvent::Library { .. } => Signal::SIGTRAP,
            StopEvent::Exited { .. } => Signal::SIGTERM,
            StopEvent::Killed { signal, .. } => signal,
        }
    }

    /// Whether the process is gone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopEvent::Exited { .. } | StopEvent::Killed { .. })
    }
}
