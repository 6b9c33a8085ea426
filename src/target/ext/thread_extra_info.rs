//! Provide extra information for a thread (`qThreadExtraInfo`).

use crate::arch::OsError;
use crate::common::{Pid, Tid};
use crate::target::Target;

/// Scheduling state of a thread, as reported to `info threads`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    /// Stopped; the value is the number of outstanding suspensions.
    Suspended(u32),
    /// Exited with the given code.
    Terminated(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub state: ThreadState,
    /// Scheduling priority (nice value), when known.
    pub priority: Option<i32>,
}

/// Target Extension - Provide extra information for a thread
pub trait ThreadExtraInfo: Target {
    /// Query the OS for a thread's state and priority.
    fn thread_info(&mut self, pid: Pid, tid: Tid) -> Result<ThreadInfo, OsError>;
}

define_ext!(ThreadExtraInfoOps, ThreadExtraInfo);
