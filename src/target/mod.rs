//! The [`Target`] trait: everything the server needs from the operating
//! system's debugging facilities.
//!
//! A `Target` is deliberately thin. It knows nothing about breakpoints,
//! register layouts or the wire protocol; it only moves bytes between the
//! server and the debuggee, delivers [`DebugEvent`]s, and resumes threads.
//! Everything else is built on top of it by the [`session`](crate::session),
//! the [`xpoint`](crate::xpoint) registry and the CPU backends.
//!
//! ## Target Extensions
//!
//! Optional functionality is exposed via _Inlineable Dyn Extension Traits_
//! (IDETs): a `support_<ext>` method returning
//! `Option<<Ext>Ops<'_>>`. The default implementation returns `None`; a
//! target opts in by implementing the extension trait and returning
//! `Some(self)`:
//!
//! ```rust,ignore
//! impl Target for MyTarget {
//!     // ...
//!     fn support_monitor_cmd(&mut self) -> Option<MonitorCmdOps<'_>> {
//!         Some(self)
//!     }
//! }
//!
//! impl MonitorCmd for MyTarget {
//!     // ...
//! }
//! ```

use std::time::Duration;

use crate::arch::{InsnClassifier, OsError, RegisterContext};
use crate::common::{Pid, Signal, Tid};
use crate::session::DebugEvent;

pub mod ext;

use ext::memory_regions::MemoryRegionsOps;
use ext::monitor_cmd::MonitorCmdOps;
use ext::section_offsets::SectionOffsetsOps;
use ext::thread_extra_info::ThreadExtraInfoOps;

/// How a stopped thread should be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Swallow the event that stopped the thread.
    Continue,
    /// Pass the signal through to the debuggee.
    Deliver(Signal),
}

/// OS-level debugging operations consumed by the server.
pub trait Target {
    /// Block for up to `timeout` (forever if `None`) waiting for the next
    /// debug event.
    ///
    /// Returns `Ok(None)` on a clean timeout. Any error is fatal: the
    /// debuggee is considered gone.
    fn wait_for_event(&mut self, timeout: Option<Duration>) -> Result<Option<DebugEvent>, OsError>;

    /// Release a stopped thread.
    fn resume_thread(&mut self, pid: Pid, tid: Tid, disposition: Disposition)
        -> Result<(), OsError>;

    /// Fill `ctx` with the register state of a stopped thread.
    fn read_context(&mut self, pid: Pid, tid: Tid, ctx: &mut RegisterContext)
        -> Result<(), OsError>;

    /// Commit `ctx` to a stopped thread.
    fn write_context(&mut self, pid: Pid, tid: Tid, ctx: &RegisterContext) -> Result<(), OsError>;

    /// Read debuggee memory, returning how many leading bytes were read.
    ///
    /// A read that fails on the very first byte should return an error.
    fn read_memory(&mut self, pid: Pid, addr: u64, buf: &mut [u8]) -> Result<usize, OsError>;

    /// Write debuggee memory, returning how many leading bytes were written.
    fn write_memory(&mut self, pid: Pid, addr: u64, data: &[u8]) -> Result<usize, OsError>;

    /// Force a running debuggee to stop. The stop is reported through
    /// [`wait_for_event`](Self::wait_for_event).
    fn break_in(&mut self, pid: Pid) -> Result<(), OsError>;

    /// Kill the debuggee.
    fn terminate(&mut self, pid: Pid) -> Result<(), OsError>;

    /// Stop debugging the process and let it run freely.
    fn detach(&mut self, pid: Pid) -> Result<(), OsError>;

    /// Whether the process was attached to (as opposed to spawned).
    fn is_attached(&self, pid: Pid) -> bool {
        let _ = pid;
        false
    }

    /// Support for `monitor wnd` / `monitor proc` text producers.
    #[inline(always)]
    fn support_monitor_cmd(&mut self) -> Option<MonitorCmdOps<'_>> {
        None
    }

    /// Support for `monitor mem`.
    #[inline(always)]
    fn support_memory_regions(&mut self) -> Option<MemoryRegionsOps<'_>> {
        None
    }

    /// Support for richer `qThreadExtraInfo` replies.
    #[inline(always)]
    fn support_thread_extra_info(&mut self) -> Option<ThreadExtraInfoOps<'_>> {
        None
    }

    /// Support for `qOffsets`.
    #[inline(always)]
    fn support_section_offsets(&mut self) -> Option<SectionOffsetsOps<'_>> {
        None
    }

    /// Disassembler used to classify instructions during range stepping.
    #[inline(always)]
    fn support_insn_classifier(&mut self) -> Option<&mut dyn InsnClassifier> {
        None
    }
}
