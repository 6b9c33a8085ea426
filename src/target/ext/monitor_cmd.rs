//! Text producers for the `monitor wnd` and `monitor proc` commands.
//!
//! The server owns the `monitor` command table (`mem`, `trace`, `help` are
//! built in). The listings below describe the debuggee's host environment,
//! and are delegated to the target.

use crate::arch::OsError;
use crate::target::Target;

pub use crate::protocol::ConsoleOutput;
pub use crate::{output, outputln};

/// Target Extension - Produce human-readable listings for `monitor`.
pub trait MonitorCmd: Target {
    /// `monitor wnd` / `monitor window`: the debuggee's window hierarchy, or
    /// whatever the host's closest equivalent is.
    fn window_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError>;

    /// `monitor proc` / `monitor process`: the processes running on the
    /// host, with the debuggee marked.
    fn process_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError>;
}

define_ext!(MonitorCmdOps, MonitorCmd);
