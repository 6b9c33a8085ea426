//! A GDB Remote Serial Protocol proxy: expose a live, OS-level debuggee to a
//! GDB client.
//!
//! `gdbproxy` sits between a GDB client and the operating system's debugging
//! facilities. The client speaks RSP over a TCP socket; the proxy translates
//! every request into operations on a [`Target`](target::Target) (memory and
//! register access, thread resumption, debug events), and keeps track of
//! breakpoints, watchpoints and single-stepping on the client's behalf.
//!
//! The main pieces are:
//!
//! - [`arch`]: CPU backends (register layouts, breakpoint encodings, debug
//!   register allocation), one per supported architecture.
//! - [`session`]: the processes and threads being debugged, and the debug
//!   event [`pump`](session::pump).
//! - [`xpoint`]: the breakpoint/watchpoint registry.
//! - [`server`]: the RSP server itself.
//! - `native`: a Linux `ptrace` implementation of [`Target`](target::Target).
//!
//! ## Getting started
//!
//! ```rust,ignore
//! let mut target = NativeTarget::spawn("/usr/bin/true", &[])?;
//! let mut session = DebugSession::new();
//! pump::wait_for_first_stop(&mut target, &mut session, Duration::from_millis(100))?;
//!
//! let (stream, _) = TcpListener::bind("127.0.0.1:9001")?.accept()?;
//! GdbServer::new(stream).run(&mut target, &mut session)?;
//! ```
//!
//! ## Feature flags
//!
//! - `std` (default): `impl Connection` for `TcpStream`.
//! - `trace-pkt` (default): log every packet sent and received at `trace`
//!   level.
//! - `native` (default): the Linux x86-64 `ptrace` target.

#![allow(clippy::type_complexity)]

#[macro_use]
extern crate log;

pub use gdbproxy_arch as arch;

pub mod common;
pub mod conn;
pub mod protocol;
pub mod server;
pub mod session;
pub mod target;
pub mod xpoint;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "native", target_os = "linux", target_arch = "x86_64"))] {
        pub mod native;
    }
}

#[cfg(test)]
mod test_util;
