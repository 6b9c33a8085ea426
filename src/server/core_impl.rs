use core::marker::PhantomData;
use std::time::Duration;

use crate::arch::{CpuBackend, Memory, OsError, XpointKind};
use crate::common::{Signal, Tid};
use crate::conn::{Connection, ConnectionExt};
use crate::protocol::commands::Command;
use crate::protocol::{IdKind, Packet, QxferBuffer, ReplyBuffer, ResponseWriter};
use crate::server::error::GdbServerError as Error;
use crate::session::pump::{self, Controller, ThreadFilter, WaitStatus};
use crate::session::{DebugSession, ExceptionCode, Process, StopEvent};
use crate::target::Target;
use crate::xpoint::Triggered;

/// Common imports used by >50% of all handlers.
///
/// Do not clutter this prelude with types only used by a few handlers.
mod prelude {
    pub(super) use super::errno;
    pub(super) use crate::conn::Connection;
    pub(super) use crate::protocol::ResponseWriter;
    pub(super) use crate::server::core_impl::{GdbServerImpl, HandlerStatus};
    pub(super) use crate::server::error::GdbServerError as Error;
    pub(super) use crate::server::target_result_ext::TargetResultExt;
    pub(super) use crate::session::DebugSession;
    pub(super) use crate::target::Target;
}

mod base;
mod monitor_cmd;
mod no_ack_mode;
mod qxfer;
mod resume;
mod section_offsets;
mod single_register_access;
mod target_xml;
mod thread_extra_info;
mod xpoints;

/// POSIX error numbers used in `E<errno>` replies.
pub(crate) mod errno {
    pub const ENOENT: u8 = 2;
    pub const ESRCH: u8 = 3;
    pub const EFAULT: u8 = 14;
    pub const EINVAL: u8 = 22;
}

/// Describes why the debugging session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Target exited with given status code
    TargetExited(u8),
    /// Target terminated with given signal
    TargetTerminated(Signal),
    /// GDB issued a disconnect command
    Disconnect,
    /// GDB issued a kill command
    Kill,
    /// The controller connection went away while the debuggee was running.
    /// The debuggee has been killed.
    ControllerHangup,
}

pub enum State {
    Pump,
    Disconnect(DisconnectReason),
}

pub enum HandlerStatus {
    Handled,
    NeedsOk,
    /// The debuggee was resumed. The reply is the next stop reply.
    Resumed,
    Disconnect(DisconnectReason),
}

/// An active `vCont;r` request.
#[derive(Debug, Clone, Copy)]
struct RangeStep {
    tid: Tid,
    start: u64,
    end: u64,
    filter: ThreadFilter,
}

/// Size of the register block exchanged by `g`/`G`.
pub(crate) fn register_bytes(backend: &dyn CpuBackend) -> usize {
    backend
        .register_map()
        .last()
        .map(|r| r.offset + r.size)
        .unwrap_or(0)
}

pub(crate) struct GdbServerImpl<C: Connection> {
    _connection: PhantomData<C>,

    features: ProtocolFeatures,
    no_ack_allowed: bool,
    packet_size: usize,

    /// Thread selected by `Hg`. Falls back to the thread that reported the
    /// last stop.
    current_mem_tid: Option<Tid>,
    /// Thread selected by `Hc`.
    current_resume_tid: IdKind,

    qxfer: QxferBuffer,
    range_step: Option<RangeStep>,
    last_triggered: Vec<Triggered>,
}

impl<C: Connection> GdbServerImpl<C> {
    pub fn new(packet_size: usize, no_ack_allowed: bool) -> GdbServerImpl<C> {
        GdbServerImpl {
            _connection: PhantomData,

            features: ProtocolFeatures::empty(),
            no_ack_allowed,
            packet_size,

            current_mem_tid: None,
            current_resume_tid: IdKind::All,

            qxfer: QxferBuffer::new(),
            range_step: None,
            last_triggered: Vec::new(),
        }
    }

    pub fn handle_packet(
        &mut self,
        conn: &mut C,
        reply: &mut ReplyBuffer,
        target: &mut dyn Target,
        session: &mut DebugSession,
        packet: Packet<'_>,
    ) -> Result<State, Error<C::Error>> {
        match packet {
            Packet::Ack => Ok(State::Pump),
            Packet::Nack => {
                debug!("<-- nack, retransmitting");
                conn.write_all(reply.last_sent())
                    .map_err(Error::ConnectionWrite)?;
                conn.flush().map_err(Error::ConnectionWrite)?;
                Ok(State::Pump)
            }
            Packet::Interrupt => {
                debug!("<-- interrupt packet while stopped, ignoring");
                Ok(State::Pump)
            }
            Packet::Command(command) => {
                // Acknowledge the command
                if !self.features.no_ack_mode() {
                    conn.write(b'+').map_err(Error::ConnectionWrite)?;
                }

                let mut res = ResponseWriter::new(conn, reply);
                let disconnect_reason =
                    match self.handle_command(&mut res, target, session, command) {
                        Ok(HandlerStatus::Handled) => None,
                        Ok(HandlerStatus::NeedsOk) => {
                            res.write_str("OK")?;
                            None
                        }
                        Ok(HandlerStatus::Resumed) => {
                            res.as_conn().flush().map_err(Error::ConnectionWrite)?;
                            return Ok(State::Pump);
                        }
                        Ok(HandlerStatus::Disconnect(reason)) => Some(reason),
                        // HACK: handling this "dummy" error is required as part of the
                        // `TargetResultExt::handle_error()` machinery.
                        Err(Error::NonFatalError(code)) => {
                            res.reset();
                            res.write_str("E")?;
                            res.write_hex(code)?;
                            None
                        }
                        Err(e) => return Err(e),
                    };

                // every response needs to be flushed, _except_ for the response to a kill
                // packet
                if disconnect_reason != Some(DisconnectReason::Kill) {
                    res.flush()?;
                } else {
                    res.as_conn().flush().map_err(Error::ConnectionWrite)?;
                }

                let state = match disconnect_reason {
                    Some(reason) => State::Disconnect(reason),
                    None => State::Pump,
                };

                Ok(state)
            }
        }
    }

    /// Answer a packet whose checksum matched but whose arguments did not
    /// parse.
    pub fn reject_malformed(
        &mut self,
        conn: &mut C,
        reply: &mut ReplyBuffer,
    ) -> Result<(), Error<C::Error>> {
        warn!("malformed command");
        if !self.features.no_ack_mode() {
            conn.write(b'+').map_err(Error::ConnectionWrite)?;
        }
        let mut res = ResponseWriter::new(conn, reply);
        res.write_str("E")?;
        res.write_hex(errno::EINVAL)?;
        res.flush()?;
        Ok(())
    }

    /// Ask for a corrupted packet to be sent again.
    pub fn request_retransmit(&mut self, conn: &mut C) -> Result<(), Error<C::Error>> {
        if self.features.no_ack_mode() {
            return Ok(());
        }
        conn.write(b'-').map_err(Error::ConnectionWrite)?;
        conn.flush().map_err(Error::ConnectionWrite)
    }

    fn handle_command(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        cmd: Command<'_>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        match cmd {
            // `handle_X` methods are defined in the `core_impl` submodules
            Command::Base(cmd) => self.handle_base(res, target, session, cmd),
            Command::Resume(cmd) => self.handle_stop_resume(target, session, res, cmd),
            Command::Xpoints(cmd) => self.handle_xpoints(target, session, cmd),
            Command::SingleRegisterAccess(cmd) => {
                self.handle_single_register_access(res, target, session, cmd)
            }
            Command::NoAckMode(cmd) => self.handle_no_ack_mode(cmd),
            Command::MonitorCmd(cmd) => self.handle_monitor_cmd(res, target, session, cmd),
            Command::SectionOffsets(cmd) => self.handle_section_offsets(res, target, session, cmd),
            Command::ThreadExtraInfo(cmd) => {
                self.handle_thread_extra_info(res, target, session, cmd)
            }
            Command::Qxfer(cmd) => self.handle_qxfer(res, session, cmd),
            Command::Unknown(cmd) => {
                info!("Unknown command: {:?}", core::str::from_utf8(cmd));
                Ok(HandlerStatus::Handled)
            }
        }
    }

    /// The current process, and the thread register and memory commands
    /// apply to.
    pub(crate) fn mem_thread<'s>(
        &self,
        session: &'s DebugSession,
    ) -> Result<(&'s Process, Tid), Error<C::Error>> {
        let process = session
            .current_process()
            .ok_or(Error::NonFatalError(errno::ESRCH))?;
        let tid = self
            .current_mem_tid
            .filter(|tid| process.thread(*tid).is_some())
            .or_else(|| session.stopped_thread())
            .or_else(|| process.thread_ids().next())
            .ok_or(Error::NonFatalError(errno::ESRCH))?;
        Ok((process, tid))
    }

    /// Write the stop reply for the session's last stop.
    ///
    /// Returns the reason the session must end, if the debuggee is gone.
    pub(crate) fn write_stop_reply(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &DebugSession,
    ) -> Result<Option<DisconnectReason>, Error<C::Error>> {
        let stop = match session.last_stop() {
            Some(stop) => stop.clone(),
            None => match session.current_process() {
                Some(process) => match process.thread_ids().next() {
                    Some(tid) => StopEvent::Signal {
                        pid: process.pid(),
                        tid,
                        signal: Signal::SIGTRAP,
                        code: None,
                        sw_break: false,
                    },
                    None => StopEvent::Exited {
                        pid: process.pid(),
                        code: 0,
                    },
                },
                None => {
                    res.write_str("W00")?;
                    return Ok(Some(DisconnectReason::TargetExited(0)));
                }
            },
        };

        match stop {
            StopEvent::Signal {
                tid,
                signal,
                sw_break,
                ..
            } => {
                // gdb expects register access to follow the reporting thread
                self.current_mem_tid = Some(tid);

                res.write_str("T")?;
                res.write_hex(signal.0)?;
                res.write_str("thread:")?;
                res.write_num(tid.get())?;
                res.write_str(";")?;

                if sw_break {
                    res.write_str("swbreak:;")?;
                }
                for t in &self.last_triggered {
                    let key = match t.kind {
                        XpointKind::HwExec => {
                            res.write_str("hwbreak:;")?;
                            continue;
                        }
                        XpointKind::WriteWatch => "watch:",
                        XpointKind::ReadWatch => "rwatch:",
                        XpointKind::Break => continue,
                    };
                    res.write_str(key)?;
                    res.write_num(t.addr)?;
                    res.write_str(";")?;
                }

                write_expedited(res, target, session, tid)?;
                Ok(None)
            }
            StopEvent::Library { .. } => {
                res.write_str("T05library:;")?;
                Ok(None)
            }
            StopEvent::Exited { code, .. } => {
                res.write_str("W")?;
                res.write_hex(code as u8)?;
                Ok(Some(DisconnectReason::TargetExited(code as u8)))
            }
            StopEvent::Killed { signal, .. } => {
                res.write_str("X")?;
                res.write_hex(signal.0)?;
                Ok(Some(DisconnectReason::TargetTerminated(signal)))
            }
        }
    }

    /// Keep a `vCont;r` going while the stepping thread stays inside its
    /// range. Returns `true` if the debuggee was resumed again.
    fn continue_range_step(&mut self, target: &mut dyn Target, session: &mut DebugSession) -> bool {
        let range = match self.range_step.take() {
            Some(range) => range,
            None => return false,
        };

        let (pid, tid) = match session.last_stop() {
            Some(StopEvent::Signal {
                pid,
                tid,
                code: Some(ExceptionCode::SingleStep),
                ..
            }) if *tid == range.tid => (*pid, *tid),
            _ => return false,
        };
        let process = match session.process(pid) {
            Some(process) => process,
            None => return false,
        };
        let backend = process.backend();

        let pc = match process.read_context(target, tid) {
            Ok(ctx) => match backend.pc(&ctx) {
                Ok(pc) => pc,
                Err(_) => return false,
            },
            Err(e) => {
                debug!("range step: cannot read context of thread {}: {}", tid, e);
                return false;
            }
        };
        if pc < range.start || pc >= range.end {
            return false;
        }

        // hand calls and other step-over instructions back to gdb, which
        // knows how to step over them
        let mut insn = InsnBytes {
            addr: pc,
            bytes: vec![0; backend.max_insn_len()],
        };
        let n = target.read_memory(pid, pc, &mut insn.bytes).unwrap_or(0);
        insn.bytes.truncate(n);
        session.xpoints().unshadow(pid, pc, &mut insn.bytes);
        if let Some(classifier) = target.support_insn_classifier() {
            if let Some(callee) = backend.is_function_call(classifier, &mut insn, pc) {
                debug!("range step: call to {:#x} at {:#x}", callee, pc);
            }
            if backend.is_step_over_insn(classifier, &mut insn, pc) {
                debug!("range step: stopping before step-over insn at {:#x}", pc);
                return false;
            }
        }

        match pump::resume(target, session, range.filter, Some(tid), None) {
            Ok(()) => {
                self.range_step = Some(range);
                true
            }
            Err(e) => {
                warn!("range step: cannot resume: {}", e);
                false
            }
        }
    }

    fn forward_console(
        &mut self,
        conn: &mut C,
        reply: &mut ReplyBuffer,
        session: &mut DebugSession,
    ) -> Result<(), Error<C::Error>> {
        for text in session.take_console_output() {
            let mut res = ResponseWriter::new(conn, reply);
            res.write_str("O")?;
            res.write_hex_buf(text.as_bytes())?;
            res.flush()?;
        }
        Ok(())
    }
}

impl<C: ConnectionExt> GdbServerImpl<C> {
    /// Pump one debug event while the debuggee runs. Sends the stop reply
    /// once it stops.
    pub fn wait_for_stop(
        &mut self,
        conn: &mut C,
        reply: &mut ReplyBuffer,
        target: &mut dyn Target,
        session: &mut DebugSession,
        poll_interval: Duration,
    ) -> Result<Option<DisconnectReason>, Error<C::Error>> {
        let status = pump::wait_and_apply(target, session, poll_interval, || poll_controller(conn))?;
        match status {
            WaitStatus::ControllerDetached => {
                warn!("controller hung up while the debuggee was running");
                return Ok(Some(DisconnectReason::ControllerHangup));
            }
            WaitStatus::TimedOut => {
                self.forward_console(conn, reply, session)?;
                return Ok(None);
            }
            WaitStatus::Applied => self.forward_console(conn, reply, session)?,
        }

        if session.is_running() || self.continue_range_step(target, session) {
            return Ok(None);
        }
        self.range_step = None;

        let trapped = match session.last_stop() {
            Some(StopEvent::Signal { tid, .. }) => Some(*tid),
            _ => None,
        };
        self.last_triggered = match (trapped, session.current_with_xpoints()) {
            (Some(tid), Some((process, xpoints))) => xpoints.status_for_thread(target, process, tid),
            _ => Vec::new(),
        };

        let mut res = ResponseWriter::new(conn, reply);
        let reason = self.write_stop_reply(&mut res, target, session)?;
        res.flush()?;
        Ok(reason)
    }
}

/// Check the controller connection without blocking.
fn poll_controller<C: ConnectionExt>(conn: &mut C) -> Controller {
    loop {
        match conn.peek() {
            Ok(None) => return Controller::Idle,
            Ok(Some(0x03)) => {
                return match conn.read() {
                    Ok(_) => Controller::Interrupt,
                    Err(_) => Controller::Hangup,
                }
            }
            Ok(Some(byte)) => {
                if conn.read().is_err() {
                    return Controller::Hangup;
                }
                // acks of console packets
                if byte != b'+' {
                    warn!("ignoring byte {:#04x} sent while the debuggee runs", byte);
                }
            }
            Err(_) => return Controller::Hangup,
        }
    }
}

/// Send the expedited registers of `tid`. Registers that cannot be read are
/// left out.
fn write_expedited<C: Connection>(
    res: &mut ResponseWriter<'_, C>,
    target: &mut dyn Target,
    session: &DebugSession,
    tid: Tid,
) -> Result<(), Error<C::Error>> {
    let process = match session.current_process() {
        Some(process) => process,
        None => return Ok(()),
    };
    let backend = process.backend();
    let ctx = match process.read_context(target, tid) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("cannot read context of thread {}: {}", tid, e);
            return Ok(());
        }
    };

    let map = backend.register_map();
    for &regnum in backend.expedited_registers() {
        let bytes = match map.get(regnum).and_then(|entry| ctx.register(entry)) {
            Some(bytes) => bytes,
            None => continue,
        };
        res.write_num(regnum)?;
        res.write_str(":")?;
        res.write_hex_buf(bytes)?;
        res.write_str(";")?;
    }
    Ok(())
}

/// A few instruction bytes, already read from the debuggee.
struct InsnBytes {
    addr: u64,
    bytes: Vec<u8>,
}

impl Memory for InsnBytes {
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
        let start = addr
            .checked_sub(self.addr)
            .map(|off| off as usize)
            .filter(|off| *off < self.bytes.len())
            .ok_or(OsError::BadAddress(addr))?;
        let n = buf.len().min(self.bytes.len() - start);
        buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, addr: u64, _data: &[u8]) -> Result<usize, OsError> {
        Err(OsError::BadAddress(addr))
    }
}

#[derive(Copy, Clone)]
#[repr(transparent)]
struct ProtocolFeatures(u8);

// This bitflag is not part of the protocol - it is an internal implementation
// detail.
bitflags::bitflags! {
    impl ProtocolFeatures: u8 {
        const NO_ACK_MODE = 1 << 0;
    }
}

impl ProtocolFeatures {
    #[inline(always)]
    fn no_ack_mode(&self) -> bool {
        self.contains(ProtocolFeatures::NO_ACK_MODE)
    }

    #[inline(always)]
    fn set_no_ack_mode(&mut self, val: bool) {
        self.set(ProtocolFeatures::NO_ACK_MODE, val)
    }
}
