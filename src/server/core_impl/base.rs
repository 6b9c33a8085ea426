use super::prelude::*;
use crate::protocol::commands::ext::Base;

use core::num::NonZeroUsize;

use crate::arch::Machine;
use crate::protocol::commands::_h_upcase::Op;
use crate::protocol::IdKind;
use crate::server::core_impl::{register_bytes, DisconnectReason};
use crate::session::pump;

/// Memory is read from the debuggee in chunks of this size.
const MEM_CHUNK: usize = 32;

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_base<'a>(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: Base<'a>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let handler_status = match command {
            // ------------------ Handshaking and Queries ------------------- //
            Base::qSupported(cmd) => {
                for feature in cmd.features.into_iter() {
                    trace!("client feature: {:?}", feature);
                }

                res.write_str("PacketSize=")?;
                res.write_num(self.packet_size)?;

                if self.no_ack_allowed {
                    res.write_str(";QStartNoAckMode+")?;
                }
                res.write_str(";qXfer:libraries:read+")?;
                res.write_str(";qXfer:threads:read+")?;
                res.write_str(";qXfer:features:read+")?;
                res.write_str(";qXfer:exec-file:read+")?;
                res.write_str(";vContSupported+")?;
                res.write_str(";swbreak+")?;

                let machine = session.current_process().map(|p| p.backend().machine());
                if let Some(Machine::I386) | Some(Machine::Amd64) = machine {
                    res.write_str(";hwbreak+")?;
                }

                HandlerStatus::Handled
            }
            Base::QuestionMark(_) => match self.write_stop_reply(res, target, session)? {
                Some(reason) => HandlerStatus::Disconnect(reason),
                None => HandlerStatus::Handled,
            },
            Base::qAttached(_) => {
                let process = session
                    .current_process()
                    .ok_or(Error::NonFatalError(errno::ESRCH))?;
                res.write_str(if process.is_attached() { "1" } else { "0" })?;
                HandlerStatus::Handled
            }
            Base::qSymbol(_) => HandlerStatus::NeedsOk,
            Base::qTStatus(_) => {
                // no trace experiment is ever running
                res.write_str("T0")?;
                HandlerStatus::Handled
            }

            // -------------------- "Core" Functionality -------------------- //
            Base::D(cmd) => {
                let pid = match cmd.pid.and_then(NonZeroUsize::new) {
                    Some(pid) => pid,
                    None => session
                        .current_pid()
                        .ok_or(Error::NonFatalError(errno::ESRCH))?,
                };
                pump::release_process(target, session, pid, false).handle_error()?;
                res.write_str("OK")?;
                HandlerStatus::Disconnect(DisconnectReason::Disconnect)
            }
            Base::k(_) => {
                if let Some(pid) = session.current_pid() {
                    if let Err(e) = pump::release_process(target, session, pid, true) {
                        warn!("cannot kill process {}: {}", pid, e);
                    }
                }
                HandlerStatus::Disconnect(DisconnectReason::Kill)
            }
            Base::g(_) => {
                let (process, tid) = self.mem_thread(session)?;
                let ctx = process.read_context(target, tid).handle_error()?;
                let bytes = ctx.as_bytes();
                let len = register_bytes(process.backend()).min(bytes.len());
                res.write_hex_buf(&bytes[..len])?;
                HandlerStatus::Handled
            }
            Base::G(cmd) => {
                let (process, tid) = self.mem_thread(session)?;
                let len = register_bytes(process.backend());
                let mut ctx = process.read_context(target, tid).handle_error()?;
                match ctx.as_bytes_mut().get_mut(..len) {
                    Some(regs) if cmd.vals.len() == len => regs.copy_from_slice(cmd.vals),
                    _ => return Err(Error::NonFatalError(errno::EINVAL)),
                }
                process.write_context(target, tid, &ctx).handle_error()?;
                HandlerStatus::NeedsOk
            }
            Base::m(cmd) => {
                let (process, _) = self.mem_thread(session)?;
                let pid = process.pid();

                // every byte costs two hex digits
                let len = cmd.len.min(self.packet_size / 2);
                let mut buf = [0u8; MEM_CHUNK];
                let mut addr = cmd.addr;
                let mut remaining = len;
                let mut total = 0;
                while remaining > 0 {
                    let chunk = remaining.min(MEM_CHUNK);
                    let n = match target.read_memory(pid, addr, &mut buf[..chunk]) {
                        Ok(n) => n.min(chunk),
                        Err(e) => {
                            debug!("read of {:#x} failed: {}", addr, e);
                            0
                        }
                    };
                    if n == 0 {
                        break;
                    }

                    session.xpoints().unshadow(pid, addr, &mut buf[..n]);
                    res.write_hex_buf(&buf[..n])?;

                    total += n;
                    remaining -= n;
                    addr = addr.wrapping_add(n as u64);
                    if n < chunk {
                        break;
                    }
                }

                if total == 0 && len != 0 {
                    return Err(Error::NonFatalError(errno::EFAULT));
                }
                HandlerStatus::Handled
            }
            Base::M(cmd) => {
                if cmd.val.len() != cmd.len {
                    return Err(Error::NonFatalError(errno::EINVAL));
                }
                let (process, _) = self.mem_thread(session)?;
                let pid = process.pid();

                let n = target.write_memory(pid, cmd.addr, cmd.val).handle_error()?;
                if let Some((process, xpoints)) = session.current_with_xpoints() {
                    xpoints.reshadow(target, process, cmd.addr, &cmd.val[..n.min(cmd.len)]);
                }
                if n < cmd.len {
                    return Err(Error::NonFatalError(errno::EFAULT));
                }
                HandlerStatus::NeedsOk
            }

            // ------------------- Multi-threading Support ------------------ //
            Base::H(cmd) => {
                let process = session
                    .current_process()
                    .ok_or(Error::NonFatalError(errno::ESRCH))?;
                if let Some(tid) = cmd.thread.tid.specific() {
                    if process.thread(tid).is_none() {
                        return Err(Error::NonFatalError(errno::ESRCH));
                    }
                }

                match cmd.kind {
                    Op::Other => self.current_mem_tid = cmd.thread.tid.specific(),
                    Op::StepContinue => self.current_resume_tid = cmd.thread.tid,
                }
                HandlerStatus::NeedsOk
            }
            Base::qC(_) => {
                let (_, tid) = self.mem_thread(session)?;
                res.write_str("QC")?;
                res.write_num(tid.get())?;
                HandlerStatus::Handled
            }
            Base::qfThreadInfo(_) => {
                let mut tids = session
                    .current_process()
                    .into_iter()
                    .flat_map(|p| p.thread_ids())
                    .peekable();

                if tids.peek().is_none() {
                    res.write_str("l")?;
                } else {
                    res.write_str("m")?;
                    let mut first = true;
                    for tid in tids {
                        if !first {
                            res.write_str(",")?;
                        }
                        first = false;
                        res.write_num(tid.get())?;
                    }
                }
                HandlerStatus::Handled
            }
            Base::qsThreadInfo(_) => {
                res.write_str("l")?;
                HandlerStatus::Handled
            }
            Base::qGetTIBAddr(cmd) => {
                let teb = cmd
                    .thread
                    .tid
                    .specific()
                    .and_then(|tid| session.current_process()?.thread(tid))
                    .map(|t| t.teb)
                    .ok_or(Error::NonFatalError(errno::ESRCH))?;
                res.write_num(teb)?;
                HandlerStatus::Handled
            }
            Base::T(cmd) => {
                let tid = match cmd.thread.tid {
                    IdKind::WithId(tid) => tid,
                    IdKind::All | IdKind::Any => return Err(Error::NonFatalError(errno::EINVAL)),
                };
                let alive = session
                    .current_process()
                    .map_or(false, |p| p.thread(tid).is_some());
                if !alive {
                    return Err(Error::NonFatalError(errno::ESRCH));
                }
                HandlerStatus::NeedsOk
            }
        };
        Ok(handler_status)
    }
}
