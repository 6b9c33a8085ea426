//! The core [`GdbServer`] type, used to drive a GDB debugging session for a
//! [`DebugSession`] over a given [`Connection`].
//!
//! [`Connection`]: crate::conn::Connection

use std::time::Duration;

use crate::common::Pid;
use crate::conn::ConnectionExt;
use crate::protocol::recv_packet::{RecvPacketBlocking, RecvPacketError};
use crate::protocol::{Packet, PacketParseError, ReplyBuffer};
use crate::session::{pump, DebugSession, Process};
use crate::target::Target;

mod builder;
mod core_impl;
mod error;
mod target_result_ext;

pub use builder::{
    GdbServerBuilder, GdbServerBuilderError, DEFAULT_PACKET_BUFFER_SIZE, DEFAULT_POLL_INTERVAL,
};
pub use core_impl::DisconnectReason;
pub use error::GdbServerError;

use core_impl::{GdbServerImpl, State};
use GdbServerError as Error;

/// Serve a [`DebugSession`] to a GDB client using the GDB Remote Serial
/// Protocol over a given [`Connection`].
///
/// [`Connection`]: crate::conn::Connection
pub struct GdbServer<C: ConnectionExt> {
    conn: C,
    packet_buffer_size: usize,
    poll_interval: Duration,
    inner: GdbServerImpl<C>,
}

impl<C: ConnectionExt> GdbServer<C> {
    /// Create a [`GdbServerBuilder`] using the provided Connection.
    pub fn builder(conn: C) -> GdbServerBuilder<C> {
        GdbServerBuilder::new(conn)
    }

    /// Create a new `GdbServer` using the provided connection and the default
    /// options.
    pub fn new(conn: C) -> GdbServer<C> {
        GdbServer {
            conn,
            packet_buffer_size: DEFAULT_PACKET_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            inner: GdbServerImpl::new(DEFAULT_PACKET_BUFFER_SIZE, true),
        }
    }

    /// Run the session until the client disconnects or the debuggee goes
    /// away.
    ///
    /// The debuggee must already be stopped, e.g. via
    /// [`pump::wait_for_first_stop`]. If the session ends with an error, or
    /// the client hangs up while the debuggee runs, every debuggee is killed.
    pub fn run(
        mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
    ) -> Result<DisconnectReason, Error<C::Error>> {
        let res = self.run_inner(target, session);
        match &res {
            Ok(DisconnectReason::ControllerHangup) => release_all(target, session),
            Err(e) => {
                if e.is_connection_error() {
                    error!("lost the connection to the client");
                } else {
                    error!("debugging session failed");
                }
                release_all(target, session);
            }
            Ok(reason) => info!("session ended: {:?}", reason),
        }
        res
    }

    fn run_inner(
        &mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
    ) -> Result<DisconnectReason, Error<C::Error>> {
        let GdbServer {
            conn,
            packet_buffer_size,
            poll_interval,
            inner,
        } = self;

        conn.on_session_start().map_err(Error::ConnectionInit)?;

        // room for the `$`, the `#` and the checksum
        let max_len = *packet_buffer_size + 4;
        let mut reply = ReplyBuffer::new();
        let mut packet_buffer = Vec::with_capacity(max_len);
        let mut recv = RecvPacketBlocking::new(max_len);

        loop {
            if session.is_running() {
                if let Some(reason) =
                    inner.wait_for_stop(conn, &mut reply, target, session, *poll_interval)?
                {
                    return Ok(reason);
                }
                continue;
            }

            let buf = match recv.recv(&mut packet_buffer, || conn.read()) {
                Ok(buf) => buf,
                Err(RecvPacketError::Capacity) => return Err(Error::PacketBufferOverflow),
                Err(RecvPacketError::Connection(e)) => return Err(Error::ConnectionRead(e)),
            };

            let packet = match Packet::from_buf(buf) {
                Ok(packet) => packet,
                Err(PacketParseError::UnexpectedHeader(byte)) => {
                    warn!("ignoring stray byte {:#04x}", byte);
                    continue;
                }
                Err(PacketParseError::MalformedCommand) => {
                    inner.reject_malformed(conn, &mut reply)?;
                    continue;
                }
                Err(e) => {
                    warn!("bad packet: {:?}", e);
                    inner.request_retransmit(conn)?;
                    continue;
                }
            };

            match inner.handle_packet(conn, &mut reply, target, session, packet)? {
                State::Pump => {}
                State::Disconnect(reason) => return Ok(reason),
            }
        }
    }
}

/// Kill every debuggee of the session.
fn release_all(target: &mut dyn Target, session: &mut DebugSession) {
    let pids: Vec<Pid> = session.processes().iter().map(Process::pid).collect();
    for pid in pids {
        if let Err(e) = pump::release_process(target, session, pid, true) {
            warn!("cannot kill process {}: {}", pid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::arch::Machine;
    use crate::common::Tid;
    use crate::protocol::{frame, unescape, verify};
    use crate::session::{DebugEvent, ExceptionCode};
    use crate::target::ext::memory_regions::{Protection, RegionKind, RegionState};
    use crate::test_util::{MockConnection, MockTarget};

    fn id(n: usize) -> Tid {
        Tid::new(n).unwrap()
    }

    fn pkt(body: &str) -> Vec<u8> {
        frame(body.as_bytes())
    }

    /// Payloads of every packet in `output`, ignoring acks.
    fn replies(output: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = output;
        while let Some(start) = rest.iter().position(|b| *b == b'$') {
            let hash = start + rest[start..].iter().position(|b| *b == b'#').unwrap();
            let payload = verify(&rest[start..hash + 3]).expect("bad checksum");
            out.push(String::from_utf8(unescape(payload)).unwrap());
            rest = &rest[hash + 3..];
        }
        out
    }

    fn stopped(machine: Machine) -> (MockTarget, DebugSession) {
        let mut target = MockTarget::new(machine);
        target.add_thread(id(7));
        target.map_memory(0x401000, &[0x90; 16]);
        target.set_pc(id(7), 0x401000);
        target.push_event(DebugEvent::ProcessCreate {
            pid: id(7),
            tid: id(7),
            machine,
            image_name: Some("/usr/bin/demo".into()),
            teb: 0x7ff000,
            base: 0x400000,
        });
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(7),
            code: ExceptionCode::Breakpoint,
            address: 0x401000,
            first_chance: true,
        });

        let mut session = DebugSession::new();
        pump::wait_for_first_stop(&mut target, &mut session, Duration::from_millis(1)).unwrap();
        (target, session)
    }

    /// Feed `packets` (terminated by a kill) to a server and return its
    /// replies.
    fn serve(target: &mut MockTarget, session: &mut DebugSession, packets: &[&str]) -> Vec<String> {
        let mut input = Vec::new();
        for p in packets {
            input.extend_from_slice(&pkt(p));
        }
        input.extend_from_slice(&pkt("k"));

        let mut conn = MockConnection::new(&input);
        let reason = GdbServer::new(&mut conn).run(target, session).unwrap();
        assert_eq!(reason, DisconnectReason::Kill);
        replies(conn.output())
    }

    #[test]
    fn handshake() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let replies = serve(
            &mut target,
            &mut session,
            &["qSupported:multiprocess+;swbreak+", "?", "qC", "qfThreadInfo", "qsThreadInfo", "vMustReplyEmpty"],
        );

        assert_eq!(
            replies[0],
            "PacketSize=1000;QStartNoAckMode+;qXfer:libraries:read+;qXfer:threads:read+;\
             qXfer:features:read+;qXfer:exec-file:read+;vContSupported+;swbreak+;hwbreak+"
        );
        assert!(replies[1].starts_with("T05thread:07;"), "{}", replies[1]);
        // rip is expedited
        assert!(replies[1].contains(";10:0010400000000000;"), "{}", replies[1]);
        assert_eq!(replies[2], "QC07");
        assert_eq!(replies[3], "m07");
        assert_eq!(replies[4], "l");
        assert_eq!(replies[5], "");
        assert!(target.terminated);
    }

    #[test]
    fn breakpoints_are_invisible_to_memory_reads() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let replies = serve(
            &mut target,
            &mut session,
            &[
                "Z0,401004,1",
                "m401000,8",
                "z0,401004,1",
                "z0,401004,1",
                "Z9,401004,1",
                "z7,401004,1",
            ],
        );

        assert_eq!(replies[0], "OK");
        assert_eq!(replies[1], "9090909090909090");
        assert_eq!(replies[2], "OK");
        assert_eq!(replies[3], "E02");
        // unknown xpoint types
        assert_eq!(replies[4], "E16");
        assert_eq!(replies[5], "E16");
    }

    #[test]
    fn memory_errors() {
        let (mut target, mut session) = stopped(Machine::I386);
        let replies = serve(
            &mut target,
            &mut session,
            &["m10,4", "M401000,2:aabbcc", "M401000,2:aabb", "m401000,4", "m40100e,8"],
        );
        assert_eq!(replies[0], "E0e");
        assert_eq!(replies[1], "E16");
        assert_eq!(replies[2], "OK");
        assert_eq!(replies[3], "aabb9090");
        // partial reads return what was readable
        assert_eq!(replies[4], "9090");
    }

    #[test]
    fn register_access() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let rip = Machine::Amd64.backend().pc_regnum();
        let replies = serve(
            &mut target,
            &mut session,
            &[
                &format!("p{:x}", rip),
                &format!("P{:x}=0810400000000000", rip),
                &format!("p{:x}", rip),
                "P1000=00",
                &format!("P{:x}=00", rip),
            ],
        );
        assert_eq!(replies[0], "0010400000000000");
        assert_eq!(replies[1], "OK");
        assert_eq!(replies[2], "0810400000000000");
        assert_eq!(replies[3], "E16");
        assert_eq!(replies[4], "E16");
        assert_eq!(target.pc(id(7)), 0x401008);
    }

    #[test]
    fn whole_register_block() {
        let (mut target, mut session) = stopped(Machine::Arm64);
        let replies = serve(&mut target, &mut session, &["g", "G00"]);
        let len = core_impl::register_bytes(Machine::Arm64.backend());
        assert_eq!(replies[0].len(), len * 2);
        assert_eq!(replies[1], "E16");
    }

    #[test]
    fn malformed_and_corrupt_packets() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let mut input = b"$qC#00".to_vec();
        input.extend_from_slice(&pkt("m401000"));
        input.extend_from_slice(b"x");
        input.extend_from_slice(&pkt("k"));

        let mut conn = MockConnection::new(&input);
        let reason = GdbServer::new(&mut conn)
            .run(&mut target, &mut session)
            .unwrap();
        assert_eq!(reason, DisconnectReason::Kill);

        let out = conn.output();
        assert!(out.starts_with(b"-+$E16#"), "{:?}", String::from_utf8_lossy(out));
    }

    #[test]
    fn no_ack_mode() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let mut input = pkt("QStartNoAckMode");
        input.extend_from_slice(b"+");
        input.extend_from_slice(&pkt("qC"));
        input.extend_from_slice(&pkt("QStartNoAckMode"));
        input.extend_from_slice(&pkt("k"));

        let mut conn = MockConnection::new(&input);
        GdbServer::new(&mut conn)
            .run(&mut target, &mut session)
            .unwrap();

        let out = String::from_utf8(conn.output().to_vec()).unwrap();
        // only the first packet is acknowledged
        assert_eq!(out.matches('+').count(), 1);
        assert_eq!(replies(conn.output()), vec!["OK", "QC07", "OK"]);
    }

    #[test]
    fn nack_retransmits() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let mut input = pkt("qC");
        input.extend_from_slice(b"-");
        input.extend_from_slice(&pkt("k"));

        let mut conn = MockConnection::new(&input);
        GdbServer::new(&mut conn)
            .run(&mut target, &mut session)
            .unwrap();
        assert_eq!(replies(conn.output()), vec!["QC07", "QC07"]);
    }

    #[test]
    fn qxfer_paging() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let replies = serve(
            &mut target,
            &mut session,
            &[
                "qXfer:exec-file:read::0,4",
                "qXfer:exec-file:read::4,100",
                "qXfer:threads:read::0,1000",
                "qXfer:features:read:other.xml:0,100",
                "qXfer:auxv:read::0,100",
            ],
        );
        assert_eq!(replies[0], "m/usr");
        assert_eq!(replies[1], "l/bin/demo");
        assert_eq!(replies[2], r#"l<threads><thread id="7"/></threads>"#);
        assert_eq!(replies[3], "E02");
        assert_eq!(replies[4], "");
    }

    #[test]
    fn target_description_is_paged_whole() {
        let (mut target, mut session) = stopped(Machine::PowerPc);
        let mut packets = Vec::new();
        for page in 0..64 {
            packets.push(format!("qXfer:features:read:target.xml:{:x},200", page * 0x200));
        }
        let packets: Vec<&str> = packets.iter().map(String::as_str).collect();
        let replies = serve(&mut target, &mut session, &packets);

        let mut xml = String::new();
        for reply in replies {
            xml.push_str(&reply[1..]);
            if reply.starts_with('l') {
                break;
            }
        }
        assert!(xml.starts_with("<?xml"));
        assert!(xml.ends_with("</target>"));
    }

    #[test]
    fn monitor_commands() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        target.regions.push(crate::target::ext::memory_regions::MemoryRegion {
            start: 0x401000,
            size: 0x1000,
            state: RegionState::Commit,
            kind: RegionKind::Image,
            protection: Protection::READ | Protection::EXEC,
        });

        let hex = |s: &str| s.bytes().map(|b| format!("{:02x}", b)).collect::<String>();
        let replies = serve(
            &mut target,
            &mut session,
            &[
                &format!("qRcmd,{}", hex("mem")),
                &format!("qRcmd,{}", hex("bogus")),
            ],
        );

        let decode = |s: &str| {
            let bytes: Vec<u8> = (0..s.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
                .collect();
            String::from_utf8(bytes).unwrap()
        };
        // one console packet per line
        assert_eq!(decode(&replies[0][1..]), "Address  Size     State   Type    RWX\n");
        assert_eq!(decode(&replies[1][1..]), "00401000 00001000 commit  image   R X\n");
        assert_eq!(replies[2], "OK");
        assert_eq!(replies[3], "E16");
    }

    #[test]
    fn continue_until_breakpoint() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        target.set_pc(id(7), 0x401005);
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(7),
            code: ExceptionCode::Breakpoint,
            address: 0x401004,
            first_chance: true,
        });

        let replies = serve(&mut target, &mut session, &["Z0,401004,1", "c"]);
        assert_eq!(replies[0], "OK");
        assert!(
            replies[1].starts_with("T05thread:07;swbreak:;"),
            "{}",
            replies[1]
        );
        assert_eq!(target.pc(id(7)), 0x401004);
    }

    #[test]
    fn stop_reply_names_the_trapping_thread() {
        let mut target = MockTarget::new(Machine::Amd64);
        target.add_thread(id(7));
        target.add_thread(id(8));
        target.map_memory(0x401000, &[0x90; 16]);
        target.push_event(DebugEvent::ProcessCreate {
            pid: id(7),
            tid: id(7),
            machine: Machine::Amd64,
            image_name: None,
            teb: 0,
            base: 0x400000,
        });
        target.push_event(DebugEvent::ThreadCreate {
            pid: id(7),
            tid: id(8),
            teb: 0,
        });
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(7),
            code: ExceptionCode::Breakpoint,
            address: 0,
            first_chance: true,
        });
        let mut session = DebugSession::new();
        pump::wait_for_first_stop(&mut target, &mut session, Duration::from_millis(1)).unwrap();

        // thread 8 runs into the second breakpoint
        target.set_pc(id(8), 0x401009);
        target.push_event(DebugEvent::Exception {
            pid: id(7),
            tid: id(8),
            code: ExceptionCode::Breakpoint,
            address: 0x401008,
            first_chance: true,
        });

        let replies = serve(
            &mut target,
            &mut session,
            &["Z0,401004,1", "Z0,401008,1", "c", "qC"],
        );
        assert_eq!(replies[0], "OK");
        assert_eq!(replies[1], "OK");
        assert!(
            replies[2].starts_with("T05thread:08;swbreak:;"),
            "{}",
            replies[2]
        );
        assert_eq!(target.pc(id(8)), 0x401008);
        assert_eq!(replies[3], "QC08");
    }

    #[test]
    fn exit_ends_the_session() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        target.push_event(DebugEvent::ProcessExit {
            pid: id(7),
            exit_code: 3,
        });

        let mut conn = MockConnection::new(&pkt("c"));
        let reason = GdbServer::new(&mut conn)
            .run(&mut target, &mut session)
            .unwrap();
        assert_eq!(reason, DisconnectReason::TargetExited(3));
        assert_eq!(replies(conn.output()), vec!["W03"]);
    }

    #[test]
    fn rejects_foreign_signals() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let replies = serve(&mut target, &mut session, &["C0b", "vCont;x", "vCont?"]);
        assert_eq!(replies[0], "E16");
        assert_eq!(replies[1], "E16");
        assert_eq!(replies[2], "vCont;c;C;s;S;r");
        assert!(!session.is_running());
    }

    #[test]
    fn range_step_runs_until_pc_leaves_range() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        target.push_step(id(7), id(7), 0x401002);
        target.push_step(id(7), id(7), 0x401006);
        target.resumed.clear();

        let replies = serve(&mut target, &mut session, &["vCont;r401000,401004:7"]);
        assert!(replies[0].starts_with("T05thread:07;"), "{}", replies[0]);
        assert!(replies[0].contains(";10:0610400000000000;"), "{}", replies[0]);
        // one step from the packet, one to carry on from 0x401002
        assert_eq!(target.resumed.len(), 2);
        assert_eq!(target.pc(id(7)), 0x401006);
    }

    #[test]
    fn range_step_stops_before_calls() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        target.map_memory(0x401008, &[0xe8, 0, 0, 0, 0]);
        target.classify_calls = true;
        target.push_step(id(7), id(7), 0x401004);
        target.push_step(id(7), id(7), 0x401008);
        target.push_step(id(7), id(7), 0x40100d);
        target.resumed.clear();

        let replies = serve(&mut target, &mut session, &["vCont;r401000,401010:7"]);
        assert!(replies[0].starts_with("T05thread:07;"), "{}", replies[0]);
        assert!(replies[0].contains(";10:0810400000000000;"), "{}", replies[0]);
        assert_eq!(target.resumed.len(), 2);
        assert_eq!(target.pc(id(7)), 0x401008);
    }

    #[test]
    fn hangup_while_running_kills() {
        let (mut target, mut session) = stopped(Machine::Amd64);
        let mut conn = MockConnection::new(&pkt("c"));
        let reason = GdbServer::new(&mut conn)
            .run(&mut target, &mut session)
            .unwrap();
        assert_eq!(reason, DisconnectReason::ControllerHangup);
        assert!(target.terminated);
        assert!(session.processes().is_empty());
    }
}
