use super::prelude::*;
use crate::protocol::commands::ext::MonitorCmd;

use log::LevelFilter;

use crate::protocol::{ConsoleOutput, ReplyBuffer};
use crate::{output, outputln};
use crate::target::ext::memory_regions::{MemoryRegion, Protection, RegionKind, RegionState};

const HELP: &str = "\
monitor commands:
  wnd, window      list the debuggee's windows
  proc, process    list processes on the host
  mem              show the debuggee's memory map
  trace            show the log level
  trace=<level>    set the log level (off, error, warn, info, debug, trace or 0-5)
  help             show this text
";

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_monitor_cmd<'a>(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: MonitorCmd<'a>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let handler_status = match command {
            MonitorCmd::qRcmd(cmd) => {
                let text = String::from_utf8_lossy(cmd.hex_cmd);
                let text = text.trim();
                debug!("monitor command: {:?}", text);

                let mut err: Result<_, Error<C::Error>> = Ok(());
                let mut scratch = ReplyBuffer::new();
                let mut callback = |msg: &[u8]| {
                    // TODO: replace this with a try block (once stabilized)
                    let e = (|| {
                        let mut res = ResponseWriter::new(res.as_conn(), &mut scratch);
                        res.write_str("O")?;
                        res.write_hex_buf(msg)?;
                        res.flush()?;
                        Ok(())
                    })();

                    if let Err(e) = e {
                        err = Err(e)
                    }
                };

                let outcome = {
                    let mut out = ConsoleOutput::new(&mut callback);
                    run_command(text, &mut out, target, session)
                };
                err?;
                outcome?;

                HandlerStatus::NeedsOk
            }
        };

        Ok(handler_status)
    }
}

fn run_command<E>(
    text: &str,
    out: &mut ConsoleOutput<'_>,
    target: &mut dyn Target,
    session: &DebugSession,
) -> Result<(), Error<E>> {
    let (name, arg) = match text.find(|c: char| c == '=' || c.is_whitespace()) {
        Some(idx) => (&text[..idx], Some(text[idx + 1..].trim())),
        None => (text, None),
    };

    match (name, arg) {
        ("wnd", None) | ("window", None) => match target.support_monitor_cmd() {
            Some(ops) => ops.window_list(out).handle_error()?,
            None => outputln!(out, "window listing is not supported on this host"),
        },
        ("proc", None) | ("process", None) => match target.support_monitor_cmd() {
            Some(ops) => ops.process_list(out).handle_error()?,
            None => outputln!(out, "process listing is not supported on this host"),
        },
        ("mem", None) => {
            let pid = session
                .current_pid()
                .ok_or(Error::NonFatalError(errno::ESRCH))?;
            match target.support_memory_regions() {
                Some(ops) => {
                    output!(out, "Address  Size     State   Type    RWX\n");
                    ops.memory_regions(pid, &mut |region| output!(out, "{}", region_row(&region)))
                        .handle_error()?;
                }
                None => outputln!(out, "memory map is not available on this host"),
            }
        }
        ("trace", None) => output!(out, "trace={:x}\n", log::max_level() as usize),
        ("trace", Some(level)) => {
            let new = parse_level(level).ok_or(Error::NonFatalError(errno::EINVAL))?;
            let old = log::max_level();
            log::set_max_level(new);
            output!(out, "trace: {:x} => {:x}\n", old as usize, new as usize);
        }
        ("help", None) | ("", None) => output!(out, "{}", HELP),
        _ => {
            info!("unknown monitor command: {:?}", text);
            return Err(Error::NonFatalError(errno::EINVAL));
        }
    }
    Ok(())
}

fn parse_level(s: &str) -> Option<LevelFilter> {
    if let Ok(level) = s.parse::<LevelFilter>() {
        return Some(level);
    }
    let n = usize::from_str_radix(s.trim_start_matches("0x"), 16).ok()?;
    LevelFilter::iter().find(|level| *level as usize == n)
}

fn region_row(region: &MemoryRegion) -> String {
    let state = match region.state {
        RegionState::Commit => "commit ",
        RegionState::Free => "free   ",
        RegionState::Reserve => "reserve",
    };

    let (kind, prot) = if region.state == RegionState::Free {
        ("       ", String::from("   "))
    } else {
        let kind = match region.kind {
            RegionKind::Image => "image  ",
            RegionKind::Mapped => "mapped ",
            RegionKind::Private => "private",
            RegionKind::Unknown => "       ",
        };
        let p = region.protection;
        let mut prot = String::with_capacity(3);
        prot.push(if p.contains(Protection::READ) { 'R' } else { ' ' });
        prot.push(if p.contains(Protection::WRITE) {
            'W'
        } else if p.contains(Protection::COPY) {
            'C'
        } else {
            ' '
        });
        prot.push(if p.contains(Protection::EXEC) { 'X' } else { ' ' });
        (kind, prot)
    };

    format!(
        "{:08x} {:08x} {} {} {}\n",
        region.start, region.size, state, kind, prot
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows() {
        let row = region_row(&MemoryRegion {
            start: 0x400000,
            size: 0x1000,
            state: RegionState::Commit,
            kind: RegionKind::Image,
            protection: Protection::READ | Protection::EXEC,
        });
        assert_eq!(row, "00400000 00001000 commit  image   R X\n");

        let row = region_row(&MemoryRegion {
            start: 0x7f0000,
            size: 0x2000,
            state: RegionState::Free,
            kind: RegionKind::Private,
            protection: Protection::READ,
        });
        assert_eq!(row, "007f0000 00002000 free               \n");

        let row = region_row(&MemoryRegion {
            start: 0x10000,
            size: 0x10000,
            state: RegionState::Commit,
            kind: RegionKind::Mapped,
            protection: Protection::READ | Protection::COPY,
        });
        assert_eq!(row, "00010000 00010000 commit  mapped  RC \n");
    }

    #[test]
    fn levels() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("0"), Some(LevelFilter::Off));
        assert_eq!(parse_level("5"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("6"), None);
        assert_eq!(parse_level("loud"), None);
    }
}
