use super::prelude::*;
use crate::protocol::commands::ext::Xpoints;

use crate::arch::XpointKind;
use crate::protocol::commands::_z::XpointArgs;

enum CmdKind {
    Add,
    Remove,
}

impl<C: Connection> GdbServerImpl<C> {
    #[inline(always)]
    fn handle_xpoint_common(
        &mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
        cmd: XpointArgs,
        cmd_kind: CmdKind,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let kind = match cmd.type_ {
            0 => XpointKind::Break,
            1 => XpointKind::HwExec,
            2 => XpointKind::WriteWatch,
            // access watchpoints are approximated by read watchpoints
            3 | 4 => XpointKind::ReadWatch,
            _ => return Err(Error::NonFatalError(errno::EINVAL)),
        };

        let (process, xpoints) = session
            .current_with_xpoints()
            .ok_or(Error::NonFatalError(errno::ESRCH))?;

        let res = match cmd_kind {
            CmdKind::Add => xpoints.insert(target, process, None, kind, cmd.addr, cmd.kind),
            CmdKind::Remove => xpoints.remove(target, process, None, kind, cmd.addr, cmd.kind),
        };

        match res {
            Ok(()) => Ok(HandlerStatus::NeedsOk),
            Err(e) => {
                debug!("{:?} at {:#x}: {}", kind, cmd.addr, e);
                match e.errno() {
                    Some(code) => Err(Error::NonFatalError(code)),
                    None => Ok(HandlerStatus::Handled),
                }
            }
        }
    }

    pub(crate) fn handle_xpoints(
        &mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: Xpoints,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        match command {
            Xpoints::z(cmd) => self.handle_xpoint_common(target, session, cmd.0, CmdKind::Remove),
            Xpoints::Z(cmd) => self.handle_xpoint_common(target, session, cmd.0, CmdKind::Add),
        }
    }
}
