use super::prelude::*;
use crate::protocol::commands::ext::SingleRegisterAccess;

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_single_register_access<'a>(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: SingleRegisterAccess<'a>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let (process, tid) = self.mem_thread(session)?;
        let map = process.backend().register_map();

        let handler_status = match command {
            SingleRegisterAccess::p(p) => {
                let entry = map
                    .get(p.reg_id)
                    .ok_or(Error::NonFatalError(errno::EINVAL))?;
                let ctx = process.read_context(target, tid).handle_error()?;
                let bytes = ctx
                    .register(entry)
                    .ok_or(Error::NonFatalError(errno::EINVAL))?;
                res.write_hex_buf(bytes)?;
                HandlerStatus::Handled
            }
            SingleRegisterAccess::P(p) => {
                let entry = map
                    .get(p.reg_id)
                    .ok_or(Error::NonFatalError(errno::EINVAL))?;
                let mut ctx = process.read_context(target, tid).handle_error()?;
                match ctx.register_mut(entry) {
                    Some(reg) if reg.len() == p.val.len() => reg.copy_from_slice(p.val),
                    _ => return Err(Error::NonFatalError(errno::EINVAL)),
                }
                process.write_context(target, tid, &ctx).handle_error()?;
                HandlerStatus::NeedsOk
            }
        };

        Ok(handler_status)
    }
}
