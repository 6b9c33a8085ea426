use super::prelude::*;
use crate::protocol::commands::ext::SectionOffsets;

use crate::target::ext::section_offsets::Offsets;

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_section_offsets(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: SectionOffsets,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let handler_status = match command {
            SectionOffsets::qOffsets(_cmd) => {
                let pid = session.current_pid();
                let offsets = match (pid, target.support_section_offsets()) {
                    (Some(pid), Some(ops)) => ops.section_offsets(pid).handle_error()?,
                    _ => Offsets::default(),
                };

                res.write_str("Text=")?;
                res.write_num(offsets.text)?;
                res.write_str(";Data=")?;
                res.write_num(offsets.data)?;
                res.write_str(";Bss=")?;
                res.write_num(offsets.bss.unwrap_or(offsets.data))?;
                HandlerStatus::Handled
            }
        };
        Ok(handler_status)
    }
}
