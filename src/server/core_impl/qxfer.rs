use super::prelude::*;
use crate::protocol::commands::ext::Qxfer;

use crate::protocol::{QxferObject, ReplyBuffer};
use crate::server::core_impl::target_xml::write_target_xml;
use crate::session::Process;

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_qxfer<'a>(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        session: &mut DebugSession,
        command: Qxfer<'a>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let Qxfer::qXfer(cmd) = command;

        let object = match cmd.object {
            Some(object) => object,
            None => return Ok(HandlerStatus::Handled),
        };
        let process = session
            .current_process()
            .ok_or(Error::NonFatalError(errno::ESRCH))?;
        let annex = cmd.annex;

        self.qxfer
            .fill(object, annex, |out| render(object, annex, process, out))
            .map_err(Error::NonFatalError)?;

        // leave room for the `$`, the marker and the checksum; escaping may
        // double the size of every byte
        let len = cmd.length.min(self.packet_size.saturating_sub(5) / 2);
        self.qxfer.page(res.reply_buf(), cmd.offset, len);
        Ok(HandlerStatus::Handled)
    }
}

fn render(
    object: QxferObject,
    annex: &str,
    process: &Process,
    out: &mut ReplyBuffer,
) -> Result<(), u8> {
    match object {
        QxferObject::Libraries => {
            out.write_str("<library-list>");
            for module in process.modules() {
                out.write_str(r#"<library name=""#);
                out.write_xml_escaped(&module.name);
                out.write_str(r#""><segment address="0x"#);
                out.write_str(&format!("{:x}", module.base));
                out.write_str(r#""/></library>"#);
            }
            out.write_str("</library-list>");
        }
        QxferObject::Threads => {
            out.write_str("<threads>");
            for tid in process.thread_ids() {
                out.write_str(r#"<thread id=""#);
                out.write_str(&format!("{:x}", tid.get()));
                out.write_str(r#""/>"#);
            }
            out.write_str("</threads>");
        }
        QxferObject::Features => {
            if annex != "target.xml" {
                return Err(errno::ENOENT);
            }
            write_target_xml(process.backend(), out);
        }
        QxferObject::ExecFile => {
            let name = process.image_name().ok_or(errno::ENOENT)?;
            out.write_str(name);
        }
    }
    Ok(())
}
