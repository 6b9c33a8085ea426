use super::prelude::*;
use crate::protocol::qxfer::QxferObject;

/// `qXfer:<object>:read:<annex>:<offset>,<length>`
#[derive(Debug)]
pub struct qXfer<'a> {
    /// `None` for objects the server does not know.
    pub object: Option<QxferObject>,
    pub annex: &'a str,
    pub offset: usize,
    pub length: usize,
}

impl<'a> ParseCommand<'a> for qXfer<'a> {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let body = buf.into_body_str();
        let mut body = body.strip_prefix(':')?.splitn(4, ':');

        let object = QxferObject::from_name(body.next()?.as_bytes());
        if body.next()? != "read" {
            return None;
        }
        let annex = body.next()?;

        let mut range = body.next()?.split(',');
        let offset = decode_hex(range.next()?.as_bytes()).ok()?;
        let length = decode_hex(range.next()?.as_bytes()).ok()?;

        Some(qXfer {
            object,
            annex,
            offset,
            length,
        })
    }
}
