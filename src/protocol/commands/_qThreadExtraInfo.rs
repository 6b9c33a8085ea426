use super::prelude::*;

#[derive(Debug)]
pub struct qThreadExtraInfo {
    pub thread: ThreadId,
}

impl<'a> ParseCommand<'a> for qThreadExtraInfo {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        match buf.into_body() {
            [b',', body @ ..] => Some(qThreadExtraInfo {
                thread: (&*body).try_into().ok()?,
            }),
            _ => None,
        }
    }
}
