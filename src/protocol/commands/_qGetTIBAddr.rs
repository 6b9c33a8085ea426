use super::prelude::*;

#[derive(Debug)]
pub struct qGetTIBAddr {
    pub thread: ThreadId,
}

impl<'a> ParseCommand<'a> for qGetTIBAddr {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        match buf.into_body() {
            [b':', id @ ..] => Some(qGetTIBAddr {
                thread: (&*id).try_into().ok()?,
            }),
            _ => None,
        }
    }
}
