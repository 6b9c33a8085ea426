use super::prelude::*;

#[derive(PartialEq, Eq, Debug)]
pub struct qAttached {
    pub pid: Option<usize>,
}

impl<'a> ParseCommand<'a> for qAttached {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let body = buf.into_body();
        let pid = match body {
            [] => None,
            [b':', pid @ ..] => Some(decode_hex(pid).ok()?),
            _ => return None,
        };
        Some(qAttached { pid })
    }
}
