use super::prelude::*;

/// `C<sig>[;addr]`
#[derive(PartialEq, Eq, Debug)]
pub struct C {
    pub sig: u8,
    pub addr: Option<u64>,
}

impl<'a> ParseCommand<'a> for C {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let (sig, addr) = parse_sig_addr(buf.into_body())?;
        Some(C { sig, addr })
    }
}

pub(super) fn parse_sig_addr(body: &[u8]) -> Option<(u8, Option<u64>)> {
    let mut body = body.splitn(2, |b| *b == b';');
    let sig = decode_hex(body.next()?).ok()?;
    let addr = match body.next() {
        Some(addr) => Some(decode_hex(addr).ok()?),
        None => None,
    };
    Some((sig, addr))
}
