use super::prelude::*;

/// `S<sig>[;addr]`
#[derive(PartialEq, Eq, Debug)]
pub struct S {
    pub sig: u8,
    pub addr: Option<u64>,
}

impl<'a> ParseCommand<'a> for S {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let (sig, addr) = super::_c_upcase::parse_sig_addr(buf.into_body())?;
        Some(S { sig, addr })
    }
}
