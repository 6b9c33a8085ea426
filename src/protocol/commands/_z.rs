use super::prelude::*;

/// Arguments shared by `z` and `Z`: `<type>,<addr>,<kind>`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct XpointArgs {
    pub type_: u8,
    pub addr: u64,
    pub kind: u64,
}

impl XpointArgs {
    pub(super) fn parse(body: &[u8]) -> Option<Self> {
        let mut body = body.split(|b| *b == b',');
        let type_ = decode_hex(body.next()?).ok()?;
        let addr = decode_hex(body.next()?).ok()?;
        // conditions and commands (`;X...`) are not supported
        let kind = body.next()?;
        let kind = kind.split(|b| *b == b';').next()?;
        let kind = decode_hex(kind).ok()?;

        Some(XpointArgs { type_, addr, kind })
    }
}

#[derive(PartialEq, Eq, Debug)]
pub struct z(pub XpointArgs);

impl<'a> ParseCommand<'a> for z {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        XpointArgs::parse(buf.into_body()).map(z)
    }
}
