use super::_z::XpointArgs;
use super::prelude::*;

#[derive(PartialEq, Eq, Debug)]
pub struct Z(pub XpointArgs);

impl<'a> ParseCommand<'a> for Z {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        XpointArgs::parse(buf.into_body()).map(Z)
    }
}
