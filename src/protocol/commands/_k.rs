use super::prelude::*;

#[derive(PartialEq, Eq, Debug)]
pub struct k;

impl<'a> ParseCommand<'a> for k {
    fn from_packet(_buf: PacketBuf<'a>) -> Option<Self> {
        Some(k)
    }
}
