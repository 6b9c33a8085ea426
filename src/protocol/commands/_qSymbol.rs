use super::prelude::*;

/// `qSymbol::` (or a `qSymbol:<sym>:<name>` answer). Symbol lookup is not
/// offered, so the contents are ignored.
#[derive(Debug)]
pub struct qSymbol;

impl<'a> ParseCommand<'a> for qSymbol {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        if !buf.into_body().starts_with(b":") {
            return None;
        }
        Some(qSymbol)
    }
}
