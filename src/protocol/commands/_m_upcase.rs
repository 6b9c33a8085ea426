use super::prelude::*;

#[derive(PartialEq, Eq, Debug)]
pub struct M<'a> {
    pub addr: u64,
    pub len: usize,
    /// Decoded payload. Its length is checked against `len` by the handler.
    pub val: &'a [u8],
}

impl<'a> ParseCommand<'a> for M<'a> {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let body = buf.into_body();

        let mut body = body.split_mut(|&b| b == b',' || b == b':');
        let addr = decode_hex(body.next()?).ok()?;
        let len = decode_hex(body.next()?).ok()?;
        let val = decode_hex_buf(body.next()?).ok()?;

        Some(M { addr, len, val })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_write() {
        let mut body = b"401000,2:90cc".to_vec();
        let cmd = M::from_packet(PacketBuf::new_with_raw_body(&mut body).unwrap()).unwrap();
        assert_eq!(cmd.addr, 0x401000);
        assert_eq!(cmd.len, 2);
        assert_eq!(cmd.val, [0x90, 0xcc]);
    }

    #[test]
    fn empty_payload_is_allowed() {
        let mut body = b"401000,0:".to_vec();
        let cmd = M::from_packet(PacketBuf::new_with_raw_body(&mut body).unwrap()).unwrap();
        assert!(cmd.val.is_empty());
    }
}
