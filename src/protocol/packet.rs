use crate::protocol::commands::Command;
use crate::protocol::common::hex::decode_hex;

/// Packet parse error.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketParseError {
    ChecksumMismatched { checksum: u8, calculated: u8 },
    EmptyBuf,
    MissingChecksum,
    MalformedChecksum,
    MalformedCommand,
    NotAscii,
    UnexpectedHeader(u8),
}

/// Top-Level GDB packet
#[derive(Debug)]
pub enum Packet<'a> {
    Ack,
    Nack,
    Interrupt,
    Command(Command<'a>),
}

/// Wrapper around a raw packet buffer that has passed checksum validation.
pub struct PacketBuf<'a> {
    buf: &'a mut [u8],
    body_range: core::ops::Range<usize>,
}

impl<'a> PacketBuf<'a> {
    /// Validate the contents of the raw packet buffer, checking for checksum
    /// consistency and structural correctness.
    pub fn new(pkt_buf: &'a mut [u8]) -> Result<PacketBuf<'a>, PacketParseError> {
        if pkt_buf.is_empty() {
            return Err(PacketParseError::EmptyBuf);
        }

        // split buffer into body and checksum components
        let hash = pkt_buf[1..]
            .iter()
            .position(|b| *b == b'#')
            .ok_or(PacketParseError::MissingChecksum)?
            + 1;
        let body = &pkt_buf[1..hash];
        let checksum = pkt_buf
            .get(hash + 1..hash + 3)
            .ok_or(PacketParseError::MalformedChecksum)?;

        let checksum = decode_hex(checksum).map_err(|_| PacketParseError::MalformedChecksum)?;
        let calculated = crate::protocol::reply::checksum(body);
        if calculated != checksum {
            return Err(PacketParseError::ChecksumMismatched {
                checksum,
                calculated,
            });
        }

        if !body.is_ascii() {
            return Err(PacketParseError::NotAscii);
        }

        Ok(PacketBuf {
            buf: pkt_buf,
            body_range: 1..hash,
        })
    }

    /// (used for tests) Create a packet buffer from a raw body buffer, skipping
    /// the header/checksum trimming stage.
    #[cfg(test)]
    pub fn new_with_raw_body(body: &'a mut [u8]) -> Result<PacketBuf<'a>, PacketParseError> {
        if !body.is_ascii() {
            return Err(PacketParseError::NotAscii);
        }

        let len = body.len();
        Ok(PacketBuf {
            buf: body,
            body_range: 0..len,
        })
    }

    /// Strip `prefix` from the body, returning `false` (and leaving the body
    /// untouched) if it isn't there.
    pub fn strip_prefix(&mut self, prefix: &[u8]) -> bool {
        if self.as_body().starts_with(prefix) {
            self.body_range.start += prefix.len();
            true
        } else {
            false
        }
    }

    pub fn as_body(&self) -> &[u8] {
        &self.buf[self.body_range.clone()]
    }

    /// Return a mut reference to slice of the packet buffer corresponding to
    /// the current body.
    pub fn into_body(self) -> &'a mut [u8] {
        &mut self.buf[self.body_range]
    }

    /// Return the body as a `str`. The body was validated as ASCII on
    /// construction.
    pub fn into_body_str(self) -> &'a str {
        core::str::from_utf8(self.into_body()).unwrap_or_default()
    }
}

impl<'a> Packet<'a> {
    pub fn from_buf(buf: &'a mut [u8]) -> Result<Packet<'a>, PacketParseError> {
        // cannot have empty packet
        if buf.is_empty() {
            return Err(PacketParseError::EmptyBuf);
        }

        match buf[0] {
            b'$' => Ok(Packet::Command(
                Command::from_packet(PacketBuf::new(buf)?)
                    .ok_or(PacketParseError::MalformedCommand)?,
            )),
            b'+' => Ok(Packet::Ack),
            b'-' => Ok(Packet::Nack),
            0x03 => Ok(Packet::Interrupt),
            _ => Err(PacketParseError::UnexpectedHeader(buf[0])),
        }
    }
}
