pub enum RecvPacketError<C> {
    Capacity,
    Connection(C),
}

/// Receives a packet by pulling data from a callback (typically backed by a
/// blocking `ConnectionExt::read`).
pub struct RecvPacketBlocking {
    max_len: usize,
}

impl RecvPacketBlocking {
    pub fn new(max_len: usize) -> Self {
        RecvPacketBlocking { max_len }
    }

    fn push<C>(&self, buf: &mut Vec<u8>, byte: u8) -> Result<(), RecvPacketError<C>> {
        if buf.len() >= self.max_len {
            return Err(RecvPacketError::Capacity);
        }
        buf.push(byte);
        Ok(())
    }

    /// Receive a single-byte packet (`+`, `-`, `^C`) or an entire
    /// `$...#xx` frame into `buf`.
    ///
    /// Stray bytes that do not start a packet are returned as-is, so the
    /// caller can report them.
    pub fn recv<'b, C>(
        &mut self,
        buf: &'b mut Vec<u8>,
        mut get_byte: impl FnMut() -> Result<u8, C>,
    ) -> Result<&'b mut [u8], RecvPacketError<C>> {
        let header_byte = get_byte().map_err(RecvPacketError::Connection)?;

        buf.clear();
        self.push(buf, header_byte)?;
        if header_byte == b'$' {
            // read the packet body
            loop {
                let c = get_byte().map_err(RecvPacketError::Connection)?;
                self.push(buf, c)?;
                if c == b'#' {
                    break;
                }
            }
            // read the checksum as well
            for _ in 0..2 {
                let c = get_byte().map_err(RecvPacketError::Connection)?;
                self.push(buf, c)?;
            }
        }

        #[cfg(feature = "trace-pkt")]
        trace!("<-- {}", String::from_utf8_lossy(buf));

        Ok(buf.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(input: &[u8], max_len: usize) -> Result<Vec<u8>, RecvPacketError<()>> {
        let mut input = input.iter().copied();
        let mut buf = Vec::new();
        RecvPacketBlocking::new(max_len)
            .recv(&mut buf, || input.next().ok_or(()))
            .map(|b| b.to_vec())
    }

    #[test]
    fn reads_whole_frames() {
        assert_eq!(feed(b"$g#67+", 64).ok(), Some(b"$g#67".to_vec()));
        assert_eq!(feed(b"+$g#67", 64).ok(), Some(b"+".to_vec()));
    }

    #[test]
    fn overlong_frames_are_rejected() {
        assert!(matches!(feed(b"$mmmmmmmm#00", 4), Err(RecvPacketError::Capacity)));
    }

    #[test]
    fn truncated_frames_report_the_connection() {
        assert!(matches!(feed(b"$g#6", 64), Err(RecvPacketError::Connection(()))));
    }
}
