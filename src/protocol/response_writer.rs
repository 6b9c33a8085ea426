use num_traits::{PrimInt, Unsigned};

use crate::conn::Connection;
use crate::protocol::common::thread_id::IdKind;
use crate::protocol::reply::ReplyBuffer;

/// Newtype around a Connection error. Having a newtype allows implementing a
/// `From<ResponseWriterError<C>> for crate::Error<T, C>`, which greatly
/// simplifies some of the error handling in the server.
#[derive(Debug, Clone)]
pub struct Error<C>(pub C);

/// Composes a single packet in a [`ReplyBuffer`], and sends it over a
/// [`Connection`] when flushed.
pub struct ResponseWriter<'a, C: Connection> {
    inner: &'a mut C,
    buf: &'a mut ReplyBuffer,
}

impl<'a, C: Connection + 'a> ResponseWriter<'a, C> {
    /// Open a new packet in `buf`, discarding anything left over in it.
    pub fn new(inner: &'a mut C, buf: &'a mut ReplyBuffer) -> Self {
        buf.clear();
        buf.open_packet();
        Self { inner, buf }
    }

    /// Close the packet and transmit it.
    pub fn flush(self) -> Result<(), Error<C::Error>> {
        self.buf.close_packet();

        #[cfg(feature = "trace-pkt")]
        trace!("--> {}", String::from_utf8_lossy(self.buf.as_bytes()));

        self.inner.write_all(self.buf.as_bytes()).map_err(Error)?;
        self.inner.flush().map_err(Error)?;
        self.buf.mark_sent();
        Ok(())
    }

    /// Discard the payload written so far, keeping the packet open.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.buf.open_packet();
    }

    /// Get a mutable reference to the underlying connection.
    pub fn as_conn(&mut self) -> &mut C {
        self.inner
    }

    /// Number of payload bytes written so far.
    pub fn payload_len(&self) -> usize {
        self.buf.payload().len()
    }

    /// Direct access to the packet being composed.
    pub fn reply_buf(&mut self) -> &mut ReplyBuffer {
        self.buf
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), Error<C::Error>> {
        self.buf.write_str(s);
        Ok(())
    }

    /// Write a single byte as a hex string (two ascii chars)
    pub fn write_hex(&mut self, byte: u8) -> Result<(), Error<C::Error>> {
        self.buf.write_hex(byte);
        Ok(())
    }

    /// Write a byte-buffer as a hex string (i.e: two ascii chars / byte).
    pub fn write_hex_buf(&mut self, data: &[u8]) -> Result<(), Error<C::Error>> {
        self.buf.write_hex_buf(data);
        Ok(())
    }

    /// Write data using the binary protocol.
    pub fn write_binary(&mut self, data: &[u8]) -> Result<(), Error<C::Error>> {
        self.buf.write_binary(data);
        Ok(())
    }

    /// Write a number as a big-endian hex string using the most compact
    /// representation possible (i.e: trimming leading zeros).
    pub fn write_num<D: PrimInt + Unsigned>(&mut self, digit: D) -> Result<(), Error<C::Error>> {
        self.buf.write_num(digit);
        Ok(())
    }

    /// Write the low `width` bytes of `num` as fixed-width hex.
    pub fn write_hex_fixed(&mut self, num: u64, width: usize) -> Result<(), Error<C::Error>> {
        self.buf.write_hex_fixed(num, width);
        Ok(())
    }

    pub fn write_dec(&mut self, num: u64) -> Result<(), Error<C::Error>> {
        self.buf.write_dec(num);
        Ok(())
    }

    pub fn write_id_kind(&mut self, id: IdKind) -> Result<(), Error<C::Error>> {
        match id {
            IdKind::All => self.write_str("-1"),
            IdKind::Any => self.write_str("0"),
            IdKind::WithId(id) => self.write_num(id.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockConnection;

    #[test]
    fn flush_frames_and_records_the_packet() {
        let mut conn = MockConnection::new(b"");
        let mut buf = ReplyBuffer::new();

        let mut res = ResponseWriter::new(&mut conn, &mut buf);
        res.write_str("T05thread:").unwrap();
        res.write_num(0x1au32).unwrap();
        res.write_str(";").unwrap();
        res.flush().unwrap();

        assert_eq!(conn.output(), b"$T05thread:1a;#38");
        assert_eq!(buf.last_sent(), b"$T05thread:1a;#38");
        assert!(buf.is_empty());
    }
}
