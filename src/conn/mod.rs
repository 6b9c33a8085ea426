//! Traits to perform in-order, serial, byte-wise I/O with the GDB client.

mod impls;

/// A trait to perform in-order, serial, byte-wise I/O.
///
/// Implemented for [`TcpStream`](std::net::TcpStream).
pub trait Connection {
    /// Transport-specific error type.
    type Error;

    /// Write a single byte.
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Write the entire buffer, blocking until complete.
    ///
    /// The default implementation calls `self.write()` on each byte.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for b in buf {
            self.write(*b)?;
        }
        Ok(())
    }

    /// Flush any intermediately buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Called once before any packet is exchanged.
    ///
    /// The `TcpStream` implementation enables `TCP_NODELAY`: the protocol
    /// trades many small packets, and Nagle's algorithm makes every round
    /// trip painfully slow.
    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Extends [`Connection`] with `read` and `peek` methods.
///
/// The server blocks in `read` while the debuggee is stopped, and polls
/// `peek` while it runs so that an interrupt byte can preempt it.
pub trait ConnectionExt: Connection {
    /// Read a single byte, blocking until one is available.
    ///
    /// A closed connection must be reported as an error.
    fn read(&mut self) -> Result<u8, Self::Error>;

    /// Peek a single byte. This MUST be **non-blocking**, returning `None` if
    /// no byte is available.
    ///
    /// Subsequent calls to `peek` MUST return the same byte.
    fn peek(&mut self) -> Result<Option<u8>, Self::Error>;
}
