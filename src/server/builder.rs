use core::fmt::{self, Display};
use std::time::Duration;

use crate::arch::Machine;
use crate::conn::ConnectionExt;

use super::core_impl::{register_bytes, GdbServerImpl};
use super::GdbServer;

/// Default size of the packet buffer, as reported to GDB.
pub const DEFAULT_PACKET_BUFFER_SIZE: usize = 0x1000;

/// Default interval at which the controller is polled while the debuggee
/// runs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An error which may occur when building a [`GdbServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GdbServerBuilderError {
    /// The packet buffer cannot hold a `g` reply for every supported machine.
    PacketBufferTooSmall { size: usize, required: usize },
    /// The poll interval must be non-zero.
    ZeroPollInterval,
}

impl Display for GdbServerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::GdbServerBuilderError::*;
        match self {
            PacketBufferTooSmall { size, required } => write!(
                f,
                "`packet_buffer_size` of {} bytes is too small; at least {} bytes are required.",
                size, required
            ),
            ZeroPollInterval => write!(f, "`poll_interval` must be non-zero."),
        }
    }
}

impl std::error::Error for GdbServerBuilderError {}

/// Helper to construct and customize [`GdbServer`].
pub struct GdbServerBuilder<C: ConnectionExt> {
    conn: C,
    packet_buffer_size: Option<usize>,
    poll_interval: Option<Duration>,
    no_ack_mode: bool,
}

impl<C: ConnectionExt> GdbServerBuilder<C> {
    /// Create a new `GdbServerBuilder` using the provided Connection.
    pub fn new(conn: C) -> GdbServerBuilder<C> {
        GdbServerBuilder {
            conn,
            packet_buffer_size: None,
            poll_interval: None,
            no_ack_mode: true,
        }
    }

    /// Specify a custom size for the packet buffer. Defaults to 4096 bytes.
    ///
    /// The buffer must be large enough to hold the hex-encoded register
    /// block of every supported machine.
    pub fn packet_buffer_size(mut self, size: usize) -> Self {
        self.packet_buffer_size = Some(size);
        self
    }

    /// How long to wait for a debug event before checking the connection
    /// for an interrupt. Defaults to 100ms.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Whether to offer `QStartNoAckMode` to the client. Enabled by default.
    pub fn no_ack_mode(mut self, enabled: bool) -> Self {
        self.no_ack_mode = enabled;
        self
    }

    /// Build the GdbServer, returning an error if something went wrong.
    pub fn build(self) -> Result<GdbServer<C>, GdbServerBuilderError> {
        let size = self.packet_buffer_size.unwrap_or(DEFAULT_PACKET_BUFFER_SIZE);
        let required = Machine::ALL
            .iter()
            .map(|m| register_bytes(m.backend()) * 2)
            .max()
            .unwrap_or(0);
        if size < required {
            return Err(GdbServerBuilderError::PacketBufferTooSmall { size, required });
        }

        let poll_interval = self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval == Duration::from_secs(0) {
            return Err(GdbServerBuilderError::ZeroPollInterval);
        }

        Ok(GdbServer {
            conn: self.conn,
            packet_buffer_size: size,
            poll_interval,
            inner: GdbServerImpl::new(size, self.no_ack_mode),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockConnection;

    #[test]
    fn rejects_tiny_buffers() {
        let err = GdbServerBuilder::new(MockConnection::new(b""))
            .packet_buffer_size(16)
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            GdbServerBuilderError::PacketBufferTooSmall { size: 16, .. }
        ));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let err = GdbServerBuilder::new(MockConnection::new(b""))
            .poll_interval(Duration::from_secs(0))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GdbServerBuilderError::ZeroPollInterval);
    }
}
