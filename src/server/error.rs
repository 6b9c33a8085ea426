use core::fmt::{self, Debug, Display};

use crate::protocol::ResponseWriterError;
use crate::session::PumpError;

/// An error which may occur during a debugging session.
#[derive(Debug)]
#[non_exhaustive]
pub enum GdbServerError<C> {
    /// Connection Error while initializing the session.
    ConnectionInit(C),
    /// Connection Error while reading request.
    ConnectionRead(C),
    /// Connection Error while writing response.
    ConnectionWrite(C),

    /// Packet cannot fit in the packet buffer.
    PacketBufferOverflow,
    /// The debug event pump failed. The debuggee is considered gone.
    Pump(PumpError),

    // Internal - A non-fatal error occurred (with errno-style error code)
    //
    // This "dummy" error is required as part of the internal
    // `TargetResultExt::handle_error()` machinery, and will never be
    // propagated up to the end user.
    #[doc(hidden)]
    NonFatalError(u8),
}

impl<C> GdbServerError<C> {
    /// Whether the controller connection is unusable after this error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            GdbServerError::ConnectionInit(_)
                | GdbServerError::ConnectionRead(_)
                | GdbServerError::ConnectionWrite(_)
        )
    }
}

impl<C> From<ResponseWriterError<C>> for GdbServerError<C> {
    fn from(e: ResponseWriterError<C>) -> Self {
        GdbServerError::ConnectionWrite(e.0)
    }
}

impl<C> From<PumpError> for GdbServerError<C> {
    fn from(e: PumpError) -> Self {
        GdbServerError::Pump(e)
    }
}

impl<C> Display for GdbServerError<C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::GdbServerError::*;
        match self {
            ConnectionInit(e) => write!(f, "Connection Error while initializing the session: {:?}", e),
            ConnectionRead(e) => write!(f, "Connection Error while reading request: {:?}", e),
            ConnectionWrite(e) => write!(f, "Connection Error while writing response: {:?}", e),
            PacketBufferOverflow => write!(f, "Packet too big for provided buffer!"),
            Pump(e) => write!(f, "Debug event pump failed: {}", e),

            NonFatalError(_) => write!(f, "Internal non-fatal error. End users should never see this!"),
        }
    }
}

impl<C> std::error::Error for GdbServerError<C>
where
    C: Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GdbServerError::Pump(e) => Some(e),
            _ => None,
        }
    }
}
