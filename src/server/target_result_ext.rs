use crate::arch::{CpuError, OsError};
use crate::server::GdbServerError;

/// Extension trait to ease working with OS and backend results in the
/// server implementation.
pub(super) trait TargetResultExt<V, C> {
    /// Turn a failed OS or backend operation into an `E<errno>` reply.
    fn handle_error(self) -> Result<V, GdbServerError<C>>;
}

impl<V, C> TargetResultExt<V, C> for Result<V, OsError> {
    fn handle_error(self) -> Result<V, GdbServerError<C>> {
        self.map_err(|e| {
            debug!("os error: {}", e);
            GdbServerError::NonFatalError(e.errno())
        })
    }
}

impl<V, C> TargetResultExt<V, C> for Result<V, CpuError> {
    fn handle_error(self) -> Result<V, GdbServerError<C>> {
        let e = match self {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        debug!("backend error: {}", e);
        let code = match e {
            CpuError::Full => 28,             // ENOSPC
            CpuError::InvalidLength(_) => 22, // EINVAL
            CpuError::Unsupported => 95,      // EOPNOTSUPP
            CpuError::BadContext | CpuError::BadRestoreValue => 0,
            CpuError::Os(e) => e.errno(),
        };
        Err(GdbServerError::NonFatalError(code))
    }
}
