//! Utility macros shared by the protocol and transport modules.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(version == FCGI_VERSION_1, ProtocolError::InvalidVersion(version));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
