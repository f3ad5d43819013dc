//! Procedure return codes.

use std::fmt;

/// Status word that opens every response.
///
/// Zero is success; each negative value names a failure family. Any other
/// value is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    /// The backend ran the procedure and it failed.
    Failed,
    /// The driver does not implement this procedure.
    NotImplemented,
    /// The driver ran out of memory while executing.
    OutOfMemory,
    /// The backend refused the operation.
    PermissionDenied,
}

impl StatusCode {
    pub const fn code(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Failed => -1,
            StatusCode::NotImplemented => -2,
            StatusCode::OutOfMemory => -3,
            StatusCode::PermissionDenied => -4,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(StatusCode::Ok),
            -1 => Some(StatusCode::Failed),
            -2 => Some(StatusCode::NotImplemented),
            -3 => Some(StatusCode::OutOfMemory),
            -4 => Some(StatusCode::PermissionDenied),
            _ => None,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }

    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Failed => "FAILED",
            StatusCode::NotImplemented => "NOT_IMPLEMENTED",
            StatusCode::OutOfMemory => "OUT_OF_MEMORY",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
