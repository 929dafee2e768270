//! Error taxonomy for the path and file-service layers.
//!
//! Every OS failure is translated into one of a small set of kinds; the
//! operation name and the path involved always travel with the error.
//! Buffer-sizing retries are internal to the storage backends and never
//! surface here.

use std::fmt;

/// Win32 error codes the service layer cares about by name.
pub mod os_code {
    pub const FILE_NOT_FOUND: u32 = 2;
    pub const PATH_NOT_FOUND: u32 = 3;
    pub const ACCESS_DENIED: u32 = 5;
    pub const NO_MORE_FILES: u32 = 18;
    pub const FILE_EXISTS: u32 = 80;
    pub const INVALID_PARAMETER: u32 = 87;
    pub const INSUFFICIENT_BUFFER: u32 = 122;
    pub const DIR_NOT_EMPTY: u32 = 145;
    pub const ALREADY_EXISTS: u32 = 183;
    pub const ENVVAR_NOT_FOUND: u32 = 203;
    pub const MORE_DATA: u32 = 234;
    pub const DIRECTORY: u32 = 267;
    pub const REQUEST_ABORTED: u32 = 1235;
}

/// Failure kinds raised by the storage and service layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The input doesn't fit any recognized path grammar (bare colon,
    /// truncated UNC, incomplete device prefix).
    MalformedPath { path: String },
    /// The target file, directory, or volume doesn't exist.
    NotFound { operation: &'static str, path: String },
    /// The name is already taken, or taken by the wrong kind of object
    /// (a file where a directory was expected, a copy target without
    /// overwrite).
    AlreadyExists { operation: &'static str, path: String },
    /// Permission failure. Never folded into not-found, even where the OS
    /// signal is ambiguous.
    AccessDenied { operation: &'static str, path: String },
    /// The caller broke an argument contract (relative path where an
    /// absolute one is required, and the like).
    InvalidArgument { message: String },
    /// Any other OS failure, with its raw error code.
    Os {
        operation: &'static str,
        path: String,
        code: u32,
    },
}

impl FsError {
    /// Classify a raw Win32 error code into the taxonomy.
    pub fn from_os_code(operation: &'static str, path: &str, code: u32) -> Self {
        let path = path.to_owned();
        match code {
            os_code::FILE_NOT_FOUND | os_code::PATH_NOT_FOUND => FsError::NotFound { operation, path },
            os_code::ACCESS_DENIED => FsError::AccessDenied { operation, path },
            os_code::FILE_EXISTS | os_code::ALREADY_EXISTS => FsError::AlreadyExists { operation, path },
            _ => FsError::Os {
                operation,
                path,
                code,
            },
        }
    }

    /// The raw OS code, where one was involved.
    pub fn os_code(&self) -> Option<u32> {
        match self {
            FsError::Os { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::MalformedPath { path } => write!(f, "malformed path: {path:?}"),
            FsError::NotFound { operation, path } => {
                write!(f, "{operation}: not found: {path:?}")
            }
            FsError::AlreadyExists { operation, path } => {
                write!(f, "{operation}: already exists: {path:?}")
            }
            FsError::AccessDenied { operation, path } => {
                write!(f, "{operation}: access denied: {path:?}")
            }
            FsError::InvalidArgument { message } => write!(f, "invalid argument: {message}"),
            FsError::Os {
                operation,
                path,
                code,
            } => write!(f, "{operation} failed with OS error {code}: {path:?}"),
        }
    }
}

impl std::error::Error for FsError {}

/// Process exit codes surfaced at the command boundary.
///
/// The values mirror the Win32 system error codes a shell user would
/// recognize; anything the mapping doesn't name collapses to
/// `GeneralFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralFailure = 1,
    FileNotFound = 2,
    PathNotFound = 3,
    AccessDenied = 5,
    InvalidData = 13,
    NetworkPathNotFound = 53,
    Canceled = 1223,
    NetworkConnectionFailed = 2250,
    InvalidArgument = 10022,
}

impl From<&FsError> for ExitCode {
    fn from(error: &FsError) -> Self {
        match error {
            FsError::NotFound { .. } => ExitCode::FileNotFound,
            FsError::AccessDenied { .. } => ExitCode::AccessDenied,
            FsError::MalformedPath { .. } | FsError::InvalidArgument { .. } => {
                ExitCode::InvalidArgument
            }
            FsError::Os { code, .. } => match *code {
                os_code::PATH_NOT_FOUND => ExitCode::PathNotFound,
                53 => ExitCode::NetworkPathNotFound,
                os_code::REQUEST_ABORTED => ExitCode::Canceled,
                2250 => ExitCode::NetworkConnectionFailed,
                _ => ExitCode::GeneralFailure,
            },
            _ => ExitCode::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_code_classification() {
        assert!(matches!(
            FsError::from_os_code("CreateDirectory", "C:\\x", os_code::FILE_NOT_FOUND),
            FsError::NotFound { .. }
        ));
        assert!(matches!(
            FsError::from_os_code("CreateDirectory", "C:\\x", os_code::PATH_NOT_FOUND),
            FsError::NotFound { .. }
        ));
        assert!(matches!(
            FsError::from_os_code("CopyFile", "C:\\x", os_code::FILE_EXISTS),
            FsError::AlreadyExists { .. }
        ));
        assert!(matches!(
            FsError::from_os_code("DeleteFile", "C:\\x", os_code::ACCESS_DENIED),
            FsError::AccessDenied { .. }
        ));
        let other = FsError::from_os_code("RemoveDirectory", "C:\\x", os_code::DIR_NOT_EMPTY);
        assert_eq!(other.os_code(), Some(os_code::DIR_NOT_EMPTY));
    }

    #[test]
    fn test_exit_code_mapping() {
        let not_found = FsError::NotFound {
            operation: "GetFileInfo",
            path: "C:\\x".into(),
        };
        assert_eq!(ExitCode::from(&not_found), ExitCode::FileNotFound);

        let malformed = FsError::MalformedPath { path: "@:".into() };
        assert_eq!(ExitCode::from(&malformed), ExitCode::InvalidArgument);

        let unclassified = FsError::Os {
            operation: "CopyFile",
            path: "C:\\x".into(),
            code: 1117,
        };
        assert_eq!(ExitCode::from(&unclassified), ExitCode::GeneralFailure);
    }
}
