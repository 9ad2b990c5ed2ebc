//! Error taxonomy and failure classification.
//!
//! Every failure the engine can hit — transport, HTTP status, filesystem,
//! user cancellation — is translated into one [`Error`] variant with a
//! stable numeric code, so callers can dispatch on the kind of failure
//! without inspecting source errors. [`classify`] applies the translation
//! rules in priority order; [`Error::is_retryable`] separates conditions
//! worth another attempt from ones that terminate the download.

use reqwest::StatusCode;
use std::io;
use std::path::Path;
use thiserror::Error as ThisError;

/// Result type alias for downloader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors with stable numeric codes (see [`Error::code`]).
///
/// The filesystem group always terminates a download: if the destination
/// cannot be written, retrying the transfer cannot help. `Network` and
/// `OperationFailed` are transient and may be retried within the overall
/// timeout budget.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    #[error("unknown error")]
    Unknown,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("runtime error")]
    Runtime,
    #[error("out of memory")]
    OutOfMemory,
    #[error("permission denied")]
    PermissionDenied,
    #[error("operation failed")]
    OperationFailed,
    #[error("operation interrupted")]
    OperationInterrupted,
    #[error("filesystem error")]
    Filesystem,
    #[error("filesystem i/o error")]
    FilesystemIo,
    #[error("filesystem does not support files this large")]
    FilesystemNotSupportLargeFiles,
    #[error("filesystem unavailable")]
    FilesystemUnavailable,
    #[error("no space left on device")]
    FilesystemNoSpace,
    #[error("filesystem network error")]
    FilesystemNetwork,
    #[error("file not found")]
    FileNotFound,
    #[error("file not writable")]
    FileNotWritable,
    #[error("file path too long")]
    FilePathTooLong,
    #[error("file is used by another process")]
    FileWasUsedByOtherProcesses,
    #[error("network error")]
    Network,
    #[error("server error")]
    Server,
}

impl Error {
    /// The stable numeric code of this error. Codes survive releases and
    /// are safe to persist or ship across process boundaries.
    pub fn code(&self) -> u32 {
        match self {
            Error::Unknown => 0x01,
            Error::InvalidParam => 0x02,
            Error::Runtime => 0x03,
            Error::OutOfMemory => 0x04,
            Error::PermissionDenied => 0x05,
            Error::OperationFailed => 0x2a,
            Error::OperationInterrupted => 0x2b,
            Error::Filesystem => 0x51,
            Error::FilesystemIo => 0x52,
            Error::FilesystemNotSupportLargeFiles => 0x53,
            Error::FilesystemUnavailable => 0x54,
            Error::FilesystemNoSpace => 0x55,
            Error::FilesystemNetwork => 0x56,
            Error::FileNotFound => 0x61,
            Error::FileNotWritable => 0x62,
            Error::FilePathTooLong => 0x63,
            Error::FileWasUsedByOtherProcesses => 0x64,
            Error::Network => 0x81,
            Error::Server => 0xa1,
        }
    }

    /// True for transient conditions that may succeed on another attempt
    /// within the overall timeout budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network | Error::OperationFailed)
    }

    /// True for conditions that terminate the download without retry.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Translates a filesystem error.
    ///
    /// `path` should name the file involved when known: network-class I/O
    /// errors are reported as `FilesystemNetwork` when they carry a path
    /// (the destination sits on a remote mount) and as plain `Network`
    /// when they do not.
    pub fn from_io(err: &io::Error, path: Option<&Path>) -> Error {
        use io::ErrorKind;

        match err.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => Error::FilesystemNoSpace,
            ErrorKind::FileTooLarge => Error::FilesystemNotSupportLargeFiles,
            ErrorKind::PermissionDenied => Error::FileNotWritable,
            ErrorKind::NotFound => Error::FileNotFound,
            ErrorKind::StaleNetworkFileHandle | ErrorKind::NotADirectory => {
                Error::FilesystemUnavailable
            }
            ErrorKind::InvalidFilename => Error::FilePathTooLong,
            ErrorKind::ResourceBusy | ErrorKind::ExecutableFileBusy => {
                Error::FileWasUsedByOtherProcesses
            }
            ErrorKind::NetworkDown
            | ErrorKind::NetworkUnreachable
            | ErrorKind::HostUnreachable
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
            | ErrorKind::BrokenPipe => {
                if path.is_some() {
                    Error::FilesystemNetwork
                } else {
                    Error::Network
                }
            }
            _ => Error::Filesystem,
        }
    }

    /// Translates a transport failure from the HTTP client.
    ///
    /// Every transport class — resolve, connect, proxy, TLS, timeout, a
    /// connection dropped mid-body — maps to the retryable `Network`;
    /// status errors are translated through [`Error::from_status`].
    pub fn from_transport(err: &reqwest::Error) -> Error {
        if err.is_status() {
            return err
                .status()
                .and_then(Error::from_status)
                .unwrap_or(Error::Network);
        }
        Error::Network
    }

    /// Translates an HTTP status code. `None` means the status carries no
    /// error (200 or 206).
    pub fn from_status(status: StatusCode) -> Option<Error> {
        match status {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => None,
            StatusCode::NOT_FOUND => Some(Error::FileNotFound),
            StatusCode::SERVICE_UNAVAILABLE => Some(Error::Server),
            s if s.is_client_error() || s.is_server_error() => Some(Error::OperationFailed),
            _ => Some(Error::Runtime),
        }
    }
}

/// Classifies the outcome of one transfer attempt.
///
/// Rules apply top to bottom:
/// 1. a filesystem error dominates everything else (no retry can help);
/// 2. a transfer aborted because the caller cancelled becomes
///    `OperationInterrupted`;
/// 3. a transport failure is next;
/// 4. then the HTTP status;
/// 5. with nothing reported the attempt succeeded and `None` is returned.
pub fn classify(
    status: Option<StatusCode>,
    transport: Option<&reqwest::Error>,
    filesystem: Option<(&io::Error, Option<&Path>)>,
    cancelled: bool,
) -> Option<Error> {
    if let Some((err, path)) = filesystem {
        return Some(Error::from_io(err, path));
    }
    if cancelled {
        return Some(Error::OperationInterrupted);
    }
    if let Some(err) = transport {
        return Some(Error::from_transport(err));
    }
    if let Some(status) = status {
        return Error::from_status(status);
    }
    None
}

/// The transport failure inside a client error, when there is one, for
/// handing to [`classify`]. The middleware wrapper can also fail for
/// reasons of its own; those carry no transport error and callers fall
/// back to [`Error::Network`].
pub fn middleware_transport(err: &reqwest_middleware::Error) -> Option<&reqwest::Error> {
    match err {
        reqwest_middleware::Error::Reqwest(e) => Some(e),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(Error::Unknown.code(), 0x01);
        assert_eq!(Error::OperationFailed.code(), 0x2a);
        assert_eq!(Error::OperationInterrupted.code(), 0x2b);
        assert_eq!(Error::Filesystem.code(), 0x51);
        assert_eq!(Error::FilesystemNoSpace.code(), 0x55);
        assert_eq!(Error::FileNotFound.code(), 0x61);
        assert_eq!(Error::Network.code(), 0x81);
        assert_eq!(Error::Server.code(), 0xa1);
    }

    #[test]
    fn test_retryable_split() {
        assert!(Error::Network.is_retryable());
        assert!(Error::OperationFailed.is_retryable());

        assert!(Error::FileNotFound.is_fatal());
        assert!(Error::Server.is_fatal());
        assert!(Error::OperationInterrupted.is_fatal());
        assert!(Error::FilesystemNoSpace.is_fatal());
        assert!(Error::Runtime.is_fatal());
        assert!(Error::InvalidParam.is_fatal());
    }

    #[test]
    fn test_status_translation() {
        assert_eq!(Error::from_status(StatusCode::OK), None);
        assert_eq!(Error::from_status(StatusCode::PARTIAL_CONTENT), None);
        assert_eq!(
            Error::from_status(StatusCode::NOT_FOUND),
            Some(Error::FileNotFound)
        );
        assert_eq!(
            Error::from_status(StatusCode::SERVICE_UNAVAILABLE),
            Some(Error::Server)
        );
        assert_eq!(
            Error::from_status(StatusCode::FORBIDDEN),
            Some(Error::OperationFailed)
        );
        assert_eq!(
            Error::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(Error::OperationFailed)
        );
        assert_eq!(
            Error::from_status(StatusCode::NO_CONTENT),
            Some(Error::Runtime)
        );
    }

    #[test]
    fn test_io_translation() {
        use std::io::ErrorKind;

        let cases = [
            (ErrorKind::StorageFull, Error::FilesystemNoSpace),
            (ErrorKind::QuotaExceeded, Error::FilesystemNoSpace),
            (
                ErrorKind::FileTooLarge,
                Error::FilesystemNotSupportLargeFiles,
            ),
            (ErrorKind::PermissionDenied, Error::FileNotWritable),
            (ErrorKind::NotFound, Error::FileNotFound),
            (
                ErrorKind::StaleNetworkFileHandle,
                Error::FilesystemUnavailable,
            ),
            (ErrorKind::InvalidFilename, Error::FilePathTooLong),
            (ErrorKind::ResourceBusy, Error::FileWasUsedByOtherProcesses),
            (ErrorKind::Other, Error::Filesystem),
        ];
        for (kind, expected) in cases {
            let err = io::Error::new(kind, "test");
            assert_eq!(Error::from_io(&err, Some(Path::new("out.bin"))), expected);
        }
    }

    #[test]
    fn test_io_network_errors_depend_on_path() {
        let err = io::Error::new(io::ErrorKind::NetworkDown, "test");
        assert_eq!(
            Error::from_io(&err, Some(Path::new("out.bin"))),
            Error::FilesystemNetwork
        );
        assert_eq!(Error::from_io(&err, None), Error::Network);
    }

    #[test]
    fn test_classify_filesystem_dominates() {
        let io_err = io::Error::new(io::ErrorKind::StorageFull, "test");
        let got = classify(
            Some(StatusCode::OK),
            None,
            Some((&io_err, Some(Path::new("out.bin")))),
            true,
        );
        assert_eq!(got, Some(Error::FilesystemNoSpace));
    }

    #[test]
    fn test_classify_cancellation() {
        let got = classify(Some(StatusCode::OK), None, None, true);
        assert_eq!(got, Some(Error::OperationInterrupted));
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(Some(StatusCode::OK), None, None, false), None);
        assert_eq!(
            classify(Some(StatusCode::PARTIAL_CONTENT), None, None, false),
            None
        );
        assert_eq!(classify(None, None, None, false), None);
    }

    #[test]
    fn test_classify_status_fallthrough() {
        assert_eq!(
            classify(Some(StatusCode::NOT_FOUND), None, None, false),
            Some(Error::FileNotFound)
        );
        assert_eq!(
            classify(Some(StatusCode::SERVICE_UNAVAILABLE), None, None, false),
            Some(Error::Server)
        );
    }
}
