//! 错误类型
//!
//! Every failure the library can report is one variant of [`Error`]. Inside a
//! batch these are captured per item; at the public boundary the
//! `raise_on_error` switch decides whether they reach the caller.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Connection failure or mid-transfer disconnect
    #[error("network error while fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-success status code
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("timed out after {timeout:?} while fetching {url}")]
    Timeout { url: String, timeout: Duration },

    /// Creating a directory, opening a file or writing a chunk failed
    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed input: unreadable batch file, bad URL, unsupported option
    #[error("invalid input: {0}")]
    Input(String),

    #[error("ftp error while fetching {url}: {message}")]
    Ftp { url: String, message: String },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    Filesystem,
    Input,
    Archive,
    Decode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } | Error::Status { .. } | Error::Ftp { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Filesystem { .. } => ErrorKind::Filesystem,
            Error::Input(_) => ErrorKind::Input,
            Error::Archive(_) => ErrorKind::Archive,
            Error::Json(_) => ErrorKind::Decode,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// 包装文件系统错误
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// 将reqwest错误归类为超时、状态码或网络错误
    pub fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout {
                url: url.to_string(),
                timeout,
            };
        }
        if let Some(status) = err.status() {
            return Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        Error::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Classify a failed read from a response body
    pub fn from_read(url: &str, timeout: Duration, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            Error::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            Error::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}
