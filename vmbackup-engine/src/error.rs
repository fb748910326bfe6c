//! Error types for backup and restore operations.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vmbackup_platform::PlatformError;

/// What a failed relocation step was moving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationTarget {
    /// An image directory, named by its disk group id.
    DiskGroup(String),
    /// The directory holding the VM's OVF.
    VmMetadata(String),
}

impl fmt::Display for RelocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiskGroup(id) => write!(f, "disk group {}", id),
            Self::VmMetadata(id) => write!(f, "VM metadata {}", id),
        }
    }
}

/// Errors that can occur during backup and restore.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The platform rejected a request.
    #[error("Remote operation failed{}: {reason}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    RemoteOperation {
        /// HTTP status, when the platform answered at all
        status: Option<u16>,
        reason: String,
    },

    /// An expected resource is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A lookup key matched more than one entity.
    #[error("Ambiguous match for {what}: {count} candidates")]
    AmbiguousMatch { what: String, count: usize },

    /// Malformed OVF payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// File write or read failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive tool exited unsuccessfully.
    #[error("{tool} failed ({}): {stderr}", exit_label(.code))]
    Subprocess {
        tool: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        stderr: String,
    },

    /// A wait ran past its deadline.
    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    /// A wait was cancelled.
    #[error("Cancelled while waiting for {operation}")]
    Cancelled { operation: String },

    /// The archive tool succeeded but nothing was retrieved.
    #[error("Archive not found: {} does not exist after retrieval", .path.display())]
    ArchiveNotFound { path: PathBuf },

    /// A caller-supplied value was rejected before any work started.
    #[error("Invalid {what}: {reason}")]
    InvalidInput { what: String, reason: String },

    /// The resource about to be created already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A move into the export domain failed. Earlier moves are not undone.
    #[error("Failed to relocate {target} into {}: {source} (already moved: {moved:?})", .destination.display())]
    Relocation {
        target: RelocationTarget,
        destination: PathBuf,
        /// Disk groups moved before the failure
        moved: Vec<String>,
        #[source]
        source: io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}

impl BackupError {
    /// Create an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Process exit code for this error.
    ///
    /// `1` when the archive did not contain the requested directory, the
    /// archive tool's own code when it failed, `2` for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ArchiveNotFound { .. } => 1,
            Self::Subprocess { code: Some(code), .. } if *code != 0 => *code,
            _ => 2,
        }
    }
}

impl From<PlatformError> for BackupError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Request { status, reason } => Self::RemoteOperation {
                status: Some(status),
                reason,
            },
            PlatformError::VmNotFound(name) => Self::NotFound(format!("vm {}", name)),
            PlatformError::NotFound(what) => Self::NotFound(what),
            other => Self::RemoteOperation {
                status: None,
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = BackupError::ArchiveNotFound { path: PathBuf::from("/data/restore/job42") };
        assert_eq!(err.exit_code(), 1);

        let err = BackupError::Subprocess {
            tool: "dsmc".to_string(),
            code: Some(12),
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 12);

        let err = BackupError::Subprocess {
            tool: "dsmc".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 2);

        let err = BackupError::Relocation {
            target: RelocationTarget::DiskGroup("grp1".to_string()),
            destination: PathBuf::from("/export/images"),
            moved: vec![],
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_from_platform_error() {
        let err: BackupError = PlatformError::Request {
            status: 409,
            reason: "name in use".to_string(),
        }.into();
        assert!(matches!(err, BackupError::RemoteOperation { status: Some(409), .. }));

        let err: BackupError = PlatformError::VmNotFound("web01".to_string()).into();
        assert!(matches!(err, BackupError::NotFound(ref what) if what == "vm web01"));

        let err: BackupError = PlatformError::Connection("refused".to_string()).into();
        assert!(matches!(err, BackupError::RemoteOperation { status: None, .. }));
    }

    #[test]
    fn test_display() {
        let err = BackupError::RemoteOperation { status: Some(404), reason: "gone".to_string() };
        assert_eq!(err.to_string(), "Remote operation failed (404): gone");

        let err = BackupError::Subprocess {
            tool: "dsmc".to_string(),
            code: None,
            stderr: "terminated".to_string(),
        };
        assert_eq!(err.to_string(), "dsmc failed (killed by signal): terminated");
    }
}
