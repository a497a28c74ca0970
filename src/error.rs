use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pose pipeline error types
#[derive(Error, Debug)]
pub enum PoseError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Pairing mismatch: {0}")]
    PairingMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid quaternion: {0}")]
    InvalidQuaternion(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PoseError>;

impl PoseError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PoseError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Stable label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PoseError::Io { .. } => "io",
            PoseError::Schema(_) => "schema",
            PoseError::Parse(_) => "parse",
            PoseError::NumericalInstability(_) => "numerical_instability",
            PoseError::PairingMismatch(_) => "pairing_mismatch",
            PoseError::InvalidConfig(_) => "invalid_config",
            PoseError::InvalidQuaternion(_) => "invalid_quaternion",
        }
    }

    /// I/O failures that may succeed on a second attempt. Missing files,
    /// permission problems and every non-I/O error are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            PoseError::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Attach trace context to this error.
    pub fn in_trace(self, path: impl AsRef<Path>, row: Option<usize>) -> TraceFailure {
        TraceFailure {
            path: path.as_ref().to_path_buf(),
            row,
            error: self,
        }
    }
}

/// A failure scoped to a single trace file
#[derive(Error, Debug)]
#[error("{} (row {}): [{}] {}", .path.display(), row_label(.row), .error.kind(), .error)]
pub struct TraceFailure {
    pub path: PathBuf,
    /// 0-based data row (header excluded), when the failure is tied to one
    pub row: Option<usize>,
    #[source]
    pub error: PoseError,
}

/// A failure at a known data row, before the file it came from is attached
#[derive(Error, Debug)]
#[error("row {row}: {error}")]
pub struct RowError {
    pub row: usize,
    #[source]
    pub error: PoseError,
}

impl RowError {
    pub fn in_trace(self, path: impl AsRef<Path>) -> TraceFailure {
        self.error.in_trace(path, Some(self.row))
    }
}

fn row_label(row: &Option<usize>) -> String {
    row.map_or_else(|| "-".to_string(), |r| r.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(PoseError::Parse("x".into()).kind(), "parse");
        assert_eq!(
            PoseError::NumericalInstability("S".into()).kind(),
            "numerical_instability"
        );
        let io = PoseError::io("a.csv", std::io::Error::new(ErrorKind::NotFound, "gone"));
        assert_eq!(io.kind(), "io");
        assert!(!PoseError::Schema("cols".into()).is_transient());
    }

    #[test]
    fn test_only_transient_io_kinds_retry() {
        let io = |kind| PoseError::io("a.csv", std::io::Error::new(kind, "io"));
        for kind in [ErrorKind::Interrupted, ErrorKind::TimedOut, ErrorKind::WouldBlock] {
            assert!(io(kind).is_transient(), "{kind:?}");
        }
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::InvalidData,
        ] {
            assert!(!io(kind).is_transient(), "{kind:?}");
        }
    }

    #[test]
    fn test_trace_failure_display() {
        let failure = PoseError::Parse("bad value".into()).in_trace("trace_a.csv", Some(12));
        let msg = failure.to_string();
        assert!(msg.contains("trace_a.csv"));
        assert!(msg.contains("row 12"));
        assert!(msg.contains("[parse]"));

        let no_row = PoseError::Schema("missing PosX".into()).in_trace("b.csv", None);
        assert!(no_row.to_string().contains("row -"));
    }
}
