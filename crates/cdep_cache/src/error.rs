//! Error types for state store operations.

use std::path::PathBuf;

/// Errors that can occur while persisting or decoding compilation state.
///
/// Loading never surfaces these: a state that fails to decode is treated as
/// absent. Storing does, so that a build whose state could not be written is
/// reported as failed instead of silently leaving stale state behind.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing a state file.
    #[error("state I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A state file has an invalid or missing header.
    #[error("invalid state header: {reason}")]
    InvalidHeader {
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("state checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The checksum recorded in the header.
        expected: String,
        /// The checksum computed from the payload.
        actual: String,
    },

    /// The state was written by an incompatible format or tool version.
    #[error("state version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The version this build understands.
        expected: String,
        /// The version recorded in the file.
        actual: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("state serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/.cdep/state/abc.state"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("state I/O error"));
        assert!(msg.contains("abc.state"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = CacheError::ChecksumMismatch {
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = CacheError::VersionMismatch {
            expected: "format 2".to_string(),
            actual: "format 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected format 2"));
        assert!(msg.contains("got format 1"));
    }

    #[test]
    fn serialization_error_display() {
        let err = CacheError::Serialization {
            reason: "unexpected end of input".to_string(),
        };
        assert!(err.to_string().contains("unexpected end of input"));
    }
}
