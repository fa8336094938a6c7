use std::path::PathBuf;

use thiserror::Error;

/// jmanager error types
#[derive(Error, Debug)]
pub enum JailError {
    /// A `zfs` invocation failed or produced output that could not be parsed
    #[error("ZFS error: {operation} - {message}")]
    Store { operation: String, message: String },

    /// Distribution archive missing or corrupt
    #[error("Archive error: {} - {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// The base image a jail depends on is not complete
    #[error("Prerequisite error: {0}")]
    Prerequisite(String),

    /// The target already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dataset, jail or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Downloading a distribution archive failed
    #[error("Transport error: {url} - {message}")]
    Transport { url: String, message: String },

    /// A string outside a closed vocabulary, or a malformed record
    #[error("Parse error: {0}")]
    Parse(String),

    /// The provisioning tool failed
    #[error("Provision error: {0}")]
    Provision(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl JailError {
    /// Build a store error for the given `zfs` operation.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        JailError::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build an archive error for the given archive path.
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        JailError::Archive {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for JailError {
    fn from(err: serde_json::Error) -> Self {
        JailError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for JailError {
    fn from(err: serde_yaml::Error) -> Self {
        JailError::Serialization(err.to_string())
    }
}

/// Result type alias for jmanager operations
pub type Result<T> = std::result::Result<T, JailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let error = JailError::store("zfs snapshot zroot/jails@x", "permission denied");
        assert_eq!(
            error.to_string(),
            "ZFS error: zfs snapshot zroot/jails@x - permission denied"
        );
    }

    #[test]
    fn test_archive_error_display() {
        let error = JailError::archive("/tmp/base.txz", "not found");
        assert_eq!(error.to_string(), "Archive error: /tmp/base.txz - not found");
    }

    #[test]
    fn test_prerequisite_error_display() {
        let error = JailError::Prerequisite("base image 12.0-RELEASE/amd64 missing".to_string());
        assert_eq!(
            error.to_string(),
            "Prerequisite error: base image 12.0-RELEASE/amd64 missing"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let error = JailError::Transport {
            url: "https://download.FreeBSD.org/base.txz".to_string(),
            message: "404 Not Found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transport error: https://download.FreeBSD.org/base.txz - 404 Not Found"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: JailError = io_error.into();
        assert!(matches!(error, JailError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: JailError = result.unwrap_err().into();
        assert!(matches!(error, JailError::Serialization(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: JailError = result.unwrap_err().into();
        assert!(matches!(error, JailError::Serialization(_)));
    }
}
