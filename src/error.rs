use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum AuditError {
    Browser(String),
    Navigation { url: String, message: String },
    Evaluation(String),
    Snapshot(String),
    Stylesheet { path: PathBuf, message: String },
    Rebuild(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Browser(message) => write!(f, "browser error: {}", message),
            AuditError::Navigation { url, message } => {
                write!(f, "navigation to {} failed: {}", url, message)
            }
            AuditError::Evaluation(message) => write!(f, "page evaluation failed: {}", message),
            AuditError::Snapshot(message) => write!(f, "invalid page snapshot: {}", message),
            AuditError::Stylesheet { path, message } => {
                write!(f, "stylesheet {}: {}", path.display(), message)
            }
            AuditError::Rebuild(message) => write!(f, "site rebuild failed: {}", message),
            AuditError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            AuditError::Io(err) => write!(f, "io error: {}", err),
            AuditError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuditError::Io(err) => Some(err),
            AuditError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(value: std::io::Error) -> Self {
        AuditError::Io(value)
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(value: serde_json::Error) -> Self {
        AuditError::Json(value)
    }
}
