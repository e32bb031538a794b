use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlakError>;

#[derive(Debug, Error)]
pub enum PlakError {
    #[error("{what} '{name}' already exists")]
    DuplicateName { what: &'static str, name: String },

    #[error("{what} '{key}' not found")]
    NotFound { what: &'static str, key: String },

    #[error("'{0}' is not a valid IPv4 or IPv6 address")]
    InvalidAddress(String),

    #[error("permission denied: {}", .path.display())]
    Permission { path: PathBuf },

    #[error("could not inspect key '{name}': {reason}")]
    Inspection { name: String, reason: String },

    #[error("removed private key '{name}' but not its public key: {source}")]
    PartialDelete {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{} cannot be read as a text file: {reason}", .path.display())]
    MalformedFile { path: PathBuf, reason: &'static str },

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("{program} failed: {message}")]
    Process { program: String, message: String },

    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlakError {
    /// Classify an I/O failure on `path`, keeping permission problems distinct.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            PlakError::Permission {
                path: path.to_path_buf(),
            }
        } else {
            PlakError::Io(err)
        }
    }
}
