//! Error taxonomy shared by the mesh, material and cache loaders.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// File missing or unreadable.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed directive arguments that cannot be read leniently.
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A face corner resolved outside its raw attribute array.
    #[error("Face on line {line} references {kind} index {index} outside 0..{len}")]
    Geometry {
        line: usize,
        kind: &'static str,
        index: i64,
        len: usize,
    },

    /// Truncated, inconsistent or foreign binary cache.
    #[error("Cache format error: {0}")]
    CacheFormat(String),

    /// Texture map with an extension no decoder handles.
    #[error("Unsupported map format: '{}'", .0.display())]
    UnsupportedMap(PathBuf),
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::CacheFormat(message.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
