use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlCompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found or unreadable: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A matched pair whose file names differ; indicates a bug in matching
    #[error("Invalid pair: {} does not match {}", .upstream.display(), .custom.display())]
    InvalidPair { upstream: PathBuf, custom: PathBuf },

    #[error("Parse error in {} at line {line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Path error: {0}")]
    Path(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, MlCompareError>;
