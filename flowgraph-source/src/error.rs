use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Input path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No batch files (*{extension}) found in {}", .dir.display())]
    NoBatches { dir: PathBuf, extension: &'static str },

    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid batch file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Batch producer failed: {0}")]
    Producer(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SourceError>;
