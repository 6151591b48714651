use std::io;
use std::path::PathBuf;

use building::CompileError;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open log file: {0}")]
    LogFile(#[source] io::Error),
    #[error("Failed to install logger: {0}")]
    Logger(#[from] SetGlobalDefaultError),
    #[error("{0}")]
    Compile(#[from] CompileError),
}
