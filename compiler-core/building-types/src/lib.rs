pub mod include_name_map;
pub use include_name_map::*;

mod fingerprint;
pub use fingerprint::*;

use files::FileId;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKey {
    Content(FileId),
    IncludeTarget(IncludeNameId),
    Config,
    Parsed(FileId),
    IncludeTargets(FileId),
    Includes(FileId),
    Evaluated(FileId),
    Document(FileId),
    LaidOut(FileId),
    Artifacts(FileId),
    Diagnostics(FileId),
    Compiled(FileId),
}

#[derive(Debug, Error, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryError {
    #[error("Query cancelled")]
    Cancelled,
    #[error("Query cycle through {stack:?}")]
    Cycle { stack: Arc<[QueryKey]> },
}

pub type QueryResult<T> = Result<T, QueryError>;
