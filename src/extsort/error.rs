use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a sort operation.
///
/// Every variant names the path involved and carries the I/O cause. On any
/// error the destination contents must be treated as invalid.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("error reading the file {}", path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error creating a temporary file in {}", dir.display())]
    CreateTemp {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error writing the temporary file {}", path.display())]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading the temporary file {}", path.display())]
    ReadTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error writing the file {}", path.display())]
    WriteTarget {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot start the merge worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl SortError {
    /// The underlying I/O error, if this failure came from file access.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            SortError::ReadSource { source, .. }
            | SortError::CreateTemp { source, .. }
            | SortError::WriteTemp { source, .. }
            | SortError::ReadTemp { source, .. }
            | SortError::WriteTarget { source, .. } => Some(source),
            SortError::WorkerPool(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SortError>;
