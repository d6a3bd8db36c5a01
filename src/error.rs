use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The archive could not be opened or its entries could not be enumerated.
    #[error("Failed to read archive {}: {source}", path.display())]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad patch format: {0}")]
    BadPatchFormat(String),

    #[error("Invalid move, target used twice: {target}")]
    DuplicateMoveTarget { target: String },

    #[error("Move source '{source_name}' not found in old archive (command: {command})")]
    MissingMoveSource {
        source_name: String,
        command: String,
    },

    /// Names with whitespace other than a plain space cannot be written to the index.
    #[error("Entry name cannot be encoded in the patch index: {0:?}")]
    UnencodableName(String),

    #[error("New archive contains the reserved patch index entry: {0}")]
    ReservedEntryName(String),

    #[error("Entry written twice to output archive: {0}")]
    DuplicateOutputEntry(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::Io(std::io::Error::other(other)),
        }
    }
}
