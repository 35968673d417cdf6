//! Error taxonomy for archive requests.
//!
//! Every failure the pipeline can hit maps to one [`ArchiveError`] variant.
//! Errors raised before streaming starts are turned into a status code and
//! error code for the caller; errors raised afterwards can only end the
//! stream early.

use std::io;

use thiserror::Error;

/// Message returned to clients asking for something other than a `.zip`.
pub const NOT_A_ZIP_MESSAGE: &str = "This access point can only be used to download ZIP files";

/// Failures of a single archive request.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The request path does not name a ZIP file.
    #[error("This access point can only be used to download ZIP files")]
    Validation { path: String },

    /// A listing page could not be fetched.
    #[error("There was an error paginating S3: {0}")]
    Pagination(#[source] anyhow::Error),

    /// An object's content could not be opened or read.
    #[error("getting object {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Archive structure could not be written to the output.
    #[error("writing archive: {0}")]
    Write(#[source] io::Error),

    /// The request was cancelled or ran past its deadline.
    #[error("request cancelled: {reason}")]
    Cancelled { reason: &'static str },

    /// The producer task panicked or disappeared.
    #[error("unexpected fault: {0}")]
    UnexpectedFault(String),
}

impl ArchiveError {
    /// Error code reported alongside the status code.
    pub fn code(&self) -> &'static str {
        match self {
            ArchiveError::Validation { .. } => "NotAZipFile",
            ArchiveError::Pagination(_) => "PaginationError",
            ArchiveError::Fetch { .. } => "FetchError",
            ArchiveError::Write(_) => "WriteError",
            ArchiveError::Cancelled { .. } => "Cancelled",
            ArchiveError::UnexpectedFault(_) => "InternalError",
        }
    }

    /// HTTP status code for errors that are reported before streaming.
    pub fn status_code(&self) -> u16 {
        match self {
            ArchiveError::Validation { .. } => 400,
            ArchiveError::Cancelled { .. } => 503,
            _ => 500,
        }
    }

    /// Convert into an `io::Error` for the consumer side of the pipe.
    pub fn into_io(self) -> io::Error {
        match self {
            ArchiveError::Write(e) => e,
            ArchiveError::Cancelled { .. } => io::Error::new(io::ErrorKind::TimedOut, self),
            other => io::Error::other(other),
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        ArchiveError::Write(e)
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
