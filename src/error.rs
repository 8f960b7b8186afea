use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CinderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before a full message arrived")]
    ConnectionClosed,

    #[error("malformed message: {0:?}")]
    Malformed(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("unexpected reply {1:?} from {0}")]
    UnexpectedReply(String, String),

    #[error("registration rejected by scheduler at {0}")]
    RegistrationRejected(String),

    #[error("command `{0}` failed: {1}")]
    Command(String, String),

    #[error("invalid commit hash: {0:?}")]
    InvalidCommit(String),

    #[error("repository path is not a directory: {0}")]
    RepoMissing(PathBuf),
}

pub type Result<T> = std::result::Result<T, CinderError>;
