use thiserror::Error;

use super::validator::ValidationError;
use crate::exec::CommandFailure;

#[derive(Error, Debug)]
pub enum MultipathError {
    #[error("invalid WWID: {0}")]
    InvalidWwid(String),

    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    #[error("failed to back up configuration: {0}")]
    Backup(#[from] crate::backup::BackupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MultipathError>;
