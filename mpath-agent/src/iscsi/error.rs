use thiserror::Error;

use crate::exec::CommandFailure;

#[derive(Error, Debug)]
pub enum IscsiError {
    #[error("storage '{0}' already exists")]
    StorageExists(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid portal: {0}")]
    InvalidPortal(String),

    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IscsiError>;
