use thiserror::Error;

use crate::db::RepositoryId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("No item with id {0} in the repository")]
    NotFound(RepositoryId),

    #[error("The item is not known to the repository")]
    ItemNotFound,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} was used after it was disposed")]
    Disposed(&'static str),
}

/// Returned by the typed property accessors when a field already holds a
/// value of a different kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Field '{name}' holds a {found} value, expected {expected}")]
pub struct PropertyError {
    pub name: String,
    pub expected: &'static str,
    pub found: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SortError {
    #[error("A writing system id is required for sorting")]
    InvalidWritingSystem,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
