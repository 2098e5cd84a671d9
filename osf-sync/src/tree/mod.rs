//! Lazily materialized view of a storage's remote tree.
//!
//! Nothing here caches: every listing goes back to the provider, and the
//! streams returned are single-pass. Call the listing again to walk it twice.

mod container;
mod entity;
pub mod resolve;
mod storage;

use std::pin::Pin;

use futures_util::Stream;
use osf_core::OsfError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::sync::transfer::TransferError;

pub use container::{Container, children, create_folder, files, flatten, folders, recursive_files};
pub(crate) use container::records;
pub use entity::{Entity, Folder, RemoteFile};
pub use storage::Storage;

pub type EntityStream<'a> = Pin<Box<dyn Stream<Item = Result<Entity, TreeError>> + Send + 'a>>;
pub type FileStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteFile, TreeError>> + Send + 'a>>;
pub type FolderStream<'a> = Pin<Box<dyn Stream<Item = Result<Folder, TreeError>> + Send + 'a>>;
pub type StorageStream<'a> = Pin<Box<dyn Stream<Item = Result<Storage, TreeError>> + Send + 'a>>;

/// Boxes a `try_stream!` body so its `?` conversions target [`TreeError`].
pub(crate) fn boxed<'a, T>(
    stream: impl Stream<Item = Result<T, TreeError>> + Send + 'a,
) -> Pin<Box<dyn Stream<Item = Result<T, TreeError>> + Send + 'a>> {
    Box::pin(stream)
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("api error: {0}")]
    Api(#[from] OsfError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("{path} already exists")]
    AlreadyExists { path: String },
    #[error("{path} was not found")]
    NotFound { path: String },
    #[error("could not delete {path} (status {status})")]
    RemoveFailed { path: String, status: StatusCode },
    #[error("could not move {path} (status {status})")]
    MoveFailed { path: String, status: StatusCode },
    #[error("could not update {path} (status {status})")]
    UpdateFailed { path: String, status: StatusCode },
    #[error("unexpected status {status} for {path}")]
    UnexpectedStatus { path: String, status: StatusCode },
    #[error("{path} has no {link} link")]
    MissingLink { path: String, link: &'static str },
    #[error("project has no storage provider '{provider}'")]
    NoSuchStorage { provider: String },
}

impl TreeError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TreeError::RemoveFailed { status, .. }
            | TreeError::MoveFailed { status, .. }
            | TreeError::UpdateFailed { status, .. }
            | TreeError::UnexpectedStatus { status, .. } => Some(*status),
            TreeError::Api(err) => err.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
