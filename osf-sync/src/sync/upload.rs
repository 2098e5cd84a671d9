use std::io;

use osf_core::paths;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::source::{HashAlgorithm, UploadSource};
use super::transfer::{self, TransferError};
use crate::tree::resolve::find_by_path;
use crate::tree::{Container, Entity, Folder, Storage, TreeError, create_folder};

/// Below this size a connection error during upload is reported as
/// ambiguous instead of as a conflict: small bodies rarely reach the server
/// before the connection drops.
pub const AMBIGUOUS_CONFLICT_CUTOFF: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub force: bool,
    pub update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{path} already exists")]
    AlreadyExists { path: String },
    #[error(
        "there was a connection error which might mean {path} already exists; \
         try again with the `--force` flag specified"
    )]
    AmbiguousConflict { path: String },
    #[error("could not create a new file at {path} nor update it")]
    NotFound { path: String },
    #[error("{path} is a folder and cannot be updated")]
    NotAFile { path: String },
    #[error("upload of {path} failed with status {status}")]
    UnexpectedStatus { path: String, status: StatusCode },
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    pub fn path(&self) -> Option<&str> {
        match self {
            UploadError::AlreadyExists { path }
            | UploadError::AmbiguousConflict { path }
            | UploadError::NotFound { path }
            | UploadError::NotAFile { path }
            | UploadError::UnexpectedStatus { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Stores `source` at `path` inside `storage`, creating missing parent
/// folders on the way.
///
/// An existing file is only touched when `options` allow it: `update`
/// rewrites it when the md5 differs, `force` rewrites it regardless.
pub async fn create_or_update_file(
    storage: &Storage,
    path: &str,
    source: &UploadSource,
    options: UploadOptions,
) -> Result<UploadOutcome, UploadError> {
    let normalized = paths::normalize(path);
    let (dirs, leaf) = paths::split_leaf(&normalized);
    let display_path = paths::join("", &normalized);
    if leaf.is_empty() {
        return Err(UploadError::NotAFile { path: display_path });
    }

    let mut parent: Option<Folder> = None;
    for dir in dirs {
        let folder = match &parent {
            Some(folder) => create_folder(folder, dir, true).await?,
            None => create_folder(storage, dir, true).await?,
        };
        parent = Some(folder);
    }
    let container: &dyn Container = match &parent {
        Some(folder) => folder,
        None => storage,
    };
    let link = container.upload_link().ok_or_else(|| TreeError::MissingLink {
        path: container.path().to_string(),
        link: "upload",
    })?;

    info!(path = %display_path, "uploading file");
    let uploaded =
        transfer::upload_from(container.session(), source, link, &[("name", leaf)]).await;
    let ambiguous = match uploaded {
        Ok(response) => match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                info!(path = %display_path, "created");
                return Ok(UploadOutcome::Created);
            }
            StatusCode::CONFLICT => false,
            status => {
                return Err(UploadError::UnexpectedStatus {
                    path: display_path,
                    status,
                });
            }
        },
        Err(err) if err.is_transport() => {
            warn!(path = %display_path, error = %err, "connection error during upload");
            true
        }
        Err(err) => return Err(err.into()),
    };

    if !options.force && !options.update {
        if ambiguous && source.len().await? < AMBIGUOUS_CONFLICT_CUTOFF {
            return Err(UploadError::AmbiguousConflict { path: display_path });
        }
        return Err(UploadError::AlreadyExists { path: display_path });
    }

    let file = match find_by_path(storage, &normalized).await? {
        None => return Err(UploadError::NotFound { path: display_path }),
        Some(Entity::Folder(_)) => return Err(UploadError::NotAFile { path: display_path }),
        Some(Entity::File(file)) => file,
    };

    if !options.force {
        let local = source.checksum(HashAlgorithm::Md5).await?;
        let remote = file.hash(HashAlgorithm::Md5.name());
        if remote.is_some_and(|remote| remote.eq_ignore_ascii_case(&local)) {
            info!(path = %display_path, md5 = %local, "remote file already up to date");
            return Ok(UploadOutcome::Unchanged);
        }
        debug!(path = %display_path, local = %local, remote = ?remote, "checksums differ");
    }

    file.update(source).await?;
    info!(path = %display_path, "updated");
    Ok(UploadOutcome::Updated)
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
