use std::io;
use std::path::{Path, PathBuf};

use futures_util::TryStreamExt;
use osf_core::paths;
use thiserror::Error;
use tracing::{debug, info};

use super::source::{HashAlgorithm, UploadSource};
use super::transfer::{TransferError, download_to_path};
use crate::project::Project;
use crate::tree::{RemoteFile, TreeError, recursive_files};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    pub force: bool,
    pub update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Written(u64),
    Unchanged,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("local file {} already exists, not overwriting", .path.display())]
    LocalExists { path: PathBuf },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub async fn fetch_file(
    file: &RemoteFile,
    target: &Path,
    options: DownloadOptions,
) -> Result<DownloadOutcome, FetchError> {
    if tokio::fs::try_exists(target).await? {
        if !options.force && !options.update {
            return Err(FetchError::LocalExists {
                path: target.to_path_buf(),
            });
        }
        if !options.force && local_matches(file, target).await? {
            debug!(path = %file.path(), target = %target.display(), "local copy up to date");
            return Ok(DownloadOutcome::Unchanged);
        }
    }
    let written = download_to_path(file, target).await?;
    Ok(DownloadOutcome::Written(written))
}

/// Mirrors every file of every storage in `project` under
/// `dest/<provider>/<path>`. Existing local files are overwritten unless
/// `update` is set, in which case files whose md5 already matches are kept.
pub async fn clone_project(
    project: &Project,
    dest: &Path,
    update: bool,
) -> Result<Vec<(PathBuf, DownloadOutcome)>, FetchError> {
    let options = DownloadOptions {
        force: !update,
        update,
    };
    let mut fetched = Vec::new();
    let mut storages = project.storages();
    while let Some(storage) = storages.try_next().await? {
        let mut files = recursive_files(&storage, true);
        while let Some(file) = files.try_next().await? {
            let target = local_target(dest, storage.provider(), file.path());
            let outcome = fetch_file(&file, &target, options).await?;
            fetched.push((target, outcome));
        }
    }
    info!(project = %project.id(), files = fetched.len(), "clone finished");
    Ok(fetched)
}

async fn local_matches(file: &RemoteFile, target: &Path) -> io::Result<bool> {
    let Some(remote) = file.hash(HashAlgorithm::Md5.name()) else {
        return Ok(false);
    };
    let local = UploadSource::from_path(target)
        .checksum(HashAlgorithm::Md5)
        .await?;
    Ok(local.eq_ignore_ascii_case(remote))
}

fn local_target(dest: &Path, provider: &str, remote: &str) -> PathBuf {
    let mut target = dest.join(provider);
    target.extend(paths::normalize(remote).split('/').filter(|s| !s.is_empty()));
    target
}
