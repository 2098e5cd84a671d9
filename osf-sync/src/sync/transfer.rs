use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use md5::Context;
use osf_core::{OsfError, OsfSession};
use reqwest::{Body, Response, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

use super::source::UploadSource;
use crate::tree::RemoteFile;

pub const UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("api error: {0}")]
    Api(#[from] OsfError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download of {path} failed with status {status}")]
    Status { path: String, status: StatusCode },
    #[error("{path} has no {link} link")]
    MissingLink { path: String, link: &'static str },
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

impl TransferError {
    pub fn is_transport(&self) -> bool {
        match self {
            TransferError::Api(err) => err.is_transport(),
            TransferError::Request(err) => !err.is_decode() && !err.is_status(),
            _ => false,
        }
    }
}

/// PUTs `source` to `link`, merging `query` into the link's query string.
///
/// Empty content goes out as an explicit zero-length body: providers drop a
/// file whose streamed body turns out empty.
pub async fn upload_from(
    session: &OsfSession,
    source: &UploadSource,
    link: &Url,
    query: &[(&str, &str)],
) -> Result<Response, TransferError> {
    let len = source.len().await?;
    let body = if len == 0 {
        Body::from(Vec::new())
    } else {
        let reader = source.open().await?;
        Body::wrap_stream(ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE))
    };
    debug!(url = %link, bytes = len, "uploading");
    Ok(session.put(link, query, body).await?)
}

pub async fn download_to<W>(file: &RemoteFile, sink: &mut W) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    download_with_progress(file, sink, |_, _| {}).await
}

pub async fn download_with_progress<W, F>(
    file: &RemoteFile,
    sink: &mut W,
    mut progress: F,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(u64, Option<u64>),
{
    copy_download(file, sink, |_, written, total| progress(written, total)).await
}

/// Downloads `file` to `target` through a `.partial` sibling that is renamed
/// into place once complete. When the provider reports an md5 digest, the
/// written bytes are checked against it first.
pub async fn download_to_path(file: &RemoteFile, target: &Path) -> Result<u64, TransferError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(target);
    let mut out = tokio::fs::File::create(&partial).await?;
    let expected_md5 = file.hash("md5").map(str::to_ascii_lowercase);
    let mut md5 = expected_md5.as_ref().map(|_| Context::new());

    let written = copy_download(file, &mut out, |chunk, _, _| {
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(chunk);
        }
    })
    .await?;
    out.sync_all().await?;

    if let (Some(expected_md5), Some(ctx)) = (expected_md5, md5) {
        let actual_md5 = format!("{:x}", ctx.compute());
        if actual_md5 != expected_md5 {
            let _ = tokio::fs::remove_file(&partial).await;
            warn!(path = %file.path(), "downloaded content does not match remote md5");
            return Err(TransferError::IntegrityMismatch {
                expected_md5,
                actual_md5,
            });
        }
    }

    tokio::fs::rename(&partial, target).await?;
    info!(path = %file.path(), target = %target.display(), bytes = written, "downloaded");
    Ok(written)
}

async fn copy_download<W, F>(
    file: &RemoteFile,
    sink: &mut W,
    mut on_chunk: F,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(&[u8], u64, Option<u64>),
{
    let response = open_download(file).await?;
    if response.status() != StatusCode::OK {
        return Err(TransferError::Status {
            path: file.path().to_string(),
            status: response.status(),
        });
    }
    let total = response.content_length();
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_chunk(&chunk, written, total);
    }
    sink.flush().await?;
    debug!(path = %file.path(), bytes = written, "download finished");
    Ok(written)
}

/// Some storage backends only grant reads through the upload endpoint for
/// certain auth modes, so a 401 on the download link is retried there once.
async fn open_download(file: &RemoteFile) -> Result<Response, TransferError> {
    let session = file.session();
    let links = file.links();
    let download = links
        .download
        .as_ref()
        .ok_or_else(|| missing(file, "download"))?;
    match session.get_stream(download).await {
        Err(OsfError::Unauthorized { url }) => {
            debug!(path = %file.path(), url = %url, "download unauthorized, trying upload link");
            let upload = links.upload.as_ref().ok_or_else(|| missing(file, "upload"))?;
            Ok(session.get_stream(upload).await?)
        }
        other => Ok(other?),
    }
}

fn missing(file: &RemoteFile, link: &'static str) -> TransferError {
    TransferError::MissingLink {
        path: file.path().to_string(),
        link,
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
