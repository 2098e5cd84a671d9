use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const CHECKSUM_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Local content to upload.
///
/// A source can be opened any number of times and every reader starts at
/// the beginning, which is what an overwrite after a failed create needs.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Bytes),
}

impl UploadSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        UploadSource::Path(path.into())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        UploadSource::Bytes(bytes.into())
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            UploadSource::Path(path) => Some(path),
            UploadSource::Bytes(_) => None,
        }
    }

    pub async fn len(&self) -> io::Result<u64> {
        match self {
            UploadSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            UploadSource::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    pub async fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn open(&self) -> io::Result<Pin<Box<dyn AsyncRead + Send + Sync>>> {
        match self {
            UploadSource::Path(path) => Ok(Box::pin(tokio::fs::File::open(path).await?)),
            UploadSource::Bytes(bytes) => Ok(Box::pin(Cursor::new(bytes.clone()))),
        }
    }

    pub async fn checksum(&self, algorithm: HashAlgorithm) -> io::Result<String> {
        let mut reader = self.open().await?;
        let mut buf = vec![0u8; CHECKSUM_BLOCK_SIZE];
        match algorithm {
            HashAlgorithm::Md5 => {
                let mut ctx = md5::Context::new();
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    ctx.consume(&buf[..n]);
                }
                Ok(format!("{:x}", ctx.compute()))
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn checksums_match_known_digests() {
        let source = UploadSource::from_bytes("hello");
        assert_eq!(
            source.checksum(HashAlgorithm::Md5).await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            source.checksum(HashAlgorithm::Sha256).await.unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn file_source_reopens_from_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"payload").unwrap();
        let source = UploadSource::from_path(&path);

        for _ in 0..2 {
            let mut out = Vec::new();
            source.open().await.unwrap().read_to_end(&mut out).await.unwrap();
            assert_eq!(out, b"payload");
        }
        assert_eq!(source.len().await.unwrap(), 7);
        assert!(!source.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn checksum_spans_multiple_blocks() {
        let content = vec![7u8; CHECKSUM_BLOCK_SIZE * 2 + 11];
        let expected = format!("{:x}", md5::compute(&content));
        let source = UploadSource::from_bytes(content);
        assert_eq!(source.checksum(HashAlgorithm::Md5).await.unwrap(), expected);
    }

    #[test]
    fn algorithm_names_match_provider_keys() {
        assert_eq!(HashAlgorithm::Md5.name(), "md5");
        assert_eq!(HashAlgorithm::Sha256.name(), "sha256");
    }
}
