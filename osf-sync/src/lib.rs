pub mod config;
#[cfg(test)]
mod fixtures;
pub mod project;
pub mod sync;
pub mod tree;

pub use config::SyncConfig;
pub use project::{OsfClient, Project};
pub use sync::fetch::{DownloadOptions, DownloadOutcome, FetchError, clone_project, fetch_file};
pub use sync::source::{HashAlgorithm, UploadSource};
pub use sync::transfer::TransferError;
pub use sync::upload::{UploadError, UploadOptions, UploadOutcome, create_or_update_file};
pub use tree::{Container, Entity, Folder, RemoteFile, Storage, TreeError};
