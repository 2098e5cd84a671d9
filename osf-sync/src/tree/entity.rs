use std::collections::BTreeMap;

use osf_core::{ActionLinks, EntryKind, EntryRecord, OsfError, OsfSession, RawRecord, paths};
use reqwest::StatusCode;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;

use super::{Container, TreeError};
use crate::sync::source::UploadSource;
use crate::sync::transfer;

/// A file or folder as it was listed. Values are snapshots: operations act
/// through the provider and never update the value they were called on.
#[derive(Debug, Clone)]
pub enum Entity {
    File(RemoteFile),
    Folder(Folder),
}

#[derive(Debug, Clone)]
pub struct RemoteFile {
    session: OsfSession,
    record: EntryRecord,
}

#[derive(Debug, Clone)]
pub struct Folder {
    session: OsfSession,
    record: EntryRecord,
    listing: Url,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    action: &'static str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflict: Option<&'static str>,
}

impl Entity {
    pub(crate) fn decode(session: &OsfSession, raw: RawRecord) -> Result<Option<Self>, OsfError> {
        match raw.kind() {
            EntryKind::Unknown => {
                debug!(id = %raw.id, "skipping record of unknown kind");
                Ok(None)
            }
            EntryKind::File => Ok(Some(Entity::File(RemoteFile {
                session: session.clone(),
                record: EntryRecord::try_from(raw)?,
            }))),
            EntryKind::Folder => {
                let record = EntryRecord::try_from(raw)?;
                let listing = record.links.move_to.clone().ok_or_else(|| {
                    OsfError::Decode(format!("folder {} has no listing link", record.id))
                })?;
                Ok(Some(Entity::Folder(Folder {
                    session: session.clone(),
                    record,
                    listing,
                })))
            }
        }
    }

    fn record(&self) -> &EntryRecord {
        match self {
            Entity::File(file) => &file.record,
            Entity::Folder(folder) => &folder.record,
        }
    }

    fn session(&self) -> &OsfSession {
        match self {
            Entity::File(file) => &file.session,
            Entity::Folder(folder) => &folder.session,
        }
    }

    pub fn id(&self) -> &str {
        &self.record().id
    }

    pub fn path(&self) -> &str {
        &self.record().path
    }

    pub fn name(&self) -> &str {
        &self.record().name
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.record().created
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.record().modified
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entity::Folder(_))
    }

    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            Entity::File(file) => Some(file),
            Entity::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Entity::Folder(folder) => Some(folder),
            Entity::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<RemoteFile> {
        match self {
            Entity::File(file) => Some(file),
            Entity::Folder(_) => None,
        }
    }

    pub fn into_folder(self) -> Option<Folder> {
        match self {
            Entity::Folder(folder) => Some(folder),
            Entity::File(_) => None,
        }
    }

    pub async fn remove(&self) -> Result<(), TreeError> {
        remove_record(self.session(), self.record()).await
    }

    pub async fn move_to<C: Container + ?Sized>(
        &self,
        destination: &C,
        new_name: Option<&str>,
        force: bool,
    ) -> Result<(), TreeError> {
        move_record(self.session(), self.record(), destination, new_name, force).await
    }
}

impl RemoteFile {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn size(&self) -> Option<u64> {
        self.record.size
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.record.created
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.record.modified
    }

    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.record.hashes
    }

    pub fn hash(&self, algorithm: &str) -> Option<&str> {
        self.record.hashes.get(algorithm).map(String::as_str)
    }

    pub fn links(&self) -> &ActionLinks {
        &self.record.links
    }

    pub(crate) fn session(&self) -> &OsfSession {
        &self.session
    }

    pub async fn remove(&self) -> Result<(), TreeError> {
        remove_record(&self.session, &self.record).await
    }

    pub async fn move_to<C: Container + ?Sized>(
        &self,
        destination: &C,
        new_name: Option<&str>,
        force: bool,
    ) -> Result<(), TreeError> {
        move_record(&self.session, &self.record, destination, new_name, force).await
    }

    pub async fn update(&self, source: &UploadSource) -> Result<(), TreeError> {
        let url = link(&self.record, self.record.links.upload.as_ref(), "upload")?;
        info!(path = %self.path(), "updating remote file");
        let response = transfer::upload_from(&self.session, source, url, &[]).await?;
        if response.status() != StatusCode::OK {
            return Err(TreeError::UpdateFailed {
                path: self.path().to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }
}

impl Folder {
    pub(crate) fn from_record(session: OsfSession, raw: RawRecord) -> Result<Self, OsfError> {
        let id = raw.id.clone();
        match Entity::decode(&session, raw)? {
            Some(Entity::Folder(folder)) => Ok(folder),
            _ => Err(OsfError::Decode(format!("record {id} is not a folder"))),
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.record.created
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.record.modified
    }

    pub async fn create_folder(&self, name: &str, exist_ok: bool) -> Result<Folder, TreeError> {
        super::create_folder(self, name, exist_ok).await
    }

    pub async fn remove(&self) -> Result<(), TreeError> {
        remove_record(&self.session, &self.record).await
    }

    pub async fn move_to<C: Container + ?Sized>(
        &self,
        destination: &C,
        new_name: Option<&str>,
        force: bool,
    ) -> Result<(), TreeError> {
        move_record(&self.session, &self.record, destination, new_name, force).await
    }
}

impl Container for Folder {
    fn session(&self) -> &OsfSession {
        &self.session
    }

    fn path(&self) -> &str {
        &self.record.path
    }

    fn provider_path(&self) -> &str {
        self.record
            .provider_path
            .as_deref()
            .unwrap_or(&self.record.path)
    }

    fn listing_link(&self) -> &Url {
        &self.listing
    }

    fn upload_link(&self) -> Option<&Url> {
        self.record.links.upload.as_ref()
    }

    fn new_folder_link(&self) -> Option<&Url> {
        self.record.links.new_folder.as_ref()
    }
}

fn link<'a>(
    record: &EntryRecord,
    url: Option<&'a Url>,
    name: &'static str,
) -> Result<&'a Url, TreeError> {
    url.ok_or_else(|| TreeError::MissingLink {
        path: record.path.clone(),
        link: name,
    })
}

async fn remove_record(session: &OsfSession, record: &EntryRecord) -> Result<(), TreeError> {
    let url = link(record, record.links.delete.as_ref(), "delete")?;
    let response = session.delete(url).await?;
    if response.status() != StatusCode::NO_CONTENT {
        return Err(TreeError::RemoveFailed {
            path: record.path.clone(),
            status: response.status(),
        });
    }
    info!(path = %record.path, "removed");
    Ok(())
}

async fn move_record<C: Container + ?Sized>(
    session: &OsfSession,
    record: &EntryRecord,
    destination: &C,
    new_name: Option<&str>,
    force: bool,
) -> Result<(), TreeError> {
    let url = link(record, record.links.move_to.as_ref(), "move")?;
    let body = MoveRequest {
        action: "move",
        path: destination.provider_path(),
        rename: new_name,
        conflict: force.then_some("replace"),
    };
    let response = session.post_json(url, &body).await?;
    match response.status() {
        StatusCode::OK | StatusCode::CREATED => {
            info!(
                path = %record.path,
                to = %paths::join(destination.path(), new_name.unwrap_or(&record.name)),
                "moved"
            );
            Ok(())
        }
        status => Err(TreeError::MoveFailed {
            path: record.path.clone(),
            status,
        }),
    }
}
