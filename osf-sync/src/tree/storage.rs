use osf_core::{OsfError, OsfSession, RawRecord, StorageRecord};
use url::Url;

use super::{Container, Folder, TreeError};

#[derive(Debug, Clone)]
pub struct Storage {
    session: OsfSession,
    record: StorageRecord,
}

impl Storage {
    pub(crate) fn from_record(session: OsfSession, raw: RawRecord) -> Result<Self, OsfError> {
        Ok(Self {
            session,
            record: StorageRecord::try_from(raw)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn provider(&self) -> &str {
        &self.record.provider
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn node(&self) -> Option<&str> {
        self.record.node.as_deref()
    }

    pub async fn create_folder(&self, name: &str, exist_ok: bool) -> Result<Folder, TreeError> {
        super::create_folder(self, name, exist_ok).await
    }
}

impl Container for Storage {
    fn session(&self) -> &OsfSession {
        &self.session
    }

    fn path(&self) -> &str {
        &self.record.path
    }

    fn provider_path(&self) -> &str {
        &self.record.path
    }

    // The file service lists a folder on GET of its upload endpoint.
    fn listing_link(&self) -> &Url {
        &self.record.upload
    }

    fn upload_link(&self) -> Option<&Url> {
        Some(&self.record.upload)
    }

    fn new_folder_link(&self) -> Option<&Url> {
        self.record.new_folder.as_ref()
    }
}
