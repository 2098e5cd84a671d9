use futures_util::{StreamExt, TryStreamExt};
use osf_core::{OsfError, OsfSession};
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::tree::{Storage, StorageStream, TreeError, boxed, records};

#[derive(Debug, Clone)]
pub struct OsfClient {
    session: OsfSession,
}

impl OsfClient {
    pub fn new(session: OsfSession) -> Self {
        Self { session }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, OsfError> {
        Ok(Self::new(config.session()?))
    }

    pub fn session(&self) -> &OsfSession {
        &self.session
    }

    /// Handle on project `id`. Nothing is fetched until its storages are
    /// listed.
    pub fn project(&self, id: &str) -> Result<Project, OsfError> {
        Ok(Project {
            session: self.session.clone(),
            id: id.to_string(),
            storages_link: self.session.build_url(&["nodes", id, "files"])?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    session: OsfSession,
    id: String,
    storages_link: Url,
}

impl Project {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storages(&self) -> StorageStream<'_> {
        let session = &self.session;
        debug!(project = %self.id, "listing storages");
        boxed(
            records(session, &self.storages_link)
                .map_err(TreeError::from)
                .and_then(move |raw| async move {
                    Storage::from_record(session.clone(), raw).map_err(TreeError::from)
                }),
        )
    }

    pub async fn storage(&self, provider: &str) -> Result<Storage, TreeError> {
        let mut storages = self.storages();
        while let Some(storage) = storages.next().await {
            let storage = storage?;
            if storage.provider() == provider {
                return Ok(storage);
            }
        }
        Err(TreeError::NoSuchStorage {
            provider: provider.to_string(),
        })
    }
}
