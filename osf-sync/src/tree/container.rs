use async_stream::try_stream;
use futures_util::{Stream, StreamExt, TryStreamExt};
use osf_core::{OsfError, OsfSession, Page, RawRecord, Single, paths, read_json, with_query_param};
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use super::{Entity, EntityStream, FileStream, Folder, FolderStream, TreeError, boxed};

pub trait Container: Send + Sync {
    fn session(&self) -> &OsfSession;

    fn path(&self) -> &str;

    /// Provider path used as the destination of a move.
    fn provider_path(&self) -> &str;

    fn listing_link(&self) -> &Url;

    fn upload_link(&self) -> Option<&Url>;

    fn new_folder_link(&self) -> Option<&Url>;
}

pub(crate) fn records<'a>(
    session: &'a OsfSession,
    listing: &'a Url,
) -> impl Stream<Item = Result<RawRecord, OsfError>> + Send + 'a {
    try_stream! {
        let mut url = listing.clone();
        loop {
            let page: Page<RawRecord> = session.get_json(&url).await?;
            debug!(url = %url, records = page.data.len(), "fetched listing page");
            for record in page.data {
                yield record;
            }
            match page.next_token {
                Some(token) => url = with_query_param(listing, "next_token", &token),
                None => break,
            }
        }
    }
}

/// Lists the immediate children of `container`.
///
/// The stream is single-pass: pages are fetched as it is polled and nothing
/// is kept once yielded.
pub fn children<'a, C: Container + ?Sized>(container: &'a C) -> EntityStream<'a> {
    let session = container.session();
    Box::pin(
        records(session, container.listing_link())
            .map_err(TreeError::from)
            .try_filter_map(move |raw| async move {
                Entity::decode(session, raw).map_err(TreeError::from)
            }),
    )
}

pub fn files<'a, C: Container + ?Sized>(container: &'a C) -> FileStream<'a> {
    Box::pin(
        children(container)
            .try_filter_map(|entity| async move { Ok::<_, TreeError>(entity.into_file()) }),
    )
}

pub fn folders<'a, C: Container + ?Sized>(container: &'a C) -> FolderStream<'a> {
    Box::pin(
        children(container)
            .try_filter_map(|entity| async move { Ok::<_, TreeError>(entity.into_folder()) }),
    )
}

/// Files of `container`. With `recurse`, every sub-folder is walked as soon
/// as it shows up in a page, so its files come before the rest of the page.
pub fn recursive_files<'a, C: Container + ?Sized>(
    container: &'a C,
    recurse: bool,
) -> FileStream<'a> {
    boxed(try_stream! {
        let mut listing = children(container);
        while let Some(entity) = listing.next().await {
            match entity? {
                Entity::File(file) => yield file,
                Entity::Folder(folder) if recurse => {
                    let mut nested = recursive_files(&folder, true);
                    while let Some(file) = nested.next().await {
                        yield file?;
                    }
                }
                Entity::Folder(_) => {}
            }
        }
    })
}

/// Every descendant of `container`, depth first, each folder before its
/// contents.
pub fn flatten<'a, C: Container + ?Sized>(container: &'a C) -> EntityStream<'a> {
    boxed(try_stream! {
        let mut listing = children(container);
        while let Some(entity) = listing.next().await {
            let entity = entity?;
            let folder = entity.as_folder().cloned();
            yield entity;
            if let Some(folder) = folder {
                let mut nested = flatten(&folder);
                while let Some(descendant) = nested.next().await {
                    yield descendant?;
                }
            }
        }
    })
}

pub async fn create_folder<C: Container + ?Sized>(
    parent: &C,
    name: &str,
    exist_ok: bool,
) -> Result<Folder, TreeError> {
    let path = paths::join(parent.path(), name);
    let url = parent.new_folder_link().ok_or_else(|| TreeError::MissingLink {
        path: parent.path().to_string(),
        link: "new_folder",
    })?;
    let session = parent.session();
    let response = session.put(url, &[("name", name)], Vec::new()).await?;
    match response.status() {
        StatusCode::CREATED => {
            let created: Single<RawRecord> = read_json(response).await?;
            info!(path = %path, "created folder");
            Ok(Folder::from_record(session.clone(), created.data)?)
        }
        StatusCode::CONFLICT if exist_ok => {
            debug!(path = %path, "folder already exists, looking it up");
            let mut existing = folders(parent);
            while let Some(folder) = existing.next().await {
                let folder = folder?;
                if folder.name() == name {
                    return Ok(folder);
                }
            }
            Err(TreeError::NotFound { path })
        }
        StatusCode::CONFLICT => Err(TreeError::AlreadyExists { path }),
        status => Err(TreeError::UnexpectedStatus { path, status }),
    }
}
