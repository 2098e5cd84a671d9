//! Decoding of the JSON records returned by the files API.
//!
//! Raw records are deserialized as-is and then converted into typed records
//! per kind. Identity and path fields are required; timestamps, sizes, hashes
//! and action links are optional because providers omit them freely.

use std::collections::BTreeMap;

use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;
use url::Url;

use crate::client::OsfError;

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Single<T> {
    pub data: T,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub attributes: RawAttributes,
    #[serde(default)]
    pub links: RawLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttributes {
    #[serde(default)]
    pub kind: Option<EntryKind>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub materialized: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created_utc: Option<String>,
    #[serde(default)]
    pub modified_utc: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub extra: Option<RawExtra>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtra {
    #[serde(default)]
    pub hashes: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLinks {
    #[serde(default)]
    pub download: Option<Url>,
    #[serde(default)]
    pub upload: Option<Url>,
    #[serde(default)]
    pub delete: Option<Url>,
    #[serde(default, rename = "move")]
    pub move_to: Option<Url>,
    #[serde(default)]
    pub new_folder: Option<Url>,
}

impl RawRecord {
    pub fn kind(&self) -> EntryKind {
        self.attributes.kind.unwrap_or(EntryKind::Unknown)
    }
}

/// Provider-supplied action links. Each one is only valid until the next
/// structural change to the entity, a sibling or an ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionLinks {
    pub download: Option<Url>,
    pub upload: Option<Url>,
    pub delete: Option<Url>,
    pub move_to: Option<Url>,
    pub new_folder: Option<Url>,
}

impl From<RawLinks> for ActionLinks {
    fn from(links: RawLinks) -> Self {
        Self {
            download: links.download,
            upload: links.upload,
            delete: links.delete,
            move_to: links.move_to,
            new_folder: links.new_folder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub id: String,
    pub kind: EntryKind,
    pub name: String,
    pub path: String,
    /// The provider's own path for the entry; for id-based providers this is
    /// `/<id>/` rather than anything human readable.
    pub provider_path: Option<String>,
    pub provider: Option<String>,
    pub created: Option<OffsetDateTime>,
    pub modified: Option<OffsetDateTime>,
    pub size: Option<u64>,
    pub hashes: BTreeMap<String, String>,
    pub links: ActionLinks,
}

impl TryFrom<RawRecord> for EntryRecord {
    type Error = OsfError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let kind = raw.kind();
        if kind == EntryKind::Unknown {
            return Err(OsfError::Decode(format!("record {} has no usable kind", raw.id)));
        }
        let attributes = raw.attributes;
        let name = attributes
            .name
            .ok_or_else(|| missing(&raw.id, "attributes.name"))?;
        let path = attributes
            .materialized
            .ok_or_else(|| missing(&raw.id, "attributes.materialized"))?;
        if kind == EntryKind::Folder && raw.links.move_to.is_none() {
            return Err(missing(&raw.id, "links.move"));
        }
        let created = pick_timestamp(attributes.created_utc, attributes.created);
        let modified = pick_timestamp(attributes.modified_utc, attributes.modified);
        let hashes = attributes
            .extra
            .map(|extra| {
                extra
                    .hashes
                    .into_iter()
                    .filter_map(|(algorithm, digest)| Some((algorithm, digest?)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: raw.id,
            kind,
            name,
            path,
            provider_path: attributes.path,
            provider: attributes.provider,
            created,
            modified,
            size: attributes.size,
            hashes,
            links: raw.links.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub path: String,
    pub node: Option<String>,
    /// Listing and upload share one endpoint on the file service.
    pub upload: Url,
    pub new_folder: Option<Url>,
}

impl TryFrom<RawRecord> for StorageRecord {
    type Error = OsfError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let attributes = raw.attributes;
        let provider = attributes
            .provider
            .ok_or_else(|| missing(&raw.id, "attributes.provider"))?;
        let upload = raw
            .links
            .upload
            .ok_or_else(|| missing(&raw.id, "links.upload"))?;
        Ok(Self {
            name: attributes.name.unwrap_or_else(|| provider.clone()),
            path: attributes.path.unwrap_or_else(|| "/".to_string()),
            id: raw.id,
            provider,
            node: attributes.node,
            upload,
            new_folder: raw.links.new_folder,
        })
    }
}

fn missing(id: &str, field: &str) -> OsfError {
    OsfError::Decode(format!("record {id} is missing {field}"))
}

fn pick_timestamp(preferred: Option<String>, fallback: Option<String>) -> Option<OffsetDateTime> {
    let value = preferred
        .filter(|v| !v.is_empty())
        .or(fallback.filter(|v| !v.is_empty()))?;
    let parsed = parse_timestamp(&value);
    if parsed.is_none() {
        warn!(value = %value, "ignoring unparseable timestamp");
    }
    parsed
}

/// Accepts RFC 3339 and the offset-less ISO form some providers emit, which
/// is taken to be UTC.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }
    let naive = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(value, naive)
        .map(PrimitiveDateTime::assume_utc)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file_json() -> serde_json::Value {
        json!({
            "id": "58becc229ad5a101f98293a3",
            "type": "files",
            "links": {
                "move": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/hello.txt",
                "upload": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/hello.txt",
                "download": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/hello.txt",
                "delete": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/hello.txt"
            },
            "attributes": {
                "kind": "file",
                "name": "hello.txt",
                "materialized": "/hello.txt",
                "path": "/hello.txt",
                "provider": "osfstorage",
                "size": 42,
                "created_utc": null,
                "modified_utc": "2017-03-20T16:24:57.417044+00:00",
                "extra": { "hashes": { "md5": "abc", "sha256": null } }
            }
        })
    }

    #[test]
    fn decodes_file_record() {
        let raw: RawRecord = serde_json::from_value(file_json()).unwrap();
        let record = EntryRecord::try_from(raw).unwrap();

        assert_eq!(record.kind, EntryKind::File);
        assert_eq!(record.path, "/hello.txt");
        assert_eq!(record.size, Some(42));
        assert_eq!(record.created, None);
        assert!(record.modified.is_some());
        assert_eq!(record.hashes.get("md5").map(String::as_str), Some("abc"));
        assert!(!record.hashes.contains_key("sha256"));
        assert!(record.links.download.is_some());
        assert!(record.links.new_folder.is_none());
    }

    #[test]
    fn falls_back_to_legacy_timestamp_fields() {
        let mut value = file_json();
        value["attributes"]["modified_utc"] = json!("");
        value["attributes"]["modified"] = json!("2017-03-20T16:24:57.417044");
        let raw: RawRecord = serde_json::from_value(value).unwrap();
        let record = EntryRecord::try_from(raw).unwrap();

        let modified = record.modified.unwrap();
        assert_eq!(modified.year(), 2017);
        assert_eq!(modified.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn missing_materialized_path_fails() {
        let mut value = file_json();
        value["attributes"]
            .as_object_mut()
            .unwrap()
            .remove("materialized");
        let raw: RawRecord = serde_json::from_value(value).unwrap();
        assert!(matches!(EntryRecord::try_from(raw), Err(OsfError::Decode(_))));
    }

    #[test]
    fn missing_id_fails_deserialization() {
        let mut value = file_json();
        value.as_object_mut().unwrap().remove("id");
        assert!(serde_json::from_value::<RawRecord>(value).is_err());
    }

    #[test]
    fn folder_without_listing_link_fails() {
        let raw: RawRecord = serde_json::from_value(json!({
            "id": "folder1",
            "attributes": { "kind": "folder", "name": "folder1", "materialized": "/folder1/" },
            "links": {}
        }))
        .unwrap();
        assert!(matches!(EntryRecord::try_from(raw), Err(OsfError::Decode(_))));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let raw: RawRecord = serde_json::from_value(json!({
            "id": "x",
            "attributes": { "kind": "symlink", "name": "x", "materialized": "/x" }
        }))
        .unwrap();
        assert_eq!(raw.kind(), EntryKind::Unknown);
    }

    #[test]
    fn decodes_storage_record() {
        let raw: RawRecord = serde_json::from_value(json!({
            "id": "f3szh:osfstorage",
            "type": "files",
            "links": {
                "upload": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/",
                "new_folder": "https://files.osf.io/v1/resources/f3szh/providers/osfstorage/?kind=folder"
            },
            "attributes": {
                "node": "f3szh",
                "path": "/",
                "kind": "folder",
                "name": "osfstorage",
                "provider": "osfstorage"
            }
        }))
        .unwrap();
        let record = StorageRecord::try_from(raw).unwrap();
        assert_eq!(record.provider, "osfstorage");
        assert_eq!(record.node.as_deref(), Some("f3szh"));
        assert_eq!(record.path, "/");
    }

    #[test]
    fn page_defaults_next_token_to_none() {
        let page: Page<serde_json::Value> = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert!(page.data.is_empty());
        assert!(page.next_token.is_none());
    }
}
