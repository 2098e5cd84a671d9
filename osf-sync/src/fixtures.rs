//! JSON records shaped like the files API, pointed at a mock server.

use osf_core::{OsfSession, RawRecord};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::tree::Storage;

pub const PROVIDER_ROOT: &str = "/v1/resources/p/providers/osfstorage/";

fn record_id(materialized: &str) -> String {
    materialized.trim_matches('/').replace('/', "-")
}

/// URL path of the endpoint that lists, renames and uploads into `materialized`.
pub fn endpoint(materialized: &str) -> String {
    let id = record_id(materialized);
    if id.is_empty() {
        PROVIDER_ROOT.to_string()
    } else if materialized.ends_with('/') {
        format!("{PROVIDER_ROOT}{id}/")
    } else {
        format!("{PROVIDER_ROOT}{id}")
    }
}

pub fn download_endpoint(materialized: &str) -> String {
    format!("/download/{}", record_id(materialized))
}

pub fn storage_json(base: &str) -> Value {
    json!({
        "id": "p:osfstorage",
        "type": "files",
        "links": {
            "upload": format!("{base}{PROVIDER_ROOT}"),
            "new_folder": format!("{base}{PROVIDER_ROOT}?kind=folder")
        },
        "attributes": {
            "node": "p",
            "path": "/",
            "kind": "folder",
            "name": "osfstorage",
            "provider": "osfstorage"
        }
    })
}

pub fn folder_json(base: &str, materialized: &str) -> Value {
    let link = format!("{base}{}", endpoint(materialized));
    let name = materialized.trim_matches('/').rsplit('/').next().unwrap_or_default();
    json!({
        "id": record_id(materialized),
        "type": "files",
        "links": {
            "move": link,
            "upload": link,
            "delete": link,
            "new_folder": format!("{link}?kind=folder")
        },
        "attributes": {
            "kind": "folder",
            "name": name,
            "materialized": materialized,
            "path": format!("/{}/", record_id(materialized)),
            "provider": "osfstorage"
        }
    })
}

pub fn file_json(base: &str, materialized: &str, size: u64, md5: &str) -> Value {
    let link = format!("{base}{}", endpoint(materialized));
    let name = materialized.rsplit('/').next().unwrap_or_default();
    json!({
        "id": record_id(materialized),
        "type": "files",
        "links": {
            "move": link,
            "upload": link,
            "delete": link,
            "download": format!("{base}{}", download_endpoint(materialized))
        },
        "attributes": {
            "kind": "file",
            "name": name,
            "materialized": materialized,
            "path": format!("/{}", record_id(materialized)),
            "provider": "osfstorage",
            "size": size,
            "modified_utc": "2017-03-20T16:24:57.417044+00:00",
            "extra": { "hashes": { "md5": md5, "sha256": null } }
        }
    })
}

pub fn page(data: Vec<Value>) -> Value {
    json!({ "data": data })
}

pub fn storage(server: &MockServer) -> Storage {
    let session = OsfSession::with_base_url(&server.uri(), Some("token".into())).unwrap();
    let raw: RawRecord = serde_json::from_value(storage_json(&server.uri())).unwrap();
    Storage::from_record(session, raw).unwrap()
}

/// Serves `records` as a single-page listing of `materialized`.
pub async fn mount_listing(server: &MockServer, materialized: &str, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(endpoint(materialized)))
        .and(query_param_is_missing("next_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(records)))
        .mount(server)
        .await;
}

/// Storage with `hello.txt`, `bye.txt`, `folder1/folder1content.txt` and
/// `folder2/folder2content.txt`.
pub async fn mount_sample_tree(server: &MockServer) {
    let base = server.uri();
    mount_listing(
        server,
        "/",
        vec![
            file_json(&base, "/hello.txt", 5, "5d41402abc4b2a76b9719d911017c592"),
            file_json(&base, "/bye.txt", 3, "c7a13b1a9e8b3c4d5f6a7b8c9d0e1f2a"),
            folder_json(&base, "/folder1/"),
            folder_json(&base, "/folder2/"),
        ],
    )
    .await;
    mount_listing(
        server,
        "/folder1/",
        vec![file_json(&base, "/folder1/folder1content.txt", 1, "x")],
    )
    .await;
    mount_listing(
        server,
        "/folder2/",
        vec![file_json(&base, "/folder2/folder2content.txt", 1, "y")],
    )
    .await;
}
