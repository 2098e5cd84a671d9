//! Locating entities by exact path or by per-segment wildcard pattern.
//!
//! Absence is never an error here: lookups return `Ok(None)` when a segment
//! does not exist, and only transport or decode failures surface as `Err`.

use async_stream::try_stream;
use futures_util::StreamExt;
use osf_core::paths;

use super::{Container, Entity, EntityStream, Folder, TreeError, boxed, children, folders};

pub use super::flatten;

/// Folder holding the leaf of `target`, or `None` when `target` sits directly
/// under `root` or any of its ancestors is missing.
pub async fn find_ancestor_folder<C: Container + ?Sized>(
    root: &C,
    target: &str,
) -> Result<Option<Folder>, TreeError> {
    let target = paths::normalize(target);
    let (dirs, _) = paths::split_leaf(&target);
    if dirs.is_empty() {
        return Ok(None);
    }
    let mut current: Option<Folder> = None;
    let mut prefix = String::new();
    for segment in dirs {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        let next = match &current {
            Some(folder) => child_folder(folder, &prefix).await?,
            None => child_folder(root, &prefix).await?,
        };
        match next {
            Some(folder) => current = Some(folder),
            None => return Ok(None),
        }
    }
    Ok(current)
}

/// Entity whose materialized path is exactly `target`.
///
/// Each ancestor is resolved first and only its children are scanned, so the
/// cost is one listing per segment.
pub async fn find_by_path<C: Container + ?Sized>(
    root: &C,
    target: &str,
) -> Result<Option<Entity>, TreeError> {
    let target = paths::normalize(target);
    if target.is_empty() {
        return Ok(None);
    }
    let (dirs, _) = paths::split_leaf(&target);
    let mut parent: Option<Folder> = None;
    let mut prefix = String::new();
    for segment in dirs {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        let found = match &parent {
            Some(folder) => child_entity(folder, &prefix).await?,
            None => child_entity(root, &prefix).await?,
        };
        match found.and_then(Entity::into_folder) {
            Some(folder) => parent = Some(folder),
            None => return Ok(None),
        }
    }
    match &parent {
        Some(folder) => child_entity(folder, &target).await,
        None => child_entity(root, &target).await,
    }
}

/// Entities under `root` matching `pattern` segment by segment.
///
/// `None` and `/` yield every entity below `root`. Folders matched by a
/// single-segment pattern are followed by everything beneath them; folders
/// matched deeper in a multi-segment pattern are not expanded.
pub fn filter_by_pattern<'a, C: Container + ?Sized>(
    root: &'a C,
    pattern: Option<&str>,
) -> EntityStream<'a> {
    match pattern {
        None | Some("/") => flatten(root),
        Some(pattern) => matching(root, pattern.to_string(), 0),
    }
}

fn matching<'a, C: Container + ?Sized>(
    root: &'a C,
    pattern: String,
    depth: usize,
) -> EntityStream<'a> {
    let segments: Vec<String> = pattern
        .trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .map(str::to_string)
        .collect();

    if segments.len() <= 1 {
        return boxed(try_stream! {
            let mut listing = children(root);
            while let Some(entity) = listing.next().await {
                let entity = entity?;
                if !paths::matches_pattern(Some(pattern.as_str()), entity.path()) {
                    continue;
                }
                let expand = if depth == 0 { entity.as_folder().cloned() } else { None };
                yield entity;
                if let Some(folder) = expand {
                    let mut nested = flatten(&folder);
                    while let Some(descendant) = nested.next().await {
                        yield descendant?;
                    }
                }
            }
        });
    }

    let parent_pattern = format!("/{}/", segments[..segments.len() - 1].join("/"));
    boxed(try_stream! {
        let mut ancestors = matching(root, parent_pattern, depth + 1);
        while let Some(ancestor) = ancestors.next().await {
            let Some(folder) = ancestor?.into_folder() else {
                continue;
            };
            let mut listing = children(&folder);
            while let Some(entity) = listing.next().await {
                let entity = entity?;
                if !paths::matches_pattern(Some(pattern.as_str()), entity.path()) {
                    continue;
                }
                let expand = if depth == 0 { entity.as_folder().cloned() } else { None };
                yield entity;
                if let Some(folder) = expand {
                    let mut nested = flatten(&folder);
                    while let Some(descendant) = nested.next().await {
                        yield descendant?;
                    }
                }
            }
        }
    })
}

async fn child_folder<C: Container + ?Sized>(
    container: &C,
    normalized: &str,
) -> Result<Option<Folder>, TreeError> {
    let mut listing = folders(container);
    while let Some(folder) = listing.next().await {
        let folder = folder?;
        if paths::normalize(folder.path()) == normalized {
            return Ok(Some(folder));
        }
    }
    Ok(None)
}

async fn child_entity<C: Container + ?Sized>(
    container: &C,
    normalized: &str,
) -> Result<Option<Entity>, TreeError> {
    let mut listing = children(container);
    while let Some(entity) = listing.next().await {
        let entity = entity?;
        if paths::normalize(entity.path()) == normalized {
            return Ok(Some(entity));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use wiremock::MockServer;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::fixtures::{self, file_json, folder_json, mount_listing};

    fn paths_of(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(Entity::path).collect()
    }

    async fn nested_tree() -> MockServer {
        let server = MockServer::start().await;
        let base = server.uri();
        mount_listing(
            &server,
            "/",
            vec![
                folder_json(&base, "/data/"),
                folder_json(&base, "/docs/"),
                file_json(&base, "/readme.md", 10, "r"),
            ],
        )
        .await;
        mount_listing(
            &server,
            "/data/",
            vec![
                folder_json(&base, "/data/raw/"),
                file_json(&base, "/data/summary.csv", 4, "s"),
            ],
        )
        .await;
        mount_listing(
            &server,
            "/data/raw/",
            vec![file_json(&base, "/data/raw/run1.csv", 8, "a")],
        )
        .await;
        mount_listing(
            &server,
            "/docs/",
            vec![file_json(&base, "/docs/guide.md", 2, "g")],
        )
        .await;
        server
    }

    #[tokio::test]
    async fn find_by_path_resolves_nested_file() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let found = find_by_path(&storage, "/data/raw/run1.csv").await.unwrap();
        let file = found.and_then(Entity::into_file).unwrap();
        assert_eq!(file.path(), "/data/raw/run1.csv");
        assert_eq!(file.size(), Some(8));

        let folder = find_by_path(&storage, "data/raw").await.unwrap().unwrap();
        assert!(folder.is_folder());
    }

    #[tokio::test]
    async fn find_by_path_returns_none_on_absence() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        assert!(find_by_path(&storage, "missing.txt").await.unwrap().is_none());
        assert!(find_by_path(&storage, "data/nope/run1.csv").await.unwrap().is_none());
        // A file cannot be an ancestor.
        assert!(find_by_path(&storage, "readme.md/child").await.unwrap().is_none());
        assert!(find_by_path(&storage, "/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_path_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(fixtures::PROVIDER_ROOT))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let storage = fixtures::storage(&server);

        let err = find_by_path(&storage, "a.txt").await.expect_err("500 must fail");
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn find_ancestor_folder_walks_intermediate_segments() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let folder = find_ancestor_folder(&storage, "data/raw/run1.csv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(folder.name(), "raw");

        assert!(find_ancestor_folder(&storage, "readme.md").await.unwrap().is_none());
        assert!(find_ancestor_folder(&storage, "data/gone/x.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flatten_yields_parents_before_children() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let all: Vec<Entity> = flatten(&storage).try_collect().await.unwrap();
        assert_eq!(
            paths_of(&all),
            vec![
                "/data/",
                "/data/raw/",
                "/data/raw/run1.csv",
                "/data/summary.csv",
                "/docs/",
                "/docs/guide.md",
                "/readme.md",
            ]
        );
    }

    #[tokio::test]
    async fn missing_pattern_matches_everything() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let none: Vec<Entity> = filter_by_pattern(&storage, None).try_collect().await.unwrap();
        let slash: Vec<Entity> = filter_by_pattern(&storage, Some("/"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(none.len(), 7);
        assert_eq!(paths_of(&none), paths_of(&slash));
    }

    #[tokio::test]
    async fn single_segment_match_expands_folders() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let matched: Vec<Entity> = filter_by_pattern(&storage, Some("da%"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            paths_of(&matched),
            vec!["/data/", "/data/raw/", "/data/raw/run1.csv", "/data/summary.csv"]
        );

        let matched: Vec<Entity> = filter_by_pattern(&storage, Some("%.md"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(paths_of(&matched), vec!["/readme.md"]);
    }

    #[tokio::test]
    async fn multi_segment_match_narrows_each_level() {
        let server = nested_tree().await;
        let storage = fixtures::storage(&server);

        let matched: Vec<Entity> = filter_by_pattern(&storage, Some("/d%/%.csv"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(paths_of(&matched), vec!["/data/summary.csv"]);

        let matched: Vec<Entity> = filter_by_pattern(&storage, Some("data/%raw%"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(paths_of(&matched), vec!["/data/raw/", "/data/raw/run1.csv"]);
    }
}
