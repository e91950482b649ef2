use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub image: Option<String>,
    pub permalink: String,
    pub score: u64,
    pub adult: bool,
}

/// The aggregated document served to clients.
///
/// Top-level fields other than `updatedAt` and `items` belong to other
/// subsystems; they are kept in `extras` and written back untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    /// `None` only for a seed document that has never been built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// Single-document JSON store for the pack.
///
/// Writes replace the whole file atomically. There is no locking here: callers
/// must make sure only one writer runs at a time.
#[derive(Debug, Clone)]
pub struct PackStore {
    path: PathBuf,
}

impl PackStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Pack, StoreError> {
        let bytes = self.read().await?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Load only the fields owned by other subsystems.
    ///
    /// Any JSON object qualifies, even one whose `items` no longer match
    /// [`Item`], so those fields survive a rebuild.
    pub async fn load_extras(&self) -> Result<Map<String, Value>, StoreError> {
        let bytes = self.read().await?;
        let mut doc: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        doc.remove("updatedAt");
        doc.remove("items");
        Ok(doc)
    }

    async fn read(&self) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub async fn save(&self, pack: &Pack) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(pack).map_err(StoreError::Encode)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })??;

        debug!(
            "Saved pack with {} items to {}",
            pack.items.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Write an empty pack if no document exists yet, so reads issued before
    /// the first refresh have something to serve. Returns whether a seed was
    /// written.
    pub async fn ensure_seeded(&self) -> Result<bool, StoreError> {
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => Ok(false),
            Ok(false) => {
                self.save(&Pack::default()).await?;
                info!("Seeded empty pack at {}", self.path.display());
                Ok(true)
            }
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Write to a temp file next to `path`, fsync it, then rename it over `path`.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (PackStore, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = PackStore::new(temp_dir.path().join("morning.json"));
        (store, temp_dir)
    }

    fn create_test_item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            source_id: "aww".to_string(),
            title: format!("Post {}", id),
            image: Some(format!("https://i.redd.it/{}.jpg", id)),
            permalink: format!("https://reddit.com/r/aww/comments/{}/", id),
            score: 42,
            adult: false,
        }
    }

    fn create_test_pack(ids: &[&str]) -> Pack {
        Pack {
            updated_at: Some(Utc::now()),
            items: ids.iter().map(|id| create_test_item(id)).collect(),
            extras: Map::new(),
        }
    }

    mod load_tests {
        use super::*;

        #[tokio::test]
        async fn test_load_missing_document() {
            let (store, _dir) = create_test_store();

            let result = store.load().await;
            assert!(matches!(result, Err(StoreError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_load_corrupt_document() {
            let (store, _dir) = create_test_store();
            std::fs::write(store.path(), b"{\"items\": [").unwrap();

            let result = store.load().await;
            assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        }

        #[tokio::test]
        async fn test_load_seed_without_updated_at() {
            let (store, _dir) = create_test_store();
            std::fs::write(
                store.path(),
                br#"{"items": [], "youtube_picks": [{"title": "x"}]}"#,
            )
            .unwrap();

            let pack = store.load().await.unwrap();
            assert!(pack.updated_at.is_none());
            assert!(pack.items.is_empty());
            assert_eq!(pack.extras["youtube_picks"], json!([{"title": "x"}]));
        }

        #[tokio::test]
        async fn test_load_extras_ignores_mismatched_items() {
            let (store, _dir) = create_test_store();
            std::fs::write(
                store.path(),
                br#"{"updatedAt": "2024-01-01T00:00:00Z",
                     "items": [{"id": "x", "title": "legacy"}],
                     "trending_terms": ["rust"]}"#,
            )
            .unwrap();

            assert!(matches!(store.load().await, Err(StoreError::Corrupt { .. })));
            let extras = store.load_extras().await.unwrap();
            assert_eq!(extras.len(), 1);
            assert_eq!(extras["trending_terms"], json!(["rust"]));
        }

        #[tokio::test]
        async fn test_load_extras_rejects_non_object() {
            let (store, _dir) = create_test_store();
            std::fs::write(store.path(), b"[1, 2, 3]").unwrap();

            let result = store.load_extras().await;
            assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        }

        #[tokio::test]
        async fn test_load_extras_missing_document() {
            let (store, _dir) = create_test_store();

            let result = store.load_extras().await;
            assert!(matches!(result, Err(StoreError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_load_empty_object() {
            let (store, _dir) = create_test_store();
            std::fs::write(store.path(), b"{}").unwrap();

            let pack = store.load().await.unwrap();
            assert_eq!(pack, Pack::default());
        }
    }

    mod save_tests {
        use super::*;

        #[tokio::test]
        async fn test_save_then_load() {
            let (store, _dir) = create_test_store();
            let pack = create_test_pack(&["a1", "a2"]);

            store.save(&pack).await.unwrap();
            let loaded = store.load().await.unwrap();

            assert_eq!(loaded, pack);
        }

        #[tokio::test]
        async fn test_save_replaces_whole_document() {
            let (store, _dir) = create_test_store();
            store.save(&create_test_pack(&["a1", "a2", "a3"])).await.unwrap();
            store.save(&create_test_pack(&["b1"])).await.unwrap();

            let loaded = store.load().await.unwrap();
            assert_eq!(loaded.items.len(), 1);
            assert_eq!(loaded.items[0].id, "b1");
        }

        #[tokio::test]
        async fn test_save_writes_camel_case_layout() {
            let (store, _dir) = create_test_store();
            let mut pack = create_test_pack(&["a1"]);
            pack.extras
                .insert("trending_terms".to_string(), json!(["rust"]));
            store.save(&pack).await.unwrap();

            let raw: Value =
                serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
            assert!(raw["updatedAt"].is_string());
            assert_eq!(raw["items"][0]["sourceId"], "aww");
            assert_eq!(raw["items"][0]["adult"], false);
            assert_eq!(raw["trending_terms"], json!(["rust"]));
            assert!(raw.get("extras").is_none());
        }

        #[tokio::test]
        async fn test_save_creates_missing_parent_dir() {
            let temp_dir = tempfile::tempdir().unwrap();
            let store = PackStore::new(temp_dir.path().join("data").join("morning.json"));

            store.save(&create_test_pack(&["a1"])).await.unwrap();
            assert!(store.path().exists());
        }

        #[tokio::test]
        async fn test_save_failure_is_reported_and_leaves_no_temp_files() {
            let (store, dir) = create_test_store();
            let original = create_test_pack(&["a1"]);
            store.save(&original).await.unwrap();

            // A directory squatting on the target path makes the rename fail
            let blocked = PackStore::new(dir.path().join("blocked"));
            std::fs::create_dir(blocked.path()).unwrap();
            std::fs::write(blocked.path().join("keep"), b"x").unwrap();

            let result = blocked.save(&create_test_pack(&["b1"])).await;
            assert!(matches!(result, Err(StoreError::Io { .. })));
            assert!(blocked.path().join("keep").exists());

            let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
            assert_eq!(entries.len(), 2, "only morning.json and blocked/ remain");
            assert_eq!(store.load().await.unwrap(), original);
        }

        #[tokio::test]
        async fn test_interrupted_write_never_exposes_partial_document() {
            let (store, dir) = create_test_store();
            let original = create_test_pack(&["a1", "a2"]);
            store.save(&original).await.unwrap();

            // Simulate a crash halfway through the next save: the temp file
            // holds a truncated document and is never renamed into place.
            let next = serde_json::to_vec_pretty(&create_test_pack(&["b1", "b2"])).unwrap();
            let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
            tmp.write_all(&next[..next.len() / 2]).unwrap();
            drop(tmp);

            assert_eq!(store.load().await.unwrap(), original);
        }
    }

    mod seed_tests {
        use super::*;

        #[tokio::test]
        async fn test_ensure_seeded_writes_empty_pack() {
            let (store, _dir) = create_test_store();

            assert!(store.ensure_seeded().await.unwrap());
            let pack = store.load().await.unwrap();
            assert!(pack.updated_at.is_none());
            assert!(pack.items.is_empty());
        }

        #[tokio::test]
        async fn test_ensure_seeded_keeps_existing_document() {
            let (store, _dir) = create_test_store();
            let original = create_test_pack(&["a1"]);
            store.save(&original).await.unwrap();

            assert!(!store.ensure_seeded().await.unwrap());
            assert_eq!(store.load().await.unwrap(), original);
        }
    }
}
