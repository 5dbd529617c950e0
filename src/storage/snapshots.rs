//! Baseline snapshot tree
//!
//! Layout: `baselines/{customer_id}/{site_folder_id}/{custid}{nn}[-{k}].html`,
//! with `index.json` counter files at the customer and site-folder levels.
//! Snapshot files are immutable; re-baselining a URL writes a new revision
//! with a `-{k}` suffix, and the database row follows the newest file.
//!
//! The `.html` file holds the normalized text, never the raw body. A
//! `.meta.json` sidecar carries the structural fingerprint and script set
//! the comparator needs.

use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A normalized-content snapshot for defacement comparison
#[derive(Debug, Clone, PartialEq)]
pub struct PageVersion {
    pub url: String,
    pub normalized_text: String,
    pub content_hash: String,
    pub structural_hash: String,
    pub tag_paths: Vec<String>,
    pub script_srcs: Vec<String>,
    pub norm_version: String,
    pub created_at: String,
}

/// Sidecar document stored next to each snapshot
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    url: String,
    content_hash: String,
    structural_hash: String,
    tag_paths: Vec<String>,
    script_srcs: Vec<String>,
    norm_version: String,
    created_at: String,
}

/// Per-customer index: allocates site folder ids
#[derive(Debug, Default, Serialize, Deserialize)]
struct CustomerIndex {
    next_folder: u32,
    sites: BTreeMap<String, u32>,
}

/// Per-site-folder index: allocates page numbers and revision counters
#[derive(Debug, Default, Serialize, Deserialize)]
struct SiteIndex {
    next_page: u32,
    pages: BTreeMap<String, PageEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageEntry {
    page_no: u32,
    revisions: u32,
}

/// Filesystem store for baseline snapshots.
///
/// Writes to one site folder are serialized through a per-folder mutex so
/// concurrent workers cannot corrupt the index files.
pub struct SnapshotStore {
    root: PathBuf,
    folder_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Keyed by customer: the customer-level index.json is shared by all of
    // that customer's site folders
    fn folder_lock(&self, customer_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.folder_locks.lock().unwrap();
        locks
            .entry(customer_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Writes one page version into the snapshot tree and returns the path
    /// of the new (immutable) snapshot file.
    pub async fn write_snapshot(
        &self,
        customer_id: i64,
        site_id: i64,
        version: &PageVersion,
    ) -> StorageResult<PathBuf> {
        let lock = self.folder_lock(customer_id);
        let _guard = lock.lock().await;

        let customer_dir = self.root.join(customer_id.to_string());
        fs::create_dir_all(&customer_dir)?;

        let customer_index_path = customer_dir.join("index.json");
        let mut customer_index = load_index::<CustomerIndex>(&customer_index_path)?;

        let site_key = site_id.to_string();
        let folder_id = match customer_index.sites.get(&site_key) {
            Some(id) => *id,
            None => {
                customer_index.next_folder += 1;
                let id = customer_index.next_folder;
                customer_index.sites.insert(site_key, id);
                save_index(&customer_index_path, &customer_index)?;
                id
            }
        };

        let site_dir = customer_dir.join(folder_id.to_string());
        fs::create_dir_all(&site_dir)?;

        let site_index_path = site_dir.join("index.json");
        let mut site_index = load_index::<SiteIndex>(&site_index_path)?;

        let revision;
        let page_no;
        match site_index.pages.get_mut(&version.url) {
            Some(entry) => {
                entry.revisions += 1;
                page_no = entry.page_no;
                revision = entry.revisions;
            }
            None => {
                site_index.next_page += 1;
                page_no = site_index.next_page;
                revision = 0;
                site_index.pages.insert(
                    version.url.clone(),
                    PageEntry {
                        page_no,
                        revisions: 0,
                    },
                );
            }
        }

        let stem = if revision == 0 {
            format!("{customer_id}{page_no:02}")
        } else {
            format!("{customer_id}{page_no:02}-{revision}")
        };

        let snapshot_path = site_dir.join(format!("{stem}.html"));
        fs::write(&snapshot_path, &version.normalized_text)?;

        let meta = SnapshotMeta {
            url: version.url.clone(),
            content_hash: version.content_hash.clone(),
            structural_hash: version.structural_hash.clone(),
            tag_paths: version.tag_paths.clone(),
            script_srcs: version.script_srcs.clone(),
            norm_version: version.norm_version.clone(),
            created_at: version.created_at.clone(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(site_dir.join(format!("{stem}.meta.json")), meta_json)?;

        save_index(&site_index_path, &site_index)?;

        Ok(snapshot_path)
    }

    /// Loads a page version back from its snapshot path
    pub fn load_page_version(&self, snapshot_path: &Path) -> StorageResult<PageVersion> {
        let normalized_text = fs::read_to_string(snapshot_path)?;

        let meta_path = meta_path_for(snapshot_path);
        let meta_json = fs::read_to_string(&meta_path)?;
        let meta: SnapshotMeta = serde_json::from_str(&meta_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(PageVersion {
            url: meta.url,
            normalized_text,
            content_hash: meta.content_hash,
            structural_hash: meta.structural_hash,
            tag_paths: meta.tag_paths,
            script_srcs: meta.script_srcs,
            norm_version: meta.norm_version,
            created_at: meta.created_at,
        })
    }
}

fn meta_path_for(snapshot_path: &Path) -> PathBuf {
    let mut path = snapshot_path.to_path_buf();
    path.set_extension("meta.json");
    path
}

fn load_index<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> StorageResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn save_index<T: Serialize>(path: &Path, index: &T) -> StorageResult<()> {
    let raw =
        serde_json::to_string_pretty(index).map_err(|e| StorageError::Serialization(e.to_string()))?;
    fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{content_hash, structural_hash, NORM_VERSION};
    use chrono::Utc;

    fn version(url: &str, text: &str) -> PageVersion {
        let tag_paths = vec!["/html".to_string(), "/html/body".to_string()];
        PageVersion {
            url: url.to_string(),
            normalized_text: text.to_string(),
            content_hash: content_hash(text),
            structural_hash: structural_hash(&tag_paths),
            tag_paths,
            script_srcs: vec!["https://x.test/a.js".to_string()],
            norm_version: NORM_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let original = version("https://x.test/a", "normalized page text");
        let path = store.write_snapshot(10, 1, &original).await.unwrap();

        assert!(path.ends_with("1001.html"));
        let loaded = store.load_page_version(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_layout_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let first = store
            .write_snapshot(10, 1, &version("https://x.test/a", "a"))
            .await
            .unwrap();
        let second = store
            .write_snapshot(10, 1, &version("https://x.test/b", "b"))
            .await
            .unwrap();

        // baselines/{customer}/{site_folder}/{custid}{nn}.html
        assert!(first.ends_with("10/1/1001.html"), "got {first:?}");
        assert!(second.ends_with("10/1/1002.html"), "got {second:?}");

        // index.json files exist at both levels
        assert!(dir.path().join("10").join("index.json").exists());
        assert!(dir.path().join("10").join("1").join("index.json").exists());
    }

    #[tokio::test]
    async fn test_rebaseline_writes_new_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let first = store
            .write_snapshot(10, 1, &version("https://x.test/a", "old"))
            .await
            .unwrap();
        let second = store
            .write_snapshot(10, 1, &version("https://x.test/a", "new"))
            .await
            .unwrap();

        assert!(first.ends_with("1001.html"));
        assert!(second.ends_with("1001-1.html"));

        // The first snapshot is untouched
        assert_eq!(fs::read_to_string(&first).unwrap(), "old");
        assert_eq!(fs::read_to_string(&second).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_distinct_sites_get_distinct_folders() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let a = store
            .write_snapshot(10, 1, &version("https://x.test/a", "a"))
            .await
            .unwrap();
        let b = store
            .write_snapshot(10, 2, &version("https://y.test/a", "b"))
            .await
            .unwrap();

        assert!(a.to_string_lossy().contains("/10/1/"));
        assert!(b.to_string_lossy().contains("/10/2/"));
    }
}
