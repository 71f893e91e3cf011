//! Artifact Store (C1): atomic, lock-protected persistence of item records
//! and phase artifacts under `.wreckit/`.
//!
//! Every write goes through a write-then-rename durability point: a
//! temp-sibling file is written and fsynced, then renamed over the target,
//! so a crash mid-write never leaves a half-written record. Concurrent
//! writers are additionally serialized through the per-file lock in
//! [`lock`].

pub mod lock;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::StoreError;
use crate::healing::log::HealingLogEntry;
use crate::item::Item;
use crate::plan::PlanDocument;
use lock::{LockGuard, LockMode, LockPolicy};

/// Handle onto a `.wreckit/` workspace directory.
pub struct Store {
    root: PathBuf,
    lock_policy: LockPolicy,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store {
            root: root.into(),
            lock_policy: LockPolicy::default(),
        }
    }

    pub fn with_lock_policy(root: impl Into<PathBuf>, lock_policy: LockPolicy) -> Self {
        Store {
            root: root.into(),
            lock_policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn items_dir(&self) -> PathBuf {
        self.root.join("items")
    }

    pub fn item_dir(&self, id: &str) -> PathBuf {
        self.items_dir().join(id)
    }

    fn item_json_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("item.json")
    }

    fn item_lock_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join(".item.lock")
    }

    fn plan_json_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("prd.json")
    }

    fn research_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("research.md")
    }

    fn plan_md_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("plan.md")
    }

    fn pr_md_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("pr.md")
    }

    fn healing_log_path(&self) -> PathBuf {
        self.root.join("healing-log.jsonl")
    }

    /// Hold an exclusive (or shared) lock over all of an item's artifacts
    /// for the duration of a phase execution.
    pub fn scoped_lock(&self, item_id: &str, mode: LockMode) -> Result<LockGuard, StoreError> {
        fs::create_dir_all(self.item_dir(item_id)).map_err(|e| StoreError::Io {
            path: self.item_dir(item_id),
            source: e,
        })?;
        lock::acquire(&self.item_lock_path(item_id), mode, self.lock_policy)
    }

    pub fn create_item(&self, item: &Item) -> Result<(), StoreError> {
        let path = self.item_json_path(&item.id);
        if path.exists() {
            return Err(StoreError::ItemAlreadyExists(item.id.clone()));
        }
        let _guard = self.scoped_lock(&item.id, LockMode::Exclusive)?;
        atomic_write_json(&path, item)
    }

    pub fn read_item(&self, id: &str) -> Result<Item, StoreError> {
        let path = self.item_json_path(id);
        if !path.exists() {
            return Err(StoreError::ItemNotFound(id.to_string()));
        }
        read_json(&path)
    }

    pub fn write_item(&self, item: &Item) -> Result<(), StoreError> {
        let _guard = self.scoped_lock(&item.id, LockMode::Exclusive)?;
        atomic_write_json(&self.item_json_path(&item.id), item)
    }

    /// All items currently on disk, sorted by id. A directory with no
    /// `item.json` yet (mid-creation) is skipped rather than erroring.
    pub fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let dir = self.items_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let item_path = self.item_json_path(&id);
            if !item_path.exists() {
                continue;
            }
            items.push(self.read_item(&id)?);
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    pub fn read_plan(&self, id: &str) -> Result<PlanDocument, StoreError> {
        let path = self.plan_json_path(id);
        if !path.exists() {
            return Err(StoreError::ArtifactNotFound(path));
        }
        read_json(&path)
    }

    pub fn write_plan(&self, id: &str, plan: &PlanDocument) -> Result<(), StoreError> {
        let _guard = self.scoped_lock(id, LockMode::Exclusive)?;
        atomic_write_json(&self.plan_json_path(id), plan)
    }

    pub fn write_research_report(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let _guard = self.scoped_lock(id, LockMode::Exclusive)?;
        atomic_write_text(&self.research_path(id), content)
    }

    pub fn read_research_report(&self, id: &str) -> Result<String, StoreError> {
        let path = self.research_path(id);
        fs::read_to_string(&path).map_err(|_| StoreError::ArtifactNotFound(path))
    }

    pub fn write_plan_markdown(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let _guard = self.scoped_lock(id, LockMode::Exclusive)?;
        atomic_write_text(&self.plan_md_path(id), content)
    }

    pub fn write_pr_description(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let _guard = self.scoped_lock(id, LockMode::Exclusive)?;
        atomic_write_text(&self.pr_md_path(id), content)
    }

    pub fn has_research_report(&self, id: &str) -> bool {
        self.research_path(id).exists()
    }

    pub fn has_plan_artifacts(&self, id: &str) -> bool {
        self.plan_md_path(id).exists() && self.plan_json_path(id).exists()
    }

    pub fn has_pr_description(&self, id: &str) -> bool {
        self.pr_md_path(id).exists()
    }

    /// Append one healing episode to the workspace-wide JSONL log. Locked
    /// against the log file itself, not any single item's lock, since
    /// episodes from different items interleave here.
    pub fn append_healing_log(&self, entry: &HealingLogEntry) -> Result<(), StoreError> {
        let path = self.healing_log_path();
        let lock_path = self.root.join(".healing-log.lock");
        fs::create_dir_all(&self.root).map_err(|e| StoreError::Io {
            path: self.root.clone(),
            source: e,
        })?;
        let _guard = lock::acquire(&lock_path, LockMode::Exclusive, self.lock_policy)?;

        let mut line = serde_json::to_string(entry).map_err(|e| StoreError::Corruption {
            path: path.clone(),
            source: e,
        })?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
        file.write_all(line.as_bytes()).map_err(|e| StoreError::Io {
            path,
            source: e,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| StoreError::Corruption {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `value` to `path` via temp-sibling-then-rename so partial writes
/// are never observable, then sweep any stray temp files a prior failed
/// write left behind targeting the same path.
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corruption {
        path: path.to_path_buf(),
        source: e,
    })?;
    atomic_write_bytes(path, &bytes)
}

fn atomic_write_text(path: &Path, content: &str) -> Result<(), StoreError> {
    atomic_write_bytes(path, content.as_bytes())
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

    let write_result = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }

    sweep_stray_temp_files(dir, &file_name);
    Ok(())
}

fn sweep_stray_temp_files(dir: &Path, file_name: &str) {
    let prefix = format!(".{file_name}.tmp-");
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(&prefix) {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemState;
    use crate::plan::UserStory;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join(".wreckit"));
        (dir, store)
    }

    #[test]
    fn create_then_read_item_round_trips() {
        let (_dir, store) = store();
        let item = Item::new("001-add-flag", "Add a flag", "overview");
        store.create_item(&item).unwrap();

        let read_back = store.read_item("001-add-flag").unwrap();
        assert_eq!(read_back.id, item.id);
        assert_eq!(read_back.state, ItemState::Raw);
    }

    #[test]
    fn create_item_twice_errors() {
        let (_dir, store) = store();
        let item = Item::new("001-x", "x", "x");
        store.create_item(&item).unwrap();
        assert!(matches!(
            store.create_item(&item),
            Err(StoreError::ItemAlreadyExists(_))
        ));
    }

    #[test]
    fn read_missing_item_fails_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_item("999-missing"),
            Err(StoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn read_corrupt_item_fails_corruption_and_is_not_auto_repaired() {
        let (_dir, store) = store();
        let path = store.item_json_path("001-x");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{not valid json").unwrap();

        assert!(matches!(
            store.read_item("001-x"),
            Err(StoreError::Corruption { .. })
        ));
        // Never auto-repaired: still corrupt on a second read.
        assert!(matches!(
            store.read_item("001-x"),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn write_item_is_visible_to_a_subsequent_read() {
        let (_dir, store) = store();
        let mut item = Item::new("001-x", "x", "x");
        store.create_item(&item).unwrap();

        item.state = ItemState::Researched;
        store.write_item(&item).unwrap();

        let read_back = store.read_item("001-x").unwrap();
        assert_eq!(read_back.state, ItemState::Researched);
    }

    #[test]
    fn list_items_returns_all_in_id_order() {
        let (_dir, store) = store();
        store.create_item(&Item::new("002-b", "b", "b")).unwrap();
        store.create_item(&Item::new("001-a", "a", "a")).unwrap();

        let items = store.list_items().unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["001-a", "002-b"]);
    }

    #[test]
    fn list_items_skips_a_directory_with_no_item_json_yet() {
        let (_dir, store) = store();
        store.create_item(&Item::new("001-a", "a", "a")).unwrap();
        fs::create_dir_all(store.item_dir("002-mid-create")).unwrap();

        let items = store.list_items().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn plan_round_trips_and_missing_plan_is_artifact_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_plan("001-x"),
            Err(StoreError::ArtifactNotFound(_))
        ));

        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(UserStory::new("US-001", "first", 1));
        store.write_plan("001-x", &plan).unwrap();

        let read_back = store.read_plan("001-x").unwrap();
        assert_eq!(read_back.user_stories.len(), 1);
    }

    #[test]
    fn append_healing_log_writes_one_line_per_call() {
        let (_dir, store) = store();
        let entry = HealingLogEntry::new(
            "001-x",
            crate::healing::FailureClass::GitLock,
            "index.lock present",
        );
        store.append_healing_log(&entry).unwrap();
        store.append_healing_log(&entry).unwrap();

        let content = fs::read_to_string(store.healing_log_path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn a_stray_temp_file_is_swept_on_next_successful_write() {
        let (_dir, store) = store();
        let item = Item::new("001-x", "x", "x");
        store.create_item(&item).unwrap();

        let dir = store.item_dir("001-x");
        fs::write(dir.join(".item.json.tmp-stale"), b"leftover").unwrap();
        assert!(dir.join(".item.json.tmp-stale").exists());

        store.write_item(&item).unwrap();
        assert!(!dir.join(".item.json.tmp-stale").exists());
    }
}
