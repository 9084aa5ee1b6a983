//! File-based task store, one JSON file for the whole task set.
//! The whole task set lives in one JSON object keyed by stringified task id,
//! pretty-printed in insertion order so the file stays human-readable.
//! Every save rewrites the file through a temp file + rename.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tasks::{Task, TaskStatus};

/// File-based task store.
pub struct TaskStore {
    path: PathBuf,
    writes: AtomicU64,
}

impl TaskStore {
    /// Create a store backed by `path`. The parent directory is created if missing.
    pub fn new(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create task store directory {}: {e}", parent.display());
            }
        }
        Self {
            path: path.to_path_buf(),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of successful saves since this store was created.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Load tasks from disk, falling back to (and persisting) the default set
    /// when the file is missing or unreadable.
    ///
    /// A `Running` status can only be true for the process that set it, so it
    /// is reset to `Scheduled`.
    pub fn load(&self) -> Vec<Task> {
        let mut tasks = match self.read() {
            Ok(Some(tasks)) => {
                tracing::info!("Tasks loaded from {} ({} task(s))", self.path.display(), tasks.len());
                tasks
            }
            Ok(None) => self.create_default_tasks(),
            Err(e) => {
                tracing::error!("Error loading tasks from {}: {e}", self.path.display());
                self.create_default_tasks()
            }
        };

        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Running {
                tracing::debug!("Task {} was Running at shutdown, now Scheduled", task.id);
                task.status = TaskStatus::Scheduled;
            }
        }
        tasks
    }

    /// Save all tasks to disk. Nothing is written if serialization fails.
    pub fn save(&self, tasks: &[Task]) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&TaskMapRef(tasks))
            .map_err(|e| format!("Serialize error: {e}"))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| format!("Write error: {e}"))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            format!("Rename error: {e}")
        })?;

        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Saved {} tasks to {}", tasks.len(), self.path.display());
        Ok(())
    }

    fn read(&self) -> Result<Option<Vec<Task>>, String> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path).map_err(|e| format!("Read error: {e}"))?;
        let TaskMapOwned(tasks) =
            serde_json::from_str(&json).map_err(|e| format!("Parse error: {e}"))?;
        Ok(Some(tasks))
    }

    fn create_default_tasks(&self) -> Vec<Task> {
        let tasks = Task::default_tasks();
        match self.save(&tasks) {
            Ok(()) => tracing::info!("Default tasks created and saved."),
            Err(e) => tracing::error!("Failed to save default tasks: {e}"),
        }
        tasks
    }
}

/// On-disk shape: `{"1": {...}, "2": {...}}`, written in slice order.
struct TaskMapRef<'a>(&'a [Task]);

impl Serialize for TaskMapRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for task in self.0 {
            map.serialize_entry(&task.id.to_string(), task)?;
        }
        map.end()
    }
}

/// Same shape as [`TaskMapRef`], read back in file order.
struct TaskMapOwned(Vec<Task>);

impl<'de> Deserialize<'de> for TaskMapOwned {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TaskMapVisitor)
    }
}

struct TaskMapVisitor;

impl<'de> Visitor<'de> for TaskMapVisitor {
    type Value = TaskMapOwned;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of task id to task")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut tasks: Vec<Task> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, mut task)) = access.next_entry::<String, Task>()? {
            let id: u32 = key
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("task key '{key}' is not an integer id")))?;
            if task.id != id {
                tracing::warn!("Task stored under key {id} has id {}, using {id}", task.id);
                task.id = id;
            }
            match tasks.iter_mut().find(|t| t.id == id) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
        }
        Ok(TaskMapOwned(tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> TaskStore {
        TaskStore::new(&dir.path().join("config").join("tasks_config.json"))
    }

    #[test]
    fn test_missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let tasks = store.load();
        assert_eq!(tasks.len(), 10);
        assert!(store.path().exists());
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();

        let tasks = store.load();
        assert_eq!(tasks, Task::default_tasks());
        // Corrupt file replaced by the defaults.
        let reloaded = store.load();
        assert_eq!(reloaded.len(), 10);
    }

    #[test]
    fn test_non_integer_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let json = serde_json::json!({
            "abc": {"id": 1, "name": "x", "cron": "0 1 * * *", "description": "",
                    "function_name": "lidarr_sync", "last_run": "", "status": "Scheduled"}
        });
        std::fs::write(store.path(), json.to_string()).unwrap();
        assert_eq!(store.load(), Task::default_tasks());
    }

    #[test]
    fn test_running_normalized_to_scheduled() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut tasks = Task::default_tasks();
        tasks[2].status = TaskStatus::Running;
        tasks[4].status = TaskStatus::Disabled;
        store.save(&tasks).unwrap();

        let loaded = store.load();
        assert_eq!(loaded[2].status, TaskStatus::Scheduled);
        assert_eq!(loaded[4].status, TaskStatus::Disabled);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut tasks = Task::default_tasks();
        tasks[2].last_run = "16-October-2026 03:00:05".into();
        store.save(&tasks).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let radarr = &value["3"];
        assert_eq!(radarr["id"], 3);
        assert_eq!(radarr["name"], "Radarr Sync");
        assert_eq!(radarr["cron"], "0 3 * * *");
        assert_eq!(radarr["function_name"], "radarr_sync");
        assert_eq!(radarr["last_run"], "16-October-2026 03:00:05");
        assert_eq!(radarr["status"], "Scheduled");

        // Keys appear in insertion order, not string order ("10" after "9").
        let pos_9 = raw.find("\"9\":").unwrap();
        let pos_10 = raw.find("\"10\":").unwrap();
        assert!(pos_9 < pos_10);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_insertion_order_preserved_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let tasks = vec![
            Task::new(7, "b", "0 7 * * *", "", "readarr_sync"),
            Task::new(2, "a", "0 2 * * *", "", "lidarr_sync"),
        ];
        store.save(&tasks).unwrap();
        let ids: Vec<u32> = store.load().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![7, 2]);
    }

    #[test]
    fn test_key_is_authoritative_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let json = serde_json::json!({
            "4": {"id": 40, "name": "Movie Recommendations", "cron": "0 4 * * *",
                  "description": "", "function_name": "generate_movie_recommendations",
                  "last_run": "", "status": "Completed"}
        });
        std::fs::write(store.path(), json.to_string()).unwrap();
        let tasks = store.load();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, 4);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn test_save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is a directory, so the rename cannot succeed.
        let target = dir.path().join("tasks.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let store = TaskStore::new(&target);
        assert!(store.save(&Task::default_tasks()).is_err());
        assert_eq!(store.writes(), 0);
    }
}
