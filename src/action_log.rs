use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{StartBucket, Status, Task};
use crate::utils::{self, Profile};

const ACTION_LOG_FILE: &str = "action-log.json";

#[derive(Debug, Error)]
pub enum ActionLogError {
    #[error("No action logged; nothing to undo")]
    NoActionLogged,
    #[error("Action log I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Action log is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not determine a location for the action log")]
    NoLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Trash,
    Update,
}

/// Frozen copy of the task fields needed to invert a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub start: StartBucket,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    pub status: Status,
}

impl ActionItem {
    pub fn capture(task: &Task) -> Self {
        Self {
            id: task.uuid.clone(),
            title: task.title.clone(),
            notes: task.notes.clone(),
            tags: task.tags.clone(),
            deadline: task.deadline,
            start: task.start,
            start_date: task.start_date,
            heading: task.heading_title.clone(),
            project_id: task.project_id.clone(),
            area_id: task.area_id.clone(),
            status: task.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub kind: ActionKind,
    pub created_at: DateTime<Local>,
    pub items: Vec<ActionItem>,
}

impl ActionEntry {
    /// Capture `tasks` in the order given, which is also dispatch order
    pub fn capture(kind: ActionKind, tasks: &[Task]) -> Self {
        Self {
            kind,
            created_at: Local::now(),
            items: tasks.iter().map(ActionItem::capture).collect(),
        }
    }
}

/// Single-slot journal of the last bulk mutation.
///
/// Writing replaces the previous entry. There is no cross-process locking.
#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `action-log.json` in the profile's data directory
    pub fn default_location(profile: Profile) -> Result<Self, ActionLogError> {
        let dir = utils::get_data_dir(profile).ok_or(ActionLogError::NoLocation)?;
        Ok(Self::at(dir.join(ACTION_LOG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the slot with `entry`. Written to a sibling temp file and
    /// renamed so a reader never sees half a document.
    pub fn append(&self, entry: &ActionEntry) -> Result<(), ActionLogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let json = serde_json::to_vec_pretty(entry)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| ActionLogError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io(e))?;
        info!(kind = ?entry.kind, items = entry.items.len(), path = %self.path.display(), "recorded action");
        Ok(())
    }

    pub fn read_last(&self) -> Result<ActionEntry, ActionLogError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ActionLogError::NoActionLogged);
            }
            Err(e) => return Err(self.io(e)),
        };
        if contents.trim().is_empty() {
            return Err(ActionLogError::NoActionLogged);
        }
        let entry: ActionEntry = serde_json::from_str(&contents)?;
        if entry.items.is_empty() {
            return Err(ActionLogError::NoActionLogged);
        }
        debug!(kind = ?entry.kind, items = entry.items.len(), "read action log");
        Ok(entry)
    }

    /// Delete the slot. Already missing is fine.
    pub fn remove(&self) -> Result<(), ActionLogError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io(e)),
        }
    }

    fn io(&self, source: io::Error) -> ActionLogError {
        ActionLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        let mut task = Task::new(id, format!("title {id}"));
        task.tags = vec!["home".into()];
        task.deadline = NaiveDate::from_ymd_opt(2025, 5, 1);
        task
    }

    #[test]
    fn missing_slot_means_nothing_to_undo() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::at(dir.path().join("log.json"));
        assert!(matches!(log.read_last(), Err(ActionLogError::NoActionLogged)));
        log.remove().unwrap();
    }

    #[test]
    fn append_overwrites_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::at(dir.path().join("nested/log.json"));
        log.append(&ActionEntry::capture(ActionKind::Trash, &[task("A"), task("B")]))
            .unwrap();
        log.append(&ActionEntry::capture(ActionKind::Update, &[task("C")]))
            .unwrap();

        let entry = log.read_last().unwrap();
        assert_eq!(entry.kind, ActionKind::Update);
        assert_eq!(entry.items.len(), 1);
        assert_eq!(entry.items[0].id, "C");
        assert_eq!(entry.items[0].tags, vec!["home".to_string()]);
        assert!(!dir.path().join("nested/log.json.tmp").exists());
    }

    #[test]
    fn remove_empties_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::at(dir.path().join("log.json"));
        log.append(&ActionEntry::capture(ActionKind::Trash, &[task("A")]))
            .unwrap();
        log.remove().unwrap();
        assert!(matches!(log.read_last(), Err(ActionLogError::NoActionLogged)));
    }

    #[test]
    fn blank_file_counts_as_empty_and_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let log = ActionLog::at(&path);
        fs::write(&path, "  \n").unwrap();
        assert!(matches!(log.read_last(), Err(ActionLogError::NoActionLogged)));
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(log.read_last(), Err(ActionLogError::Json(_))));
    }

    #[test]
    fn capture_preserves_submission_order() {
        let entry = ActionEntry::capture(ActionKind::Trash, &[task("B"), task("A"), task("C")]);
        let ids: Vec<&str> = entry.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }
}
