#![allow(dead_code)]

use chrono::{Local, NaiveDate};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use things3::models::encode_things_date;
use things3::things::{Channel, ChannelError, Dispatch};
use things3::utils;

const SCHEMA: &str = "
CREATE TABLE TMTask (
    uuid TEXT PRIMARY KEY,
    title TEXT,
    notes TEXT,
    type INTEGER DEFAULT 0,
    status INTEGER DEFAULT 0,
    trashed INTEGER DEFAULT 0,
    start INTEGER DEFAULT 0,
    startDate INTEGER,
    deadline INTEGER,
    creationDate REAL,
    userModificationDate REAL,
    stopDate REAL,
    project TEXT,
    area TEXT,
    heading TEXT,
    \"index\" INTEGER DEFAULT 0,
    todayIndex INTEGER DEFAULT 0,
    rt1_repeatingTemplate TEXT,
    rt1_recurrenceRule BLOB,
    rt1_instanceCreationStartDate INTEGER,
    rt1_instanceCreationPaused INTEGER DEFAULT 0,
    rt1_instanceCreationCount INTEGER DEFAULT 0,
    rt1_afterCompletionReferenceDate INTEGER,
    rt1_nextInstanceStartDate INTEGER
);
CREATE TABLE TMArea (
    uuid TEXT PRIMARY KEY,
    title TEXT,
    visible INTEGER DEFAULT 1,
    \"index\" INTEGER DEFAULT 0
);
CREATE TABLE TMTag (
    uuid TEXT PRIMARY KEY,
    title TEXT,
    shortcut TEXT,
    parent TEXT,
    \"index\" INTEGER DEFAULT 0
);
CREATE TABLE TMTaskTag (
    tasks TEXT NOT NULL,
    tags TEXT NOT NULL
);
";

/// One `TMTask` row; unset fields keep the column defaults
#[derive(Debug, Clone, Default)]
pub struct TaskRow {
    pub uuid: String,
    pub title: String,
    pub notes: Option<String>,
    pub task_type: i64,
    pub status: i64,
    pub trashed: bool,
    pub start: i64,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub created: Option<f64>,
    pub modified: Option<f64>,
    pub stopped: Option<f64>,
    pub project: Option<String>,
    pub area: Option<String>,
    pub heading: Option<String>,
    pub index: i64,
    pub template: Option<String>,
    pub rule: Option<Vec<u8>>,
}

impl TaskRow {
    pub fn todo(uuid: &str, title: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            title: title.to_string(),
            created: Some(now()),
            modified: Some(now()),
            ..Self::default()
        }
    }

    pub fn project(uuid: &str, title: &str) -> Self {
        Self {
            task_type: 1,
            start: 1,
            ..Self::todo(uuid, title)
        }
    }

    pub fn heading(uuid: &str, title: &str, project: &str) -> Self {
        Self {
            task_type: 2,
            project: Some(project.to_string()),
            ..Self::todo(uuid, title)
        }
    }
}

pub fn now() -> f64 {
    utils::to_epoch_seconds(&Local::now())
}

/// A throwaway Things snapshot on disk
pub struct Fixture {
    _dir: TempDir,
    path: PathBuf,
    conn: Connection,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { _dir: dir, path, conn }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn insert(&self, row: TaskRow) -> &Self {
        self.conn
            .execute(
                "INSERT INTO TMTask (uuid, title, notes, type, status, trashed, start, startDate, deadline,
                    creationDate, userModificationDate, stopDate, project, area, heading, \"index\",
                    rt1_repeatingTemplate, rt1_recurrenceRule)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    row.uuid,
                    row.title,
                    row.notes,
                    row.task_type,
                    row.status,
                    row.trashed as i64,
                    row.start,
                    row.start_date.map(encode_things_date),
                    row.deadline.map(encode_things_date),
                    row.created,
                    row.modified,
                    row.stopped,
                    row.project,
                    row.area,
                    row.heading,
                    row.index,
                    row.template,
                    row.rule,
                ],
            )
            .unwrap();
        self
    }

    pub fn area(&self, uuid: &str, title: &str) -> &Self {
        self.conn
            .execute("INSERT INTO TMArea (uuid, title) VALUES (?1, ?2)", params![uuid, title])
            .unwrap();
        self
    }

    pub fn tag(&self, uuid: &str, title: &str, parent: Option<&str>) -> &Self {
        self.conn
            .execute(
                "INSERT INTO TMTag (uuid, title, parent) VALUES (?1, ?2, ?3)",
                params![uuid, title, parent],
            )
            .unwrap();
        self
    }

    pub fn tag_task(&self, task: &str, tag: &str) -> &Self {
        self.conn
            .execute("INSERT INTO TMTaskTag (tasks, tags) VALUES (?1, ?2)", params![task, tag])
            .unwrap();
        self
    }

    pub fn set_rule(&self, uuid: &str, rule: &[u8]) -> &Self {
        self.conn
            .execute(
                "UPDATE TMTask SET rt1_recurrenceRule = ?1, rt1_instanceCreationStartDate = 132000000,
                    rt1_instanceCreationCount = 3, rt1_nextInstanceStartDate = 132000128
                 WHERE uuid = ?2",
                params![rule, uuid],
            )
            .unwrap();
        self
    }

    pub fn modified_at(&self, uuid: &str) -> Option<f64> {
        self.conn
            .query_row(
                "SELECT userModificationDate FROM TMTask WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .unwrap()
    }
}

/// Channel that records every dispatch instead of talking to Things.
///
/// With `creates_in` set, each add also inserts a matching row into that
/// snapshot, standing in for the app syncing the new task to disk.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub sent: Vec<Dispatch>,
    pub creates_in: Option<PathBuf>,
}

impl RecordingChannel {
    pub fn creating_in(path: &Path) -> Self {
        Self {
            sent: Vec::new(),
            creates_in: Some(path.to_path_buf()),
        }
    }
}

impl Channel for RecordingChannel {
    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), ChannelError> {
        self.sent.push(dispatch.clone());
        if let (Dispatch::Add(add), Some(path)) = (dispatch, &self.creates_in) {
            let conn = Connection::open(path).unwrap();
            conn.execute(
                "INSERT INTO TMTask (uuid, title, creationDate, userModificationDate) VALUES (?1, ?2, ?3, ?3)",
                params![format!("NEW-{}", self.sent.len()), add.title, now()],
            )
            .unwrap();
        }
        Ok(())
    }
}
