use chrono::{DateTime, Local};
use rusqlite::types::Value;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::filter::TaskFilter;
use crate::models::{
    Area, Project, RepeatRule, RepeatUpdate, StartBucket, Status, Tag, Task, TaskType,
    decode_things_date, encode_things_date,
};
use crate::utils;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Things database unavailable at {}: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },
    #[error("Task '{id}' not found")]
    NotFound { id: String },
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);
const TAG_LOOKUP_CHUNK: usize = 500;
const FOLD_FN: &str = "things_fold";

const TASK_SELECT_SQL: &str = "SELECT
    t.uuid, t.title, t.notes, t.type, t.status, t.trashed,
    t.start, t.startDate, t.deadline,
    t.creationDate, t.userModificationDate, t.stopDate,
    COALESCE(t.project, h.project), p.title,
    COALESCE(t.area, p.area), a.title,
    t.heading, h.title,
    t.\"index\", t.todayIndex,
    t.rt1_repeatingTemplate, t.rt1_recurrenceRule
FROM TMTask t
LEFT JOIN TMTask h ON h.uuid = t.heading
LEFT JOIN TMTask p ON p.uuid = COALESCE(t.project, h.project)
LEFT JOIN TMArea a ON a.uuid = COALESCE(t.area, p.area)";

/// Single-task reads, split out so polling code can run against fakes
pub trait TaskLookup {
    fn task_by_id(&self, id: &str) -> Result<Task, DatabaseError>;
}

/// Read view over the Things SQLite snapshot.
///
/// The connection is owned by the store and closed when it is dropped, so
/// every exit path releases it.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open the snapshot read-only
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    /// Open the snapshot for the repeat-rule write path
    pub fn open_writable(path: &Path) -> Result<Self, DatabaseError> {
        Self::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    fn open_with_flags(path: &Path, mode: OpenFlags) -> Result<Self, DatabaseError> {
        let unavailable = |reason: String| DatabaseError::StoreUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("file does not exist".to_string()));
        }

        let flags = mode | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| unavailable(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| unavailable(e.to_string()))?;
        register_fold(&conn).map_err(|e| unavailable(e.to_string()))?;

        // A locked or non-SQLite file fails here rather than on first use
        let has_tasks: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'TMTask'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| unavailable(e.to_string()))?;
        if has_tasks == 0 {
            return Err(unavailable("not a Things database (missing TMTask table)".to_string()));
        }

        info!(path = %path.display(), writable = mode.contains(OpenFlags::SQLITE_OPEN_READ_WRITE), "opened Things database");
        Ok(Store {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a single task by ID
    pub fn task_by_id(&self, id: &str) -> Result<Task, DatabaseError> {
        let sql = format!("{TASK_SELECT_SQL} WHERE t.uuid = ?1");
        let today = utils::today();
        let task = self
            .conn
            .query_row(&sql, params![id], |row| row_to_task(row, today))
            .optional()?;
        let mut task = task.ok_or_else(|| DatabaseError::NotFound { id: id.to_string() })?;
        self.attach_tags(std::slice::from_mut(&mut task))?;
        Ok(task)
    }

    /// Get tasks matching the filter, in insertion order
    pub fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(filter, Vec::new(), Vec::new())
    }

    /// Tasks whose creation date falls in `[start, end)`
    pub fn tasks_created_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            filter,
            vec!["t.creationDate >= ?".to_string(), "t.creationDate < ?".to_string()],
            vec![
                Value::Real(utils::to_epoch_seconds(&start)),
                Value::Real(utils::to_epoch_seconds(&end)),
            ],
        )
    }

    /// Completed tasks whose stop date falls in `[start, end)`
    pub fn tasks_completed_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            filter,
            vec![
                "t.status = ?".to_string(),
                "t.stopDate >= ?".to_string(),
                "t.stopDate < ?".to_string(),
            ],
            vec![
                Value::Integer(Status::Completed.code()),
                Value::Real(utils::to_epoch_seconds(&start)),
                Value::Real(utils::to_epoch_seconds(&end)),
            ],
        )
    }

    /// Tasks with an exact title modified at or after `since`, newest first
    pub fn tasks_by_title_since(
        &self,
        title: &str,
        task_type: TaskType,
        since: DateTime<Local>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let sql = format!(
            "{TASK_SELECT_SQL} WHERE t.title = ?1 AND t.type = ?2 AND t.userModificationDate >= ?3
             ORDER BY t.userModificationDate DESC"
        );
        let today = utils::today();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut tasks = stmt
            .query_map(
                params![title, task_type.code(), utils::to_epoch_seconds(&since)],
                |row| row_to_task(row, today),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_tags(&mut tasks)?;
        Ok(tasks)
    }

    fn query_tasks(
        &self,
        filter: &TaskFilter,
        mut clauses: Vec<String>,
        mut values: Vec<Value>,
    ) -> Result<Vec<Task>, DatabaseError> {
        push_filter(filter, &mut clauses, &mut values);

        let mut sql = TASK_SELECT_SQL.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY t.rowid ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        debug!(clauses = clauses.len(), limit = ?filter.limit, "querying tasks");
        let today = utils::today();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut tasks = stmt
            .query_map(params_from_iter(values.iter()), |row| row_to_task(row, today))?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_tags(&mut tasks)?;
        debug!(count = tasks.len(), "tasks loaded");
        Ok(tasks)
    }

    /// Fill `Task::tags` for every task in one pass per chunk
    fn attach_tags(&self, tasks: &mut [Task]) -> Result<(), DatabaseError> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut by_task: HashMap<String, Vec<String>> = HashMap::new();
        for chunk in tasks.chunks(TAG_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT tt.tasks, g.title FROM TMTaskTag tt
                 JOIN TMTag g ON g.uuid = tt.tags
                 WHERE tt.tasks IN ({placeholders})
                 ORDER BY g.\"index\", g.title"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|t| t.uuid.as_str())), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            for row in rows {
                let (task_id, title) = row?;
                if let Some(title) = title {
                    by_task.entry(task_id).or_default().push(title);
                }
            }
        }
        for task in tasks.iter_mut() {
            if let Some(tags) = by_task.remove(&task.uuid) {
                task.tags = tags;
            }
        }
        Ok(())
    }

    /// Get projects, optionally restricted to one status
    pub fn projects(
        &self,
        status: Option<Status>,
        include_trashed: bool,
    ) -> Result<Vec<Project>, DatabaseError> {
        let mut sql = String::from(
            "SELECT p.uuid, p.title, p.status, p.trashed, p.area, a.title
             FROM TMTask p LEFT JOIN TMArea a ON a.uuid = p.area
             WHERE p.type = ?",
        );
        let mut values = vec![Value::Integer(TaskType::Project.code())];
        if let Some(status) = status {
            sql.push_str(" AND p.status = ?");
            values.push(Value::Integer(status.code()));
        }
        if !include_trashed {
            sql.push_str(" AND p.trashed = 0");
        }
        sql.push_str(" ORDER BY p.\"index\", p.rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let projects = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(Project {
                    uuid: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    status: Status::from_code(row.get::<_, Option<i64>>(2)?.unwrap_or_default()),
                    trashed: row.get::<_, Option<i64>>(3)?.unwrap_or_default() != 0,
                    area_id: row.get(4)?,
                    area_title: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Get all areas ordered as in the sidebar
    pub fn areas(&self) -> Result<Vec<Area>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, title, visible FROM TMArea ORDER BY \"index\", rowid")?;
        let areas = stmt
            .query_map([], |row| {
                Ok(Area {
                    uuid: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    visible: row.get::<_, Option<i64>>(2)?.unwrap_or(1) != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(areas)
    }

    /// Get all tags ordered as in the tag manager
    pub fn tags(&self) -> Result<Vec<Tag>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, title, shortcut, parent FROM TMTag ORDER BY \"index\", rowid")?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    uuid: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    shortcut: row.get(2)?,
                    parent_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Resolve a project by ID or case-insensitive title
    pub fn resolve_project(&self, selector: &str) -> Result<Option<String>, DatabaseError> {
        let id = self
            .conn
            .query_row(
                "SELECT uuid FROM TMTask
                 WHERE type = ?2 AND (uuid = ?1 OR lower(title) = lower(?1))
                 ORDER BY uuid = ?1 DESC, trashed ASC, rowid ASC LIMIT 1",
                params![selector, TaskType::Project.code()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Resolve an area by ID or case-insensitive title
    pub fn resolve_area(&self, selector: &str) -> Result<Option<String>, DatabaseError> {
        let id = self
            .conn
            .query_row(
                "SELECT uuid FROM TMArea WHERE uuid = ?1 OR lower(title) = lower(?1)
                 ORDER BY uuid = ?1 DESC, rowid ASC LIMIT 1",
                params![selector],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Resolve a tag by ID or title, returning it plus its direct children
    pub fn resolve_tag(&self, selector: &str) -> Result<Vec<Tag>, DatabaseError> {
        let root: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid FROM TMTag WHERE uuid = ?1 OR lower(title) = lower(?1)
                 ORDER BY uuid = ?1 DESC, rowid ASC LIMIT 1",
                params![selector],
                |row| row.get(0),
            )
            .optional()?;
        let Some(root) = root else {
            return Ok(Vec::new());
        };
        Ok(self
            .tags()?
            .into_iter()
            .filter(|tag| tag.uuid == root || tag.parent_id.as_deref() == Some(root.as_str()))
            .collect())
    }

    /// Read the repeat template fields of a task
    pub fn repeat_rule(&self, id: &str) -> Result<RepeatRule, DatabaseError> {
        self.conn
            .query_row(
                "SELECT rt1_recurrenceRule, rt1_instanceCreationStartDate, rt1_instanceCreationPaused,
                        rt1_instanceCreationCount, rt1_afterCompletionReferenceDate, rt1_nextInstanceStartDate
                 FROM TMTask WHERE uuid = ?1",
                params![id],
                |row| {
                    Ok(RepeatRule {
                        recurrence_rule: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                        instance_creation_start_date: row.get(1)?,
                        instance_creation_paused: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
                        instance_creation_count: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                        after_completion_reference: row.get(4)?,
                        next_instance_start_date: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| DatabaseError::NotFound { id: id.to_string() })
    }

    /// The template a repeating instance was generated from, if any
    pub fn repeat_template_for(&self, id: &str) -> Result<Option<String>, DatabaseError> {
        let template: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT rt1_repeatingTemplate FROM TMTask WHERE uuid = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match template {
            Some(template) => Ok(template.filter(|t| !t.is_empty())),
            None => Err(DatabaseError::NotFound { id: id.to_string() }),
        }
    }

    /// Write a repeat rule straight into the snapshot
    pub fn apply_repeat_rule(&self, id: &str, update: &RepeatUpdate) -> Result<(), DatabaseError> {
        let now = utils::to_epoch_seconds(&Local::now());
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE TMTask SET
                rt1_recurrenceRule = ?1,
                rt1_instanceCreationStartDate = ?2,
                rt1_instanceCreationPaused = ?3,
                rt1_instanceCreationCount = ?4,
                rt1_afterCompletionReferenceDate = ?5,
                rt1_nextInstanceStartDate = ?6,
                userModificationDate = MAX(COALESCE(userModificationDate, 0) + 0.001, ?7)
             WHERE uuid = ?8",
            params![
                update.recurrence_rule,
                update.instance_creation_start_date,
                update.instance_creation_paused,
                update.instance_creation_count,
                update.after_completion_reference,
                update.next_instance_start_date,
                now,
                id
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        if update.set_deadline {
            tx.execute(
                "UPDATE TMTask SET deadline = ?1 WHERE uuid = ?2",
                params![update.deadline, id],
            )?;
        }
        tx.commit()?;
        info!(id, rule_bytes = update.recurrence_rule.len(), "applied repeat rule");
        Ok(())
    }

    /// Remove a repeat rule and the deadline it carried
    pub fn clear_repeat_rule(&self, id: &str) -> Result<(), DatabaseError> {
        let now = utils::to_epoch_seconds(&Local::now());
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE TMTask SET
                rt1_recurrenceRule = NULL,
                rt1_instanceCreationStartDate = NULL,
                rt1_instanceCreationPaused = 0,
                rt1_instanceCreationCount = 0,
                rt1_afterCompletionReferenceDate = NULL,
                rt1_nextInstanceStartDate = NULL,
                deadline = NULL,
                userModificationDate = MAX(COALESCE(userModificationDate, 0) + 0.001, ?1)
             WHERE uuid = ?2",
            params![now, id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        tx.commit()?;
        info!(id, "cleared repeat rule");
        Ok(())
    }
}

impl TaskLookup for Store {
    fn task_by_id(&self, id: &str) -> Result<Task, DatabaseError> {
        Store::task_by_id(self, id)
    }
}

/// Translate the native part of a filter into SQL predicates
fn push_filter(filter: &TaskFilter, clauses: &mut Vec<String>, values: &mut Vec<Value>) {
    if !filter.types.is_empty() {
        let placeholders = vec!["?"; filter.types.len()].join(", ");
        clauses.push(format!("t.type IN ({placeholders})"));
        values.extend(filter.types.iter().map(|t| Value::Integer(t.code())));
    }
    if let Some(status) = filter.status {
        clauses.push("t.status = ?".to_string());
        values.push(Value::Integer(status.code()));
    }
    if !filter.include_trashed {
        clauses.push("COALESCE(t.trashed, 0) = 0".to_string());
    }
    if let Some(project_id) = &filter.project_id {
        clauses.push("COALESCE(t.project, h.project) = ?".to_string());
        values.push(Value::Text(project_id.clone()));
    }
    if let Some(area_id) = &filter.area_id {
        clauses.push("COALESCE(t.area, p.area) = ?".to_string());
        values.push(Value::Text(area_id.clone()));
    }
    if let Some(tag) = &filter.tag {
        let placeholders = vec!["?"; tag.ids.len().max(1)].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM TMTaskTag tt WHERE tt.tasks = t.uuid AND tt.tags IN ({placeholders}))"
        ));
        if tag.ids.is_empty() {
            values.push(Value::Null);
        } else {
            values.extend(tag.ids.iter().map(|id| Value::Text(id.clone())));
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        clauses.push(format!(
            "(instr({FOLD_FN}(t.title), ?) > 0 OR instr({FOLD_FN}(t.notes), ?) > 0)"
        ));
        values.push(Value::Text(needle.clone()));
        values.push(Value::Text(needle));
    }
    if let Some(start) = filter.start {
        clauses.push("t.start = ?".to_string());
        values.push(Value::Integer(start.code()));
        if start != StartBucket::Inbox {
            clauses.push("t.startDate IS NULL".to_string());
        }
    }
    let timestamps = [
        ("t.creationDate < ?", filter.created_before),
        ("t.creationDate >= ?", filter.created_after),
        ("t.userModificationDate < ?", filter.modified_before),
        ("t.userModificationDate >= ?", filter.modified_after),
    ];
    for (clause, bound) in timestamps {
        if let Some(bound) = bound {
            clauses.push(clause.to_string());
            values.push(Value::Real(utils::to_epoch_seconds(&bound)));
        }
    }
    if let Some(due) = filter.due_before {
        clauses.push("t.deadline IS NOT NULL AND t.deadline > 0 AND t.deadline < ?".to_string());
        values.push(Value::Integer(encode_things_date(due)));
    }
    if let Some(start) = filter.start_before {
        clauses.push("t.startDate IS NOT NULL AND t.startDate > 0 AND t.startDate < ?".to_string());
        values.push(Value::Integer(encode_things_date(start)));
    }
    if let Some(has_url) = filter.has_url {
        let url = "(COALESCE(t.notes, '') LIKE '%http://%' OR COALESCE(t.notes, '') LIKE '%https://%')";
        clauses.push(if has_url { url.to_string() } else { format!("NOT {url}") });
    }
}

/// Unicode lowercasing for search; SQLite's own `lower()` and `LIKE` only fold ASCII
fn register_fold(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.unwrap_or_default().to_lowercase())
        },
    )
}

/// Helper function to map a row of `TASK_SELECT_SQL` to a Task
fn row_to_task(row: &rusqlite::Row, today: chrono::NaiveDate) -> Result<Task, rusqlite::Error> {
    let start_date = row.get::<_, Option<i64>>(7)?.and_then(decode_things_date);
    let template: Option<String> = row.get(20)?;
    let rule: Option<Vec<u8>> = row.get(21)?;
    let today_index = row
        .get::<_, Option<i64>>(19)?
        .filter(|_| start_date.is_some_and(|date| date <= today));

    Ok(Task {
        uuid: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        notes: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        task_type: TaskType::from_code(row.get::<_, Option<i64>>(3)?.unwrap_or_default()),
        status: Status::from_code(row.get::<_, Option<i64>>(4)?.unwrap_or_default()),
        trashed: row.get::<_, Option<i64>>(5)?.unwrap_or_default() != 0,
        start: StartBucket::from_code(row.get::<_, Option<i64>>(6)?.unwrap_or_default()),
        start_date,
        deadline: row.get::<_, Option<i64>>(8)?.and_then(decode_things_date),
        created: row.get::<_, Option<f64>>(9)?.and_then(utils::from_epoch_seconds),
        modified: row.get::<_, Option<f64>>(10)?.and_then(utils::from_epoch_seconds),
        stopped: row.get::<_, Option<f64>>(11)?.and_then(utils::from_epoch_seconds),
        project_id: row.get(12)?,
        project_title: row.get(13)?,
        area_id: row.get(14)?,
        area_title: row.get(15)?,
        heading_id: row.get(16)?,
        heading_title: row.get(17)?,
        tags: Vec::new(),
        index: row.get::<_, Option<i64>>(18)?.unwrap_or_default(),
        today_index,
        repeating: template.is_some_and(|t| !t.is_empty()) || rule.is_some_and(|r| !r.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(&dir.path().join("nope.sqlite")).err().unwrap();
        assert!(matches!(err, DatabaseError::StoreUnavailable { .. }));
    }

    #[test]
    fn open_non_things_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY);")
            .unwrap();
        let err = Store::open(&path).err().unwrap();
        assert!(err.to_string().contains("missing TMTask"));
    }

    #[test]
    fn open_garbage_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.sqlite");
        std::fs::write(&path, b"this is not sqlite at all, just some bytes padding it out").unwrap();
        let err = Store::open(&path).err().unwrap();
        assert!(matches!(err, DatabaseError::StoreUnavailable { .. }));
    }

    #[test]
    fn fold_lowercases_beyond_ascii() {
        let conn = Connection::open_in_memory().unwrap();
        register_fold(&conn).unwrap();
        let folded: String = conn
            .query_row(&format!("SELECT {FOLD_FN}('ÄPFEL Straße')"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "äpfel straße");
        let empty: String = conn
            .query_row(&format!("SELECT {FOLD_FN}(NULL)"), [], |row| row.get(0))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn not_found_error_display() {
        let err = DatabaseError::NotFound { id: "abc".to_string() };
        assert_eq!(err.to_string(), "Task 'abc' not found");
    }
}
