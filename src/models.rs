use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Incomplete,
    Canceled,
    Completed,
}

impl Status {
    /// Code stored in `TMTask.status`
    pub fn code(self) -> i64 {
        match self {
            Status::Incomplete => 0,
            Status::Canceled => 2,
            Status::Completed => 3,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Status::Canceled,
            3 => Status::Completed,
            _ => Status::Incomplete,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Incomplete => "incomplete",
            Status::Canceled => "canceled",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Todo,
    Project,
    Heading,
}

impl TaskType {
    pub fn code(self) -> i64 {
        match self {
            TaskType::Todo => 0,
            TaskType::Project => 1,
            TaskType::Heading => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TaskType::Project,
            2 => TaskType::Heading,
            _ => TaskType::Todo,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskType::Todo => "todo",
            TaskType::Project => "project",
            TaskType::Heading => "heading",
        }
    }
}

/// Scheduling bucket stored in `TMTask.start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartBucket {
    Inbox,
    Anytime,
    Someday,
}

impl StartBucket {
    pub fn code(self) -> i64 {
        match self {
            StartBucket::Inbox => 0,
            StartBucket::Anytime => 1,
            StartBucket::Someday => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => StartBucket::Anytime,
            2 => StartBucket::Someday,
            _ => StartBucket::Inbox,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StartBucket::Inbox => "inbox",
            StartBucket::Anytime => "anytime",
            StartBucket::Someday => "someday",
        }
    }
}

impl fmt::Display for StartBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub uuid: String,
    pub title: String,
    pub notes: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: Status,
    pub trashed: bool,
    pub start: StartBucket,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub stopped: Option<DateTime<Local>>,
    pub project_id: Option<String>,
    pub project_title: Option<String>,
    pub area_id: Option<String>,
    pub area_title: Option<String>,
    pub heading_id: Option<String>,
    pub heading_title: Option<String>,
    pub tags: Vec<String>,
    pub index: i64,
    pub today_index: Option<i64>,
    pub repeating: bool,
}

impl Task {
    pub fn new(uuid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            title: title.into(),
            notes: String::new(),
            task_type: TaskType::Todo,
            status: Status::Incomplete,
            trashed: false,
            start: StartBucket::Inbox,
            start_date: None,
            deadline: None,
            created: None,
            modified: None,
            stopped: None,
            project_id: None,
            project_title: None,
            area_id: None,
            area_title: None,
            heading_id: None,
            heading_title: None,
            tags: Vec::new(),
            index: 0,
            today_index: None,
            repeating: false,
        }
    }

    /// Human-facing bucket, with "today" derived from the start date
    pub fn bucket(&self, today: NaiveDate) -> &'static str {
        match self.start_date {
            Some(date) if date <= today => "today",
            Some(_) => "upcoming",
            None => self.start.label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub uuid: String,
    pub title: String,
    pub status: Status,
    pub trashed: bool,
    pub area_id: Option<String>,
    pub area_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub uuid: String,
    pub title: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub uuid: String,
    pub title: String,
    pub shortcut: Option<String>,
    pub parent_id: Option<String>,
}

/// Repeat template fields as stored on a task row. The rule bytes are opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatRule {
    pub recurrence_rule: Vec<u8>,
    pub instance_creation_start_date: Option<i64>,
    pub instance_creation_paused: i64,
    pub instance_creation_count: i64,
    pub after_completion_reference: Option<i64>,
    pub next_instance_start_date: Option<i64>,
}

/// Write request for the repeat-rule path
#[derive(Debug, Clone, Default)]
pub struct RepeatUpdate {
    pub recurrence_rule: Vec<u8>,
    pub instance_creation_start_date: i64,
    pub instance_creation_paused: i64,
    pub instance_creation_count: i64,
    pub after_completion_reference: Option<i64>,
    pub next_instance_start_date: Option<i64>,
    pub deadline: Option<i64>,
    /// When false the deadline column is left untouched
    pub set_deadline: bool,
}

impl RepeatUpdate {
    /// Carry a rule read from another task over as an update
    pub fn from_rule(rule: RepeatRule) -> Self {
        Self {
            recurrence_rule: rule.recurrence_rule,
            instance_creation_start_date: rule.instance_creation_start_date.unwrap_or_default(),
            instance_creation_paused: rule.instance_creation_paused,
            instance_creation_count: rule.instance_creation_count,
            after_completion_reference: rule.after_completion_reference,
            next_instance_start_date: rule.next_instance_start_date,
            deadline: None,
            set_deadline: false,
        }
    }
}

/// Pack a calendar date the way Things stores `startDate` and `deadline`
pub fn encode_things_date(date: NaiveDate) -> i64 {
    ((date.year() as i64) << 16) | ((date.month() as i64) << 12) | ((date.day() as i64) << 7)
}

pub fn decode_things_date(value: i64) -> Option<NaiveDate> {
    if value <= 0 {
        return None;
    }
    let year = (value >> 16) as i32;
    let month = ((value >> 12) & 0xF) as u32;
    let day = ((value >> 7) & 0x1F) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}
